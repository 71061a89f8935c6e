//! Layered configuration for backup and restore sessions.
//!
//! Sources, lowest priority first: built-in defaults, a configuration file
//! (TOML, YAML or JSON, chosen by extension), then `TOME_` environment
//! variables with nested keys separated by `__` (`TOME_BACKUP__FORMAT=json`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tome_archive::{ContainerFormat, EXPORTABLE_TYPES, ExportOptions, ImportOptions, RecordType, UpdatePolicy};

pub const ENV_PREFIX: &str = "TOME_";
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub format: ContainerFormat,
    pub record_types: BTreeSet<RecordType>,
    /// Only write what changed since the previous backup.
    pub incremental: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self { format: ContainerFormat::default(), record_types: EXPORTABLE_TYPES.into(), incremental: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    pub record_types: BTreeSet<RecordType>,
    pub update_policy: UpdatePolicy,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self { record_types: EXPORTABLE_TYPES.into(), update_policy: UpdatePolicy::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backup: BackupConfig,
    pub restore: RestoreConfig,
}

/// `config.toml` in the platform configuration directory, if there is one.
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "tome").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

fn file_provider(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => exn::bail!(ErrorKind::Invalid(format!("unsupported configuration file: {}", path.display()))),
    })
}

impl Config {
    /// Defaults, then `path` (or the default location when `None`), then the
    /// environment. An explicit path must exist; the default one may not.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let figment = Figment::from(Serialized::defaults(Config::default()));
        let figment = match path {
            Some(path) if !path.exists() => exn::bail!(ErrorKind::Missing(path.to_path_buf())),
            Some(path) => file_provider(figment, path)?,
            None => match default_path() {
                Some(path) if path.exists() => file_provider(figment, &path)?,
                _ => figment,
            },
        };
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    #[tracing::instrument(level = "debug")]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_figment(&Self::figment(path)?)
    }

    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(format = %config.backup.format, policy = ?config.restore.update_policy, "configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.backup.format.is_writable() {
            exn::bail!(ErrorKind::Invalid(format!("backups cannot be written as {}", self.backup.format)));
        }
        if self.backup.record_types.contains(&RecordType::MetaData) {
            exn::bail!(ErrorKind::Invalid("the envelope is always written and cannot be requested".to_string()));
        }
        Ok(())
    }

    pub fn import_options(&self) -> ImportOptions {
        ImportOptions::new(self.restore.record_types.iter().copied()).with_policy(self.restore.update_policy)
    }

    /// `last_backup` is only honoured for incremental backups.
    pub fn export_options(&self, last_backup: Option<OffsetDateTime>) -> ExportOptions {
        let options = ExportOptions::new(self.backup.record_types.iter().copied());
        match last_backup {
            Some(since) if self.backup.incremental => options.incremental_since(since),
            _ => options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use time::macros::datetime;

    fn write(extension: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(&format!(".{extension}")).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_figment(&Figment::from(Serialized::defaults(Config::default()))).unwrap();
        assert_eq!(config.backup.format, ContainerFormat::Zip);
        assert_eq!(config.restore.update_policy, UpdatePolicy::OnlyNewer);
        assert_eq!(config.backup.record_types.len(), EXPORTABLE_TYPES.len());
    }

    #[rstest]
    #[case("toml", "[backup]\nformat = \"json\"\n[restore]\nupdate_policy = \"overwrite\"\n")]
    #[case("yaml", "backup:\n  format: json\nrestore:\n  update_policy: overwrite\n")]
    #[case("json", r#"{"backup":{"format":"json"},"restore":{"update_policy":"overwrite"}}"#)]
    fn test_file_formats(#[case] extension: &str, #[case] contents: &str) {
        let file = write(extension, contents);
        let config = Config::from_figment(&Config::figment(Some(file.path())).unwrap()).unwrap();
        assert_eq!(config.backup.format, ContainerFormat::Json);
        assert_eq!(config.restore.update_policy, UpdatePolicy::Overwrite);
        assert_eq!(config.restore.record_types, RestoreConfig::default().record_types);
    }

    #[rstest]
    #[case("sqlite")]
    #[case("csv")]
    fn test_read_only_backup_format(#[case] format: &str) {
        let file = write("toml", &format!("[backup]\nformat = \"{format}\"\n"));
        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = Config::load(Some(Path::new("/nonexistent/tome.toml"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Missing(_)));
    }

    #[test]
    fn test_unknown_extension() {
        let file = write("ini", "format = zip");
        let err = Config::figment(Some(file.path())).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[test]
    fn test_unparseable_value() {
        let file = write("toml", "[restore]\nupdate_policy = \"sometimes\"\n");
        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Load));
    }

    #[test]
    fn test_options() {
        let mut config = Config::default();
        config.restore.record_types = [RecordType::Books].into();
        config.restore.update_policy = UpdatePolicy::Skip;
        let import = config.import_options();
        assert_eq!(import.record_types(), &BTreeSet::from([RecordType::Books]));
        assert_eq!(import.update_policy(), UpdatePolicy::Skip);

        let last = datetime!(2024-01-01 00:00 UTC);
        assert_eq!(config.export_options(Some(last)).since(), None);
        config.backup.incremental = true;
        assert_eq!(config.export_options(Some(last)).since(), Some(last));
        assert_eq!(config.export_options(None).since(), None);
    }
}
