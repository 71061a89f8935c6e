use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

/// Streaming buffer size shared by every text codec.
pub const BUFFER_SIZE: usize = 64 * 1024;

/// How many leading bytes the detector is allowed to look at.
pub const SNIFF_LENGTH: u64 = 512;

/// Root key of the single-file JSON container.
pub const JSON_ROOT: &str = "tome";

// A browser or file manager may append " (2)" to a downloaded duplicate.
const DUPLICATE_SUFFIX: &str = r"(?:\s*\(\d+\))?$";

regex!(JSON_NAME_REGEX, format!(r"(?i)\.json{DUPLICATE_SUFFIX}").as_str());
regex!(CSV_NAME_REGEX, format!(r"(?i)\.csv{DUPLICATE_SUFFIX}").as_str());
regex!(XML_NAME_REGEX, format!(r"(?i)\.xml{DUPLICATE_SUFFIX}").as_str());

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("export.csv", true)]
    #[case("export.CSV", true)]
    #[case("export.csv (2)", true)]
    #[case("export.csv(12)", true)]
    #[case("export.csv.bak", false)]
    #[case("export.csv (two)", false)]
    fn test_duplicate_suffix(#[case] name: &str, #[case] matches: bool) {
        assert_eq!(CSV_NAME_REGEX.is_match(name), matches);
    }
}
