use crate::consts::{CSV_NAME_REGEX, JSON_NAME_REGEX, XML_NAME_REGEX};
use derive_more::Display;
use regex::Regex;

/// Image extensions checked before any pattern. Cover entries vastly
/// outnumber everything else in an archive.
const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Serialisation family of a single record.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordEncoding {
    #[display("json")]
    Json,
    #[display("csv")]
    Csv,
    #[display("xml")]
    Xml,
    #[display("image")]
    Image,
}

impl RecordEncoding {
    /// Detect the encoding of an entry from its name.
    ///
    /// # Examples
    ///
    /// ```
    /// use tome_archive::RecordEncoding;
    ///
    /// assert_eq!(RecordEncoding::detect("books.json"), Some(RecordEncoding::Json));
    /// assert_eq!(RecordEncoding::detect("abc123.JPG"), Some(RecordEncoding::Image));
    /// assert_eq!(RecordEncoding::detect("notes.txt"), None);
    /// ```
    pub fn detect(entry_name: &str) -> Option<Self> {
        if let Some((_, extension)) = entry_name.rsplit_once('.')
            && IMAGE_EXTENSIONS.iter().any(|image| extension.eq_ignore_ascii_case(image))
        {
            return Some(Self::Image);
        }
        let detected = [Self::Json, Self::Csv, Self::Xml]
            .into_iter()
            .find(|encoding| encoding.pattern().is_some_and(|pattern| pattern.is_match(entry_name)));
        if detected.is_none() {
            tracing::debug!(entry = entry_name, "no record encoding for entry");
        }
        detected
    }

    /// Extension used when writing an entry of this encoding.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Xml => "xml",
            Self::Image => "jpg",
        }
    }

    fn pattern(self) -> Option<&'static Regex> {
        match self {
            Self::Json => Some(&*JSON_NAME_REGEX),
            Self::Csv => Some(&*CSV_NAME_REGEX),
            Self::Xml => Some(&*XML_NAME_REGEX),
            Self::Image => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("cover.jpeg", Some(RecordEncoding::Image))]
    #[case("cover.PNG", Some(RecordEncoding::Image))]
    #[case("styles.json", Some(RecordEncoding::Json))]
    #[case("export.csv (3)", Some(RecordEncoding::Csv))]
    #[case("preferences.xml", Some(RecordEncoding::Xml))]
    #[case("books", None)]
    #[case("books.json.gz", None)]
    fn test_detect(#[case] name: &str, #[case] expected: Option<RecordEncoding>) {
        assert_eq!(RecordEncoding::detect(name), expected);
    }
}
