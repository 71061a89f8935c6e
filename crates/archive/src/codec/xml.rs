//! Legacy XML records. Read only: the envelope (`info-list`), preferences
//! (`preferences-list`) and styles (`style-list`) as written by older
//! versions.
//!
//! Values are typed elements (`<int name="x" value="1"/>`,
//! `<string name="y">text</string>`, `<set name="z"><string value="a"/></set>`).

use super::{Entry, Importer, ReadContext, RecordReader};
use crate::consts::BUFFER_SIZE;
use crate::error::{ErrorKind, Result};
use crate::{MetaData, ReadResults, RecordType, Scalar, UpdatePolicy};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::BTreeSet;
use std::io::BufReader;
use tome_catalog::{PreferenceValue, Preferences, Style};

const INFO_LIST: &str = "info-list";
const PREFERENCES_LIST: &str = "preferences-list";
const STYLE_LIST: &str = "style-list";
const STYLE: &str = "style";

/// A parsed element. Legacy documents are small, so the whole tree is built
/// before anything is applied.
#[derive(Debug, Default)]
struct Node {
    tag: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn open(start: &BytesStart<'_>) -> Result<Self> {
        let mut node = Node { tag: String::from_utf8_lossy(start.name().as_ref()).into_owned(), ..Node::default() };
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|err| ErrorKind::xml(err.into()))?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute.unescape_value().map_err(ErrorKind::xml)?.into_owned();
            node.attributes.push((key, value));
        }
        Ok(node)
    }

    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// The value of a typed element: the `value` attribute or the body.
    fn value(&self) -> &str {
        self.attribute("value").unwrap_or(self.text.as_str())
    }

    /// Every descendant (and self) with the given tag, in document order.
    fn find<'a>(&'a self, tag: &str, found: &mut Vec<&'a Node>) {
        if self.tag == tag {
            found.push(self);
        }
        for child in &self.children {
            child.find(tag, found);
        }
    }

    /// Decode a typed element into a named value.
    fn typed(&self) -> Option<(String, PreferenceValue)> {
        let name = self.attribute("name")?.to_string();
        let value = match self.tag.as_str() {
            "boolean" => PreferenceValue::Bool(self.value().trim().parse().ok()?),
            "int" | "long" => PreferenceValue::Int(self.value().trim().parse().ok()?),
            "string" | "float" | "double" | "serializable" => PreferenceValue::Text(self.value().to_string()),
            "set" | "list" => PreferenceValue::List(self.children.iter().map(|c| c.value().to_string()).collect()),
            _ => return None,
        };
        Some((name, value))
    }
}

fn parse(entry: &mut Entry<'_>) -> Result<Vec<Node>> {
    let mut reader = Reader::from_reader(BufReader::with_capacity(BUFFER_SIZE, entry.reader()));
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut roots = Vec::new();
    let mut stack: Vec<Node> = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(ErrorKind::xml)? {
            Event::Start(start) => stack.push(Node::open(&start)?),
            Event::Empty(start) => {
                let node = Node::open(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => roots.push(node),
                }
            },
            Event::Text(text) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&text.unescape().map_err(ErrorKind::xml)?);
                }
            },
            Event::CData(data) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(&data));
                }
            },
            Event::End(_) => {
                let Some(node) = stack.pop() else {
                    exn::bail!(ErrorKind::format("unbalanced XML"));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => roots.push(node),
                }
            },
            Event::Eof => break,
            _ => {},
        }
        buf.clear();
    }
    if !stack.is_empty() {
        exn::bail!(ErrorKind::format(format!("{} ends inside an element", entry.name())));
    }
    Ok(roots)
}

fn find<'a>(roots: &'a [Node], tag: &str) -> Vec<&'a Node> {
    let mut found = Vec::new();
    for root in roots {
        root.find(tag, &mut found);
    }
    found
}

pub(crate) struct XmlRecordReader {
    allowed: BTreeSet<RecordType>,
    policy: UpdatePolicy,
}

impl XmlRecordReader {
    pub(crate) fn new(allowed: BTreeSet<RecordType>, policy: UpdatePolicy) -> Self {
        Self { allowed, policy }
    }

    fn preferences(importer: &mut Importer<'_>, list: &Node) {
        let mut preferences = Preferences::new();
        for (index, child) in list.children.iter().enumerate() {
            match child.typed() {
                Some((name, value)) => {
                    preferences.insert(name, value);
                },
                None => importer.failed(RecordType::Preferences, index, format!("unreadable <{}>", child.tag)),
            }
        }
        importer.preferences(&preferences);
    }

    fn styles(importer: &mut Importer<'_>, list: &Node) {
        for (index, node) in list.children.iter().filter(|node| node.tag == STYLE).enumerate() {
            let Some(uuid) = node.attribute("uuid").or(node.attribute("id")).filter(|uuid| !uuid.is_empty()) else {
                importer.failed(RecordType::Styles, index, "style has no uuid");
                continue;
            };
            let style = Style {
                uuid: uuid.to_string(),
                name: node.attribute("name").unwrap_or(uuid).to_string(),
                preferred: node.attribute("preferred") == Some("true"),
                settings: node.children.iter().filter_map(Node::typed).collect(),
            };
            importer.style(index, &style);
        }
    }
}

impl RecordReader for XmlRecordReader {
    fn read_metadata(&mut self, entry: &mut Entry<'_>) -> Result<Option<MetaData>> {
        if entry.record_type() != RecordType::MetaData {
            return Ok(None);
        }
        let roots = parse(entry)?;
        let Some(list) = find(&roots, INFO_LIST).into_iter().next() else {
            return Ok(None);
        };
        let metadata = list
            .children
            .iter()
            .filter_map(Node::typed)
            .filter_map(|(name, value)| {
                let scalar = match value {
                    PreferenceValue::Bool(value) => Scalar::Bool(value),
                    PreferenceValue::Int(value) => Scalar::Int(value),
                    PreferenceValue::Text(value) => Scalar::Text(value),
                    PreferenceValue::List(_) => return None,
                };
                Some((name, scalar))
            })
            .collect();
        Ok(Some(metadata))
    }

    #[tracing::instrument(level = "debug", skip_all, fields(entry = entry.name()))]
    fn read(&mut self, entry: &mut Entry<'_>, context: &ReadContext<'_>) -> Result<ReadResults> {
        let roots = parse(entry)?;
        let record_type = entry.record_type();
        let mut importer = Importer::new(context.catalog, &self.allowed, self.policy);
        let wanted = |ty: RecordType| match record_type {
            RecordType::AutoDetect => true,
            _ => ty == record_type,
        };
        if wanted(RecordType::Styles) && importer.allows(RecordType::Styles) {
            for list in find(&roots, STYLE_LIST) {
                Self::styles(&mut importer, list);
            }
        }
        if wanted(RecordType::Preferences) && importer.allows(RecordType::Preferences) {
            for list in find(&roots, PREFERENCES_LIST) {
                Self::preferences(&mut importer, list);
            }
        }
        context.progress.advance(1, Some(entry.name()));
        Ok(importer.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{NoProgress, ProgressReporter};
    use crate::{Counters, RecordEncoding};
    use std::io::Cursor;
    use tome_catalog::{Catalog, MemoryCatalog};

    fn entry_for<'a>(name: &'a str, reader: &'a mut Cursor<Vec<u8>>) -> Entry<'a> {
        let ty = RecordType::resolve(name).unwrap();
        Entry::new(name, ty, RecordEncoding::Xml, None, reader)
    }

    fn read(name: &str, xml: &str, catalog: &MemoryCatalog) -> Result<ReadResults> {
        let mut reader = Cursor::new(xml.as_bytes().to_vec());
        let mut entry = entry_for(name, &mut reader);
        let progress = ProgressReporter::new(&NoProgress);
        let context = ReadContext { catalog, progress: &progress };
        XmlRecordReader::new(RecordType::ALL.into_iter().collect(), UpdatePolicy::Overwrite).read(&mut entry, &context)
    }

    #[test]
    fn test_info_list() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <info-list version="2">
                <int name="archiver-version" value="2"/>
                <string name="app-package">org.example.books</string>
                <long name="book-count" value="12"/>
            </info-list>"#;
        let mut reader = Cursor::new(xml.as_bytes().to_vec());
        let mut entry = entry_for("info.xml", &mut reader);
        let mut codec = XmlRecordReader::new(BTreeSet::new(), UpdatePolicy::Skip);
        let metadata = codec.read_metadata(&mut entry).unwrap().unwrap();
        assert_eq!(metadata.validate().unwrap(), 2);
        assert_eq!(metadata.app_package(), Some("org.example.books"));
        assert_eq!(metadata.book_count(), Some(12));
    }

    #[test]
    fn test_preferences_list() {
        let catalog = MemoryCatalog::default();
        let xml = r#"<preferences-list>
                <boolean name="compact" value="true"/>
                <int name="columns" value="three"/>
                <set name="sites"><string value="a"/><string>b</string></set>
                <string name="theme">dark &amp; moody</string>
            </preferences-list>"#;
        let results = read("preferences.xml", xml, &catalog).unwrap();
        assert_eq!(results.preferences, Counters { processed: 4, created: 3, failed: 1, ..Counters::default() });
        let stored = catalog.preferences().unwrap();
        assert_eq!(stored["compact"], PreferenceValue::Bool(true));
        assert_eq!(stored["sites"], PreferenceValue::List(vec!["a".into(), "b".into()]));
        assert_eq!(stored["theme"], PreferenceValue::Text("dark & moody".into()));
    }

    #[test]
    fn test_style_list() {
        let catalog = MemoryCatalog::default();
        let xml = r#"<style-list>
                <style uuid="s-1" name="Compact" preferred="true"><int name="level" value="2"/></style>
                <style name="Broken"/>
            </style-list>"#;
        let results = read("styles.xml", xml, &catalog).unwrap();
        assert_eq!(results.styles, Counters { processed: 2, created: 1, failed: 1, ..Counters::default() });
        let style = catalog.style("s-1").unwrap().unwrap();
        assert!(style.preferred);
        assert_eq!(style.settings["level"], PreferenceValue::Int(2));
    }

    #[test]
    fn test_truncated_document() {
        let err = read("styles.xml", "<style-list><style uuid=\"a\">", &MemoryCatalog::default()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Format(_)));
    }
}
