//! Single-document JSON archives: `{"tome":{"info":{..},"data":{..}}}`.
//!
//! The document is written compactly so it always starts with `{"`, and the
//! envelope comes before the data. Covers are not stored.

use super::{EntrySink, EntrySource, RawEntry};
use crate::consts::{BUFFER_SIZE, JSON_ROOT, SNIFF_LENGTH};
use crate::error::{ErrorKind, Result};
use crate::metadata::ARCHIVER_VERSION_KEY;
use crate::{RecordEncoding, RecordType};
use memchr::memmem;
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{Map, Value};
use std::io::{BufReader, BufWriter, Cursor, Read, Write};
use time::OffsetDateTime;
use tome_storage::ResourceHandle;

const INFO: &str = "info";
const DATA: &str = "data";

#[derive(Deserialize)]
struct Document {
    tome: Body,
}

#[derive(Deserialize)]
struct Body {
    info: Box<RawValue>,
    #[serde(default)]
    data: Option<Box<RawValue>>,
}

/// Presents the envelope and data objects as `info.json` and `data.json`.
pub(crate) struct JsonSource {
    resource: ResourceHandle,
    entries: Option<Vec<(String, String)>>,
    position: usize,
}

impl JsonSource {
    pub(crate) fn new(resource: ResourceHandle) -> Self {
        Self { resource, entries: None, position: 0 }
    }

    /// The full parse, deferred until entries are first needed.
    fn entries(&mut self) -> Result<&[(String, String)]> {
        if self.entries.is_none() {
            let reader = BufReader::with_capacity(BUFFER_SIZE, self.resource.reader().map_err(ErrorKind::storage)?);
            let document: Document = serde_json::from_reader(reader).map_err(ErrorKind::json)?;
            let mut entries = vec![(format!("{INFO}.json"), document.tome.info.get().to_string())];
            if let Some(data) = document.tome.data {
                entries.push((format!("{}.json", RecordType::AutoDetect.prefix()), data.get().to_string()));
            }
            self.entries = Some(entries);
        }
        Ok(self.entries.as_deref().unwrap_or_default())
    }
}

impl EntrySource for JsonSource {
    /// Only the head of the document is inspected.
    fn open(&mut self) -> Result<()> {
        let mut head = Vec::with_capacity(SNIFF_LENGTH as usize);
        let reader = self.resource.reader().map_err(ErrorKind::storage)?;
        reader.take(SNIFF_LENGTH).read_to_end(&mut head).map_err(ErrorKind::io)?;
        let root = format!("{{\"{JSON_ROOT}\":");
        let version = format!("\"{ARCHIVER_VERSION_KEY}\"");
        if !head.starts_with(root.as_bytes()) || memmem::find(&head, version.as_bytes()).is_none() {
            exn::bail!(ErrorKind::Format(None));
        }
        Ok(())
    }

    fn rewind(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }

    fn next_entry(&mut self) -> Result<Option<RawEntry<'_>>> {
        let position = self.position;
        let Some((name, body)) = self.entries()?.get(position).cloned() else {
            return Ok(None);
        };
        self.position += 1;
        Ok(Some(RawEntry { name, modified: None, reader: Box::new(Cursor::new(body.into_bytes())) }))
    }

    fn release(&mut self) -> Result<()> {
        self.entries = None;
        Ok(())
    }
}

/// Collects sections and writes the single document when finished.
pub(crate) struct JsonSink {
    resource: ResourceHandle,
    open: bool,
    info: Option<Value>,
    data: Map<String, Value>,
}

impl JsonSink {
    pub(crate) fn new(resource: ResourceHandle) -> Self {
        Self { resource, open: false, info: None, data: Map::new() }
    }
}

impl EntrySink for JsonSink {
    fn open(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn supports_covers(&self) -> bool {
        false
    }

    fn accepts(&self, encoding: RecordEncoding) -> bool {
        encoding == RecordEncoding::Json
    }

    fn put(&mut self, name: &str, bytes: &[u8], _modified: Option<OffsetDateTime>, _compress: bool) -> Result<()> {
        if !self.open {
            exn::bail!(ErrorKind::Contract("json archive is not open"));
        }
        let value: Value = serde_json::from_slice(bytes).map_err(ErrorKind::json)?;
        match (RecordType::resolve(name), value) {
            (Some(RecordType::MetaData), info) => self.info = Some(info),
            (_, Value::Object(sections)) => self.data.extend(sections),
            _ => exn::bail!(ErrorKind::format(format!("{name} is not a JSON object"))),
        }
        Ok(())
    }

    /// Nothing touches the resource until here, so a failed or cancelled
    /// backup never truncates an existing archive.
    fn finish(&mut self) -> Result<()> {
        if !std::mem::take(&mut self.open) {
            return Ok(());
        }
        let info = self.info.take().unwrap_or_else(|| Value::Object(Map::new()));
        let data = Value::Object(std::mem::take(&mut self.data));
        let mut out = BufWriter::with_capacity(BUFFER_SIZE, self.resource.writer().map_err(ErrorKind::storage)?);
        // Written by hand: the envelope has to precede the data.
        write!(out, "{{\"{JSON_ROOT}\":{{\"{INFO}\":").map_err(ErrorKind::io)?;
        serde_json::to_writer(&mut out, &info).map_err(ErrorKind::json)?;
        write!(out, ",\"{DATA}\":").map_err(ErrorKind::io)?;
        serde_json::to_writer(&mut out, &data).map_err(ErrorKind::json)?;
        out.write_all(b"}}").map_err(ErrorKind::io)?;
        out.flush().map_err(ErrorKind::io)
    }

    fn release(&mut self) {
        self.open = false;
        self.info = None;
        self.data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tome_storage::MemoryResource;

    #[test]
    fn test_document_shape() {
        let resource = MemoryResource::new("backup.json");
        let mut sink = JsonSink::new(Arc::new(resource.clone()));
        sink.open().unwrap();
        sink.put("info.json", br#"{"archiver-version":5}"#, None, true).unwrap();
        sink.put("bookshelves.json", br#"{"bookshelves":[{"name":"A"}]}"#, None, true).unwrap();
        sink.put("books.json", br#"{"books":[]}"#, None, true).unwrap();
        sink.finish().unwrap();
        let written = String::from_utf8(resource.bytes()).unwrap();
        assert!(written.starts_with(r#"{"tome":{"info":{"archiver-version":5},"data":{"#));
        let value: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["tome"]["data"]["bookshelves"][0]["name"], "A");
        assert_eq!(value["tome"]["data"]["books"], Value::Array(Vec::new()));

        let mut source = JsonSource::new(Arc::new(resource.clone()));
        source.open().unwrap();
        let names: Vec<String> = std::iter::from_fn(|| source.next_entry().unwrap().map(|entry| entry.name)).collect();
        assert_eq!(names, vec!["info.json", "data.json"]);
        assert_eq!(resource.open_handles(), 0);
    }

    #[test]
    fn test_foreign_json_is_rejected() {
        let resource = MemoryResource::with_bytes("export.json", br#"{"books":[]}"#.to_vec());
        let err = JsonSource::new(Arc::new(resource)).open().unwrap_err();
        assert_eq!(*err, ErrorKind::Format(None));
    }

    #[test]
    fn test_failed_backup_leaves_resource_alone() {
        let resource = MemoryResource::with_bytes("backup.json", b"previous".to_vec());
        let mut sink = JsonSink::new(Arc::new(resource.clone()));
        sink.open().unwrap();
        sink.put("info.json", b"{}", None, true).unwrap();
        sink.release();
        sink.finish().unwrap();
        assert_eq!(resource.bytes(), b"previous");
    }
}
