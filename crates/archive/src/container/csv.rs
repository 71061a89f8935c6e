//! Legacy CSV exports: a single file of books and no envelope.

use super::{EntrySource, RawEntry};
use crate::consts::{BUFFER_SIZE, SNIFF_LENGTH};
use crate::error::{ErrorKind, Result};
use crate::metadata::ARCHIVER_VERSION_KEY;
use crate::{MetaData, RecordEncoding, RecordType};
use std::io::{BufReader, Read};
use tome_storage::ResourceHandle;

/// Archiver version assumed for CSV exports.
const LEGACY_VERSION: i64 = 1;

pub(crate) struct CsvSource {
    resource: ResourceHandle,
    done: bool,
}

impl CsvSource {
    pub(crate) fn new(resource: ResourceHandle) -> Self {
        Self { resource, done: false }
    }
}

impl EntrySource for CsvSource {
    /// The first line must name the row id column.
    fn open(&mut self) -> Result<()> {
        let mut head = Vec::with_capacity(SNIFF_LENGTH as usize);
        let reader = self.resource.reader().map_err(ErrorKind::storage)?;
        reader.take(SNIFF_LENGTH).read_to_end(&mut head).map_err(ErrorKind::io)?;
        let first_line = head.split(|&b| b == b'\n').next().unwrap_or_default();
        if !String::from_utf8_lossy(first_line).contains("_id") {
            exn::bail!(ErrorKind::Format(None));
        }
        Ok(())
    }

    fn synthetic_metadata(&mut self) -> Result<Option<MetaData>> {
        let mut metadata = MetaData::new();
        metadata.insert(ARCHIVER_VERSION_KEY, LEGACY_VERSION);
        Ok(Some(metadata))
    }

    fn entry_count(&self) -> Option<u64> {
        Some(1)
    }

    fn rewind(&mut self) -> Result<()> {
        self.done = false;
        Ok(())
    }

    fn next_entry(&mut self) -> Result<Option<RawEntry<'_>>> {
        if std::mem::replace(&mut self.done, true) {
            return Ok(None);
        }
        let reader = self.resource.reader().map_err(ErrorKind::storage)?;
        Ok(Some(RawEntry {
            name: format!("{}.{}", RecordType::Books.prefix(), RecordEncoding::Csv.extension()),
            modified: None,
            reader: Box::new(BufReader::with_capacity(BUFFER_SIZE, reader)),
        }))
    }

    fn release(&mut self) -> Result<()> {
        self.done = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tome_storage::MemoryResource;

    #[test]
    fn test_single_books_entry() {
        let resource = MemoryResource::with_bytes("export.csv", b"\"_id\",\"book_uuid\",\"title\"\n".to_vec());
        let mut source = CsvSource::new(Arc::new(resource.clone()));
        source.open().unwrap();
        assert_eq!(source.synthetic_metadata().unwrap().unwrap().validate().unwrap(), 1);
        assert_eq!(source.next_entry().unwrap().unwrap().name, "books.csv");
        assert!(source.next_entry().unwrap().is_none());
        assert_eq!(resource.open_handles(), 0);
    }

    #[test]
    fn test_other_text_is_rejected() {
        let resource = MemoryResource::with_bytes("export.csv", b"title,author\nDune,Herbert\n".to_vec());
        assert!(CsvSource::new(Arc::new(resource)).open().is_err());
    }
}
