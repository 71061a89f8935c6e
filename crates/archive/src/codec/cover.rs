//! Cover images, one entity per entry.

use super::{Entry, Importer, ReadContext, RecordReader, RecordWriter, WriteContext};
use crate::error::{ErrorKind, Result};
use crate::{MetaData, ReadResults, RecordType, UpdatePolicy, WriteResults};
use std::collections::BTreeSet;
use std::io::{Read, Write};
use time::OffsetDateTime;
use tome_catalog::Cover;

const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];
const PNG_MAGIC: [u8; 4] = [0x89, 0x50, 0x4E, 0x47];

fn is_image(bytes: &[u8]) -> bool {
    bytes.starts_with(&JPEG_MAGIC) || bytes.starts_with(&PNG_MAGIC)
}

/// Entry names may carry directories; covers are stored by file name.
fn cover_name(entry_name: &str) -> &str {
    entry_name.rsplit(['/', '\\']).next().unwrap_or(entry_name)
}

pub(crate) struct CoverRecordReader {
    allowed: BTreeSet<RecordType>,
    policy: UpdatePolicy,
    index: usize,
}

impl CoverRecordReader {
    pub(crate) fn new(allowed: BTreeSet<RecordType>, policy: UpdatePolicy) -> Self {
        Self { allowed, policy, index: 0 }
    }
}

impl RecordReader for CoverRecordReader {
    fn read(&mut self, entry: &mut Entry<'_>, context: &ReadContext<'_>) -> Result<ReadResults> {
        let mut importer = Importer::new(context.catalog, &self.allowed, self.policy);
        let index = self.index;
        self.index += 1;
        let name = cover_name(entry.name()).to_string();
        let mut bytes = Vec::new();
        entry.reader().read_to_end(&mut bytes).map_err(ErrorKind::io)?;
        if is_image(&bytes) {
            let cover = Cover { name: name.clone(), bytes, modified: entry.modified() };
            importer.cover(index, &cover);
        } else {
            importer.failed(RecordType::Cover, index, format!("{name} is not a JPEG or PNG image"));
        }
        context.progress.advance(1, Some(&name));
        Ok(importer.finish())
    }
}

#[derive(Debug, Default)]
pub(crate) struct CoverRecordWriter {
    modified: Option<OffsetDateTime>,
}

impl RecordWriter for CoverRecordWriter {
    fn write_metadata(&mut self, _out: &mut dyn Write, _metadata: &MetaData) -> Result<()> {
        exn::bail!(ErrorKind::format("the envelope cannot be written as an image"))
    }

    fn write(&mut self, out: &mut dyn Write, record_type: RecordType, context: &WriteContext<'_>) -> Result<WriteResults> {
        let Some(name) = context.subject.filter(|_| record_type == RecordType::Cover) else {
            exn::bail!(ErrorKind::Contract("cover writer needs a single cover to write"));
        };
        let mut results = WriteResults::default();
        self.modified = None;
        match context.catalog.cover(name).map_err(ErrorKind::catalog)? {
            Some(cover) => {
                out.write_all(&cover.bytes).map_err(ErrorKind::io)?;
                self.modified = cover.modified;
                results.covers = 1;
                results.cover_names.insert(cover.name);
                context.progress.advance(1, Some(name));
            },
            None => tracing::warn!(cover = name, "cover disappeared before it could be written"),
        }
        Ok(results)
    }

    fn modified(&self) -> Option<OffsetDateTime> {
        self.modified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{NoProgress, ProgressReporter};
    use crate::{Counters, RecordEncoding};
    use std::io::Cursor;
    use time::macros::datetime;
    use tome_catalog::{Catalog, MemoryCatalog};

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    fn read(codec: &mut CoverRecordReader, name: &str, bytes: &[u8], catalog: &MemoryCatalog) -> ReadResults {
        let mut reader = Cursor::new(bytes.to_vec());
        let modified = Some(datetime!(2024-02-02 0:00 UTC));
        let mut entry = Entry::new(name, RecordType::Cover, RecordEncoding::Image, modified, &mut reader);
        let progress = ProgressReporter::new(&NoProgress);
        codec.read(&mut entry, &ReadContext { catalog, progress: &progress }).unwrap()
    }

    #[test]
    fn test_valid_and_invalid_images() {
        let catalog = MemoryCatalog::default();
        let mut codec = CoverRecordReader::new(BTreeSet::from([RecordType::Cover]), UpdatePolicy::OnlyNewer);
        let first = read(&mut codec, "covers/b-1.jpg", JPEG, &catalog);
        let second = read(&mut codec, "b-2.png", b"not an image", &catalog);
        let total = first + second;
        assert_eq!(total.covers, Counters { processed: 2, created: 1, failed: 1, ..Counters::default() });
        let stored = catalog.cover("b-1.jpg").unwrap().unwrap();
        assert_eq!(stored.modified, Some(datetime!(2024-02-02 0:00 UTC)));
    }

    #[test]
    fn test_write_single_cover() {
        let catalog = MemoryCatalog::default().with_covers([Cover::new("b-1.jpg", JPEG)]);
        let progress = ProgressReporter::new(&NoProgress);
        let context = WriteContext { catalog: &catalog, progress: &progress, subject: Some("b-1.jpg") };
        let mut out = Vec::new();
        let mut codec = CoverRecordWriter::default();
        let results = codec.write(&mut out, RecordType::Cover, &context).unwrap();
        assert_eq!(out, JPEG);
        assert_eq!(results.covers, 1);
        assert!(results.cover_names.contains("b-1.jpg"));
    }
}
