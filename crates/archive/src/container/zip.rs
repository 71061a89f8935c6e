//! Zip bundles: one entry per record, covers stored, text deflated.

use super::{EntrySink, EntrySource, RawEntry};
use crate::error::{ErrorKind, Result};
use crate::RecordType;
use std::io::Write;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};
use tome_storage::{BoxReader, BoxWriter, ResourceHandle};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Zip timestamps carry no offset; they are written and read back as UTC.
fn to_offset(at: zip::DateTime) -> Option<OffsetDateTime> {
    let month = Month::try_from(at.month()).ok()?;
    let date = Date::from_calendar_date(i32::from(at.year()), month, at.day()).ok()?;
    let time = Time::from_hms(at.hour(), at.minute(), at.second()).ok()?;
    Some(PrimitiveDateTime::new(date, time).assume_utc())
}

fn from_offset(at: OffsetDateTime) -> Option<zip::DateTime> {
    let at = at.to_offset(UtcOffset::UTC);
    let year = u16::try_from(at.year()).ok()?;
    zip::DateTime::from_date_and_time(year, u8::from(at.month()), at.day(), at.hour(), at.minute(), at.second()).ok()
}

pub(crate) struct ZipSource {
    resource: ResourceHandle,
    archive: Option<ZipArchive<BoxReader>>,
    position: usize,
}

impl ZipSource {
    pub(crate) fn new(resource: ResourceHandle) -> Self {
        Self { resource, archive: None, position: 0 }
    }
}

impl EntrySource for ZipSource {
    /// Reads the central directory only.
    fn open(&mut self) -> Result<()> {
        let reader = self.resource.reader().map_err(ErrorKind::storage)?;
        let archive = ZipArchive::new(reader).map_err(ErrorKind::zip)?;
        if !archive.file_names().any(|name| RecordType::resolve(name) == Some(RecordType::MetaData)) {
            exn::bail!(ErrorKind::Format(None));
        }
        self.archive = Some(archive);
        Ok(())
    }

    fn entry_count(&self) -> Option<u64> {
        self.archive.as_ref().map(|archive| archive.len() as u64)
    }

    fn rewind(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }

    fn next_entry(&mut self) -> Result<Option<RawEntry<'_>>> {
        let Some(archive) = self.archive.as_mut() else {
            exn::bail!(ErrorKind::Contract("zip archive is not open"));
        };
        let index = loop {
            let index = self.position;
            let Some(name) = archive.name_for_index(index) else {
                return Ok(None);
            };
            self.position += 1;
            if !name.ends_with('/') {
                break index;
            }
        };
        let file = archive.by_index(index).map_err(ErrorKind::zip)?;
        Ok(Some(RawEntry {
            name: file.name().to_string(),
            modified: file.last_modified().and_then(to_offset),
            reader: Box::new(file),
        }))
    }

    fn release(&mut self) -> Result<()> {
        self.archive = None;
        Ok(())
    }
}

pub(crate) struct ZipSink {
    resource: ResourceHandle,
    writer: Option<ZipWriter<BoxWriter>>,
}

impl ZipSink {
    pub(crate) fn new(resource: ResourceHandle) -> Self {
        Self { resource, writer: None }
    }
}

impl EntrySink for ZipSink {
    fn open(&mut self) -> Result<()> {
        let out = self.resource.writer().map_err(ErrorKind::storage)?;
        self.writer = Some(ZipWriter::new(out));
        Ok(())
    }

    fn supports_covers(&self) -> bool {
        true
    }

    fn put(&mut self, name: &str, bytes: &[u8], modified: Option<OffsetDateTime>, compress: bool) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            exn::bail!(ErrorKind::Contract("zip archive is not open"));
        };
        // Images are already compressed.
        let method = match compress {
            true => CompressionMethod::Deflated,
            false => CompressionMethod::Stored,
        };
        let mut options = SimpleFileOptions::default().compression_method(method);
        if let Some(at) = modified.and_then(from_offset) {
            options = options.last_modified_time(at);
        }
        writer.start_file(name, options).map_err(ErrorKind::zip)?;
        writer.write_all(bytes).map_err(ErrorKind::io)
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            let mut out = writer.finish().map_err(ErrorKind::zip)?;
            out.flush().map_err(ErrorKind::io)?;
        }
        Ok(())
    }

    fn release(&mut self) {
        self.writer = None;
    }
}
