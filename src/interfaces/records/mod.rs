//! Pipe-delimited line formats used by the flat-file store.
//!
//! One record per line, no header row. Fields are written in declaration order and
//! read back by position; a field containing `|`, a quote or a line break is quoted.

pub mod transaction_record;
pub mod wallet_record;

use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{Read, Write};

pub const DELIMITER: u8 = b'|';

/// Reads records of any serde type from a pipe-delimited source.
///
/// Blank lines are skipped by the underlying `csv::Reader`. Field counts are not
/// compared across lines, so a short or long line only fails its own decode.
pub struct RecordReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> RecordReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(false)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily decodes one record per line. A malformed line yields an `Err` item and
    /// reading continues with the next line.
    pub fn records<T: DeserializeOwned>(self) -> impl Iterator<Item = Result<T>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(LedgerError::from))
    }
}

pub struct RecordWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(sink: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(false)
            .from_writer(sink);
        Self { writer }
    }

    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<()> {
        self.writer.serialize(record)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

pub(crate) fn from_epoch_seconds(seconds: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| LedgerError::Record(format!("timestamp {seconds} out of range")))
}
