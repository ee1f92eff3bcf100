//! JSON-lines serialization of finalized records

use super::record::{CallRecord, ExceptionDetail};
use crate::vm::TraceResult;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::io::Write;

/// Written in the `exception` field when a frame unwound without an
/// observed exception
pub const UNKNOWN_EXCEPTION: &str = "<unknown exception>";

/// Wire form of one record
///
/// Field order is fixed; unset fields serialize as `null`.
#[derive(Debug, Serialize)]
pub struct TraceLine<'a> {
    pub name: &'a str,
    pub args: ArgsMap<'a>,
    pub class: Option<&'a str>,
    pub info: &'a str,
    pub exception: Option<&'a str>,
    pub returns: Option<&'a str>,
}

impl<'a> From<&'a CallRecord> for TraceLine<'a> {
    fn from(record: &'a CallRecord) -> Self {
        let exception = record.exception.as_ref().map(|detail| match detail {
            ExceptionDetail::Raised(text) => text.as_str(),
            ExceptionDetail::Unknown => UNKNOWN_EXCEPTION,
        });
        Self {
            name: &record.name,
            args: ArgsMap(&record.args),
            class: record.class_context.as_deref(),
            info: &record.location,
            exception,
            returns: record.return_value.as_deref(),
        }
    }
}

/// Arguments as a JSON object in declaration order
#[derive(Debug)]
pub struct ArgsMap<'a>(pub &'a [(String, String)]);

impl Serialize for ArgsMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Writes one JSON object per line to a sink
#[derive(Debug)]
pub struct Emitter<W: Write> {
    writer: W,
    flush: bool,
    emitted: u64,
}

impl<W: Write> Emitter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            flush: true,
            emitted: 0,
        }
    }

    /// Flush the sink after every record (on by default)
    pub fn with_flush(mut self, flush: bool) -> Self {
        self.flush = flush;
        self
    }

    pub fn emit(&mut self, record: &CallRecord) -> TraceResult<()> {
        serde_json::to_writer(&mut self.writer, &TraceLine::from(record))?;
        self.writer.write_all(b"\n")?;
        if self.flush {
            self.writer.flush()?;
        }
        self.emitted += 1;
        Ok(())
    }

    /// Number of records written so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}
