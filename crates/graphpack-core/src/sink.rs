// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Partition sinks: append-only byte destinations, one per output partition.
//!
//! [`BlockSink`] is the port; [`LocalFileSink`] and [`MemorySink`] are the
//! in-crate adapters. Remote adapters live in their own crates
//! (`graphpack-webhdfs`).

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failures reported by a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The target could not be created or opened.
    #[error("cannot open {target}: {source}")]
    Open {
        /// Sink target (path or URL).
        target: String,
        /// Underlying error.
        source: io::Error,
    },

    /// A write or flush failed.
    #[error("IO error on {target}: {source}")]
    Io {
        /// Sink target (path or URL).
        target: String,
        /// Underlying error.
        source: io::Error,
    },

    /// A remote store rejected or failed an operation.
    #[error("remote store error on {target}: {message}")]
    Remote {
        /// Sink target (path or URL).
        target: String,
        /// Failure description.
        message: String,
    },
}

/// An append-only destination for encoded records.
///
/// Bytes passed to [`append`](BlockSink::append) must end up in the target in
/// call order. Local sinks hand every appended byte to the OS on
/// [`flush`](BlockSink::flush); remote sinks may batch flushes and only
/// guarantee delivery once [`finish`](BlockSink::finish) returns.
pub trait BlockSink {
    /// Human-readable destination (file path or URL).
    fn target(&self) -> &str;

    /// Appends bytes to the end of the target.
    fn append(&mut self, bytes: &[u8]) -> Result<(), SinkError>;

    /// Pushes buffered bytes to the target.
    fn flush(&mut self) -> Result<(), SinkError>;

    /// Completes the target. Defaults to a final flush.
    fn finish(&mut self) -> Result<(), SinkError> {
        self.flush()
    }
}

impl<S: BlockSink + ?Sized> BlockSink for Box<S> {
    fn target(&self) -> &str {
        (**self).target()
    }

    fn append(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        (**self).append(bytes)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush()
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        (**self).finish()
    }
}

/// A sink backed by a file on the local filesystem.
///
/// The file is truncated on creation; missing parent directories are created.
#[derive(Debug)]
pub struct LocalFileSink {
    target: String,
    writer: BufWriter<File>,
}

impl LocalFileSink {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        let target = path.display().to_string();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| SinkError::Open {
                target: target.clone(),
                source,
            })?;
        }
        let file = File::create(path).map_err(|source| SinkError::Open {
            target: target.clone(),
            source,
        })?;
        Ok(Self {
            target,
            writer: BufWriter::new(file),
        })
    }

    /// Path of partition `index` under `prefix` (`<prefix><index>.dat`).
    pub fn partition_path(prefix: &str, index: usize) -> PathBuf {
        PathBuf::from(format!("{prefix}{index}.dat"))
    }

    fn io_error(&self, source: io::Error) -> SinkError {
        SinkError::Io {
            target: self.target.clone(),
            source,
        }
    }
}

impl BlockSink for LocalFileSink {
    fn target(&self) -> &str {
        &self.target
    }

    fn append(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        self.writer.write_all(bytes).map_err(|e| self.io_error(e))
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush().map_err(|e| self.io_error(e))
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.flush()?;
        self.writer.get_ref().sync_all().map_err(|e| self.io_error(e))
    }
}

/// An in-memory sink, used by tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    target: String,
    bytes: Vec<u8>,
    flushes: usize,
}

impl MemorySink {
    /// Creates an empty sink labelled `target`.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    /// Bytes appended so far.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the sink, returning its contents.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Number of flushes observed.
    pub fn flush_count(&self) -> usize {
        self.flushes
    }
}

impl BlockSink for MemorySink {
    fn target(&self) -> &str {
        &self.target
    }

    fn append(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.flushes += 1;
        Ok(())
    }
}
