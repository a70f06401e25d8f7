use crate::model::{EventId, StreamId};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Packet magic number mismatch (found {found:#010x}, expected {expected:#010x})")]
    BadMagic { found: u32, expected: u32 },

    #[error("Packet UUID does not match the trace UUID")]
    UuidMismatch,

    #[error("Unsupported {scheme} scheme ({value}); only 0 (none) is supported")]
    UnsupportedScheme { scheme: &'static str, value: u8 },

    #[error("Stream id changed mid-file (was {previous}, now {found})")]
    StreamIdChanged { previous: StreamId, found: StreamId },

    #[error("Encountered a CTF stream ID ({0}) that's not defined in the trace type")]
    UndefinedStreamId(StreamId),

    #[error("Event id {0} is unknown")]
    UndefinedEventId(EventId),

    #[error("Packet size invariant violated: {0}")]
    SizeInvariant(String),

    #[error("IO error while accessing '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to memory-map '{}': {source}", .path.display())]
    Mmap {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("scope lookup for '{0}' failed: no such field is in scope")]
    MissingScopeValue(String),

    #[error("unsupported field type '{0}'")]
    UnsupportedFieldType(String),

    #[error("attempted to decode an invalid float size ({exp_len} exponent bits, {mant_len} mantissa bits)")]
    InvalidFloatSize { exp_len: u32, mant_len: u32 },

    #[error("file '{}' is smaller than the minimum packet header size", .path.display())]
    FileTooSmall { path: PathBuf },

    #[error("write-mode access is not supported by this crate")]
    WriteUnsupported,

    #[error("metadata collaborator failed to parse TSDL text: {0}")]
    Metadata(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn mmap(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Mmap {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn unsupported_scheme(scheme: &'static str, value: u8) -> Self {
        Error::UnsupportedScheme { scheme, value }
    }
}
