use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::algorithm::AlgorithmId;
use crate::event_type::PcrIndex;

pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
pub type Result<T> = std::result::Result<T, LogError>;

/// Errors raised while interpreting the data payload of a single event.
///
/// These never abort a log parse. The decode pipeline converts them into
/// [`EventData::Invalid`](crate::EventData::Invalid) values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The payload ended exactly where another field was expected.
    #[error("{what}: reached end of data at offset {offset}, more was expected")]
    UnexpectedEof { what: &'static str, offset: u64 },

    /// A field started inside the payload but runs past its end.
    #[error("{what}: truncated at offset {offset} (need {need} bytes, have {have})")]
    Truncated {
        what: &'static str,
        offset: u64,
        need: usize,
        have: usize,
    },

    #[error("{what} at offset {offset}: {message}")]
    InvalidData {
        what: &'static str,
        offset: u64,
        message: String,
    },

    #[error("{what} at offset {offset}: unexpected value 0x{value:x}")]
    UnexpectedValue {
        what: &'static str,
        offset: u64,
        value: u64,
    },

    #[error("{what} at offset {offset}: invalid UTF-8 string")]
    InvalidUtf8 { what: &'static str, offset: u64 },

    #[error("{what} at offset {offset}: invalid UTF-16 string")]
    InvalidUtf16 { what: &'static str, offset: u64 },
}

impl DecodeError {
    /// Whether this error means the payload is shorter than the structure requires.
    pub fn is_truncation(&self) -> bool {
        matches!(
            self,
            DecodeError::UnexpectedEof { .. } | DecodeError::Truncated { .. }
        )
    }

    pub(crate) fn invalid(what: &'static str, offset: usize, message: impl Into<String>) -> Self {
        DecodeError::InvalidData {
            what,
            offset: offset as u64,
            message: message.into(),
        }
    }
}

/// Errors raised by the log reader. Unlike [`DecodeError`], these stop the parse,
/// since the record boundaries can no longer be trusted.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("An I/O error has occurred: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to open file {}: {source}", path.display())]
    FailedToOpenFile { source: io::Error, path: PathBuf },

    #[error("The log is empty")]
    EmptyLog,

    #[error("Offset {offset}: record {index} ends before its {what} was read")]
    TruncatedRecord {
        index: u32,
        what: &'static str,
        offset: u64,
    },

    #[error("Invalid log header: {source}")]
    InvalidHeader { source: DecodeError },

    #[error(
        "Log header declares digest size {declared} for {algorithm}, but the algorithm produces {expected} bytes"
    )]
    DigestSizeMismatch {
        algorithm: AlgorithmId,
        declared: u16,
        expected: usize,
    },

    #[error("Offset {offset}: record {index} (PCR {pcr_index}) contains a digest for {algorithm}, which the log header does not declare")]
    UndeclaredAlgorithm {
        index: u32,
        pcr_index: PcrIndex,
        algorithm: AlgorithmId,
        offset: u64,
    },

    #[error("Offset {offset}: record {index} (PCR {pcr_index}) contains more than one digest for {algorithm}")]
    DuplicateDigest {
        index: u32,
        pcr_index: PcrIndex,
        algorithm: AlgorithmId,
        offset: u64,
    },

    #[error("Offset {offset}: record {index} has {found} digests, but the log header declares {expected} algorithms")]
    DigestCountMismatch {
        index: u32,
        found: u32,
        expected: usize,
        offset: u64,
    },

    #[error("Failed to serialize event {index}: {source}")]
    JsonError {
        index: u32,
        source: serde_json::Error,
    },
}
