//! Event data decoders.
//!
//! [`tcg`] is the generic decoder for the structures defined by the TCG and UEFI specifications.
//! [`grub`] and [`systemd`] interpret measurements made by specific boot components and are only
//! consulted when enabled in [`LogOptions`](crate::LogOptions).

pub mod efi;
pub mod grub;
pub mod systemd;
pub mod tcg;

use crate::err::DecodeError;
use crate::event_data::TypedEventData;

/// What a single decoder made of a payload.
#[derive(Debug, Clone, PartialEq)]
pub enum DecoderOutcome {
    /// The decoder does not apply to this payload. Not an error.
    NoMatch,
    /// The decoder interpreted the payload.
    Matched {
        data: TypedEventData,
        trailing_bytes: usize,
    },
    /// The decoder recognized the payload but could not decode it.
    Failed(DecodeError),
}

impl DecoderOutcome {
    pub fn matched(data: TypedEventData, trailing_bytes: usize) -> Self {
        DecoderOutcome::Matched {
            data,
            trailing_bytes,
        }
    }
}

/// Lifts a decoder that can only decline.
impl From<Option<(TypedEventData, usize)>> for DecoderOutcome {
    fn from(result: Option<(TypedEventData, usize)>) -> Self {
        match result {
            Some((data, trailing_bytes)) => DecoderOutcome::matched(data, trailing_bytes),
            None => DecoderOutcome::NoMatch,
        }
    }
}

/// Lifts a decoder that can decline or fail.
impl From<Result<Option<(TypedEventData, usize)>, DecodeError>> for DecoderOutcome {
    fn from(result: Result<Option<(TypedEventData, usize)>, DecodeError>) -> Self {
        match result {
            Ok(matched) => matched.into(),
            Err(e) => DecoderOutcome::Failed(e),
        }
    }
}
