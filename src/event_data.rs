//! The result of decoding an event's data payload.
//!
//! Every variant of [`EventData`] keeps the exact payload bytes it was decoded from, so callers
//! can always extract the raw data, even when decoding failed.

use std::fmt::{self, Display, Formatter};

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::decoders::efi::{
    EfiGptData, EfiHandoffTables, EfiImageLoadEvent, EfiPlatformFirmwareBlob, EfiVariableData,
};
use crate::decoders::grub::GrubEventData;
use crate::decoders::systemd::SystemdEfiStubEventData;
use crate::decoders::tcg::{SeparatorEventData, SpecIdEvent, StartupLocalityEvent};
use crate::err::DecodeError;

pub(crate) fn serialize_as_hex<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&hex::encode(bytes))
}

/// A structured interpretation of an event payload, produced by one of the decoders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TypedEventData {
    SpecId(SpecIdEvent),
    StartupLocality(StartupLocalityEvent),
    Separator(SeparatorEventData),
    /// `EV_ACTION`, `EV_EFI_ACTION` and other plain text payloads.
    Text(String),
    /// `EV_S_CRTM_VERSION`, which firmware records as UTF-16.
    CrtmVersion(String),
    EfiVariable(EfiVariableData),
    EfiImageLoad(EfiImageLoadEvent),
    EfiPlatformFirmwareBlob(EfiPlatformFirmwareBlob),
    EfiHandoffTables(EfiHandoffTables),
    EfiGpt(EfiGptData),
    Grub(GrubEventData),
    SystemdEfiStub(SystemdEfiStubEventData),
}

impl Display for TypedEventData {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            TypedEventData::SpecId(e) => Display::fmt(e, f),
            TypedEventData::StartupLocality(e) => Display::fmt(e, f),
            TypedEventData::Separator(e) => Display::fmt(e, f),
            TypedEventData::Text(s) | TypedEventData::CrtmVersion(s) => f.write_str(s),
            TypedEventData::EfiVariable(e) => Display::fmt(e, f),
            TypedEventData::EfiImageLoad(e) => Display::fmt(e, f),
            TypedEventData::EfiPlatformFirmwareBlob(e) => Display::fmt(e, f),
            TypedEventData::EfiHandoffTables(e) => Display::fmt(e, f),
            TypedEventData::EfiGpt(e) => Display::fmt(e, f),
            TypedEventData::Grub(e) => Display::fmt(e, f),
            TypedEventData::SystemdEfiStub(e) => Display::fmt(e, f),
        }
    }
}

/// Why a payload was rejected by the decoder that tried to interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidReason {
    /// The payload is shorter than the structure requires.
    #[error("event data smaller than expected")]
    Truncated(#[source] DecodeError),
    /// The payload is long enough but its content is not valid.
    #[error(transparent)]
    Malformed(DecodeError),
}

impl InvalidReason {
    pub fn classify(err: DecodeError) -> Self {
        if err.is_truncation() {
            InvalidReason::Truncated(err)
        } else {
            InvalidReason::Malformed(err)
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, InvalidReason::Truncated(_))
    }

    /// The decoder error this classification was made from.
    pub fn cause(&self) -> &DecodeError {
        match self {
            InvalidReason::Truncated(e) | InvalidReason::Malformed(e) => e,
        }
    }
}

impl Serialize for InvalidReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("InvalidReason", 2)?;
        let kind = if self.is_truncated() {
            "truncated"
        } else {
            "malformed"
        };
        s.serialize_field("kind", kind)?;
        s.serialize_field("message", &self.cause().to_string())?;
        s.end()
    }
}

/// The data recorded with an event, together with the outcome of decoding it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EventData {
    /// A decoder recognized the payload. `trailing_bytes` counts the bytes after the
    /// structured portion that the decoder left uninterpreted.
    Typed {
        data: TypedEventData,
        trailing_bytes: usize,
        #[serde(serialize_with = "serialize_as_hex")]
        bytes: Vec<u8>,
    },
    /// No decoder claimed the payload.
    Opaque {
        #[serde(serialize_with = "serialize_as_hex")]
        bytes: Vec<u8>,
    },
    /// A decoder started interpreting the payload but failed.
    Invalid {
        reason: InvalidReason,
        #[serde(serialize_with = "serialize_as_hex")]
        bytes: Vec<u8>,
    },
}

impl EventData {
    pub fn typed(data: TypedEventData, trailing_bytes: usize, bytes: &[u8]) -> Self {
        EventData::Typed {
            data,
            trailing_bytes,
            bytes: bytes.to_vec(),
        }
    }

    pub fn opaque(bytes: &[u8]) -> Self {
        EventData::Opaque {
            bytes: bytes.to_vec(),
        }
    }

    pub fn invalid(err: DecodeError, bytes: &[u8]) -> Self {
        EventData::Invalid {
            reason: InvalidReason::classify(err),
            bytes: bytes.to_vec(),
        }
    }

    /// The original payload, whatever the decode outcome was.
    pub fn bytes(&self) -> &[u8] {
        match self {
            EventData::Typed { bytes, .. }
            | EventData::Opaque { bytes }
            | EventData::Invalid { bytes, .. } => bytes,
        }
    }

    /// Bytes after the structured portion of a typed payload. Always 0 for other variants.
    pub fn trailing_bytes(&self) -> usize {
        match self {
            EventData::Typed { trailing_bytes, .. } => *trailing_bytes,
            _ => 0,
        }
    }

    pub fn as_typed(&self) -> Option<&TypedEventData> {
        match self {
            EventData::Typed { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn invalid_reason(&self) -> Option<&InvalidReason> {
        match self {
            EventData::Invalid { reason, .. } => Some(reason),
            _ => None,
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, EventData::Opaque { .. })
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, EventData::Invalid { .. })
    }

    /// EFI variable payloads, if this event measured one.
    pub fn as_efi_variable(&self) -> Option<&EfiVariableData> {
        match self.as_typed() {
            Some(TypedEventData::EfiVariable(v)) => Some(v),
            _ => None,
        }
    }
}

impl Display for EventData {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            EventData::Typed { data, .. } => Display::fmt(data, f),
            EventData::Opaque { .. } => Ok(()),
            EventData::Invalid { reason, .. } => write!(f, "Invalid event data: {}", reason),
        }
    }
}
