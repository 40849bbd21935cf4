//! Measurements made by the systemd EFI stub Linux loader.
//!
//! The stub measures the kernel command line it passes to the kernel as an `EV_IPL` event. The
//! payload is the UTF-16LE command line followed by a single zero byte.

use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use crate::err::{DecodeError, DecodeResult};
use crate::event_data::TypedEventData;
use crate::utils::decode_utf16le_z;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemdEfiStubEventData {
    pub kernel_cmdline: String,
}

impl Display for SystemdEfiStubEventData {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.kernel_cmdline)
    }
}

/// Interprets a systemd EFI stub measurement.
///
/// Once this decoder applies to an event, a payload it cannot decode is an error rather than a
/// decline, so the event is reported as invalid instead of being handed to the generic decoder.
pub fn decode_systemd_efi_stub(data: &[u8]) -> DecodeResult<Option<(TypedEventData, usize)>> {
    if data.len() % 2 != 1 {
        return Err(DecodeError::invalid(
            "systemd EFI stub command line",
            0,
            format!("expected an odd number of bytes, got {}", data.len()),
        ));
    }

    let last = data.len() - 1;
    if data[last] != 0 {
        return Err(DecodeError::UnexpectedValue {
            what: "systemd EFI stub command line terminator",
            offset: last as u64,
            value: u64::from(data[last]),
        });
    }

    let kernel_cmdline = decode_utf16le_z(&data[..last], "systemd EFI stub command line", 0)?;

    Ok(Some((
        TypedEventData::SystemdEfiStub(SystemdEfiStubEventData { kernel_cmdline }),
        0,
    )))
}
