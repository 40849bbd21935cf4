//! Measurements made by GRUB.
//!
//! GRUB measures every command it executes and the kernel command line to PCR 8, and every file
//! it loads to PCR 9, all as `EV_IPL` events carrying an ASCII string.

use std::fmt::{self, Display, Formatter};

use log::trace;
use serde::Serialize;

use crate::event_data::TypedEventData;
use crate::event_type::{EventType, PcrIndex};

pub const GRUB_COMMAND_PCR: PcrIndex = 8;
pub const GRUB_FILE_PCR: PcrIndex = 9;

const COMMAND_PREFIX: &str = "grub_cmd: ";
const KERNEL_CMDLINE_PREFIX: &str = "kernel_cmdline: ";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrubStringKind {
    Command,
    KernelCmdline,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrubEventData {
    pub kind: GrubStringKind,
    /// The measured string with its GRUB prefix removed.
    pub value: String,
}

impl Display for GrubEventData {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.kind {
            GrubStringKind::Command => write!(f, "{}{}", COMMAND_PREFIX, self.value),
            GrubStringKind::KernelCmdline => write!(f, "{}{}", KERNEL_CMDLINE_PREFIX, self.value),
            GrubStringKind::File => f.write_str(&self.value),
        }
    }
}

/// Interprets a GRUB measurement.
///
/// This decoder never fails: anything it does not recognize is left to the next decoder.
pub fn decode_grub(
    pcr_index: PcrIndex,
    event_type: EventType,
    data: &[u8],
) -> Option<(TypedEventData, usize)> {
    if event_type != EventType::IPL {
        return None;
    }

    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    let s = std::str::from_utf8(&data[..end]).ok()?;

    let (kind, value) = match pcr_index {
        GRUB_COMMAND_PCR => {
            if let Some(cmd) = s.strip_prefix(COMMAND_PREFIX) {
                (GrubStringKind::Command, cmd)
            } else if let Some(cmdline) = s.strip_prefix(KERNEL_CMDLINE_PREFIX) {
                (GrubStringKind::KernelCmdline, cmdline)
            } else {
                return None;
            }
        }
        GRUB_FILE_PCR => (GrubStringKind::File, s),
        _ => return None,
    };

    trace!("GRUB {:?} measurement: {}", kind, value);

    Some((
        TypedEventData::Grub(GrubEventData {
            kind,
            value: value.to_owned(),
        }),
        0,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grub(data: TypedEventData) -> GrubEventData {
        match data {
            TypedEventData::Grub(g) => g,
            other => panic!("expected GRUB data, got {:?}", other),
        }
    }

    #[test]
    fn test_decodes_command() {
        let (data, trailing) = decode_grub(8, EventType::IPL, b"grub_cmd: linux /vmlinuz ro").unwrap();
        let data = grub(data);
        assert_eq!(data.kind, GrubStringKind::Command);
        assert_eq!(data.value, "linux /vmlinuz ro");
        assert_eq!(data.to_string(), "grub_cmd: linux /vmlinuz ro");
        assert_eq!(trailing, 0);
    }

    #[test]
    fn test_decodes_kernel_cmdline_with_nul() {
        let (data, _) = decode_grub(8, EventType::IPL, b"kernel_cmdline: /vmlinuz quiet\0").unwrap();
        let data = grub(data);
        assert_eq!(data.kind, GrubStringKind::KernelCmdline);
        assert_eq!(data.value, "/vmlinuz quiet");
    }

    #[test]
    fn test_decodes_file() {
        let (data, _) = decode_grub(9, EventType::IPL, b"/boot/grub/grub.cfg\0").unwrap();
        assert_eq!(grub(data).kind, GrubStringKind::File);
    }

    #[test]
    fn test_declines_other_payloads() {
        assert!(decode_grub(8, EventType::IPL, b"something else").is_none());
        assert!(decode_grub(8, EventType::SEPARATOR, b"grub_cmd: x").is_none());
        assert!(decode_grub(7, EventType::IPL, b"grub_cmd: x").is_none());
        assert!(decode_grub(9, EventType::IPL, &[0xff, 0xfe]).is_none());
    }
}
