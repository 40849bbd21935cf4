//! The decode pipeline.
//!
//! Every payload is offered to the enabled vendor decoders in a fixed order, and then to the
//! generic TCG decoder. The first decoder that claims the payload, by decoding it or by failing
//! to, decides the outcome.

use log::{debug, trace};

use crate::decoders::DecoderOutcome;
use crate::decoders::grub::{GRUB_COMMAND_PCR, GRUB_FILE_PCR, decode_grub};
use crate::decoders::systemd::decode_systemd_efi_stub;
use crate::decoders::tcg::decode_tcg;
use crate::event_data::EventData;
use crate::event_type::{EventType, PcrIndex};

pub const DEFAULT_SYSTEMD_EFI_STUB_PCR: PcrIndex = 8;

/// Selects which vendor specific decoders run, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions {
    enable_grub: bool,
    enable_systemd_efi_stub: bool,
    systemd_efi_stub_pcr: PcrIndex,
}

impl Default for LogOptions {
    fn default() -> Self {
        LogOptions {
            enable_grub: false,
            enable_systemd_efi_stub: false,
            systemd_efi_stub_pcr: DEFAULT_SYSTEMD_EFI_STUB_PCR,
        }
    }
}

impl LogOptions {
    pub fn new() -> Self {
        LogOptions::default()
    }

    /// Interpret the strings GRUB measures to PCRs 8 and 9.
    pub fn with_grub(mut self, enable: bool) -> Self {
        self.enable_grub = enable;
        self
    }

    /// Interpret the kernel command line measured by the systemd EFI stub.
    pub fn with_systemd_efi_stub(mut self, enable: bool) -> Self {
        self.enable_systemd_efi_stub = enable;
        self
    }

    /// The PCR the systemd EFI stub measures to. Defaults to 8.
    pub fn systemd_efi_stub_pcr(mut self, pcr: PcrIndex) -> Self {
        self.systemd_efi_stub_pcr = pcr;
        self
    }

    pub fn get_grub_enabled(&self) -> bool {
        self.enable_grub
    }

    pub fn get_systemd_efi_stub_enabled(&self) -> bool {
        self.enable_systemd_efi_stub
    }

    pub fn get_systemd_efi_stub_pcr(&self) -> PcrIndex {
        self.systemd_efi_stub_pcr
    }
}

struct VendorDecoder {
    name: &'static str,
    applies: fn(&LogOptions, PcrIndex, EventType) -> bool,
    decode: fn(PcrIndex, EventType, &[u8]) -> DecoderOutcome,
}

fn grub_applies(options: &LogOptions, pcr_index: PcrIndex, _: EventType) -> bool {
    options.enable_grub && (pcr_index == GRUB_COMMAND_PCR || pcr_index == GRUB_FILE_PCR)
}

fn grub_decode(pcr_index: PcrIndex, event_type: EventType, data: &[u8]) -> DecoderOutcome {
    decode_grub(pcr_index, event_type, data).into()
}

fn systemd_efi_stub_applies(options: &LogOptions, pcr_index: PcrIndex, event_type: EventType) -> bool {
    options.enable_systemd_efi_stub
        && pcr_index == options.systemd_efi_stub_pcr
        && event_type == EventType::IPL
}

fn systemd_efi_stub_decode(_: PcrIndex, _: EventType, data: &[u8]) -> DecoderOutcome {
    decode_systemd_efi_stub(data).into()
}

/// Vendor decoders, in the order they are consulted.
static VENDOR_CHAIN: [VendorDecoder; 2] = [
    VendorDecoder {
        name: "grub",
        applies: grub_applies,
        decode: grub_decode,
    },
    VendorDecoder {
        name: "systemd-efi-stub",
        applies: systemd_efi_stub_applies,
        decode: systemd_efi_stub_decode,
    },
];

/// Picks the winning outcome. `vendor_outcomes` is consumed lazily, so decoders after the one
/// that claims the payload are never run, and `generic` only runs if every vendor declined.
fn resolve_chain<I, G>(vendor_outcomes: I, generic: G) -> DecoderOutcome
where
    I: IntoIterator<Item = DecoderOutcome>,
    G: FnOnce() -> DecoderOutcome,
{
    for outcome in vendor_outcomes {
        match outcome {
            DecoderOutcome::NoMatch => continue,
            claimed => return claimed,
        }
    }
    generic()
}

/// Decodes the data of a single event.
///
/// Returns the decoded data and the number of trailing bytes the winning decoder left
/// uninterpreted. `separator_digest_error` must be computed by the caller from the event's
/// digests, see [`decode_tcg`].
///
/// This never fails. Payloads that a decoder could not decode are returned as
/// [`EventData::Invalid`], and payloads no decoder recognizes as [`EventData::Opaque`].
pub fn decode_event_data(
    pcr_index: PcrIndex,
    event_type: EventType,
    data: &[u8],
    options: &LogOptions,
    separator_digest_error: bool,
) -> (EventData, usize) {
    let vendor_outcomes = VENDOR_CHAIN
        .iter()
        .filter(|decoder| (decoder.applies)(options, pcr_index, event_type))
        .map(|decoder| {
            trace!("PCR {} {}: trying {} decoder", pcr_index, event_type, decoder.name);
            (decoder.decode)(pcr_index, event_type, data)
        });

    let outcome = resolve_chain(vendor_outcomes, || {
        decode_tcg(event_type, data, separator_digest_error)
    });

    match outcome {
        DecoderOutcome::NoMatch => (EventData::opaque(data), 0),
        DecoderOutcome::Matched {
            data: typed,
            trailing_bytes,
        } => (EventData::typed(typed, trailing_bytes, data), trailing_bytes),
        DecoderOutcome::Failed(e) => {
            debug!("PCR {} {}: invalid event data: {}", pcr_index, event_type, e);
            (EventData::invalid(e, data), 0)
        }
    }
}
