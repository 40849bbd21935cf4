//! The generic decoder for event data structures defined by the TCG PC Client specifications.

use std::fmt::{self, Display, Formatter};

use log::trace;
use serde::Serialize;

use crate::algorithm::AlgorithmId;
use crate::decoders::DecoderOutcome;
use crate::decoders::efi::{
    EfiGptData, EfiHandoffTables, EfiImageLoadEvent, EfiPlatformFirmwareBlob, EfiVariableData,
};
use crate::err::{DecodeError, DecodeResult};
use crate::event_data::{TypedEventData, serialize_as_hex};
use crate::event_type::EventType;
use crate::utils::{ByteCursor, decode_utf16le_z, decode_utf8_z};

const SIGNATURE_LEN: usize = 16;

const SPEC_ID_EVENT00_SIGNATURE: &[u8; SIGNATURE_LEN] = b"Spec ID Event00\0";
const SPEC_ID_EVENT02_SIGNATURE: &[u8; SIGNATURE_LEN] = b"Spec ID Event02\0";
const SPEC_ID_EVENT03_SIGNATURE: &[u8; SIGNATURE_LEN] = b"Spec ID Event03\0";
const STARTUP_LOCALITY_SIGNATURE: &[u8; SIGNATURE_LEN] = b"StartupLocality\0";

const SEPARATOR_NORMAL: u32 = 0x0000_0000;
const SEPARATOR_NORMAL_ALT: u32 = 0xffff_ffff;

/// The specification a log conforms to, as announced by its first record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Spec {
    #[default]
    Unknown,
    /// TCG PC Client Specific Implementation Specification for conventional BIOS.
    PcClient,
    /// TCG EFI Platform Specification for TPM 1.2.
    Efi1_2,
    /// TCG PC Client Platform Firmware Profile (crypto agile log format).
    Efi2,
}

impl Spec {
    pub fn is_crypto_agile(self) -> bool {
        self == Spec::Efi2
    }
}

impl Display for Spec {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let s = match self {
            Spec::Unknown => "unknown",
            Spec::PcClient => "PC Client (TCG 1.2)",
            Spec::Efi1_2 => "EFI (TCG 1.2)",
            Spec::Efi2 => "EFI (TCG 2.0)",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct AlgorithmSize {
    pub algorithm_id: AlgorithmId,
    pub digest_size: u16,
}

/// The `Spec ID Event` found in the first record of a log.
///
/// `digest_sizes` is only populated for `Spec ID Event03`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecIdEvent {
    pub spec: Spec,
    pub platform_class: u32,
    pub spec_version_minor: u8,
    pub spec_version_major: u8,
    pub spec_errata: u8,
    pub uintn_size: u8,
    pub digest_sizes: Vec<AlgorithmSize>,
    #[serde(serialize_with = "serialize_as_hex")]
    pub vendor_info: Vec<u8>,
}

impl SpecIdEvent {
    /// Decodes a spec id structure from an `EV_NO_ACTION` payload.
    ///
    /// Returns `Ok(None)` when the payload does not carry a spec id signature. The second
    /// element of the tuple is the number of trailing bytes.
    pub fn decode(data: &[u8]) -> DecodeResult<Option<(SpecIdEvent, usize)>> {
        let Some(signature) = data.get(..SIGNATURE_LEN) else {
            return Ok(None);
        };
        let spec = match signature {
            s if s == SPEC_ID_EVENT00_SIGNATURE => Spec::PcClient,
            s if s == SPEC_ID_EVENT02_SIGNATURE => Spec::Efi1_2,
            s if s == SPEC_ID_EVENT03_SIGNATURE => Spec::Efi2,
            _ => return Ok(None),
        };

        let mut cursor = ByteCursor::new(data);
        cursor.take_bytes(SIGNATURE_LEN, "signature")?;

        let platform_class = cursor.u32("platformClass")?;
        let spec_version_minor = cursor.u8("specVersionMinor")?;
        let spec_version_major = cursor.u8("specVersionMajor")?;
        let spec_errata = cursor.u8("specErrata")?;
        // Reserved in Spec ID Event00.
        let uintn_size = cursor.u8("uintnSize")?;

        let mut digest_sizes = Vec::new();
        if spec == Spec::Efi2 {
            let count_offset = cursor.pos();
            let count = cursor.u32("numberOfAlgorithms")?;
            if count == 0 {
                return Err(DecodeError::invalid(
                    "numberOfAlgorithms",
                    count_offset,
                    "crypto agile log declares no digest algorithms",
                ));
            }
            for _ in 0..count {
                digest_sizes.push(AlgorithmSize {
                    algorithm_id: AlgorithmId(cursor.u16("algorithmId")?),
                    digest_size: cursor.u16("digestSize")?,
                });
            }
        }

        let vendor_info_size = cursor.u8("vendorInfoSize")?;
        let vendor_info = cursor
            .take_bytes(usize::from(vendor_info_size), "vendorInfo")?
            .to_vec();

        Ok(Some((
            SpecIdEvent {
                spec,
                platform_class,
                spec_version_minor,
                spec_version_major,
                spec_errata,
                uintn_size,
                digest_sizes,
                vendor_info,
            },
            cursor.remaining(),
        )))
    }
}

impl Display for SpecIdEvent {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "SpecIdEvent{{ spec: {}, platformClass: {}, specVersionMinor: {}, specVersionMajor: {}, specErrata: {}, uintnSize: {}",
            self.spec,
            self.platform_class,
            self.spec_version_minor,
            self.spec_version_major,
            self.spec_errata,
            self.uintn_size
        )?;
        if self.spec == Spec::Efi2 {
            f.write_str(", digestSizes: [")?;
            for (i, d) in self.digest_sizes.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(
                    f,
                    " {{ algorithmId: 0x{:04x}, digestSize: {} }}",
                    d.algorithm_id, d.digest_size
                )?;
            }
            f.write_str(" ]")?;
        }
        f.write_str(" }")
    }
}

/// `TCG_EfiStartupLocalityEvent`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct StartupLocalityEvent {
    pub startup_locality: u8,
}

impl Display for StartupLocalityEvent {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "EfiStartupLocalityEvent{{ StartupLocality: {} }}",
            self.startup_locality
        )
    }
}

/// The payload of an `EV_SEPARATOR` event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "separator", rename_all = "lowercase")]
pub enum SeparatorEventData {
    /// A regular separator, measured as `0x00000000` or `0xffffffff`.
    Normal { value: u32 },
    /// A separator recorded because firmware hit an error.
    Error { error_code: u32 },
}

impl SeparatorEventData {
    pub fn is_error(&self) -> bool {
        matches!(self, SeparatorEventData::Error { .. })
    }
}

impl Display for SeparatorEventData {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            SeparatorEventData::Normal { .. } => Ok(()),
            SeparatorEventData::Error { error_code } => write!(f, "ERROR: 0x{:x}", error_code),
        }
    }
}

type Decoded = DecodeResult<Option<(TypedEventData, usize)>>;

fn decode_no_action(data: &[u8]) -> Decoded {
    if let Some((event, trailing)) = SpecIdEvent::decode(data)? {
        return Ok(Some((TypedEventData::SpecId(event), trailing)));
    }

    if data.starts_with(STARTUP_LOCALITY_SIGNATURE) {
        let mut cursor = ByteCursor::new(&data[SIGNATURE_LEN..]);
        let startup_locality = cursor.u8("StartupLocality")?;
        return Ok(Some((
            TypedEventData::StartupLocality(StartupLocalityEvent { startup_locality }),
            cursor.remaining(),
        )));
    }

    Ok(None)
}

fn decode_separator(data: &[u8], separator_digest_error: bool) -> Decoded {
    let mut cursor = ByteCursor::new(data);
    let value = cursor.u32("separator value")?;

    if separator_digest_error {
        return Ok(Some((
            TypedEventData::Separator(SeparatorEventData::Error { error_code: value }),
            cursor.remaining(),
        )));
    }

    if value != SEPARATOR_NORMAL && value != SEPARATOR_NORMAL_ALT {
        return Err(DecodeError::UnexpectedValue {
            what: "separator value",
            offset: 0,
            value: u64::from(value),
        });
    }
    if !cursor.is_empty() {
        return Err(DecodeError::invalid(
            "separator",
            cursor.pos(),
            format!("{} unexpected bytes after separator value", cursor.remaining()),
        ));
    }

    Ok(Some((
        TypedEventData::Separator(SeparatorEventData::Normal { value }),
        0,
    )))
}

/// Runs one of the structured EFI decoders over the whole payload.
fn decode_structure<T>(
    data: &[u8],
    decode: impl FnOnce(&mut ByteCursor) -> DecodeResult<T>,
    wrap: impl FnOnce(T) -> TypedEventData,
) -> Decoded {
    let mut cursor = ByteCursor::new(data);
    let value = decode(&mut cursor)?;
    Ok(Some((wrap(value), cursor.remaining())))
}

fn decode_event(event_type: EventType, data: &[u8], separator_digest_error: bool) -> Decoded {
    match event_type {
        EventType::NO_ACTION => decode_no_action(data),
        EventType::SEPARATOR => decode_separator(data, separator_digest_error),
        EventType::ACTION | EventType::EFI_ACTION => Ok(Some((
            TypedEventData::Text(decode_utf8_z(data, "action string", 0)?),
            0,
        ))),
        EventType::S_CRTM_VERSION => Ok(Some((
            TypedEventData::CrtmVersion(decode_utf16le_z(data, "S-CRTM version", 0)?),
            0,
        ))),
        EventType::EFI_VARIABLE_DRIVER_CONFIG
        | EventType::EFI_VARIABLE_BOOT
        | EventType::EFI_VARIABLE_AUTHORITY => {
            decode_structure(data, EfiVariableData::decode, TypedEventData::EfiVariable)
        }
        EventType::EFI_BOOT_SERVICES_APPLICATION
        | EventType::EFI_BOOT_SERVICES_DRIVER
        | EventType::EFI_RUNTIME_SERVICES_DRIVER => {
            decode_structure(data, EfiImageLoadEvent::decode, TypedEventData::EfiImageLoad)
        }
        EventType::EFI_PLATFORM_FIRMWARE_BLOB => decode_structure(
            data,
            EfiPlatformFirmwareBlob::decode,
            TypedEventData::EfiPlatformFirmwareBlob,
        ),
        EventType::EFI_HANDOFF_TABLES => decode_structure(
            data,
            EfiHandoffTables::decode,
            TypedEventData::EfiHandoffTables,
        ),
        EventType::EFI_GPT_EVENT => {
            decode_structure(data, EfiGptData::decode, TypedEventData::EfiGpt)
        }
        _ => Ok(None),
    }
}

/// Decodes event data according to the TCG specifications.
///
/// `separator_digest_error` tells the decoder that an `EV_SEPARATOR` event's digest is the
/// measurement of an error value, in which case the payload holds an error code.
pub fn decode_tcg(
    event_type: EventType,
    data: &[u8],
    separator_digest_error: bool,
) -> DecoderOutcome {
    let outcome: DecoderOutcome = decode_event(event_type, data, separator_digest_error).into();
    trace!(
        "{}: generic decoder {}",
        event_type,
        match &outcome {
            DecoderOutcome::NoMatch => "declined",
            DecoderOutcome::Matched { .. } => "matched",
            DecoderOutcome::Failed(_) => "failed",
        }
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn matched(outcome: DecoderOutcome) -> (TypedEventData, usize) {
        match outcome {
            DecoderOutcome::Matched {
                data,
                trailing_bytes,
            } => (data, trailing_bytes),
            other => panic!("expected a match, got {:?}", other),
        }
    }

    fn failed(outcome: DecoderOutcome) -> DecodeError {
        match outcome {
            DecoderOutcome::Failed(e) => e,
            other => panic!("expected a failure, got {:?}", other),
        }
    }

    fn spec_id_event03(algorithms: &[(u16, u16)]) -> Vec<u8> {
        let mut data = SPEC_ID_EVENT03_SIGNATURE.to_vec();
        data.extend_from_slice(&0_u32.to_le_bytes());
        data.extend_from_slice(&[0, 2, 0, 2]);
        data.extend_from_slice(&(algorithms.len() as u32).to_le_bytes());
        for (id, size) in algorithms {
            data.extend_from_slice(&id.to_le_bytes());
            data.extend_from_slice(&size.to_le_bytes());
        }
        data.push(0);
        data
    }

    #[test]
    fn test_decodes_spec_id_event03() {
        let data = spec_id_event03(&[(0x4, 20), (0xb, 32)]);
        let (event, trailing) = matched(decode_tcg(EventType::NO_ACTION, &data, false));
        assert_eq!(trailing, 0);

        let TypedEventData::SpecId(event) = event else {
            panic!("expected a spec id event");
        };
        assert_eq!(event.spec, Spec::Efi2);
        assert_eq!(event.spec_version_major, 2);
        assert_eq!(
            event.digest_sizes,
            vec![
                AlgorithmSize {
                    algorithm_id: AlgorithmId::SHA1,
                    digest_size: 20
                },
                AlgorithmSize {
                    algorithm_id: AlgorithmId::SHA256,
                    digest_size: 32
                },
            ]
        );
        assert_eq!(
            event.to_string(),
            "SpecIdEvent{ spec: EFI (TCG 2.0), platformClass: 0, specVersionMinor: 0, specVersionMajor: 2, specErrata: 0, uintnSize: 2, digestSizes: [ { algorithmId: 0x0004, digestSize: 20 }, { algorithmId: 0x000b, digestSize: 32 } ] }"
        );
    }

    #[test]
    fn test_decodes_spec_id_event00_with_vendor_info() {
        let mut data = SPEC_ID_EVENT00_SIGNATURE.to_vec();
        data.extend_from_slice(&0_u32.to_le_bytes());
        data.extend_from_slice(&[2, 1, 0, 0]);
        data.push(3);
        data.extend_from_slice(b"abc");
        data.extend_from_slice(&[0xee, 0xee]);

        let (event, _) = SpecIdEvent::decode(&data).unwrap().unwrap();
        assert_eq!(event.spec, Spec::PcClient);
        assert_eq!(event.vendor_info, b"abc");
        assert!(event.digest_sizes.is_empty());
        assert_eq!(SpecIdEvent::decode(&data).unwrap().unwrap().1, 2);
    }

    #[test]
    fn test_truncated_spec_id_event_fails() {
        let data = spec_id_event03(&[(0x4, 20)]);
        let err = failed(decode_tcg(EventType::NO_ACTION, &data[..22], false));
        assert!(err.is_truncation());
    }

    #[test]
    fn test_startup_locality() {
        let mut data = STARTUP_LOCALITY_SIGNATURE.to_vec();
        data.push(3);
        let (event, trailing) = matched(decode_tcg(EventType::NO_ACTION, &data, false));
        assert_eq!(
            event,
            TypedEventData::StartupLocality(StartupLocalityEvent {
                startup_locality: 3
            })
        );
        assert_eq!(trailing, 0);
    }

    #[test]
    fn test_unknown_no_action_declines() {
        assert_eq!(
            decode_tcg(EventType::NO_ACTION, b"SomethingElse\0\0\0\x01", false),
            DecoderOutcome::NoMatch
        );
        assert_eq!(
            decode_tcg(EventType::NO_ACTION, b"short", false),
            DecoderOutcome::NoMatch
        );
    }

    #[test]
    fn test_separators() {
        let (data, _) = matched(decode_tcg(EventType::SEPARATOR, &[0; 4], false));
        assert_eq!(data.to_string(), "");
        matched(decode_tcg(EventType::SEPARATOR, &[0xff; 4], false));

        let (data, trailing) = matched(decode_tcg(EventType::SEPARATOR, &[1, 0, 0, 0, 9], true));
        assert_eq!(
            data,
            TypedEventData::Separator(SeparatorEventData::Error { error_code: 1 })
        );
        assert_eq!(data.to_string(), "ERROR: 0x1");
        assert_eq!(trailing, 1);

        let err = failed(decode_tcg(EventType::SEPARATOR, &[1, 0, 0, 0], false));
        assert!(!err.is_truncation());
        let err = failed(decode_tcg(EventType::SEPARATOR, &[0, 0, 0, 0, 0], false));
        assert!(!err.is_truncation());
        let err = failed(decode_tcg(EventType::SEPARATOR, &[0, 0], false));
        assert!(err.is_truncation());
    }

    #[test]
    fn test_action_strings() {
        let (data, _) = matched(decode_tcg(
            EventType::EFI_ACTION,
            b"Exit Boot Services Invocation",
            false,
        ));
        assert_eq!(data.to_string(), "Exit Boot Services Invocation");

        let (data, _) = matched(decode_tcg(EventType::ACTION, b"Calling INT 19h\0", false));
        assert_eq!(data, TypedEventData::Text("Calling INT 19h".to_owned()));
    }

    #[test]
    fn test_crtm_version() {
        let version: Vec<u8> = "1.02"
            .encode_utf16()
            .chain(std::iter::once(0))
            .flat_map(u16::to_le_bytes)
            .collect();
        let (data, _) = matched(decode_tcg(EventType::S_CRTM_VERSION, &version, false));
        assert_eq!(data, TypedEventData::CrtmVersion("1.02".to_owned()));

        let err = failed(decode_tcg(EventType::S_CRTM_VERSION, &[0x31, 0x00, 0x32], false));
        assert!(!err.is_truncation());
    }

    #[test]
    fn test_firmware_blob_reports_trailing_bytes() {
        let mut data = 0xff00_0000_u64.to_le_bytes().to_vec();
        data.extend_from_slice(&0x10000_u64.to_le_bytes());
        data.extend_from_slice(&[0xaa; 4]);

        let (event, trailing) = matched(decode_tcg(EventType::EFI_PLATFORM_FIRMWARE_BLOB, &data, false));
        assert_eq!(trailing, 4);
        assert_eq!(
            event.to_string(),
            "UEFI_PLATFORM_FIRMWARE_BLOB{ BlobBase: 0xff000000, BlobLength: 65536 }"
        );
    }

    #[test]
    fn test_truncated_variable_fails() {
        let err = failed(decode_tcg(EventType::EFI_VARIABLE_BOOT, &[0; 10], false));
        assert!(err.is_truncation());
        let err = failed(decode_tcg(EventType::EFI_VARIABLE_BOOT, &[], false));
        assert!(matches!(err, DecodeError::UnexpectedEof { .. }));
    }

    #[test]
    fn test_other_types_decline() {
        for event_type in [
            EventType::POST_CODE,
            EventType::IPL,
            EventType::EFI_HCRTM_EVENT,
            EventType(0x1234_5678),
        ] {
            assert_eq!(
                decode_tcg(event_type, b"payload", false),
                DecoderOutcome::NoMatch
            );
        }
    }
}
