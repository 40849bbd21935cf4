#![allow(dead_code)]
use std::fs;
use std::path::{Path, PathBuf};

use std::sync::Once;

use tcglog::{AlgorithmId, EventType};

static LOGGER_INIT: Once = Once::new();

// Rust runs the tests concurrently, so unless we synchronize logging access
// it will crash when attempting to run `cargo test` with some logging facilities.
#[cfg(test)]
pub fn ensure_env_logger_initialized() {
    use std::io::Write;

    LOGGER_INIT.call_once(|| {
        let mut builder = env_logger::Builder::from_default_env();
        builder
            .format(|buf, record| writeln!(buf, "[{}] - {}", record.level(), record.args()))
            .init();
    });
}

/// `EFI_GLOBAL_VARIABLE` (8be4df61-93ca-11d2-aa0d-00e098032b8c) as stored on the wire.
pub const EFI_GLOBAL_VARIABLE: [u8; 16] = [
    0x61, 0xdf, 0xe4, 0x8b, 0xca, 0x93, 0xd2, 0x11, 0xaa, 0x0d, 0x00, 0xe0, 0x98, 0x03, 0x2b, 0x8c,
];

pub fn utf16z(s: &str) -> Vec<u8> {
    s.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}

/// A `UEFI_VARIABLE_DATA` payload. The name is stored without a terminator.
pub fn efi_variable(guid: [u8; 16], name: &str, data: &[u8]) -> Vec<u8> {
    let name: Vec<u8> = name.encode_utf16().flat_map(u16::to_le_bytes).collect();
    let mut out = guid.to_vec();
    out.extend_from_slice(&((name.len() / 2) as u64).to_le_bytes());
    out.extend_from_slice(&(data.len() as u64).to_le_bytes());
    out.extend(name);
    out.extend_from_slice(data);
    out
}

pub fn spec_id_event03(algorithms: &[AlgorithmId]) -> Vec<u8> {
    let mut data = b"Spec ID Event03\0".to_vec();
    data.extend_from_slice(&0_u32.to_le_bytes());
    // specVersionMinor, specVersionMajor, specErrata, uintnSize
    data.extend_from_slice(&[0, 2, 0, 2]);
    data.extend_from_slice(&(algorithms.len() as u32).to_le_bytes());
    for alg in algorithms {
        data.extend_from_slice(&alg.0.to_le_bytes());
        data.extend_from_slice(&(alg.digest_size() as u16).to_le_bytes());
    }
    // vendorInfoSize
    data.push(0);
    data
}

fn tcg12_record(pcr: u32, event_type: EventType, digest: &[u8], data: &[u8]) -> Vec<u8> {
    let mut out = pcr.to_le_bytes().to_vec();
    out.extend_from_slice(&event_type.0.to_le_bytes());
    out.extend_from_slice(digest);
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    out
}

/// Builds synthetic event logs. Unless given explicitly, digests are the hashes of the event data.
pub struct LogBuilder {
    /// `None` for TCG 1.2 logs.
    algorithms: Option<Vec<AlgorithmId>>,
    bytes: Vec<u8>,
}

impl LogBuilder {
    pub fn tcg12() -> Self {
        LogBuilder {
            algorithms: None,
            bytes: Vec::new(),
        }
    }

    pub fn crypto_agile(algorithms: &[AlgorithmId]) -> Self {
        let header = spec_id_event03(algorithms);
        LogBuilder {
            algorithms: Some(algorithms.to_vec()),
            bytes: tcg12_record(0, EventType::NO_ACTION, &[0; 20], &header),
        }
    }

    pub fn event(self, pcr: u32, event_type: EventType, data: &[u8]) -> Self {
        let digests: Vec<(AlgorithmId, Vec<u8>)> = match &self.algorithms {
            Some(algorithms) => algorithms
                .iter()
                .map(|alg| (*alg, alg.hash(data).unwrap()))
                .collect(),
            None => vec![(AlgorithmId::SHA1, AlgorithmId::SHA1.hash(data).unwrap())],
        };
        self.event_with_digests(pcr, event_type, &digests, data)
    }

    pub fn event_with_digests(
        mut self,
        pcr: u32,
        event_type: EventType,
        digests: &[(AlgorithmId, Vec<u8>)],
        data: &[u8],
    ) -> Self {
        if self.algorithms.is_none() {
            let record = tcg12_record(pcr, event_type, &digests[0].1, data);
            self.bytes.extend(record);
            return self;
        }

        self.bytes.extend_from_slice(&pcr.to_le_bytes());
        self.bytes.extend_from_slice(&event_type.0.to_le_bytes());
        self.bytes
            .extend_from_slice(&(digests.len() as u32).to_le_bytes());
        for (alg, digest) in digests {
            self.bytes.extend_from_slice(&alg.0.to_le_bytes());
            self.bytes.extend_from_slice(digest);
        }
        self.bytes
            .extend_from_slice(&(data.len() as u32).to_le_bytes());
        self.bytes.extend_from_slice(data);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}

/// A small crypto agile log touching the common event types, including one event whose
/// data is truncated.
pub fn sample_log() -> Vec<u8> {
    LogBuilder::crypto_agile(&[AlgorithmId::SHA1, AlgorithmId::SHA256])
        .event(0, EventType::S_CRTM_VERSION, &utf16z("1.0"))
        .event(
            7,
            EventType::EFI_VARIABLE_DRIVER_CONFIG,
            &efi_variable(EFI_GLOBAL_VARIABLE, "SecureBoot", &[1]),
        )
        .event(
            4,
            EventType::EFI_ACTION,
            b"Calling EFI Application from Boot Option",
        )
        .event(8, EventType::IPL, b"grub_cmd: linux /vmlinuz\0")
        .event(7, EventType::SEPARATOR, &[0, 0, 0, 0])
        .event(1, EventType::EFI_VARIABLE_BOOT, &[0; 5])
        .build()
}

pub fn write_sample_log(dir: &Path) -> PathBuf {
    let path = dir.join("binary_bios_measurements");
    fs::write(&path, sample_log()).unwrap();
    path
}
