//! Digest algorithms that may appear in an event log.
//!
//! The identifiers follow the `TPM_ALG_ID` values of the TPM 2.0 library specification.
//! Only the algorithms in the static registry table can be hashed; every other identifier is still a valid
//! value that a log may reference.

use std::fmt::{self, Display, Formatter, LowerHex};

use serde::{Serialize, Serializer};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};

/// Hashes a byte slice, returning the digest bytes.
pub type HashFn = fn(&[u8]) -> Vec<u8>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlgorithmId(pub u16);

pub type AlgorithmIdList = Vec<AlgorithmId>;

impl AlgorithmId {
    pub const SHA1: AlgorithmId = AlgorithmId(0x0004);
    pub const SHA256: AlgorithmId = AlgorithmId(0x000b);
    pub const SHA384: AlgorithmId = AlgorithmId(0x000c);
    pub const SHA512: AlgorithmId = AlgorithmId(0x000d);

    fn entry(self) -> Option<&'static RegistryEntry> {
        REGISTRY.iter().find(|e| e.id == self)
    }

    /// The hash function for this algorithm, or `None` if it is unsupported.
    pub fn hash_function(self) -> Option<HashFn> {
        self.entry().map(|e| e.hash)
    }

    /// Digest size in bytes. Unsupported algorithms report 0.
    pub fn digest_size(self) -> usize {
        self.entry().map_or(0, |e| e.size)
    }

    pub fn is_supported(self) -> bool {
        self.entry().is_some()
    }

    /// Hashes `data`, or returns `None` if the algorithm is unsupported.
    pub fn hash(self, data: &[u8]) -> Option<Vec<u8>> {
        self.hash_function().map(|h| h(data))
    }

    /// Looks up a supported algorithm by its short name (`sha1`, `sha256`, ...).
    pub fn from_name(name: &str) -> Option<AlgorithmId> {
        REGISTRY
            .iter()
            .find(|e| e.short_name.eq_ignore_ascii_case(name))
            .map(|e| e.id)
    }
}

impl From<u16> for AlgorithmId {
    fn from(raw: u16) -> Self {
        AlgorithmId(raw)
    }
}

impl Display for AlgorithmId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.entry() {
            Some(e) => f.write_str(e.name),
            None => write!(f, "{:04x}", self.0),
        }
    }
}

impl LowerHex for AlgorithmId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        LowerHex::fmt(&self.0, f)
    }
}

impl Serialize for AlgorithmId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct RegistryEntry {
    id: AlgorithmId,
    name: &'static str,
    short_name: &'static str,
    size: usize,
    hash: HashFn,
}

fn digest_with<D: sha2::Digest>(data: &[u8]) -> Vec<u8> {
    D::digest(data).to_vec()
}

static REGISTRY: [RegistryEntry; 4] = [
    RegistryEntry {
        id: AlgorithmId::SHA1,
        name: "SHA-1",
        short_name: "sha1",
        size: 20,
        hash: digest_with::<Sha1>,
    },
    RegistryEntry {
        id: AlgorithmId::SHA256,
        name: "SHA-256",
        short_name: "sha256",
        size: 32,
        hash: digest_with::<Sha256>,
    },
    RegistryEntry {
        id: AlgorithmId::SHA384,
        name: "SHA-384",
        short_name: "sha384",
        size: 48,
        hash: digest_with::<Sha384>,
    },
    RegistryEntry {
        id: AlgorithmId::SHA512,
        name: "SHA-512",
        short_name: "sha512",
        size: 64,
        hash: digest_with::<Sha512>,
    },
];
