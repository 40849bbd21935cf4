use std::fmt::{self, Debug, Display, Formatter, LowerHex};
use std::ops::Deref;

use hashbrown::HashMap;
use serde::{Serialize, Serializer};

use crate::algorithm::AlgorithmId;

/// The output of hashing some data with one algorithm.
///
/// No length validation happens here; the log reader sizes digests according to the
/// algorithms declared in the log header.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Digest(Vec<u8>);

impl Digest {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Digest(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for Digest {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Digest {
    fn from(bytes: Vec<u8>) -> Self {
        Digest(bytes)
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl LowerHex for Digest {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl Display for Digest {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        LowerHex::fmt(self, f)
    }
}

impl Debug for Digest {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "Digest({:x})", self)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(&self.0))
    }
}

/// Digests of a single event, keyed by algorithm.
pub type DigestMap = HashMap<AlgorithmId, Digest>;
