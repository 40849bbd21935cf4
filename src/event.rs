use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::algorithm::AlgorithmId;
use crate::digest::{Digest, DigestMap};
use crate::err::{LogError, Result};
use crate::event_data::EventData;
use crate::event_type::{EventType, PcrIndex};

/// A single measurement recorded in the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub index: u32,
    pub pcr_index: PcrIndex,
    pub event_type: EventType,
    #[serde(serialize_with = "serialize_digests")]
    pub digests: DigestMap,
    pub data: EventData,
}

/// Digests are emitted ordered by algorithm id, so output does not depend on hash map order.
fn serialize_digests<S>(digests: &DigestMap, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut sorted: Vec<(&AlgorithmId, &Digest)> = digests.iter().collect();
    sorted.sort_unstable_by_key(|(alg, _)| **alg);
    serializer.collect_map(sorted)
}

impl Event {
    pub fn new(
        index: u32,
        pcr_index: PcrIndex,
        event_type: EventType,
        digests: DigestMap,
        data: EventData,
    ) -> Self {
        Event {
            index,
            pcr_index,
            event_type,
            digests,
            data,
        }
    }

    pub fn digest(&self, algorithm: AlgorithmId) -> Option<&Digest> {
        self.digests.get(&algorithm)
    }

    pub fn to_json_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| LogError::JsonError {
            index: self.index,
            source: e,
        })
    }

    pub fn to_json(&self, indent: bool) -> Result<String> {
        let json = if indent {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        };
        json.map_err(|e| LogError::JsonError {
            index: self.index,
            source: e,
        })
    }
}
