use std::fmt::{self, Debug, Display};

use serde::{Serialize, Serializer};

use crate::err::DecodeResult;
use crate::utils::ByteCursor;

/// An EFI GUID. The first three fields are stored little-endian on the wire.
#[derive(PartialOrd, PartialEq, Eq, Hash, Clone, Copy)]
pub struct Guid {
    data1: u32,
    data2: u16,
    data3: u16,
    data4: [u8; 8],
}

impl Guid {
    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Guid {
        Guid {
            data1,
            data2,
            data3,
            data4,
        }
    }

    pub(crate) fn read(cursor: &mut ByteCursor, what: &'static str) -> DecodeResult<Guid> {
        let data1 = cursor.u32(what)?;
        let data2 = cursor.u16(what)?;
        let data3 = cursor.u16(what)?;
        let data4 = cursor.array::<8>(what)?;
        Ok(Guid::new(data1, data2, data3, data4))
    }
}

impl Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7]
        )
    }
}

impl Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl Serialize for Guid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
