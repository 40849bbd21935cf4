mod byte_cursor;
mod hexdump;
mod utf16;

pub(crate) use self::byte_cursor::ByteCursor;
pub use self::hexdump::hexdump;
pub(crate) use self::utf16::{decode_utf16le_z, decode_utf8_z};
