use crate::err::{DecodeError, DecodeResult};

/// Decode a UTF-16LE byte slice until the first NUL (0x0000), if present.
///
/// `offset` is the position of `bytes` inside the payload, used for error reporting.
pub(crate) fn decode_utf16le_z(bytes: &[u8], what: &'static str, offset: usize) -> DecodeResult<String> {
    if !bytes.len().is_multiple_of(2) {
        return Err(DecodeError::invalid(
            what,
            offset,
            format!("odd number of bytes ({}) in UTF-16 string", bytes.len()),
        ));
    }

    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
        .take_while(|&c| c != 0)
        .collect();

    String::from_utf16(&units).map_err(|_| DecodeError::InvalidUtf16 {
        what,
        offset: offset as u64,
    })
}

/// Decode an 8-bit string until the first NUL, if present.
pub(crate) fn decode_utf8_z(bytes: &[u8], what: &'static str, offset: usize) -> DecodeResult<String> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..end])
        .map(str::to_owned)
        .map_err(|_| DecodeError::InvalidUtf8 {
            what,
            offset: offset as u64,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(u16::to_le_bytes).collect()
    }

    #[test]
    fn test_decodes_until_nul() {
        let mut bytes = utf16("BootOrder");
        bytes.extend_from_slice(&[0, 0, b'x', 0]);
        assert_eq!(decode_utf16le_z(&bytes, "name", 0).unwrap(), "BootOrder");
    }

    #[test]
    fn test_rejects_odd_length() {
        let err = decode_utf16le_z(&[0x41, 0x00, 0x42], "name", 8).unwrap_err();
        assert!(!err.is_truncation());
    }

    #[test]
    fn test_rejects_lone_surrogate() {
        let bytes = [0x00, 0xd8, 0x41, 0x00];
        assert_eq!(
            decode_utf16le_z(&bytes, "name", 2),
            Err(DecodeError::InvalidUtf16 {
                what: "name",
                offset: 2
            })
        );
    }

    #[test]
    fn test_decodes_utf8_until_nul() {
        assert_eq!(decode_utf8_z(b"Calling EFI\0", "s", 0).unwrap(), "Calling EFI");
        assert!(decode_utf8_z(&[0xff, 0xfe], "s", 0).is_err());
    }
}
