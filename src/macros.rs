/// Reads a little endian integer from a record, reporting a short read as a truncated record
/// that starts at the position of the failed read.
macro_rules! try_read {
    ($cursor: ident, u16, $index: expr, $what: expr) => {{
        let offset = $cursor.position();
        $cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| LogError::TruncatedRecord {
                index: $index,
                what: $what,
                offset,
            })?
    }};

    ($cursor: ident, u32, $index: expr, $what: expr) => {{
        let offset = $cursor.position();
        $cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| LogError::TruncatedRecord {
                index: $index,
                what: $what,
                offset,
            })?
    }};
}
