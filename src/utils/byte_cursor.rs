use crate::err::{DecodeError, DecodeResult};

/// A lightweight cursor over an event payload.
///
/// All reads are little-endian and advance the cursor on success. A read that starts exactly at
/// the end of the buffer fails with [`DecodeError::UnexpectedEof`]; a read that starts inside the
/// buffer but runs past its end fails with [`DecodeError::Truncated`].
#[derive(Clone, Copy, Debug)]
pub(crate) struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    #[inline]
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        ByteCursor { buf, pos: 0 }
    }

    #[inline]
    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Everything not yet consumed.
    #[inline]
    pub(crate) fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos.min(self.buf.len())..]
    }

    #[inline]
    fn short_read(&self, what: &'static str, need: usize) -> DecodeError {
        let have = self.remaining();
        if have == 0 {
            DecodeError::UnexpectedEof {
                what,
                offset: self.pos as u64,
            }
        } else {
            DecodeError::Truncated {
                what,
                offset: self.pos as u64,
                need,
                have,
            }
        }
    }

    #[inline]
    pub(crate) fn take_bytes(&mut self, len: usize, what: &'static str) -> DecodeResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or_else(|| self.short_read(what, len))?;
        let out = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| self.short_read(what, len))?;
        self.pos = end;
        Ok(out)
    }

    /// Like [`take_bytes`](Self::take_bytes), for lengths read from the payload itself.
    #[inline]
    pub(crate) fn take_bytes_u64(&mut self, len: u64, what: &'static str) -> DecodeResult<&'a [u8]> {
        let len = usize::try_from(len).map_err(|_| self.short_read(what, usize::MAX))?;
        self.take_bytes(len, what)
    }

    #[inline]
    pub(crate) fn array<const N: usize>(&mut self, what: &'static str) -> DecodeResult<[u8; N]> {
        let bytes = self.take_bytes(N, what)?;
        let mut out = [0_u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    #[inline]
    pub(crate) fn u8(&mut self, what: &'static str) -> DecodeResult<u8> {
        Ok(self.array::<1>(what)?[0])
    }

    #[inline]
    pub(crate) fn u16(&mut self, what: &'static str) -> DecodeResult<u16> {
        Ok(u16::from_le_bytes(self.array(what)?))
    }

    #[inline]
    pub(crate) fn u32(&mut self, what: &'static str) -> DecodeResult<u32> {
        Ok(u32::from_le_bytes(self.array(what)?))
    }

    #[inline]
    pub(crate) fn u64(&mut self, what: &'static str) -> DecodeResult<u64> {
        Ok(u64::from_le_bytes(self.array(what)?))
    }
}
