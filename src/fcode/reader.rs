//! 大端字节游标
//!
//! 所有 fcode 条目都用同一套原语编码：`u1`/`u2`/`u4`/`u8`/`f8`，
//! `utf`（u2 长度 + Java modified UTF-8），`buf`（u2 长度 + 原始字节）。

use super::errors::{FcodeError, FcodeResult};

/// Big-endian cursor over one archive entry
#[derive(Debug, Clone)]
pub struct FReader<'a> {
    buf: &'a [u8],
    pos: usize,
    what: &'static str,
}

impl<'a> FReader<'a> {
    /// Create a reader; `what` names the entry for error messages
    pub fn new(
        buf: &'a [u8],
        what: &'static str,
    ) -> Self {
        Self { buf, pos: 0, what }
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(
        &mut self,
        n: usize,
    ) -> FcodeResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(FcodeError::Truncated {
                what: self.what,
                at: self.pos,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// 移动到绝对位置（不超过末尾）
    pub fn seek(
        &mut self,
        pos: usize,
    ) {
        self.pos = pos.min(self.buf.len());
    }

    pub fn skip(
        &mut self,
        n: usize,
    ) -> FcodeResult<()> {
        self.take(n).map(|_| ())
    }

    pub fn u1(&mut self) -> FcodeResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u2(&mut self) -> FcodeResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u4(&mut self) -> FcodeResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u8(&mut self) -> FcodeResult<u64> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_be_bytes(arr))
    }

    pub fn i8(&mut self) -> FcodeResult<i64> {
        self.u8().map(|v| v as i64)
    }

    pub fn f8(&mut self) -> FcodeResult<f64> {
        self.u8().map(f64::from_bits)
    }

    /// u2 length + modified UTF-8
    pub fn utf(&mut self) -> FcodeResult<String> {
        let len = self.u2()? as usize;
        let bytes = self.take(len)?;
        decode_modified_utf8(bytes)
    }

    /// u2 length + raw bytes
    pub fn buf(&mut self) -> FcodeResult<Vec<u8>> {
        let len = self.u2()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}

/// Decode Java modified UTF-8
pub fn decode_modified_utf8(bytes: &[u8]) -> FcodeResult<String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(b as u16);
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            let b2 = *bytes
                .get(i + 1)
                .ok_or_else(|| FcodeError::Utf(format!("short 2-byte sequence at {}", i)))?;
            units.push((((b & 0x1F) as u16) << 6) | (b2 & 0x3F) as u16);
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            if i + 2 >= bytes.len() {
                return Err(FcodeError::Utf(format!("short 3-byte sequence at {}", i)));
            }
            let b2 = bytes[i + 1];
            let b3 = bytes[i + 2];
            units.push(
                (((b & 0x0F) as u16) << 12) | (((b2 & 0x3F) as u16) << 6) | (b3 & 0x3F) as u16,
            );
            i += 3;
        } else {
            return Err(FcodeError::Utf(format!("bad lead byte 0x{:02X} at {}", b, i)));
        }
    }
    String::from_utf16(&units).map_err(|e| FcodeError::Utf(e.to_string()))
}

/// Encode Java modified UTF-8 (NUL as `C0 80`, supplementary chars as surrogate pairs)
pub fn encode_modified_utf8(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}
