//! Little-endian cursor over the directory file bytes.

use crate::VpkError;

pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Result<&'a [u8], VpkError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(VpkError::UnexpectedEof(self.pos))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], VpkError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub(crate) fn u16(&mut self) -> Result<u16, VpkError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, VpkError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    /// Read a NUL-terminated UTF-8 string, consuming the NUL.
    pub(crate) fn cstr(&mut self) -> Result<&'a str, VpkError> {
        let start = self.pos;
        let len = self.data[start..]
            .iter()
            .position(|&b| b == 0)
            .ok_or(VpkError::UnexpectedEof(start))?;
        let raw = self.bytes(len)?;
        self.pos += 1;
        std::str::from_utf8(raw).map_err(|_| VpkError::InvalidString(start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_little_endian() {
        let mut r = Reader::new(&[0x34, 0x12, 0x78, 0x56, 0x34, 0x12]);
        assert_eq!(r.u16().unwrap(), 0x1234);
        assert_eq!(r.u32().unwrap(), 0x1234_5678);
        assert_eq!(r.position(), 6);
    }

    #[test]
    fn test_cstr_consumes_nul() {
        let mut r = Reader::new(b"vmt\0materials\0");
        assert_eq!(r.cstr().unwrap(), "vmt");
        assert_eq!(r.cstr().unwrap(), "materials");
        assert_eq!(r.position(), 14);
    }

    #[test]
    fn test_eof_reports_offset() {
        let mut r = Reader::new(&[1, 2, 3]);
        assert_eq!(r.u32(), Err(VpkError::UnexpectedEof(0)));
        let mut r = Reader::new(b"unterminated");
        assert_eq!(r.cstr(), Err(VpkError::UnexpectedEof(0)));
    }
}
