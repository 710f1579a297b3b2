//! Big-endian primitives shared by every encoder in this crate.
//!
//! Variable-length fields are `u32 len ++ payload`. An optional string writes
//! `None` as length 0, so `Some("")` and `None` share one encoding.

use crate::CodecError;

pub(crate) struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Writer { buf: Vec::with_capacity(capacity) }
    }

    pub(crate) fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub(crate) fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub(crate) fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub(crate) fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub(crate) fn put_len(&mut self, len: usize) -> Result<(), CodecError> {
        let len = u32::try_from(len).map_err(|_| CodecError::TooLarge(len))?;
        self.put_u32(len);
        Ok(())
    }

    pub(crate) fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        self.put_len(bytes.len())?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub(crate) fn put_str(&mut self, s: &str) -> Result<(), CodecError> {
        self.put_bytes(s.as_bytes())
    }

    pub(crate) fn put_opt_str(&mut self, s: Option<&str>) -> Result<(), CodecError> {
        self.put_str(s.unwrap_or_default())
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.buf
    }
}

pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if n > self.remaining() {
            return Err(CodecError::Truncated { needed: n, remaining: self.remaining() });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn get_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn get_i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub(crate) fn get_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    pub(crate) fn get_i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub(crate) fn get_bytes(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.get_u32()? as usize;
        self.take(len)
    }

    pub(crate) fn get_string(&mut self) -> Result<String, CodecError> {
        let bytes = self.get_bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    pub(crate) fn get_opt_string(&mut self) -> Result<Option<String>, CodecError> {
        let s = self.get_string()?;
        Ok(if s.is_empty() { None } else { Some(s) })
    }

    /// Fails if anything is left after the value.
    pub(crate) fn finish(self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_big_endian() {
        let mut w = Writer::with_capacity(16);
        w.put_i32(1);
        w.put_i64(-2);
        let bytes = w.finish();
        assert_eq!(&bytes[..4], &[0, 0, 0, 1]);
        assert_eq!(&bytes[4..], &(-2i64).to_be_bytes());
    }

    #[test]
    fn short_buffer_reports_truncation() {
        let mut r = Reader::new(&[0, 0, 0, 9, b'a']);
        let err = r.get_bytes().unwrap_err();
        assert_eq!(err, CodecError::Truncated { needed: 9, remaining: 1 });
    }

    #[test]
    fn empty_optional_string_reads_back_as_none() {
        let mut w = Writer::with_capacity(8);
        w.put_opt_str(Some("")).unwrap();
        w.put_opt_str(None).unwrap();
        let bytes = w.finish();
        assert_eq!(bytes, vec![0u8; 8]);

        let mut r = Reader::new(&bytes);
        assert_eq!(r.get_opt_string().unwrap(), None);
        assert_eq!(r.get_opt_string().unwrap(), None);
        r.finish().unwrap();
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut r = Reader::new(&[0, 0, 0, 2, 0xff, 0xfe]);
        assert_eq!(r.get_string().unwrap_err(), CodecError::InvalidUtf8);
    }

    #[test]
    fn leftover_bytes_fail_finish() {
        let mut r = Reader::new(&[7, 1, 2]);
        assert_eq!(r.get_u8().unwrap(), 7);
        assert_eq!(r.finish().unwrap_err(), CodecError::TrailingBytes(2));
    }
}
