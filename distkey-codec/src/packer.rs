use crate::deser::{ReadError, WriteError};

pub struct Codec<I>(I);
impl<I> Codec<I> {
    pub fn new(inner: I) -> Self {
        Codec(inner)
    }

    pub fn into_inner(self) -> I {
        self.0
    }
}

impl<R: std::io::BufRead> Codec<R> {
    #[inline]
    pub fn get_u8(&mut self) -> Result<u8, ReadError> {
        let mut buf = [0u8; 1];
        self.0.read_exact(&mut buf)?;
        Ok(buf[0])
    }
    #[inline]
    pub fn get_u16(&mut self) -> Result<u16, ReadError> {
        let mut buf = [0u8; 2];
        self.0.read_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }
    #[inline]
    pub fn get_u32(&mut self) -> Result<u32, ReadError> {
        let mut buf = [0u8; 4];
        self.0.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }
    #[inline]
    pub fn get_u64(&mut self) -> Result<u64, ReadError> {
        let mut buf = [0u8; 8];
        self.0.read_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }
    #[inline]
    pub fn get_bytes(&mut self, n: usize) -> Result<Vec<u8>, ReadError> {
        let mut buf = vec![0u8; n];
        self.0.read_exact(&mut buf)?;
        Ok(buf)
    }
    #[inline]
    pub fn get_slice(&mut self, slice: &mut [u8]) -> Result<(), ReadError> {
        self.0.read_exact(slice)?;
        Ok(())
    }
    /// Read a u32 length prefix followed by that many bytes. The length is
    /// capped so that a corrupted frame cannot trigger a huge allocation.
    #[inline]
    pub fn get_var_bytes(&mut self, max: usize) -> Result<Vec<u8>, ReadError> {
        let len = self.get_u32()? as usize;
        if len > max {
            return Err(ReadError::StructureInvalid(format!(
                "length prefix {} exceeds limit {}",
                len, max
            )));
        }
        self.get_bytes(len)
    }
}

impl<W: std::io::Write> Codec<W> {
    #[inline]
    pub fn put_u8(&mut self, v: u8) -> Result<(), WriteError> {
        self.0.write_all(&[v]).map_err(|e| e.into())
    }
    #[inline]
    pub fn put_u16(&mut self, v: u16) -> Result<(), WriteError> {
        self.0.write_all(&v.to_be_bytes()).map_err(|e| e.into())
    }
    #[inline]
    pub fn put_u32(&mut self, v: u32) -> Result<(), WriteError> {
        self.0.write_all(&v.to_be_bytes()).map_err(|e| e.into())
    }
    #[inline]
    pub fn put_u64(&mut self, v: u64) -> Result<(), WriteError> {
        self.0.write_all(&v.to_be_bytes()).map_err(|e| e.into())
    }
    #[inline]
    pub fn put_bytes(&mut self, v: &[u8]) -> Result<(), WriteError> {
        self.0.write_all(v).map_err(|e| e.into())
    }
    /// Write a u32 length prefix followed by the bytes.
    #[inline]
    pub fn put_var_bytes(&mut self, v: &[u8]) -> Result<(), WriteError> {
        self.put_u32(v.len() as u32)?;
        self.put_bytes(v)
    }
}

impl<R: std::io::Read> std::io::Read for Codec<R> {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl<BR: std::io::BufRead> std::io::BufRead for Codec<BR> {
    #[inline]
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        self.0.fill_buf()
    }
    #[inline]
    fn consume(&mut self, amt: usize) {
        self.0.consume(amt)
    }
}

impl<W: std::io::Write> std::io::Write for Codec<W> {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }
    #[inline]
    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_primitives() {
        let mut buf = Vec::new();
        let mut codec = Codec::new(&mut buf);
        codec.put_u8(0x17).unwrap();
        codec.put_u16(0xbeef).unwrap();
        codec.put_u64(0x0102030405060708).unwrap();
        codec.put_var_bytes(b"payload").unwrap();

        let mut codec = Codec::new(buf.as_slice());
        assert_eq!(codec.get_u8().unwrap(), 0x17);
        assert_eq!(codec.get_u16().unwrap(), 0xbeef);
        assert_eq!(codec.get_u64().unwrap(), 0x0102030405060708);
        assert_eq!(codec.get_var_bytes(1024).unwrap(), b"payload");
    }

    #[test]
    fn var_bytes_length_cap() {
        let mut buf = Vec::new();
        let mut codec = Codec::new(&mut buf);
        codec.put_var_bytes(&[0u8; 64]).unwrap();

        let mut codec = Codec::new(buf.as_slice());
        assert!(matches!(
            codec.get_var_bytes(16),
            Err(ReadError::StructureInvalid(_))
        ));
    }
}
