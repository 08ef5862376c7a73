use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("not enough bytes: {0} available, {1} expected")]
    NotEnoughBytes(usize, usize),
    #[error("{0} unconsumed bytes left after reading")]
    UnconsumedData(usize),
    #[error("invalid structure: {0}")]
    StructureInvalid(String),
    #[error("unknown tag: {0}")]
    UnknownTag(u32),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Define that an object can be written to a `Write` object.
pub trait Serialize {
    fn serialize<W: std::io::Write>(&self, writer: W) -> Result<(), WriteError>;

    /// Convenience method to serialize into a byte vector.
    fn serialize_as_vec(&self) -> Result<Vec<u8>, WriteError> {
        let mut data = vec![];
        self.serialize(&mut data)?;
        Ok(data)
    }
}

impl<T: Serialize> Serialize for &T {
    fn serialize<W: std::io::Write>(&self, writer: W) -> Result<(), WriteError> {
        (**self).serialize(writer)
    }
}

/// Define that an object can be read back from a `BufRead` object.
pub trait Deserialize: Sized {
    fn deserialize<R: std::io::BufRead>(reader: R) -> Result<Self, ReadError>;

    fn deserialize_from_slice(slice: &[u8]) -> Result<Self, ReadError> {
        let mut reader = slice;
        let value = Self::deserialize(&mut reader)?;
        if !reader.is_empty() {
            return Err(ReadError::UnconsumedData(reader.len()));
        }
        Ok(value)
    }
}
