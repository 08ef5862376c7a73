//! Byte encodings of the protocol messages. Everything is fixed-width
//! (scalars and elements take their group's encoding size), so a parsed
//! message is canonical or rejected.

use distkey_codec::{Codec, ReadError};
use distkey_group::{Group, GroupElement, Scalar};
use std::io::BufRead;

// more dealers than this is a corrupt frame, not a large committee
pub(crate) const MAX_VEC: usize = 4096;

pub(crate) fn get_scalar<R: BufRead>(
    codec: &mut Codec<R>,
    group: &Group,
) -> Result<Scalar, ReadError> {
    let bytes = codec.get_bytes(group.q_bytes())?;
    Scalar::from_bytes(group, &bytes)
        .ok_or_else(|| ReadError::StructureInvalid("scalar out of bounds".to_string()))
}

pub(crate) fn get_element<R: BufRead>(
    codec: &mut Codec<R>,
    group: &Group,
) -> Result<GroupElement, ReadError> {
    let bytes = codec.get_bytes(group.p_bytes())?;
    GroupElement::from_bytes(group, &bytes)
        .ok_or_else(|| ReadError::StructureInvalid("element not in group".to_string()))
}

pub(crate) fn get_element_vec<R: BufRead>(
    codec: &mut Codec<R>,
    group: &Group,
    expected: usize,
) -> Result<Vec<GroupElement>, ReadError> {
    let count = codec.get_u32()? as usize;
    if count != expected || count > MAX_VEC {
        return Err(ReadError::StructureInvalid(format!(
            "expected {} elements, frame claims {}",
            expected, count
        )));
    }
    (0..count).map(|_| get_element(codec, group)).collect()
}

pub(crate) fn put_element_vec(out: &mut Vec<u8>, elements: &[GroupElement]) {
    out.extend_from_slice(&(elements.len() as u32).to_be_bytes());
    for e in elements {
        out.extend_from_slice(&e.to_bytes());
    }
}

pub(crate) fn expect_end<R: BufRead>(codec: &mut Codec<R>) -> Result<(), ReadError> {
    let mut reader = codec;
    let buf = std::io::BufRead::fill_buf(&mut reader)?;
    if buf.is_empty() {
        Ok(())
    } else {
        Err(ReadError::UnconsumedData(buf.len()))
    }
}
