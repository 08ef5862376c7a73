//! Prime-order subgroup of `(Z/pZ)*` with the primitives the distributed
//! protocols are built from: group parameter (CRS) handling, scalars and
//! group elements, Pedersen commitments, and the Schnorr / Chaum-Pedersen
//! non-interactive proofs of knowledge.

#[macro_use]
mod macros;
pub mod commitment;
mod element;
mod params;
pub mod zkp;

pub use commitment::{Commitment, CommitmentKey, Open, TrapdoorCommitmentKey, Validity, VectorCommitmentKey};
pub use element::{GroupElement, Scalar};
pub use params::{Group, CRS_RADIX};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupError {
    /// A group parameter failed validation.
    #[error("bad group parameter: {0}")]
    BadParameter(&'static str),
    /// A value is not a member of the prime-order subgroup.
    #[error("element is not in the group")]
    NotInGroup,
    /// A CRS record failed to parse.
    #[error("invalid CRS record: {0}")]
    InvalidCrs(&'static str),
}
