use crate::element::{GroupElement, Scalar};
use crate::params::Group;
use cryptoxide::blake2b::Blake2b;
use cryptoxide::digest::Digest;

/// Fiat-Shamir challenge context. The domain string separates proof types,
/// the inputs fix the full statement, and `challenge` squeezes a scalar out
/// of the accumulated transcript.
pub struct ChallengeContext(Blake2b);

impl ChallengeContext {
    pub fn new(domain: &[u8]) -> Self {
        let mut ctx = Blake2b::new(64);
        ctx.input(&(domain.len() as u64).to_be_bytes());
        ctx.input(domain);
        ChallengeContext(ctx)
    }

    pub fn input_element(&mut self, e: &GroupElement) -> &mut Self {
        self.0.input(&e.to_bytes());
        self
    }

    pub fn input_scalar(&mut self, s: &Scalar) -> &mut Self {
        self.0.input(&s.to_bytes());
        self
    }

    pub fn input_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.0.input(&(bytes.len() as u64).to_be_bytes());
        self.0.input(bytes);
        self
    }

    /// Hash the transcript into `Z_q`.
    pub fn challenge(&mut self, group: &Group) -> Scalar {
        let mut digest = [0u8; 64];
        self.0.result(&mut digest);
        Scalar::from_hash(group, &digest)
    }
}
