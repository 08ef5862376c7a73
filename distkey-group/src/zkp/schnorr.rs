//! Non-interactive proof of knowledge of a discrete logarithm:
//!
//! `NIZK{(base, y), (x): y = base^x}`
#![allow(clippy::many_single_char_names)]
use super::challenge_context::ChallengeContext;
use crate::element::{GroupElement, Scalar};
use crate::params::Group;
use rand_core::RngCore;

const DOMAIN: &[u8] = b"distkey/zkp/schnorr";

/// Proof of knowledge of `x` with `y = base^x`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchnorrZkp {
    challenge: Scalar,
    response: Scalar,
}

impl SchnorrZkp {
    /// Generate a proof of knowledge of `dlog`
    pub fn generate<R>(base: &GroupElement, y: &GroupElement, dlog: &Scalar, rng: &mut R) -> Self
    where
        R: RngCore,
    {
        let group = base.group();
        let v = Scalar::random(group, rng);
        let announcement = base.pow(&v);
        let mut ctx = ChallengeContext::new(DOMAIN);
        ctx.input_element(base).input_element(y);
        ctx.input_element(&announcement);
        let challenge = ctx.challenge(group);
        let response = &v - &challenge * dlog;

        SchnorrZkp {
            challenge,
            response,
        }
    }

    /// Verify the proof against `base` and `y`
    pub fn verify(&self, base: &GroupElement, y: &GroupElement) -> bool {
        let group = base.group();
        let announcement = base.pow(&self.response) * y.pow(&self.challenge);
        // no need for constant time equality because of the hash in challenge()
        let mut ctx = ChallengeContext::new(DOMAIN);
        ctx.input_element(base).input_element(y);
        ctx.input_element(&announcement);
        let challenge = ctx.challenge(group);
        challenge == self.challenge
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.challenge.to_bytes();
        out.extend_from_slice(&self.response.to_bytes());
        out
    }

    pub fn from_bytes(group: &Group, slice: &[u8]) -> Option<Self> {
        let width = group.q_bytes();
        if slice.len() != 2 * width {
            return None;
        }
        let challenge = Scalar::from_bytes(group, &slice[..width])?;
        let response = Scalar::from_bytes(group, &slice[width..])?;
        Some(SchnorrZkp {
            challenge,
            response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    fn tiny_group() -> Group {
        // p = 2039 = 2*1019 + 1, g = 4 generates the order-1019 subgroup
        Group::from_parts(
            BigUint::from(2039u32),
            BigUint::from(1019u32),
            BigUint::from(4u32),
            BigUint::from(2u32),
            false,
        )
        .unwrap()
    }

    #[test]
    fn it_works() {
        let mut rng = ChaCha20Rng::from_seed([16u8; 32]);
        let group = tiny_group();
        let x = Scalar::random(&group, &mut rng);
        let base = group.generator();
        let y = base.pow(&x);

        let proof = SchnorrZkp::generate(&base, &y, &x, &mut rng);
        assert!(proof.verify(&base, &y));
    }

    #[test]
    fn wrong_statement_fails() {
        let mut rng = ChaCha20Rng::from_seed([17u8; 32]);
        let group = tiny_group();
        let x = Scalar::random(&group, &mut rng);
        let base = group.generator();
        let y = base.pow(&(&x + Scalar::one(&group)));

        let proof = SchnorrZkp::generate(&base, &base.pow(&x), &x, &mut rng);
        assert!(!proof.verify(&base, &y));
    }

    #[test]
    fn serialisation() {
        let mut rng = ChaCha20Rng::from_seed([18u8; 32]);
        let group = tiny_group();
        let x = Scalar::random(&group, &mut rng);
        let base = group.generator();
        let y = base.pow(&x);

        let proof = SchnorrZkp::generate(&base, &y, &x, &mut rng);
        let parsed = SchnorrZkp::from_bytes(&group, &proof.to_bytes());
        assert_eq!(parsed, Some(proof));
        assert!(parsed.unwrap().verify(&base, &y));
    }
}
