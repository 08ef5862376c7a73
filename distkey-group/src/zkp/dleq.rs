//! Non-interactive Zero Knowledge proof of discrete logarithm equality
//! (Chaum-Pedersen):
//!
//! `NIZK{(base_1, base_2, point_1, point_2), (dlog): point_1 = base_1^dlog AND point_2 = base_2^dlog}`
#![allow(clippy::many_single_char_names)]
use super::challenge_context::ChallengeContext;
use crate::element::{GroupElement, Scalar};
use crate::params::Group;
use rand_core::RngCore;

const DOMAIN: &[u8] = b"distkey/zkp/dleq";

/// Proof of equality of two discrete logarithms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DleqZkp {
    challenge: Scalar,
    response: Scalar,
}

impl DleqZkp {
    /// Generate a DLEQ proof
    pub fn generate<R>(
        base_1: &GroupElement,
        base_2: &GroupElement,
        point_1: &GroupElement,
        point_2: &GroupElement,
        dlog: &Scalar,
        rng: &mut R,
    ) -> Self
    where
        R: RngCore,
    {
        let group = base_1.group();
        let w = Scalar::random(group, rng);
        let announcement_1 = base_1.pow(&w);
        let announcement_2 = base_2.pow(&w);
        let mut ctx = ChallengeContext::new(DOMAIN);
        ctx.input_element(base_1)
            .input_element(base_2)
            .input_element(point_1)
            .input_element(point_2);
        ctx.input_element(&announcement_1)
            .input_element(&announcement_2);
        let challenge = ctx.challenge(group);
        let response = &w - &challenge * dlog;

        DleqZkp {
            challenge,
            response,
        }
    }

    /// Verify a DLEQ proof is valid
    pub fn verify(
        &self,
        base_1: &GroupElement,
        base_2: &GroupElement,
        point_1: &GroupElement,
        point_2: &GroupElement,
    ) -> bool {
        let group = base_1.group();
        let announcement_1 = base_1.pow(&self.response) * point_1.pow(&self.challenge);
        let announcement_2 = base_2.pow(&self.response) * point_2.pow(&self.challenge);
        // the challenge is a public hash output, plain equality suffices
        let mut ctx = ChallengeContext::new(DOMAIN);
        ctx.input_element(base_1)
            .input_element(base_2)
            .input_element(point_1)
            .input_element(point_2);
        ctx.input_element(&announcement_1)
            .input_element(&announcement_2);
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
        Some(DleqZkp {
            challenge,
            response,
        })
    }
}
