//! Pedersen verifiable secret sharing: the dealing, share verification,
//! and reconstruction building blocks driven by the joint protocols.

use crate::math::{interpolate_at_zero, Polynomial};
use crate::wire::{expect_end, get_element_vec, get_scalar, put_element_vec};
use distkey_codec::{Codec, ReadError};
use distkey_group::{Commitment, CommitmentKey, Group, GroupElement, Scalar};
use rand_core::RngCore;

/// A dealer's secret polynomials and the published commitment column
/// `C_k = g^{a_k} h^{b_k}`.
pub struct Dealing {
    pub(crate) f: Polynomial,
    pub(crate) fprime: Polynomial,
    pub(crate) commitments: Vec<Commitment>,
}

impl Dealing {
    /// Deal a fresh degree-`t` sharing of a random secret.
    pub fn random<R: RngCore>(group: &Group, ck: &CommitmentKey, t: usize, rng: &mut R) -> Self {
        let f = Polynomial::random(group, t, rng);
        let fprime = Polynomial::random(group, t, rng);
        Dealing::commit(ck, f, fprime)
    }

    /// Deal a sharing of zero (`f(0) = 0`), for the proactive refresh.
    pub fn zero<R: RngCore>(group: &Group, ck: &CommitmentKey, t: usize, rng: &mut R) -> Self {
        let f = Polynomial::random_with_zero_constant(group, t, rng);
        let fprime = Polynomial::random(group, t, rng);
        Dealing::commit(ck, f, fprime)
    }

    pub fn from_polynomials(ck: &CommitmentKey, f: Polynomial, fprime: Polynomial) -> Self {
        Dealing::commit(ck, f, fprime)
    }

    fn commit(ck: &CommitmentKey, f: Polynomial, fprime: Polynomial) -> Self {
        assert_eq!(f.degree(), fprime.degree());
        let commitments = f
            .coefficients()
            .zip(fprime.coefficients())
            .map(|(a, b)| ck.commit(a, b))
            .collect();
        Dealing {
            f,
            fprime,
            commitments,
        }
    }

    pub fn commitments(&self) -> &[Commitment] {
        &self.commitments
    }

    pub fn secret(&self) -> Scalar {
        self.f.at_zero()
    }

    /// The share pair destined for the participant at `abscissa`.
    pub fn share_for(&self, abscissa: u64) -> SharePair {
        let group = self.f.at_zero().group().clone();
        let x = Scalar::from_u64(&group, abscissa);
        SharePair {
            s: self.f.evaluate(&x),
            sprime: self.fprime.evaluate(&x),
        }
    }
}

/// Share pair `(s, s')` sent from a dealer to one recipient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharePair {
    pub s: Scalar,
    pub sprime: Scalar,
}

impl SharePair {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.s.to_bytes();
        out.extend_from_slice(&self.sprime.to_bytes());
        out
    }

    pub fn from_bytes(group: &Group, bytes: &[u8]) -> Result<Self, ReadError> {
        let mut codec = Codec::new(bytes);
        let s = get_scalar(&mut codec, group)?;
        let sprime = get_scalar(&mut codec, group)?;
        expect_end(&mut codec)?;
        Ok(SharePair { s, sprime })
    }
}

/// Published commitment column of one dealer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitmentColumn(pub Vec<Commitment>);

impl CommitmentColumn {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let elements: Vec<GroupElement> =
            self.0.iter().map(|c| c.element().clone()).collect();
        put_element_vec(&mut out, &elements);
        out
    }

    pub fn from_bytes(group: &Group, t: usize, bytes: &[u8]) -> Result<Self, ReadError> {
        let mut codec = Codec::new(bytes);
        let elements = get_element_vec(&mut codec, group, t + 1)?;
        expect_end(&mut codec)?;
        Ok(CommitmentColumn(
            elements.into_iter().map(Commitment::from).collect(),
        ))
    }
}

/// Verification equation at the recipient:
/// `g^s · h^s' == Π_k C_k^{x^k}` for the recipient's abscissa `x`.
pub fn verify_share(
    group: &Group,
    ck: &CommitmentKey,
    commitments: &[Commitment],
    abscissa: u64,
    share: &SharePair,
) -> bool {
    let left = ck.commit(&share.s, &share.sprime);
    let x = Scalar::from_u64(group, abscissa);
    let mut right = GroupElement::identity(group);
    for (c, power) in commitments.iter().zip(x.exp_iter()) {
        right = right * c.element().pow(&power);
    }
    left.element() == &right
}

/// Reconstruct the dealer's secret from `t+1` or more share points.
pub fn reconstruct(group: &Group, points: &[(u64, Scalar)]) -> Option<Scalar> {
    interpolate_at_zero(group, points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    fn tiny_group() -> Group {
        Group::from_parts(
            BigUint::from(23u32),
            BigUint::from(11u32),
            BigUint::from(2u32),
            BigUint::from(2u32),
            false,
        )
        .unwrap()
    }

    /// The deterministic dealing from the protocol documentation:
    /// `p=23, q=11, g=2`, dealer polynomials `f(z)=5+3z`, `f'(z)=7+4z`.
    #[test]
    fn deterministic_tiny_dealing() {
        let group = tiny_group();
        // h = g^2 = 4, a known subgroup element
        let h = group.generator().pow(&Scalar::from_u64(&group, 2));
        let ck = CommitmentKey::from_element(h);

        let f = Polynomial::from_coefficients(vec![
            Scalar::from_u64(&group, 5),
            Scalar::from_u64(&group, 3),
        ]);
        let fprime = Polynomial::from_coefficients(vec![
            Scalar::from_u64(&group, 7),
            Scalar::from_u64(&group, 4),
        ]);
        let dealing = Dealing::from_polynomials(&ck, f, fprime);

        // C_0 = g^5 h^7, C_1 = g^3 h^4
        let g = group.generator();
        let expected_c0 = g.pow(&Scalar::from_u64(&group, 5))
            * ck.h.pow(&Scalar::from_u64(&group, 7));
        let expected_c1 = g.pow(&Scalar::from_u64(&group, 3))
            * ck.h.pow(&Scalar::from_u64(&group, 4));
        assert_eq!(dealing.commitments()[0].element(), &expected_c0);
        assert_eq!(dealing.commitments()[1].element(), &expected_c1);

        // shares for recipients 0, 1, 2 are f(1), f(2), f(3) = 8, 0, 3 mod 11
        let expected = [8u64, 0, 3];
        for (i, want) in expected.iter().enumerate() {
            let share = dealing.share_for(i as u64 + 1);
            assert_eq!(share.s, Scalar::from_u64(&group, *want));
            assert!(verify_share(
                &group,
                &ck,
                dealing.commitments(),
                i as u64 + 1,
                &share
            ));
        }
    }

    #[test]
    fn tampered_share_fails_verification() {
        let group = tiny_group();
        let mut rng = ChaCha20Rng::from_seed([25u8; 32]);
        let ck = CommitmentKey::generate_from_seed(&group, b"vss test");
        let dealing = Dealing::random(&group, &ck, 1, &mut rng);
        let mut share = dealing.share_for(2);
        share.sprime = share.sprime + Scalar::one(&group);
        assert!(!verify_share(&group, &ck, dealing.commitments(), 2, &share));
    }

    #[test]
    fn share_pair_round_trip() {
        let group = tiny_group();
        let mut rng = ChaCha20Rng::from_seed([26u8; 32]);
        let pair = SharePair {
            s: Scalar::random(&group, &mut rng),
            sprime: Scalar::random(&group, &mut rng),
        };
        let parsed = SharePair::from_bytes(&group, &pair.to_bytes()).unwrap();
        assert_eq!(parsed, pair);
    }

    #[test]
    fn commitment_column_round_trip() {
        let group = tiny_group();
        let mut rng = ChaCha20Rng::from_seed([27u8; 32]);
        let ck = CommitmentKey::generate_from_seed(&group, b"vss test");
        let dealing = Dealing::random(&group, &ck, 2, &mut rng);
        let column = CommitmentColumn(dealing.commitments().to_vec());
        let parsed = CommitmentColumn::from_bytes(&group, 2, &column.to_bytes()).unwrap();
        assert_eq!(parsed, column);

        assert!(CommitmentColumn::from_bytes(&group, 3, &column.to_bytes()).is_err());
    }

    #[test]
    fn reconstruction_from_any_quorum() {
        let group = tiny_group();
        let mut rng = ChaCha20Rng::from_seed([28u8; 32]);
        let ck = CommitmentKey::generate_from_seed(&group, b"vss test");
        let dealing = Dealing::random(&group, &ck, 1, &mut rng);
        for quorum in [[1u64, 2], [2, 3], [1, 3]] {
            let points: Vec<(u64, Scalar)> = quorum
                .iter()
                .map(|&x| (x, dealing.share_for(x).s))
                .collect();
            assert_eq!(reconstruct(&group, &points), Some(dealing.secret()));
        }
    }

    #[test]
    fn zero_dealing_shares_sum_to_zero() {
        let group = tiny_group();
        let mut rng = ChaCha20Rng::from_seed([29u8; 32]);
        let ck = CommitmentKey::generate_from_seed(&group, b"vss test");
        let dealing = Dealing::zero(&group, &ck, 1, &mut rng);
        assert_eq!(dealing.secret(), Scalar::zero(&group));
        let points: Vec<(u64, Scalar)> = [1u64, 2]
            .iter()
            .map(|&x| (x, dealing.share_for(x).s))
            .collect();
        assert_eq!(reconstruct(&group, &points), Some(Scalar::zero(&group)));
    }
}
