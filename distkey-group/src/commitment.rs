use crate::element::{GroupElement, Scalar};
use crate::params::Group;
use rand_core::RngCore;
use std::ops::Mul;

/// Pedersen commitment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Commitment {
    c: GroupElement,
}

/// Commitment key `h` with unknown discrete log relative to the group
/// generator. Binding rests on discrete-log hardness; hiding is perfect.
#[derive(Clone)]
pub struct CommitmentKey {
    pub h: GroupElement,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Invalid,
}

/// Opening of a commitment: the message and its blinding factor.
#[derive(Clone)]
pub struct Open {
    pub m: Scalar,
    pub r: Scalar,
}

impl CommitmentKey {
    /// Generate a commitment key from a seed. The seed is hashed onto a
    /// group element, so the discrete log of `h` is unknown to everybody.
    pub fn generate_from_seed(group: &Group, seed: &[u8]) -> Self {
        CommitmentKey {
            h: group.element_from_hash(b"distkey/commitment-key", seed),
        }
    }

    pub fn from_element(h: GroupElement) -> Self {
        CommitmentKey { h }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.h.to_bytes()
    }

    /// Return a commitment with the given opening, `o`
    pub fn commit_with_open(&self, o: &Open) -> Commitment {
        self.commit(&o.m, &o.r)
    }

    /// Return a commitment with the given message, `m`, and blinding, `r`:
    /// `g^m · h^r mod p`.
    pub fn commit(&self, m: &Scalar, r: &Scalar) -> Commitment {
        let group = self.h.group();
        let c = group.generator().pow(m) * self.h.pow(r);
        Commitment { c }
    }
}

impl Commitment {
    /// Verify that a given opening, `o`, corresponds to the commitment
    /// under a given commitment key `ck`
    pub fn verify(&self, ck: &CommitmentKey, o: &Open) -> Validity {
        let other = ck.commit_with_open(o);
        if self == &other {
            Validity::Valid
        } else {
            Validity::Invalid
        }
    }

    pub fn element(&self) -> &GroupElement {
        &self.c
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.c.to_bytes()
    }

    pub fn from_bytes(group: &Group, buf: &[u8]) -> Option<Self> {
        Some(Self {
            c: GroupElement::from_bytes(group, buf)?,
        })
    }
}

impl From<GroupElement> for Commitment {
    fn from(c: GroupElement) -> Self {
        Commitment { c }
    }
}

// Homomorphic combination: the product commits to the sum of messages.
impl<'a, 'b> Mul<&'b Commitment> for &'a Commitment {
    type Output = Commitment;
    fn mul(self, rhs: &'b Commitment) -> Self::Output {
        Commitment {
            c: &self.c * &rhs.c,
        }
    }
}

std_ops_gen!(Commitment, Mul, Commitment, Commitment, mul);

impl Commitment {
    /// `self^e`, committing to `e` times the message.
    pub fn pow(&self, e: &Scalar) -> Commitment {
        Commitment { c: self.c.pow(e) }
    }
}

/// Commitment key for message tuples. Each generator is derived from a
/// public-coin value, so no discrete-log relation among the generators is
/// known to any party.
#[derive(Clone)]
pub struct VectorCommitmentKey {
    pub gens: Vec<GroupElement>,
    pub h: GroupElement,
}

impl VectorCommitmentKey {
    /// Derive `n` generators from a jointly produced coin.
    pub fn from_coin(group: &Group, coin: &Scalar, n: usize) -> Self {
        let mut gens = Vec::with_capacity(n);
        for i in 0..n {
            let mut seed = coin.to_bytes();
            seed.extend_from_slice(&(i as u64).to_be_bytes());
            gens.push(group.element_from_hash(b"distkey/vector-generator", &seed));
        }
        let mut seed = coin.to_bytes();
        seed.extend_from_slice(b"blinding");
        VectorCommitmentKey {
            gens,
            h: group.element_from_hash(b"distkey/vector-generator", &seed),
        }
    }

    /// `Π g_i^{m_i} · h^r`. The message tuple must match the key length.
    pub fn commit(&self, msgs: &[Scalar], r: &Scalar) -> Option<Commitment> {
        if msgs.len() != self.gens.len() {
            return None;
        }
        let mut c = self.h.pow(r);
        for (gen, m) in self.gens.iter().zip(msgs.iter()) {
            c = c * gen.pow(m);
        }
        Some(Commitment { c })
    }

    pub fn verify(&self, commitment: &Commitment, msgs: &[Scalar], r: &Scalar) -> Validity {
        match self.commit(msgs, r) {
            Some(other) if &other == commitment => Validity::Valid,
            _ => Validity::Invalid,
        }
    }
}

/// Commitment key with a known trapdoor `x` (`h = g^x`). The holder can
/// open any commitment as any message, which is what the trusted-setup
/// role needs; everyone else sees an ordinary Pedersen key.
pub struct TrapdoorCommitmentKey {
    key: CommitmentKey,
    trapdoor: Scalar,
}

impl TrapdoorCommitmentKey {
    pub fn generate<R: RngCore>(group: &Group, rng: &mut R) -> Self {
        // x = 0 would make h the identity and the key useless
        let trapdoor = loop {
            let x = Scalar::random(group, rng);
            if !x.is_zero() {
                break x;
            }
        };
        let h = group.generator().pow(&trapdoor);
        TrapdoorCommitmentKey {
            key: CommitmentKey { h },
            trapdoor,
        }
    }

    pub fn key(&self) -> &CommitmentKey {
        &self.key
    }

    pub fn trapdoor(&self) -> &Scalar {
        &self.trapdoor
    }

    /// Produce the blinding that opens an existing commitment as
    /// `new_m` instead of the committed message.
    pub fn equivocate(&self, o: &Open, new_m: &Scalar) -> Open {
        let x_inv = self
            .trapdoor
            .inverse()
            .unwrap_or_else(|| Scalar::one(self.trapdoor.group()));
        let r = &o.r + (&o.m - new_m) * &x_inv;
        Open {
            m: new_m.clone(),
            r,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Group;
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

    #[test]
    fn commit_and_verify() {
        let mut rng = ChaCha20Rng::from_seed([12u8; 32]);
        let group = tiny_group();
        let ck = CommitmentKey::generate_from_seed(&group, b"test key");
        let o = Open {
            m: Scalar::random(&group, &mut rng),
            r: Scalar::random(&group, &mut rng),
        };
        let c = ck.commit_with_open(&o);
        assert_eq!(c.verify(&ck, &o), Validity::Valid);

        let bad = Open {
            m: &o.m + Scalar::one(&group),
            r: o.r.clone(),
        };
        assert_eq!(c.verify(&ck, &bad), Validity::Invalid);
    }

    #[test]
    fn homomorphic_combination() {
        let mut rng = ChaCha20Rng::from_seed([13u8; 32]);
        let group = tiny_group();
        let ck = CommitmentKey::generate_from_seed(&group, b"test key");
        let (m1, r1) = (Scalar::random(&group, &mut rng), Scalar::random(&group, &mut rng));
        let (m2, r2) = (Scalar::random(&group, &mut rng), Scalar::random(&group, &mut rng));
        let combined = ck.commit(&m1, &r1) * ck.commit(&m2, &r2);
        assert_eq!(combined, ck.commit(&(&m1 + &m2), &(&r1 + &r2)));
    }

    #[test]
    fn vector_commitment() {
        let mut rng = ChaCha20Rng::from_seed([14u8; 32]);
        let group = tiny_group();
        let coin = Scalar::random(&group, &mut rng);
        let vck = VectorCommitmentKey::from_coin(&group, &coin, 3);
        let msgs: Vec<Scalar> = (0..3).map(|_| Scalar::random(&group, &mut rng)).collect();
        let r = Scalar::random(&group, &mut rng);
        let c = vck.commit(&msgs, &r).unwrap();
        assert_eq!(vck.verify(&c, &msgs, &r), Validity::Valid);
        assert!(vck.commit(&msgs[..2], &r).is_none());
    }

    #[test]
    fn trapdoor_equivocation() {
        let mut rng = ChaCha20Rng::from_seed([15u8; 32]);
        let group = tiny_group();
        let tck = TrapdoorCommitmentKey::generate(&group, &mut rng);
        let o = Open {
            m: Scalar::from_u64(&group, 4),
            r: Scalar::random(&group, &mut rng),
        };
        let c = tck.key().commit_with_open(&o);
        let other = tck.equivocate(&o, &Scalar::from_u64(&group, 9));
        assert_eq!(c.verify(tck.key(), &other), Validity::Valid);
    }
}
