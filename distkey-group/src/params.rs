use crate::element::{GroupElement, Scalar};
use crate::GroupError;
use cryptoxide::blake2b::Blake2b;
use cryptoxide::digest::Digest;
use distkey_arith::{gen_prime, gen_safe_prime, is_probab_prime, modpow, rand_range};
use num_bigint::BigUint;
use num_traits::One;
use rand_core::RngCore;
use std::sync::Arc;

/// Radix of the ASCII CRS encoding. Both ends must agree on it.
pub const CRS_RADIX: u32 = 36;

const GENERATOR_DOMAIN: &[u8] = b"distkey/generator";
const INDEX_DOMAIN: &[u8] = b"distkey/index";

#[derive(Debug)]
pub(crate) struct GroupParams {
    pub(crate) p: BigUint,
    pub(crate) q: BigUint,
    pub(crate) g: BigUint,
    pub(crate) k: BigUint,
    pub(crate) verifiable_g: bool,
}

/// Handle on the common reference string `(p, q, g, k)`: primes `p = kq+1`
/// and a generator `g` of the order-`q` subgroup. Parameters are immutable
/// after construction, so the handle is a cheap shared clone.
#[derive(Clone, Debug)]
pub struct Group(Arc<GroupParams>);

impl PartialEq for Group {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.p == other.0.p && self.0.q == other.0.q && self.0.g == other.0.g)
    }
}

impl Eq for Group {}

impl Group {
    /// Build a group from explicit parameters, validating their structure.
    /// Primality is only checked by `check_group`, which is the expensive
    /// half of validation.
    pub fn from_parts(
        p: BigUint,
        q: BigUint,
        g: BigUint,
        k: BigUint,
        verifiable_g: bool,
    ) -> Result<Group, GroupError> {
        if p <= BigUint::from(3u32) || q <= BigUint::one() {
            return Err(GroupError::BadParameter("p and q must be primes > 1"));
        }
        if k <= BigUint::one() {
            return Err(GroupError::BadParameter("cofactor k must be > 1"));
        }
        if &k * &q + BigUint::one() != p {
            return Err(GroupError::BadParameter("p != kq + 1"));
        }
        if g <= BigUint::one() || g >= p {
            return Err(GroupError::BadParameter("generator out of range"));
        }
        if modpow(&g, &q, &p) != BigUint::one() {
            return Err(GroupError::BadParameter("generator has wrong order"));
        }
        Ok(Group(Arc::new(GroupParams {
            p,
            q,
            g,
            k,
            verifiable_g,
        })))
    }

    /// Generate fresh parameters with `|p| = p_bits`, `|q| = q_bits` and a
    /// random generator. With `p_bits == q_bits + 1` the result is a safe
    /// prime group (`k = 2`).
    pub fn generate<R: RngCore>(p_bits: u64, q_bits: u64, rng: &mut R) -> Group {
        let (p, q, k) = gen_params(p_bits, q_bits, rng);
        let one = BigUint::one();
        let g = loop {
            let h = rand_range(&BigUint::from(2u32), &p, rng);
            let g = modpow(&h, &k, &p);
            if g > one {
                break g;
            }
        };
        Group(Arc::new(GroupParams {
            p,
            q,
            g,
            k,
            verifiable_g: false,
        }))
    }

    /// Generate fresh parameters with a generator derived by hashing the
    /// canonical encoding of `(p, q, k)`, so that nobody, including the
    /// party that ran the generation, knows a discrete-log relation between
    /// `g` and any other element derived the same way.
    pub fn generate_verifiable<R: RngCore>(p_bits: u64, q_bits: u64, rng: &mut R) -> Group {
        let (p, q, k) = gen_params(p_bits, q_bits, rng);
        let g = derive_generator(&p, &q, &k);
        Group(Arc::new(GroupParams {
            p,
            q,
            g,
            k,
            verifiable_g: true,
        }))
    }

    /// Parse a `crs|<p>|<q>|<g>|<k>|` record (all fields in `CRS_RADIX`).
    pub fn from_crs(record: &str) -> Result<Group, GroupError> {
        let mut fields = record.split('|');
        if fields.next() != Some("crs") {
            return Err(GroupError::InvalidCrs("missing crs header"));
        }
        let mut next_int = || -> Result<BigUint, GroupError> {
            let field = fields
                .next()
                .ok_or(GroupError::InvalidCrs("missing field"))?;
            if field.is_empty() {
                return Err(GroupError::InvalidCrs("empty field"));
            }
            if !field
                .bytes()
                .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase())
            {
                return Err(GroupError::InvalidCrs("non-digit character"));
            }
            BigUint::parse_bytes(field.as_bytes(), CRS_RADIX)
                .ok_or(GroupError::InvalidCrs("invalid digits"))
        };
        let p = next_int()?;
        let q = next_int()?;
        let g = next_int()?;
        let k = next_int()?;
        if fields.next() != Some("") || fields.next().is_some() {
            return Err(GroupError::InvalidCrs("trailing data"));
        }
        Group::from_parts(p, q, g, k, false)
    }

    /// Encode the parameters as a `crs|...|` record.
    pub fn to_crs(&self) -> String {
        format!(
            "crs|{}|{}|{}|{}|",
            self.0.p.to_str_radix(CRS_RADIX),
            self.0.q.to_str_radix(CRS_RADIX),
            self.0.g.to_str_radix(CRS_RADIX),
            self.0.k.to_str_radix(CRS_RADIX),
        )
    }

    /// Full parameter validation: primality of `p` and `q`, `q | p-1`,
    /// generator order, and re-derivation of a verifiable generator.
    pub fn check_group<R: RngCore>(&self, iterations: usize, rng: &mut R) -> Result<(), GroupError> {
        let one = BigUint::one();
        if !is_probab_prime(&self.0.p, iterations, rng) {
            return Err(GroupError::BadParameter("p is not prime"));
        }
        if !is_probab_prime(&self.0.q, iterations, rng) {
            return Err(GroupError::BadParameter("q is not prime"));
        }
        if (&self.0.p - &one) % &self.0.q != BigUint::from(0u32) {
            return Err(GroupError::BadParameter("q does not divide p-1"));
        }
        if &self.0.k * &self.0.q + &one != self.0.p {
            return Err(GroupError::BadParameter("p != kq + 1"));
        }
        if self.0.g <= one || modpow(&self.0.g, &self.0.q, &self.0.p) != one {
            return Err(GroupError::BadParameter("generator has wrong order"));
        }
        if self.0.verifiable_g && derive_generator(&self.0.p, &self.0.q, &self.0.k) != self.0.g {
            return Err(GroupError::BadParameter("verifiable generator mismatch"));
        }
        Ok(())
    }

    pub fn generator(&self) -> GroupElement {
        GroupElement::new_unchecked(self.clone(), self.0.g.clone())
    }

    /// `g^r` for uniform `r` in `Z_q`.
    pub fn random_element<R: RngCore>(&self, rng: &mut R) -> GroupElement {
        let r = Scalar::random(self, rng);
        self.generator().pow(&r)
    }

    /// Deterministic, collision-free injection of an index into the group,
    /// used for canonical public reference points.
    pub fn index_element(&self, index: u64) -> GroupElement {
        self.element_from_hash(INDEX_DOMAIN, &index.to_be_bytes())
    }

    /// Hash arbitrary bytes onto a subgroup element by reducing into `Z_p`
    /// and raising to the cofactor, retrying with a counter on the two
    /// degenerate values.
    pub fn element_from_hash(&self, domain: &[u8], data: &[u8]) -> GroupElement {
        let one = BigUint::one();
        for counter in 0u32.. {
            let mut hash = Blake2b::new(64);
            hash.input(domain);
            hash.input(&(data.len() as u64).to_be_bytes());
            hash.input(data);
            hash.input(&counter.to_be_bytes());
            let mut digest = [0u8; 64];
            hash.result(&mut digest);
            let v = BigUint::from_bytes_be(&digest) % &self.0.p;
            let candidate = modpow(&v, &self.0.k, &self.0.p);
            if candidate > one {
                return GroupElement::new_unchecked(self.clone(), candidate);
            }
        }
        unreachable!("hash-to-group retries exhausted")
    }

    pub fn is_member(&self, value: &BigUint) -> bool {
        value > &BigUint::one()
            && value < &self.0.p
            && modpow(value, &self.0.q, &self.0.p) == BigUint::one()
    }

    pub fn p(&self) -> &BigUint {
        &self.0.p
    }

    pub fn q(&self) -> &BigUint {
        &self.0.q
    }

    pub fn cofactor(&self) -> &BigUint {
        &self.0.k
    }

    pub fn has_verifiable_generator(&self) -> bool {
        self.0.verifiable_g
    }

    /// Width of the fixed-size element encoding.
    pub fn p_bytes(&self) -> usize {
        ((self.0.p.bits() + 7) / 8) as usize
    }

    /// Width of the fixed-size scalar encoding.
    pub fn q_bytes(&self) -> usize {
        ((self.0.q.bits() + 7) / 8) as usize
    }
}

fn gen_params<R: RngCore>(p_bits: u64, q_bits: u64, rng: &mut R) -> (BigUint, BigUint, BigUint) {
    assert!(q_bits >= 3 && p_bits > q_bits);
    let one = BigUint::one();
    if p_bits == q_bits + 1 {
        let (p, q) = gen_safe_prime(p_bits, rng);
        return (p, q, BigUint::from(2u32));
    }
    let k_bits = p_bits - q_bits;
    loop {
        let q = gen_prime(q_bits, rng);
        for _ in 0..4 * p_bits {
            let mut k = rand_range(
                &(BigUint::one() << (k_bits - 1)),
                &(BigUint::one() << k_bits),
                rng,
            );
            k.set_bit(0, false);
            if k <= one {
                continue;
            }
            let p = &k * &q + &one;
            if p.bits() == p_bits && is_probab_prime(&p, 64, rng) {
                return (p, q, k);
            }
        }
    }
}

fn derive_generator(p: &BigUint, q: &BigUint, k: &BigUint) -> BigUint {
    let one = BigUint::one();
    for counter in 0u32.. {
        let mut hash = Blake2b::new(64);
        hash.input(GENERATOR_DOMAIN);
        hash.input(p.to_str_radix(CRS_RADIX).as_bytes());
        hash.input(b"|");
        hash.input(q.to_str_radix(CRS_RADIX).as_bytes());
        hash.input(b"|");
        hash.input(k.to_str_radix(CRS_RADIX).as_bytes());
        hash.input(&counter.to_be_bytes());
        let mut digest = [0u8; 64];
        hash.result(&mut digest);
        let v = BigUint::from_bytes_be(&digest) % p;
        let g = modpow(&v, k, p);
        if g > one {
            return g;
        }
    }
    unreachable!("generator derivation retries exhausted")
}
