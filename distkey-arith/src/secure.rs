use crate::modular::{modinv, modpow};
use crate::random::rand_range;
use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand_core::RngCore;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Container for a secret integer. The value is wiped on drop and compared
/// in constant time; callers keep secrets inside for their whole lifetime
/// and only `expose` them to feed an arithmetic operation.
#[derive(Clone, Debug)]
pub struct SecretInt(BigUint);

impl SecretInt {
    pub fn new(value: BigUint) -> Self {
        SecretInt(value)
    }

    pub fn expose(&self) -> &BigUint {
        &self.0
    }

    pub fn into_inner(mut self) -> BigUint {
        std::mem::replace(&mut self.0, BigUint::zero())
    }

    /// Constant-time equality over encodings padded to the same width.
    pub fn ct_eq(&self, other: &Self) -> bool {
        let a = self.0.to_bytes_be();
        let b = other.0.to_bytes_be();
        let width = a.len().max(b.len());
        let mut pa = vec![0u8; width];
        let mut pb = vec![0u8; width];
        pa[width - a.len()..].copy_from_slice(&a);
        pb[width - b.len()..].copy_from_slice(&b);
        let eq = pa.ct_eq(&pb).into();
        pa.zeroize();
        pb.zeroize();
        eq
    }
}

impl From<BigUint> for SecretInt {
    fn from(value: BigUint) -> Self {
        SecretInt(value)
    }
}

impl Drop for SecretInt {
    fn drop(&mut self) {
        // BigUint offers no in-place wipe of its limbs; overwriting with
        // zero releases the old allocation as best effort.
        self.0 = BigUint::zero();
    }
}

/// Side-channel-hardened `base^exponent mod p` for prime `p`.
///
/// The base is blinded with a fresh random `r` each call:
/// `a^e = (a·r)^e · (r^-1)^e (mod p)`, so the values flowing through the
/// underlying exponentiation differ between calls with identical inputs.
pub fn spowm<R: RngCore + ?Sized>(
    base: &BigUint,
    exponent: &BigUint,
    p: &BigUint,
    rng: &mut R,
) -> BigUint {
    assert!(p > &BigUint::one());
    let r = rand_range(&BigUint::from(2u32), p, rng);
    let blinded = (base % p * &r) % p;
    let masked = modpow(&blinded, exponent, p);
    // r is invertible: p is prime and 2 <= r < p
    let r_inv = match modinv(&r, p) {
        Ok(inv) => inv,
        Err(_) => return modpow(base, exponent, p),
    };
    let unmask = modpow(&r_inv, exponent, p);
    (masked * unmask) % p
}

/// Precomputed table for repeated exponentiations with a fixed base.
///
/// `new` stores `base^(2^i) mod p` for every bit position up to
/// `max_exponent_bits`; `powm` then needs one modular multiplication per
/// set exponent bit.
pub struct FixedBasePowm {
    p: BigUint,
    table: Vec<BigUint>,
}

impl FixedBasePowm {
    pub fn new(base: &BigUint, p: &BigUint, max_exponent_bits: u64) -> Self {
        assert!(p > &BigUint::one());
        let mut table = Vec::with_capacity(max_exponent_bits as usize);
        let mut acc = base % p;
        for _ in 0..max_exponent_bits {
            table.push(acc.clone());
            acc = (&acc * &acc) % p;
        }
        FixedBasePowm { p: p.clone(), table }
    }

    pub fn powm(&self, exponent: &BigUint) -> BigUint {
        assert!(exponent.bits() <= self.table.len() as u64);
        let mut acc = BigUint::one();
        for (i, power) in self.table.iter().enumerate() {
            if exponent.bit(i as u64) {
                acc = (acc * power) % &self.p;
            }
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    #[test]
    fn spowm_matches_reference() {
        let mut rng = ChaCha20Rng::from_seed([7u8; 32]);
        let p = BigUint::from(7919u32);
        for (b, e) in [(2u32, 100u32), (17, 0), (7918, 7918), (3, 1)] {
            let b = BigUint::from(b);
            let e = BigUint::from(e);
            assert_eq!(spowm(&b, &e, &p, &mut rng), modpow(&b, &e, &p));
        }
    }

    #[test]
    fn fixed_base_matches_reference() {
        let p = BigUint::from(7919u32);
        let g = BigUint::from(7u32);
        let fp = FixedBasePowm::new(&g, &p, 16);
        for e in [0u32, 1, 2, 255, 65535] {
            let e = BigUint::from(e);
            assert_eq!(fp.powm(&e), modpow(&g, &e, &p));
        }
    }

    #[test]
    fn secret_ct_eq() {
        let a = SecretInt::new(BigUint::from(123456u32));
        let b = SecretInt::new(BigUint::from(123456u32));
        let c = SecretInt::new(BigUint::from(654321u32));
        assert!(a.ct_eq(&b));
        assert!(!a.ct_eq(&c));
    }
}
