use crate::ArithError;
use num_bigint::{BigInt, BigUint, Sign};
use num_integer::Integer;
use num_traits::{One, Zero};

/// `base^exponent mod modulus`. The modulus must be greater than one.
pub fn modpow(base: &BigUint, exponent: &BigUint, modulus: &BigUint) -> BigUint {
    assert!(modulus > &BigUint::one());
    base.modpow(exponent, modulus)
}

/// Modular inverse by extended gcd. Fails when `a` and `m` are not coprime.
pub fn modinv(a: &BigUint, m: &BigUint) -> Result<BigUint, ArithError> {
    if m <= &BigUint::one() {
        return Err(ArithError::BadModulus);
    }
    let a = BigInt::from_biguint(Sign::Plus, a.clone());
    let m_int = BigInt::from_biguint(Sign::Plus, m.clone());
    let ext = a.extended_gcd(&m_int);
    if !ext.gcd.is_one() {
        return Err(ArithError::NoInverse);
    }
    // mod_floor keeps the representative in [0, m); a plain `%` could hand
    // back a negative value from the extended gcd.
    let inv = ext.x.mod_floor(&m_int);
    Ok(inv.to_biguint().unwrap_or_else(BigUint::zero))
}

/// `(a - b) mod m`, normalized into `[0, m)` regardless of operand order.
pub fn sub_mod(a: &BigUint, b: &BigUint, m: &BigUint) -> BigUint {
    assert!(m > &BigUint::one());
    let a = a % m;
    let b = b % m;
    if a >= b {
        a - b
    } else {
        m - b + a
    }
}

pub fn gcd(a: &BigUint, b: &BigUint) -> BigUint {
    a.gcd(b)
}

/// `a * 2^k`.
pub fn mul2exp(a: &BigUint, k: u64) -> BigUint {
    a << k
}

/// `a / 2^k`, truncating.
pub fn div2exp(a: &BigUint, k: u64) -> BigUint {
    a >> k
}

/// Jacobi symbol `(a/n)` for odd `n > 0`. Returns -1, 0, or 1.
pub fn jacobi(a: &BigUint, n: &BigUint) -> i32 {
    assert!(n.is_odd() && !n.is_zero());
    let mut a = a % n;
    let mut n = n.clone();
    let mut result = 1i32;
    while !a.is_zero() {
        while a.is_even() {
            a >>= 1u32;
            let r = (&n % 8u32).to_u32_digits();
            let r = r.first().copied().unwrap_or(0);
            if r == 3 || r == 5 {
                result = -result;
            }
        }
        std::mem::swap(&mut a, &mut n);
        if (&a % 4u32) == BigUint::from(3u32) && (&n % 4u32) == BigUint::from(3u32) {
            result = -result;
        }
        a %= &n;
    }
    if n.is_one() {
        result
    } else {
        0
    }
}

/// Square root modulo an odd prime `p` (Tonelli-Shanks, with the direct
/// exponentiation shortcut for `p ≡ 3 (mod 4)`).
pub fn sqrt_mod_p(a: &BigUint, p: &BigUint) -> Result<BigUint, ArithError> {
    if p <= &BigUint::one() {
        return Err(ArithError::BadModulus);
    }
    let a = a % p;
    if a.is_zero() {
        return Ok(BigUint::zero());
    }
    if jacobi(&a, p) != 1 {
        return Err(ArithError::NoSquareRoot);
    }
    if (p % 4u32) == BigUint::from(3u32) {
        let e = (p + BigUint::one()) >> 2u32;
        return Ok(modpow(&a, &e, p));
    }

    // Tonelli-Shanks: write p-1 = s * 2^r with s odd.
    let one = BigUint::one();
    let mut s = p - &one;
    let mut r = 0u64;
    while s.is_even() {
        s >>= 1u32;
        r += 1;
    }
    // A fixed sweep finds a non-residue quickly; half of all candidates are.
    let mut z = BigUint::from(2u32);
    while jacobi(&z, p) != -1 {
        z += &one;
    }
    let mut c = modpow(&z, &s, p);
    let mut x = modpow(&a, &((&s + &one) >> 1u32), p);
    let mut t = modpow(&a, &s, p);
    let mut m = r;
    while !t.is_one() {
        let mut i = 0u64;
        let mut t2 = t.clone();
        while !t2.is_one() {
            t2 = (&t2 * &t2) % p;
            i += 1;
            if i == m {
                return Err(ArithError::NoSquareRoot);
            }
        }
        let b = modpow(&c, &mul2exp(&one, m - i - 1), p);
        x = (&x * &b) % p;
        c = (&b * &b) % p;
        t = (&t * &c) % p;
        m = i;
    }
    Ok(x)
}

/// Square root modulo `n = p * q` by CRT combination of the two prime roots.
pub fn sqrt_mod_pq(a: &BigUint, p: &BigUint, q: &BigUint) -> Result<BigUint, ArithError> {
    let n = p * q;
    let rp = sqrt_mod_p(&(a % p), p)?;
    let rq = sqrt_mod_p(&(a % q), q)?;
    let q_inv = modinv(q, p)?;
    // x = rq + q * ((rp - rq) * q^-1 mod p)
    let diff = sub_mod(&rp, &(&rq % p), p);
    let x = (&rq + q * ((diff * q_inv) % p)) % &n;
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::quickcheck;

    #[test]
    fn modinv_inverts() {
        let m = BigUint::from(101u32);
        for a in 1u32..101 {
            let a = BigUint::from(a);
            let inv = modinv(&a, &m).unwrap();
            assert_eq!((a * inv) % &m, BigUint::one());
        }
    }

    #[test]
    fn modinv_rejects_non_coprime() {
        let a = BigUint::from(6u32);
        let m = BigUint::from(15u32);
        assert_eq!(modinv(&a, &m), Err(ArithError::NoInverse));
    }

    #[test]
    fn sub_mod_never_negative() {
        let m = BigUint::from(11u32);
        let a = BigUint::from(3u32);
        let b = BigUint::from(8u32);
        assert_eq!(sub_mod(&a, &b, &m), BigUint::from(6u32));
        assert_eq!(sub_mod(&b, &a, &m), BigUint::from(5u32));
        assert_eq!(sub_mod(&a, &a, &m), BigUint::zero());
    }

    #[test]
    fn jacobi_on_small_prime() {
        // residues of 11: 1, 3, 4, 5, 9
        let p = BigUint::from(11u32);
        let residues = [1u32, 3, 4, 5, 9];
        for a in 1u32..11 {
            let expected = if residues.contains(&a) { 1 } else { -1 };
            assert_eq!(jacobi(&BigUint::from(a), &p), expected);
        }
    }

    #[test]
    fn sqrt_mod_p_both_branches() {
        // 23 ≡ 3 (mod 4), 29 ≡ 1 (mod 4)
        for p in [23u32, 29] {
            let p = BigUint::from(p);
            for a in 2u32..20 {
                let sq = (BigUint::from(a) * BigUint::from(a)) % &p;
                let root = sqrt_mod_p(&sq, &p).unwrap();
                assert_eq!((&root * &root) % &p, sq);
            }
        }
    }

    #[test]
    fn sqrt_mod_pq_combines() {
        let p = BigUint::from(23u32);
        let q = BigUint::from(29u32);
        let n = &p * &q;
        let x = BigUint::from(100u32);
        let sq = (&x * &x) % &n;
        let root = sqrt_mod_pq(&sq, &p, &q).unwrap();
        assert_eq!((&root * &root) % &n, sq);
    }

    quickcheck! {
        fn modpow_matches_naive(base: u64, exp: u8, modulus: u16) -> bool {
            if modulus < 2 {
                return true;
            }
            let m = BigUint::from(modulus);
            let b = BigUint::from(base);
            let mut expected = BigUint::one();
            for _ in 0..exp {
                expected = (expected * &b) % &m;
            }
            modpow(&b, &BigUint::from(exp), &m) == expected
        }
    }
}
