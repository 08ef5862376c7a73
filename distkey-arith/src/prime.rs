use crate::modular::modpow;
use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand_core::RngCore;

/// Default Miller-Rabin iteration count. 64 rounds push the error
/// probability below 2^-128.
pub const DEFAULT_MR_ITERATIONS: usize = 64;

// Trial division front end for candidate filtering.
const SMALL_PRIMES: [u32; 54] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89,
    97, 101, 103, 107, 109, 113, 127, 131, 137, 139, 149, 151, 157, 163, 167, 173, 179, 181, 191,
    193, 197, 199, 211, 223, 227, 229, 233, 239, 241, 251,
];

fn passes_trial_division(n: &BigUint) -> bool {
    for &sp in SMALL_PRIMES.iter() {
        let sp_big = BigUint::from(sp);
        if n == &sp_big {
            return true;
        }
        if (n % sp) == BigUint::zero() {
            return false;
        }
    }
    true
}

/// Miller-Rabin probable prime test with `iterations` random witnesses.
pub fn is_probab_prime<R: RngCore>(n: &BigUint, iterations: usize, rng: &mut R) -> bool {
    let one = BigUint::one();
    let two = BigUint::from(2u32);
    if n < &two {
        return false;
    }
    if !passes_trial_division(n) {
        return false;
    }
    if n < &BigUint::from(66049u32) {
        // below 257^2, surviving the sieve is a full primality proof
        return true;
    }

    // n - 1 = d * 2^s with d odd
    let n_minus_1 = n - &one;
    let mut d = n_minus_1.clone();
    let mut s = 0u64;
    while (&d % 2u32).is_zero() {
        d >>= 1u32;
        s += 1;
    }

    'witness: for _ in 0..iterations {
        let a = rng.gen_biguint_range(&two, &n_minus_1);
        let mut x = modpow(&a, &d, n);
        if x.is_one() || x == n_minus_1 {
            continue 'witness;
        }
        for _ in 0..s - 1 {
            x = (&x * &x) % n;
            if x == n_minus_1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Random probable prime of exactly `bits` bits.
pub fn gen_prime<R: RngCore>(bits: u64, rng: &mut R) -> BigUint {
    assert!(bits >= 2);
    loop {
        let mut candidate = rng.gen_biguint(bits);
        candidate.set_bit(bits - 1, true);
        candidate.set_bit(0, true);
        if is_probab_prime(&candidate, DEFAULT_MR_ITERATIONS, rng) {
            return candidate;
        }
    }
}

/// Safe prime `p = 2q + 1` of `bits` bits, together with its Sophie Germain
/// prime `q`. The sieve rejects candidates where either `q` or `p` has a
/// small factor before any Miller-Rabin work is spent.
pub fn gen_safe_prime<R: RngCore>(bits: u64, rng: &mut R) -> (BigUint, BigUint) {
    assert!(bits >= 3);
    let one = BigUint::one();
    loop {
        let mut q = rng.gen_biguint(bits - 1);
        q.set_bit(bits - 2, true);
        q.set_bit(0, true);
        let p = (&q << 1u32) + &one;
        if !passes_trial_division(&q) || !passes_trial_division(&p) {
            continue;
        }
        if is_probab_prime(&q, DEFAULT_MR_ITERATIONS, rng)
            && is_probab_prime(&p, DEFAULT_MR_ITERATIONS, rng)
        {
            return (p, q);
        }
    }
}

/// Sophie Germain prime `q` of `bits` bits, i.e. a prime with `2q + 1` prime
/// as well. Returns `(q, 2q + 1)`.
pub fn gen_sophie_germain_prime<R: RngCore>(bits: u64, rng: &mut R) -> (BigUint, BigUint) {
    let (p, q) = gen_safe_prime(bits + 1, rng);
    (q, p)
}
