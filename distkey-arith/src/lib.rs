//! Arbitrary-precision modular arithmetic for the distributed key
//! generation protocols: modular exponentiation and inversion, probable
//! prime testing, safe-prime generation, tiered randomness and zeroizing
//! containers for secret values.

mod modular;
mod prime;
mod random;
mod secure;

pub use modular::{
    div2exp, gcd, jacobi, modinv, modpow, mul2exp, sqrt_mod_p, sqrt_mod_pq, sub_mod,
};
pub use prime::{
    gen_prime, gen_safe_prime, gen_sophie_germain_prime, is_probab_prime, DEFAULT_MR_ITERATIONS,
};
pub use random::{rand_below, rand_range, rng_for, RandomTier, ResiduePool};
pub use secure::{spowm, FixedBasePowm, SecretInt};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArithError {
    /// The modulus of a modular operation was zero or one.
    #[error("modulus must be greater than one")]
    BadModulus,
    /// The element has no inverse for the given modulus.
    #[error("no modular inverse exists")]
    NoInverse,
    /// The element is not a quadratic residue for the given modulus.
    #[error("no square root exists")]
    NoSquareRoot,
}
