use num_bigint::{BigUint, RandBigInt};
use rand::rngs::{OsRng, SmallRng, StdRng};
use rand::SeedableRng;
use rand_core::RngCore;

/// Quality tier of a randomness source.
///
/// `Weak` is a fast non-cryptographic PRNG for blinding and test data,
/// `Strong` is a CSPRNG seeded once from the operating system, and
/// `VeryStrong` reads the operating system entropy pool on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RandomTier {
    Weak,
    Strong,
    VeryStrong,
}

/// Construct a generator for the requested tier.
pub fn rng_for(tier: RandomTier) -> Box<dyn RngCore> {
    match tier {
        RandomTier::Weak => Box::new(SmallRng::from_entropy()),
        RandomTier::Strong => Box::new(StdRng::from_entropy()),
        RandomTier::VeryStrong => Box::new(OsRng),
    }
}

/// Uniform value in `[0, m)`. Sampling rejects overshooting candidates
/// instead of reducing them, so no residue is favored.
pub fn rand_below<R: RngCore + ?Sized>(m: &BigUint, rng: &mut R) -> BigUint {
    assert!(!num_traits::Zero::is_zero(m));
    rng.gen_biguint_below(m)
}

/// Uniform value in `[low, high)`.
pub fn rand_range<R: RngCore + ?Sized>(low: &BigUint, high: &BigUint, rng: &mut R) -> BigUint {
    assert!(low < high);
    rng.gen_biguint_range(low, high)
}

/// Pool of precomputed uniform residues modulo `m`.
///
/// Refilling draws `capacity` values at once so that callers sampling in a
/// tight protocol round pay the rejection loop in batches.
pub struct ResiduePool {
    modulus: BigUint,
    capacity: usize,
    pool: Vec<BigUint>,
}

impl ResiduePool {
    pub fn new<R: RngCore + ?Sized>(modulus: BigUint, capacity: usize, rng: &mut R) -> Self {
        assert!(capacity > 0);
        let mut pool = Self {
            modulus,
            capacity,
            pool: Vec::with_capacity(capacity),
        };
        pool.refill(rng);
        pool
    }

    fn refill<R: RngCore + ?Sized>(&mut self, rng: &mut R) {
        while self.pool.len() < self.capacity {
            self.pool.push(rand_below(&self.modulus, rng));
        }
    }

    /// Take one residue, refilling the pool first when it ran dry.
    pub fn take<R: RngCore + ?Sized>(&mut self, rng: &mut R) -> BigUint {
        if self.pool.is_empty() {
            self.refill(rng);
        }
        self.pool.pop().unwrap_or_else(|| rand_below(&self.modulus, rng))
    }

    pub fn remaining(&self) -> usize {
        self.pool.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    #[test]
    fn rand_below_in_range() {
        let mut rng = ChaCha20Rng::from_seed([5u8; 32]);
        let m = BigUint::from(1000u32);
        for _ in 0..200 {
            assert!(rand_below(&m, &mut rng) < m);
        }
    }

    #[test]
    fn pool_refills() {
        let mut rng = ChaCha20Rng::from_seed([6u8; 32]);
        let m = BigUint::from(97u32);
        let mut pool = ResiduePool::new(m.clone(), 8, &mut rng);
        assert_eq!(pool.remaining(), 8);
        for _ in 0..20 {
            assert!(pool.take(&mut rng) < m);
        }
        assert!(pool.remaining() > 0);
    }

    #[test]
    fn tiers_produce_output() {
        for tier in [RandomTier::Weak, RandomTier::Strong, RandomTier::VeryStrong] {
            let mut rng = rng_for(tier);
            let v = rand_below(&BigUint::from(1u32 << 30), rng.as_mut());
            assert!(v < BigUint::from(1u32 << 30));
        }
    }
}
