use crate::params::Group;
use distkey_arith::{modpow, rand_below, sub_mod};
use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand_core::RngCore;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Mul, Sub};
use subtle::ConstantTimeEq;

/// Integer modulo the subgroup order `q`.
#[derive(Clone, Debug)]
pub struct Scalar {
    group: Group,
    value: BigUint,
}

/// Element of the prime-order subgroup of `(Z/pZ)*`.
#[derive(Clone, Debug)]
pub struct GroupElement {
    group: Group,
    value: BigUint,
}

impl PartialEq for Scalar {
    /// Constant-time comparison: scalars routinely hold secret shares.
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes().ct_eq(&other.to_bytes()).into()
    }
}

impl Eq for Scalar {}

#[allow(clippy::derive_hash_xor_eq)]
impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write(&self.to_bytes())
    }
}

impl PartialEq for GroupElement {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for GroupElement {}

#[allow(clippy::derive_hash_xor_eq)]
impl Hash for GroupElement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write(&self.to_bytes())
    }
}

impl Scalar {
    /// additive identity
    pub fn zero(group: &Group) -> Self {
        Scalar {
            group: group.clone(),
            value: BigUint::zero(),
        }
    }

    /// multiplicative identity
    pub fn one(group: &Group) -> Self {
        Scalar {
            group: group.clone(),
            value: BigUint::one(),
        }
    }

    pub fn from_u64(group: &Group, v: u64) -> Self {
        Scalar {
            group: group.clone(),
            value: BigUint::from(v) % group.q(),
        }
    }

    pub fn from_biguint(group: &Group, v: BigUint) -> Self {
        Scalar {
            group: group.clone(),
            value: v % group.q(),
        }
    }

    pub fn random<R: RngCore + ?Sized>(group: &Group, rng: &mut R) -> Self {
        Scalar {
            group: group.clone(),
            value: rand_below(group.q(), rng),
        }
    }

    /// Reduce a wide hash digest into `Z_q`.
    pub fn from_hash(group: &Group, digest: &[u8]) -> Self {
        Scalar {
            group: group.clone(),
            value: BigUint::from_bytes_be(digest) % group.q(),
        }
    }

    pub fn group(&self) -> &Group {
        &self.group
    }

    pub fn value(&self) -> &BigUint {
        &self.value
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn negate(&self) -> Self {
        Scalar {
            group: self.group.clone(),
            value: sub_mod(&BigUint::zero(), &self.value, self.group.q()),
        }
    }

    /// multiplicative inverse; `None` for zero
    pub fn inverse(&self) -> Option<Scalar> {
        distkey_arith::modinv(&self.value, self.group.q())
            .ok()
            .map(|value| Scalar {
                group: self.group.clone(),
                value,
            })
    }

    pub fn increment(&mut self) {
        self.value = (&self.value + BigUint::one()) % self.group.q();
    }

    /// Fixed-width big-endian encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        let width = self.group.q_bytes();
        let raw = self.value.to_bytes_be();
        let mut out = vec![0u8; width];
        out[width - raw.len()..].copy_from_slice(&raw);
        out
    }

    /// Strict decoding: the width must match and the value must be a
    /// canonical residue below `q`.
    pub fn from_bytes(group: &Group, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != group.q_bytes() {
            return None;
        }
        let value = BigUint::from_bytes_be(bytes);
        if &value >= group.q() {
            return None;
        }
        Some(Scalar {
            group: group.clone(),
            value,
        })
    }

    /// Raises `x` to the power `n` using binary exponentiation.
    /// Not constant time.
    pub fn power(&self, n: usize) -> Self {
        let mut result = BigUint::one();
        let mut power = n;
        let mut aux = self.value.clone();
        while power > 0 {
            if power & 1 == 1 {
                result = (result * &aux) % self.group.q();
            }
            power >>= 1;
            aux = (&aux * &aux) % self.group.q();
        }
        Scalar {
            group: self.group.clone(),
            value: result,
        }
    }

    /// Iterator over `1, x, x^2, ...`.
    pub fn exp_iter(&self) -> ScalarExp {
        ScalarExp {
            x: self.clone(),
            next_exp_x: Scalar::one(&self.group),
        }
    }

    pub fn sum<I>(mut i: I) -> Option<Self>
    where
        I: Iterator<Item = Self>,
    {
        let mut sum = i.next()?;
        for v in i {
            sum = sum + v;
        }
        Some(sum)
    }
}

/// Provides an iterator over the powers of a `Scalar`.
///
/// This struct is created by the `exp_iter` method.
#[derive(Clone)]
pub struct ScalarExp {
    x: Scalar,
    next_exp_x: Scalar,
}

impl Iterator for ScalarExp {
    type Item = Scalar;

    fn next(&mut self) -> Option<Scalar> {
        let exp_x = self.next_exp_x.clone();
        self.next_exp_x = &self.next_exp_x * &self.x;
        Some(exp_x)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}

impl GroupElement {
    pub(crate) fn new_unchecked(group: Group, value: BigUint) -> Self {
        GroupElement { group, value }
    }

    pub fn generator(group: &Group) -> Self {
        group.generator()
    }

    /// Neutral element of the group operation.
    pub fn identity(group: &Group) -> Self {
        GroupElement {
            group: group.clone(),
            value: BigUint::one(),
        }
    }

    pub fn group(&self) -> &Group {
        &self.group
    }

    pub fn value(&self) -> &BigUint {
        &self.value
    }

    pub fn is_identity(&self) -> bool {
        self.value.is_one()
    }

    /// Membership-checked constructor.
    pub fn from_biguint(group: &Group, value: BigUint) -> Option<Self> {
        if value.is_one() {
            return Some(GroupElement::identity(group));
        }
        if !group.is_member(&value) {
            return None;
        }
        Some(GroupElement {
            group: group.clone(),
            value,
        })
    }

    /// `self^e mod p`.
    pub fn pow(&self, e: &Scalar) -> GroupElement {
        debug_assert!(self.group == *e.group());
        GroupElement {
            group: self.group.clone(),
            value: modpow(&self.value, e.value(), self.group.p()),
        }
    }

    /// `self^-1 mod p` via Fermat: `p` is prime, members are units.
    pub fn inverse(&self) -> GroupElement {
        let exp = self.group.p() - BigUint::from(2u32);
        GroupElement {
            group: self.group.clone(),
            value: modpow(&self.value, &exp, self.group.p()),
        }
    }

    /// Fixed-width big-endian encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        let width = self.group.p_bytes();
        let raw = self.value.to_bytes_be();
        let mut out = vec![0u8; width];
        out[width - raw.len()..].copy_from_slice(&raw);
        out
    }

    /// Strict decoding with subgroup membership check.
    pub fn from_bytes(group: &Group, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != group.p_bytes() {
            return None;
        }
        GroupElement::from_biguint(group, BigUint::from_bytes_be(bytes))
    }

    pub fn prod<'a, I>(group: &Group, i: I) -> Self
    where
        I: Iterator<Item = &'a Self>,
    {
        let mut prod = GroupElement::identity(group);
        for v in i {
            prod = prod * v;
        }
        prod
    }
}

//////////
// FE + FE
//////////

impl<'a, 'b> Add<&'b Scalar> for &'a Scalar {
    type Output = Scalar;

    fn add(self, other: &'b Scalar) -> Scalar {
        debug_assert!(self.group == other.group);
        Scalar {
            group: self.group.clone(),
            value: (&self.value + &other.value) % self.group.q(),
        }
    }
}

std_ops_gen!(Scalar, Add, Scalar, Scalar, add);

//////////
// FE - FE
//////////

impl<'a, 'b> Sub<&'b Scalar> for &'a Scalar {
    type Output = Scalar;

    fn sub(self, other: &'b Scalar) -> Scalar {
        debug_assert!(self.group == other.group);
        Scalar {
            group: self.group.clone(),
            value: sub_mod(&self.value, &other.value, self.group.q()),
        }
    }
}

std_ops_gen!(Scalar, Sub, Scalar, Scalar, sub);

//////////
// FE * FE
//////////

impl<'a, 'b> Mul<&'b Scalar> for &'a Scalar {
    type Output = Scalar;

    fn mul(self, other: &'b Scalar) -> Scalar {
        debug_assert!(self.group == other.group);
        Scalar {
            group: self.group.clone(),
            value: (&self.value * &other.value) % self.group.q(),
        }
    }
}

std_ops_gen!(Scalar, Mul, Scalar, Scalar, mul);

//////////
// GE * GE (the group operation)
//////////

impl<'a, 'b> Mul<&'b GroupElement> for &'a GroupElement {
    type Output = GroupElement;

    fn mul(self, other: &'b GroupElement) -> GroupElement {
        debug_assert!(self.group == other.group);
        GroupElement {
            group: self.group.clone(),
            value: (&self.value * &other.value) % self.group.p(),
        }
    }
}

std_ops_gen!(GroupElement, Mul, GroupElement, GroupElement, mul);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Group;
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
    fn scalar_field_ops() {
        let group = tiny_group();
        let a = Scalar::from_u64(&group, 7);
        let b = Scalar::from_u64(&group, 9);
        assert_eq!(&a + &b, Scalar::from_u64(&group, 5));
        assert_eq!(&a - &b, Scalar::from_u64(&group, 9));
        assert_eq!(&a * &b, Scalar::from_u64(&group, 8));
        assert_eq!(a.negate(), Scalar::from_u64(&group, 4));
        let inv = a.inverse().unwrap();
        assert_eq!(&a * &inv, Scalar::one(&group));
        assert!(Scalar::zero(&group).inverse().is_none());
    }

    #[test]
    fn scalar_power_and_exp_iter() {
        let group = tiny_group();
        let x = Scalar::from_u64(&group, 3);
        let powers: Vec<Scalar> = x.exp_iter().take(5).collect();
        for (k, p) in powers.iter().enumerate() {
            assert_eq!(*p, x.power(k));
        }
        assert_eq!(x.power(0), Scalar::one(&group));
    }

    #[test]
    fn element_ops() {
        let group = tiny_group();
        let g = group.generator();
        let a = g.pow(&Scalar::from_u64(&group, 5));
        let b = g.pow(&Scalar::from_u64(&group, 6));
        // 2^5 = 32 = 9 mod 23
        assert_eq!(a.value(), &BigUint::from(9u32));
        assert_eq!(&a * &b, g.pow(&Scalar::from_u64(&group, 0)));
        assert_eq!(&a * &a.inverse(), GroupElement::identity(&group));
    }

    #[test]
    fn element_encoding_round_trip() {
        let group = tiny_group();
        let mut rng = ChaCha20Rng::from_seed([11u8; 32]);
        let e = group.random_element(&mut rng);
        let bytes = e.to_bytes();
        assert_eq!(GroupElement::from_bytes(&group, &bytes), Some(e));
    }

    #[test]
    fn element_decoding_rejects_non_members() {
        let group = tiny_group();
        // 5 is not in the order-11 subgroup mod 23
        assert_eq!(GroupElement::from_bytes(&group, &[5u8]), None);
        assert_eq!(GroupElement::from_bytes(&group, &[0u8, 5u8]), None);
    }

    #[test]
    fn scalar_decoding_is_strict() {
        let group = tiny_group();
        assert!(Scalar::from_bytes(&group, &[10u8]).is_some());
        // 11 == q is not canonical
        assert!(Scalar::from_bytes(&group, &[11u8]).is_none());
        assert!(Scalar::from_bytes(&group, &[0u8, 1u8]).is_none());
    }
}
