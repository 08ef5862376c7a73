//! Polynomial sampling and Lagrange interpolation over `Z_q`.

use distkey_group::{Group, Scalar};
use rand_core::RngCore;

/// Polynomial of degree `t` over `Z_q`, `f(z) = a_0 + a_1 z + ... + a_t z^t`.
#[derive(Clone)]
pub struct Polynomial {
    coefficients: Vec<Scalar>,
}

impl Polynomial {
    pub fn from_coefficients(coefficients: Vec<Scalar>) -> Self {
        assert!(!coefficients.is_empty());
        Polynomial { coefficients }
    }

    /// Uniformly random polynomial of degree `t`.
    pub fn random<R: RngCore>(group: &Group, t: usize, rng: &mut R) -> Self {
        let coefficients = (0..=t).map(|_| Scalar::random(group, rng)).collect();
        Polynomial { coefficients }
    }

    /// Random polynomial with `f(0) = 0`, used by the proactive refresh.
    pub fn random_with_zero_constant<R: RngCore>(group: &Group, t: usize, rng: &mut R) -> Self {
        let mut coefficients = vec![Scalar::zero(group)];
        coefficients.extend((0..t).map(|_| Scalar::random(group, rng)));
        Polynomial { coefficients }
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len() - 1
    }

    pub fn coefficients(&self) -> impl Iterator<Item = &Scalar> {
        self.coefficients.iter()
    }

    pub fn at_zero(&self) -> Scalar {
        self.coefficients[0].clone()
    }

    /// Horner evaluation.
    pub fn evaluate(&self, x: &Scalar) -> Scalar {
        let mut acc = self.coefficients[self.coefficients.len() - 1].clone();
        for coeff in self.coefficients.iter().rev().skip(1) {
            acc = acc * x + coeff;
        }
        acc
    }
}

/// Lagrange coefficient `λ_i` for interpolating at zero over the abscissa
/// set `xs`: `λ_i = Π_{l != i} x_l / (x_l - x_i)`.
///
/// Returns `None` when `x_i` does not appear in `xs` or the abscissas
/// collide modulo `q`.
pub fn lagrange_coefficient(group: &Group, xs: &[u64], x_i: u64) -> Option<Scalar> {
    if !xs.contains(&x_i) {
        return None;
    }
    let xi = Scalar::from_u64(group, x_i);
    let mut num = Scalar::one(group);
    let mut den = Scalar::one(group);
    for &l in xs {
        if l == x_i {
            continue;
        }
        let xl = Scalar::from_u64(group, l);
        num = num * &xl;
        den = den * (&xl - &xi);
    }
    den.inverse().map(|inv| num * inv)
}

/// Interpolate the secret at zero from `(abscissa, share)` points. The
/// number of points must exceed the polynomial degree.
pub fn interpolate_at_zero(group: &Group, points: &[(u64, Scalar)]) -> Option<Scalar> {
    let xs: Vec<u64> = points.iter().map(|(x, _)| *x).collect();
    let mut acc = Scalar::zero(group);
    for (x, share) in points {
        let lambda = lagrange_coefficient(group, &xs, *x)?;
        acc = acc + lambda * share;
    }
    Some(acc)
}

/// Same interpolation carried out in the exponent:
/// `Π v_i^{λ_i} = g^{f(0)}` for `v_i = g^{f(x_i)}`.
pub fn interpolate_at_zero_exponent(
    group: &Group,
    points: &[(u64, distkey_group::GroupElement)],
) -> Option<distkey_group::GroupElement> {
    let xs: Vec<u64> = points.iter().map(|(x, _)| *x).collect();
    let mut acc = distkey_group::GroupElement::identity(group);
    for (x, v) in points {
        let lambda = lagrange_coefficient(group, &xs, *x)?;
        acc = acc * v.pow(&lambda);
    }
    Some(acc)
}
