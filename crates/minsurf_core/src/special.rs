//! Jacobi theta series and the Weierstrass elliptic functions built on them.
//!
//! Every series stops once the magnitude of its newest term drops below
//! [`SERIES_TOLERANCE`]; the same rule is used by all of them. Formulas follow
//! DLMF §20.2 (theta functions) and §23.6 (Weierstrass ℘ and ζ).

use crate::error::{instability, Result};
use num_complex::Complex64;
use std::f64::consts::PI;

/// Absolute magnitude below which a series term ends the summation.
pub const SERIES_TOLERANCE: f64 = 1e-14;

const MAX_SERIES_TERMS: i32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThetaKind {
    One,
    Two,
    Three,
    Four,
}

fn alternating(n: i32) -> f64 {
    if n % 2 == 0 {
        1.0
    } else {
        -1.0
    }
}

fn check_nome(q: Complex64) -> Result<()> {
    if !q.is_finite() || q.norm() >= 1.0 {
        return Err(instability(format!(
            "theta series needs a nome with |q| < 1, got {q}"
        )));
    }
    Ok(())
}

fn ensure_finite(value: Complex64, what: &str) -> Result<Complex64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(instability(format!("{what} evaluated to a non-finite value")))
    }
}

/// Sums `term(start) + term(start + 1) + ...` until a term falls below the
/// series tolerance.
fn sum_series(start: i32, what: &str, mut term: impl FnMut(i32) -> Complex64) -> Result<Complex64> {
    let mut sum = Complex64::new(0.0, 0.0);
    let mut n = start;
    loop {
        let value = term(n);
        if !value.is_finite() {
            return Err(instability(format!("{what} series produced a non-finite term at n = {n}")));
        }
        sum += value;
        if value.norm() <= SERIES_TOLERANCE {
            return Ok(sum);
        }
        n += 1;
        if n - start >= MAX_SERIES_TERMS {
            return Err(instability(format!(
                "{what} series did not converge within {MAX_SERIES_TERMS} terms"
            )));
        }
    }
}

/// Jacobi theta function `θ_kind(u | q)`.
pub fn elliptic_theta(kind: ThetaKind, u: Complex64, q: Complex64) -> Result<Complex64> {
    check_nome(q)?;
    let value = match kind {
        ThetaKind::One => {
            let series = sum_series(0, "theta1", |n| {
                alternating(n) * q.powi(n * (n + 1)) * (u * (2 * n + 1) as f64).sin()
            })?;
            2.0 * q.powf(0.25) * series
        }
        ThetaKind::Two => {
            let series = sum_series(0, "theta2", |n| {
                q.powi(n * (n + 1)) * (u * (2 * n + 1) as f64).cos()
            })?;
            2.0 * q.powf(0.25) * series
        }
        ThetaKind::Three => {
            let series = sum_series(1, "theta3", |n| q.powi(n * n) * (u * (2 * n) as f64).cos())?;
            1.0 + 2.0 * series
        }
        ThetaKind::Four => {
            let series = sum_series(1, "theta4", |n| {
                alternating(n) * q.powi(n * n) * (u * (2 * n) as f64).cos()
            })?;
            1.0 + 2.0 * series
        }
    };
    ensure_finite(value, "theta")
}

/// `k`-th derivative of θ1 with respect to `u`.
pub fn elliptic_theta1_derivative(k: u32, u: Complex64, q: Complex64) -> Result<Complex64> {
    check_nome(q)?;
    let phase = k as f64 * PI / 2.0;
    let series = sum_series(0, "theta1 derivative", |n| {
        let alpha = (2 * n + 1) as f64;
        let dsin = alpha.powi(k as i32) * (u * alpha + phase).sin();
        alternating(n) * q.powi(n * (n + 1)) * dsin
    })?;
    ensure_finite(2.0 * q.powf(0.25) * series, "theta1 derivative")
}

/// Logarithmic derivative `θ1'(u) / θ1(u)`.
pub fn log_theta1_derivative(u: Complex64, q: Complex64) -> Result<Complex64> {
    check_nome(q)?;
    let series = sum_series(1, "log theta1 derivative", |n| {
        let mut q2n = q.powi(2 * n);
        if q2n.norm() < SERIES_TOLERANCE {
            q2n = Complex64::new(0.0, 0.0);
        }
        q2n / (1.0 - q2n) * (u * (2 * n) as f64).sin()
    })?;
    ensure_finite(u.cos() / u.sin() + 4.0 * series, "log theta1 derivative")
}

/// Weierstrass functions for the lattice spanned by the half-periods `w1`, `w3`.
///
/// The theta constants that do not depend on the argument are evaluated once
/// at construction.
#[derive(Debug, Clone, Copy)]
pub struct WeierstrassLattice {
    pub w1: Complex64,
    pub w3: Complex64,
    q: Complex64,
    e1: Complex64,
    theta34: Complex64,
    eta1: Complex64,
}

impl WeierstrassLattice {
    pub fn new(w1: Complex64, w3: Complex64) -> Result<Self> {
        let tau = w3 / w1;
        if tau.im <= 0.0 {
            return Err(instability(format!(
                "half-period ratio must lie in the upper half plane, got {tau}"
            )));
        }
        let i = Complex64::i();
        let q = (i * PI * tau).exp();
        let zero = Complex64::new(0.0, 0.0);

        let theta2 = elliptic_theta(ThetaKind::Two, zero, q)?;
        let theta3 = elliptic_theta(ThetaKind::Three, zero, q)?;
        let theta4 = elliptic_theta(ThetaKind::Four, zero, q)?;
        let e1 = PI * PI / (12.0 * w1 * w1) * (theta2.powi(4) + 2.0 * theta4.powi(4));

        let d1 = elliptic_theta1_derivative(1, zero, q)?;
        let d3 = elliptic_theta1_derivative(3, zero, q)?;
        let eta1 = -PI * PI / (12.0 * w1) * (d3 / d1);

        Ok(Self {
            w1,
            w3,
            q,
            e1: ensure_finite(e1, "e1")?,
            theta34: theta3 * theta4,
            eta1: ensure_finite(eta1, "eta1")?,
        })
    }

    /// The square lattice `w1 = 1/2`, `w3 = i/2` used by the Costa surface.
    pub fn square() -> Result<Self> {
        Self::new(Complex64::new(0.5, 0.0), Complex64::new(0.0, 0.5))
    }

    pub fn nome(&self) -> Complex64 {
        self.q
    }

    /// `e1 = ℘(w1)`.
    pub fn e1(&self) -> Complex64 {
        self.e1
    }

    /// `η1 = ζ(w1)`.
    pub fn eta1(&self) -> Complex64 {
        self.eta1
    }

    pub fn p(&self, z: Complex64) -> Result<Complex64> {
        let u = PI * z / (2.0 * self.w1);
        let theta1 = elliptic_theta(ThetaKind::One, u, self.q)?;
        let theta2 = elliptic_theta(ThetaKind::Two, u, self.q)?;
        let ratio = PI * self.theta34 * theta2 / (2.0 * self.w1 * theta1);
        ensure_finite(ratio * ratio + self.e1, "Weierstrass P")
    }

    pub fn zeta(&self, z: Complex64) -> Result<Complex64> {
        let u = PI * z / (2.0 * self.w1);
        let log_derivative = log_theta1_derivative(u, self.q)?;
        let value = z * self.eta1 / self.w1 + PI / (2.0 * self.w1) * log_derivative;
        ensure_finite(value, "Weierstrass zeta")
    }
}

/// ℘(z) on the square lattice.
pub fn weierstrass_p(z: Complex64) -> Result<Complex64> {
    WeierstrassLattice::square()?.p(z)
}

/// ζ(z) on the square lattice.
pub fn weierstrass_zeta(z: Complex64) -> Result<Complex64> {
    WeierstrassLattice::square()?.zeta(z)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    fn assert_close(a: Complex64, b: Complex64, tol: f64, what: &str) {
        let scale = 1.0 + a.norm().max(b.norm());
        assert!(
            (a - b).norm() <= tol * scale,
            "{what}: {a} vs {b} (diff {})",
            (a - b).norm()
        );
    }

    #[test]
    fn theta_constants_satisfy_jacobi_identity() {
        let q = c(0.1, 0.05);
        let zero = c(0.0, 0.0);
        let t2 = elliptic_theta(ThetaKind::Two, zero, q).expect("theta2");
        let t3 = elliptic_theta(ThetaKind::Three, zero, q).expect("theta3");
        let t4 = elliptic_theta(ThetaKind::Four, zero, q).expect("theta4");
        assert_close(t3.powi(4), t2.powi(4) + t4.powi(4), 1e-10, "theta3^4 = theta2^4 + theta4^4");
    }

    #[test]
    fn theta1_prime_matches_triple_product() {
        let q = c(0.2, -0.1);
        let zero = c(0.0, 0.0);
        let d1 = elliptic_theta1_derivative(1, zero, q).expect("theta1'");
        let product = elliptic_theta(ThetaKind::Two, zero, q).unwrap()
            * elliptic_theta(ThetaKind::Three, zero, q).unwrap()
            * elliptic_theta(ThetaKind::Four, zero, q).unwrap();
        assert_close(d1, product, 1e-10, "theta1'(0) = theta2 theta3 theta4");
    }

    #[test]
    fn theta1_derivative_matches_finite_difference() {
        let q = c(0.15, 0.0);
        let u = c(0.3, 0.1);
        let h = 1e-6;
        let plus = elliptic_theta(ThetaKind::One, u + h, q).unwrap();
        let minus = elliptic_theta(ThetaKind::One, u - h, q).unwrap();
        let fd = (plus - minus) / (2.0 * h);
        let exact = elliptic_theta1_derivative(1, u, q).unwrap();
        assert_close(fd, exact, 1e-7, "theta1 derivative");

        let log = log_theta1_derivative(u, q).unwrap();
        let theta1 = elliptic_theta(ThetaKind::One, u, q).unwrap();
        assert_close(log, exact / theta1, 1e-10, "log derivative");
    }

    #[test]
    fn weierstrass_p_is_periodic_on_the_lattice() {
        let lattice = WeierstrassLattice::square().expect("lattice");
        let z = c(0.23, 0.17);
        let base = lattice.p(z).unwrap();
        let shifted_real = lattice.p(z + 2.0 * lattice.w1).unwrap();
        let shifted_imag = lattice.p(z + 2.0 * lattice.w3).unwrap();
        assert_close(base, shifted_real, 1e-9, "period 2 w1");
        assert_close(base, shifted_imag, 1e-9, "period 2 w3");
        assert_close(lattice.p(-z).unwrap(), base, 1e-10, "P is even");
    }

    #[test]
    fn weierstrass_p_at_half_period_is_e1() {
        let lattice = WeierstrassLattice::square().expect("lattice");
        let at_half = lattice.p(lattice.w1).unwrap();
        assert_close(at_half, lattice.e1(), 1e-10, "P(w1) = e1");
        // Square lattice: e2 = P(w1 + w3) = 0 and e3 = P(w3) = -e1.
        assert_close(lattice.p(lattice.w1 + lattice.w3).unwrap(), c(0.0, 0.0), 1e-9, "e2");
        assert_close(lattice.p(lattice.w3).unwrap(), -lattice.e1(), 1e-9, "e3");
    }

    #[test]
    fn weierstrass_zeta_is_odd_antiderivative_of_minus_p() {
        let lattice = WeierstrassLattice::square().expect("lattice");
        let z = c(0.31, 0.22);
        let h = 1e-5;
        let fd = (lattice.zeta(z + h).unwrap() - lattice.zeta(z - h).unwrap()) / (2.0 * h);
        assert_close(fd, -lattice.p(z).unwrap(), 1e-6, "zeta' = -P");
        assert_close(lattice.zeta(-z).unwrap(), -lattice.zeta(z).unwrap(), 1e-10, "zeta odd");
        let quasi = lattice.zeta(z + 2.0 * lattice.w1).unwrap() - lattice.zeta(z).unwrap();
        assert_close(quasi, 2.0 * lattice.eta1(), 1e-9, "quasi-periodicity");
    }

    #[test]
    fn zeta_is_finite_at_the_half_period() {
        let lattice = WeierstrassLattice::square().expect("lattice");
        // u = π/2, where the cotangent vanishes.
        let log = log_theta1_derivative(c(PI / 2.0, 0.0), lattice.nome()).expect("log derivative");
        assert_close(log, c(0.0, 0.0), 1e-12, "theta1 is even about pi/2");
        let at_half = lattice.zeta(lattice.w1).expect("zeta(w1)");
        assert_close(at_half, lattice.eta1(), 1e-10, "zeta(w1) = eta1");
        let center = c(0.5, 0.5);
        assert!(lattice.zeta(center - lattice.w3).is_ok());
    }

    #[test]
    fn non_finite_and_out_of_disc_inputs_are_rejected() {
        let err = elliptic_theta(ThetaKind::Three, c(0.0, 0.0), c(1.0, 0.0)).unwrap_err();
        assert!(matches!(err, crate::error::SurfaceError::NumericalInstability(_)));
        // ζ has a pole at the origin.
        assert!(weierstrass_zeta(c(0.0, 0.0)).is_err());
        assert!(weierstrass_p(c(0.0, 0.0)).is_err());
    }
}
