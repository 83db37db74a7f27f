use crate::config::LinearSolverSettings;
use crate::error::{instability, Result};
use crate::traits::LinearOperator;
use log::{debug, warn};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

impl LinearOperator for CsrMatrix<f64> {
    fn size(&self) -> usize {
        self.nrows()
    }

    fn apply(&self, x: &DVector<f64>, y: &mut DVector<f64>) {
        let offsets = self.row_offsets();
        let columns = self.col_indices();
        let values = self.values();
        for row in 0..self.nrows() {
            let mut sum = 0.0;
            for k in offsets[row]..offsets[row + 1] {
                sum += values[k] * x[columns[k]];
            }
            y[row] = sum;
        }
    }
}

/// Wraps an operator so essential rows and columns act as the identity:
/// `y = A (x with essential entries zeroed)`, then `y[e] = x[e]`.
pub struct ConstrainedOperator<'a, O: LinearOperator + ?Sized> {
    inner: &'a O,
    essential: &'a [usize],
}

impl<'a, O: LinearOperator + ?Sized> ConstrainedOperator<'a, O> {
    pub fn new(inner: &'a O, essential: &'a [usize]) -> Self {
        Self { inner, essential }
    }
}

impl<O: LinearOperator + ?Sized> LinearOperator for ConstrainedOperator<'_, O> {
    fn size(&self) -> usize {
        self.inner.size()
    }

    fn apply(&self, x: &DVector<f64>, y: &mut DVector<f64>) {
        let mut z = x.clone();
        for &i in self.essential {
            z[i] = 0.0;
        }
        self.inner.apply(&z, y);
        for &i in self.essential {
            y[i] = x[i];
        }
    }
}

/// Right-hand side of `A X = 0` with the essential entries of `x` imposed:
/// `b = -A x_e`, then `b[e] = x[e]`.
pub fn eliminated_rhs<O: LinearOperator + ?Sized>(
    operator: &O,
    essential: &[usize],
    x: &DVector<f64>,
) -> DVector<f64> {
    let mut x_e = DVector::zeros(x.len());
    for &i in essential {
        x_e[i] = x[i];
    }
    let mut b = DVector::zeros(x.len());
    operator.apply(&x_e, &mut b);
    b.neg_mut();
    for &i in essential {
        b[i] = x[i];
    }
    b
}

/// Zeroes the essential rows and columns of `matrix` and puts 1 on their
/// diagonal.
pub fn eliminate_essential(matrix: &mut CsrMatrix<f64>, essential: &[usize]) -> Result<()> {
    let mut marked = vec![false; matrix.nrows()];
    for &i in essential {
        marked[i] = true;
    }
    let offsets = matrix.row_offsets().to_vec();
    let columns = matrix.col_indices().to_vec();
    let values = matrix.values_mut();
    for row in 0..marked.len() {
        let mut has_diagonal = false;
        for k in offsets[row]..offsets[row + 1] {
            let col = columns[k];
            if marked[row] || marked[col] {
                values[k] = if row == col { 1.0 } else { 0.0 };
            }
            has_diagonal |= row == col;
        }
        if marked[row] && !has_diagonal {
            return Err(instability(format!("essential row {row} has no diagonal entry")));
        }
    }
    Ok(())
}

/// Symmetric Gauss–Seidel sweep (forward then backward) used as a
/// preconditioner.
pub struct GaussSeidelSmoother<'a> {
    matrix: &'a CsrMatrix<f64>,
    diagonal: Vec<f64>,
}

impl<'a> GaussSeidelSmoother<'a> {
    pub fn new(matrix: &'a CsrMatrix<f64>) -> Result<Self> {
        let offsets = matrix.row_offsets();
        let columns = matrix.col_indices();
        let values = matrix.values();
        let mut diagonal = vec![0.0; matrix.nrows()];
        for row in 0..matrix.nrows() {
            for k in offsets[row]..offsets[row + 1] {
                if columns[k] == row {
                    diagonal[row] += values[k];
                }
            }
            if diagonal[row] == 0.0 || !diagonal[row].is_finite() {
                return Err(instability(format!(
                    "Gauss-Seidel needs a nonzero diagonal, row {row} has {}",
                    diagonal[row]
                )));
            }
        }
        Ok(Self { matrix, diagonal })
    }

    fn relax_row(&self, row: usize, r: &DVector<f64>, z: &mut DVector<f64>) {
        let offsets = self.matrix.row_offsets();
        let columns = self.matrix.col_indices();
        let values = self.matrix.values();
        let mut sum = r[row];
        for k in offsets[row]..offsets[row + 1] {
            let col = columns[k];
            if col != row {
                sum -= values[k] * z[col];
            }
        }
        z[row] = sum / self.diagonal[row];
    }
}

impl LinearOperator for GaussSeidelSmoother<'_> {
    fn size(&self) -> usize {
        self.matrix.nrows()
    }

    fn apply(&self, r: &DVector<f64>, z: &mut DVector<f64>) {
        z.fill(0.0);
        for row in 0..self.size() {
            self.relax_row(row, r, z);
        }
        for row in (0..self.size()).rev() {
            self.relax_row(row, r, z);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CgReport {
    pub iterations: usize,
    pub converged: bool,
    pub initial_norm: f64,
    pub final_norm: f64,
}

/// Preconditioned conjugate gradients for `A x = b`, starting from `x`.
///
/// Stops once `(B r, r) <= max(rel_tol^2 (B r0, r0), abs_tol^2)`. Failure to
/// converge is logged and reported, not raised.
pub fn conjugate_gradient(
    operator: &dyn LinearOperator,
    preconditioner: Option<&dyn LinearOperator>,
    b: &DVector<f64>,
    x: &mut DVector<f64>,
    settings: &LinearSolverSettings,
) -> CgReport {
    let n = operator.size();
    let precondition = |r: &DVector<f64>, z: &mut DVector<f64>| match preconditioner {
        Some(m) => m.apply(r, z),
        None => z.copy_from(r),
    };

    let mut r = DVector::zeros(n);
    operator.apply(x, &mut r);
    r.axpy(1.0, b, -1.0);
    let mut z = DVector::zeros(n);
    precondition(&r, &mut z);
    let mut d = z.clone();

    let mut nom = d.dot(&r);
    let initial_norm = nom.max(0.0).sqrt();
    let mut report = CgReport {
        iterations: 0,
        converged: false,
        initial_norm,
        final_norm: initial_norm,
    };
    if !(nom >= 0.0) {
        warn!("CG: preconditioned residual (B r, r) = {nom:e} is not positive");
        return report;
    }
    let threshold = (nom * settings.rel_tol * settings.rel_tol)
        .max(settings.abs_tol * settings.abs_tol);
    if nom <= threshold {
        report.converged = true;
        return report;
    }

    let mut ad = DVector::zeros(n);
    operator.apply(&d, &mut ad);
    let mut den = d.dot(&ad);
    if !(den > 0.0) {
        warn!("CG: operator is not positive definite, (d, A d) = {den:e}");
        return report;
    }

    for iteration in 1..=settings.max_iter {
        let alpha = nom / den;
        x.axpy(alpha, &d, 1.0);
        r.axpy(-alpha, &ad, 1.0);
        precondition(&r, &mut z);
        let betanom = r.dot(&z);
        report.iterations = iteration;
        report.final_norm = betanom.max(0.0).sqrt();
        if !(betanom >= 0.0) {
            warn!("CG: preconditioned residual (B r, r) = {betanom:e} is not positive");
            return report;
        }
        if betanom <= threshold {
            report.converged = true;
            break;
        }
        if iteration == settings.max_iter {
            break;
        }
        let beta = betanom / nom;
        d.axpy(1.0, &z, beta);
        operator.apply(&d, &mut ad);
        den = d.dot(&ad);
        if !(den > 0.0) {
            warn!("CG: operator is not positive definite, (d, A d) = {den:e}");
            return report;
        }
        nom = betanom;
    }

    if report.converged {
        debug!(
            "CG converged in {} iterations, |r| {:e} -> {:e}",
            report.iterations, report.initial_norm, report.final_norm
        );
    } else {
        warn!(
            "CG did not converge in {} iterations, |r| {:e} -> {:e}",
            report.iterations, report.initial_norm, report.final_norm
        );
    }
    report
}
