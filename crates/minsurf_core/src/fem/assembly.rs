use super::FunctionSpace;
use crate::basis::LagrangeBasis;
use crate::error::{instability, invalid_config, Result};
use crate::mesh::SurfaceMesh;
use crate::quadrature::GaussLegendre;
use crate::traits::LinearOperator;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Basis gradients and weights at the tensor Gauss points of the unit square.
#[derive(Debug, Clone)]
struct ReferenceQuad {
    num_basis: usize,
    weights: Vec<f64>,
    /// `grads[q * num_basis + l]` is `(dphi_l/ds, dphi_l/dt)` at point `q`.
    grads: Vec<[f64; 2]>,
}

impl ReferenceQuad {
    fn new(order: usize) -> Self {
        let basis = LagrangeBasis::new(order);
        let rule = GaussLegendre::new(order + 2);
        let n1 = basis.len();
        let values: Vec<Vec<f64>> = rule.points.iter().map(|&x| basis.values(x)).collect();
        let derivs: Vec<Vec<f64>> = rule.points.iter().map(|&x| basis.derivatives(x)).collect();

        let nq1 = rule.len();
        let mut weights = Vec::with_capacity(nq1 * nq1);
        let mut grads = Vec::with_capacity(nq1 * nq1 * n1 * n1);
        for qb in 0..nq1 {
            for qa in 0..nq1 {
                weights.push(rule.weights[qa] * rule.weights[qb]);
                for b in 0..n1 {
                    for a in 0..n1 {
                        grads.push([
                            derivs[qa][a] * values[qb][b],
                            values[qa][a] * derivs[qb][b],
                        ]);
                    }
                }
            }
        }
        Self {
            num_basis: n1 * n1,
            weights,
            grads,
        }
    }

    fn num_points(&self) -> usize {
        self.weights.len()
    }

    fn grad(&self, q: usize, l: usize) -> [f64; 2] {
        self.grads[q * self.num_basis + l]
    }
}

/// Laplace–Beltrami (diffusion) operator on a curved surface mesh.
///
/// Per quadrature point it caches `w * sqrt(det G) * G^-1`, where `G = J^T J`
/// is the metric of the element map. The cache must be refreshed with
/// [`LaplaceOperator::update`] after the geometry moves.
#[derive(Debug, Clone)]
pub struct LaplaceOperator {
    order: usize,
    reference: ReferenceQuad,
    factors: Option<Vec<[f64; 3]>>,
}

impl LaplaceOperator {
    pub fn new(order: usize) -> Self {
        Self {
            order,
            reference: ReferenceQuad::new(order),
            factors: None,
        }
    }

    pub fn invalidate(&mut self) {
        self.factors = None;
    }

    pub fn has_factors(&self) -> bool {
        self.factors.is_some()
    }

    /// Computes the geometric factors of `mesh` unless they are cached.
    pub fn update(&mut self, mesh: &SurfaceMesh) -> Result<()> {
        if self.factors.is_some() {
            return Ok(());
        }
        if mesh.order() != self.order {
            return Err(invalid_config(format!(
                "operator of order {} cannot use geometry of order {}",
                self.order,
                mesh.order()
            )));
        }
        let reference = &self.reference;
        let nq = reference.num_points();
        let mut factors = Vec::with_capacity(mesh.num_cells() * nq);
        for c in 0..mesh.num_cells() {
            let nodes = mesh.cell_nodes(c);
            for q in 0..nq {
                let mut js = [0.0; 3];
                let mut jt = [0.0; 3];
                for (l, x) in nodes.iter().enumerate() {
                    let [gs, gt] = reference.grad(q, l);
                    for d in 0..3 {
                        js[d] += gs * x[d];
                        jt[d] += gt * x[d];
                    }
                }
                let g00: f64 = js.iter().map(|v| v * v).sum();
                let g01: f64 = js.iter().zip(&jt).map(|(a, b)| a * b).sum();
                let g11: f64 = jt.iter().map(|v| v * v).sum();
                let det = g00 * g11 - g01 * g01;
                if !(det > 0.0) || !det.is_finite() {
                    return Err(instability(format!(
                        "degenerate element geometry in cell {c} (metric determinant {det:e})"
                    )));
                }
                let scale = reference.weights[q] * det.sqrt() / det;
                factors.push([scale * g11, -scale * g01, scale * g00]);
            }
        }
        self.factors = Some(factors);
        Ok(())
    }

    fn cached(&self) -> Result<&[[f64; 3]]> {
        self.factors
            .as_deref()
            .ok_or_else(|| invalid_config("geometric factors are stale; call update first"))
    }

    /// Dense element stiffness matrix of `cell` over its local dofs.
    pub fn element_matrix(&self, cell: usize) -> Result<DMatrix<f64>> {
        let factors = self.cached()?;
        let reference = &self.reference;
        let nq = reference.num_points();
        let n = reference.num_basis;
        let mut matrix = DMatrix::zeros(n, n);
        for q in 0..nq {
            let [d00, d01, d11] = factors[cell * nq + q];
            for i in 0..n {
                let [gi0, gi1] = reference.grad(q, i);
                let fi0 = d00 * gi0 + d01 * gi1;
                let fi1 = d01 * gi0 + d11 * gi1;
                for j in 0..n {
                    let [gj0, gj1] = reference.grad(q, j);
                    matrix[(i, j)] += fi0 * gj0 + fi1 * gj1;
                }
            }
        }
        Ok(matrix)
    }

    /// Assembles the scalar operator over the true dofs of `space`.
    pub fn assemble(&self, space: &FunctionSpace) -> Result<CsrMatrix<f64>> {
        let n = space.num_true_dofs();
        let mut coo = CooMatrix::new(n, n);
        for c in 0..space.num_cells() {
            let local = self.element_matrix(c)?;
            let dofs = space.element_dofs(c);
            for (i, &di) in dofs.iter().enumerate() {
                for (j, &dj) in dofs.iter().enumerate() {
                    let value = local[(i, j)];
                    for &(ti, wi) in space.expansion(di) {
                        for &(tj, wj) in space.expansion(dj) {
                            coo.push(ti, tj, wi * wj * value);
                        }
                    }
                }
            }
        }
        Ok(CsrMatrix::from(&coo))
    }

    /// Matrix-free view of the scalar operator over the true dofs of `space`.
    pub fn matrix_free<'a>(&'a self, space: &'a FunctionSpace) -> Result<MatrixFreeLaplace<'a>> {
        let factors = self.cached()?;
        let nq = self.reference.num_points();
        if factors.len() != space.num_cells() * nq {
            return Err(invalid_config("geometric factors do not match the function space"));
        }
        Ok(MatrixFreeLaplace {
            reference: &self.reference,
            factors,
            space,
        })
    }
}

/// Applies the Laplace–Beltrami operator element by element.
pub struct MatrixFreeLaplace<'a> {
    reference: &'a ReferenceQuad,
    factors: &'a [[f64; 3]],
    space: &'a FunctionSpace,
}

impl LinearOperator for MatrixFreeLaplace<'_> {
    fn size(&self) -> usize {
        self.space.num_true_dofs()
    }

    fn apply(&self, x: &DVector<f64>, y: &mut DVector<f64>) {
        let reference = self.reference;
        let nq = reference.num_points();
        let n = reference.num_basis;
        let x_full = self.space.prolong(x.as_slice());
        let mut y_full = vec![0.0; x_full.len()];
        let mut local = vec![0.0; n];
        let mut out = vec![0.0; n];

        for c in 0..self.space.num_cells() {
            let dofs = self.space.element_dofs(c);
            for (l, &dof) in dofs.iter().enumerate() {
                local[l] = x_full[dof];
            }
            out.iter_mut().for_each(|v| *v = 0.0);
            for q in 0..nq {
                let mut g = [0.0; 2];
                for (l, &value) in local.iter().enumerate() {
                    let [gs, gt] = reference.grad(q, l);
                    g[0] += gs * value;
                    g[1] += gt * value;
                }
                let [d00, d01, d11] = self.factors[c * nq + q];
                let flux = [d00 * g[0] + d01 * g[1], d01 * g[0] + d11 * g[1]];
                for (l, o) in out.iter_mut().enumerate() {
                    let [gs, gt] = reference.grad(q, l);
                    *o += gs * flux[0] + gt * flux[1];
                }
            }
            for (l, &dof) in dofs.iter().enumerate() {
                y_full[dof] += out[l];
            }
        }

        y.fill(0.0);
        self.space.restrict_transpose_add(&y_full, y.as_mut_slice());
    }
}

/// `blocks` copies of a square operator along the diagonal.
pub struct BlockDiagonal<'a, O: LinearOperator + ?Sized> {
    inner: &'a O,
    blocks: usize,
}

impl<'a, O: LinearOperator + ?Sized> BlockDiagonal<'a, O> {
    pub fn new(inner: &'a O, blocks: usize) -> Self {
        Self { inner, blocks }
    }
}

impl<O: LinearOperator + ?Sized> LinearOperator for BlockDiagonal<'_, O> {
    fn size(&self) -> usize {
        self.inner.size() * self.blocks
    }

    fn apply(&self, x: &DVector<f64>, y: &mut DVector<f64>) {
        let n = self.inner.size();
        let mut block_out = DVector::zeros(n);
        for b in 0..self.blocks {
            let block_in = x.rows(b * n, n).into_owned();
            self.inner.apply(&block_in, &mut block_out);
            y.rows_mut(b * n, n).copy_from(&block_out);
        }
    }
}

/// Assembled counterpart of [`BlockDiagonal`].
pub fn block_diagonal(matrix: &CsrMatrix<f64>, blocks: usize) -> CsrMatrix<f64> {
    let n = matrix.nrows();
    let mut coo = CooMatrix::new(n * blocks, n * blocks);
    for b in 0..blocks {
        for (i, j, &value) in matrix.triplet_iter() {
            coo.push(b * n + i, b * n + j, value);
        }
    }
    CsrMatrix::from(&coo)
}
