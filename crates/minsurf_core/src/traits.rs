use crate::mesh::SurfaceMesh;
use nalgebra::DVector;

/// A square linear operator acting on dof vectors.
pub trait LinearOperator {
    /// Returns the number of rows (and columns) of the operator.
    fn size(&self) -> usize;

    /// Computes `y = A x`.
    /// x: input vector of length `size()`
    /// y: buffer to write the result, overwritten
    fn apply(&self, x: &DVector<f64>, y: &mut DVector<f64>);
}

/// Snapshot of one Picard iteration handed to a [`DiagnosticsSink`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationReport {
    pub iteration: usize,
    pub residual: f64,
    pub linear_iterations: usize,
}

/// Receives geometry and progress while a relaxation session runs.
///
/// Callbacks cannot fail the solve. `()` is the no-op sink.
pub trait DiagnosticsSink {
    /// Called with the current geometry at the start of every iteration.
    fn on_geometry(&mut self, _iteration: usize, _mesh: &SurfaceMesh) {}

    /// Called after the update of every iteration.
    fn on_iteration(&mut self, _report: &IterationReport) {}
}

impl DiagnosticsSink for () {}
