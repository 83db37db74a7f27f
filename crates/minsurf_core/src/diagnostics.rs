use crate::mesh::SurfaceMesh;
use crate::traits::{DiagnosticsSink, IterationReport};
use log::{debug, info};

/// Forwards relaxation diagnostics to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn on_geometry(&mut self, iteration: usize, mesh: &SurfaceMesh) {
        debug!(
            "iteration {iteration}: geometry with {} vertices, {} cells",
            mesh.num_vertices(),
            mesh.num_cells()
        );
    }

    fn on_iteration(&mut self, report: &IterationReport) {
        info!(
            "iteration {} finished: residual {:e} after {} CG iterations",
            report.iteration, report.residual, report.linear_iterations
        );
    }
}

/// Keeps every report, for callers that want the convergence history.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub geometries: usize,
    pub reports: Vec<IterationReport>,
}

impl DiagnosticsSink for RecordingSink {
    fn on_geometry(&mut self, _iteration: usize, _mesh: &SurfaceMesh) {
        self.geometries += 1;
    }

    fn on_iteration(&mut self, report: &IterationReport) {
        self.reports.push(*report);
    }
}
