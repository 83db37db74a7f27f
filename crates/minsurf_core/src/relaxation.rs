use crate::config::{LinearSolverSettings, RelaxationSettings, UpdatePolicy};
use crate::error::{instability, invalid_config, Result, SurfaceError};
use crate::factory::BuiltSurface;
use crate::fem::{
    block_diagonal, vector_essential, BlockDiagonal, DofOrdering, FunctionSpace, LaplaceOperator,
    MatrixFreeLaplace,
};
use crate::solvers::{
    conjugate_gradient, eliminate_essential, eliminated_rhs, CgReport, ConstrainedOperator,
    GaussSeidelSmoother,
};
use crate::traits::{DiagnosticsSink, IterationReport, LinearOperator};
use log::{debug, info};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelaxationState {
    Initialized,
    Iterating,
    Converged,
    IterationLimitReached,
}

impl RelaxationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Converged | Self::IterationLimitReached)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaxationOutcome {
    pub state: RelaxationState,
    pub converged: bool,
    pub iterations: usize,
    /// Residual of the last iteration, infinite before the first one.
    pub residual: f64,
    pub residual_history: Vec<f64>,
}

/// Picard relaxation of a surface towards a minimal surface.
///
/// Each iteration rebuilds the Laplace–Beltrami operator on the current
/// geometry and solves `Δ_Γ x = 0` for the coordinates, keeping the essential
/// dofs at their current positions. The session owns the surface until
/// [`RelaxationSession::into_surface`].
pub struct RelaxationSession {
    surface: BuiltSurface,
    settings: RelaxationSettings,
    operator: LaplaceOperator,
    /// True dof coordinates, `ByComponent`.
    coordinates: DVector<f64>,
    state: RelaxationState,
    iteration: usize,
    residual_history: Vec<f64>,
    aborted: bool,
}

impl RelaxationSession {
    pub fn new(surface: BuiltSurface, settings: RelaxationSettings) -> Result<Self> {
        settings.validate()?;
        if surface.essential.is_empty() {
            return Err(invalid_config(format!(
                "{} has no essential dofs, the coordinate problem would be singular",
                surface.kind
            )));
        }
        let n = surface.space.num_true_dofs();
        if let Some(&bad) = surface.essential.iter().find(|&&e| e >= n) {
            return Err(invalid_config(format!(
                "essential dof {bad} out of range for {n} true dofs"
            )));
        }
        let coordinates = surface
            .space
            .true_coordinates(&surface.mesh, DofOrdering::ByComponent);
        let operator = LaplaceOperator::new(surface.space.order());
        Ok(Self {
            surface,
            settings,
            operator,
            coordinates,
            state: RelaxationState::Initialized,
            iteration: 0,
            residual_history: Vec::new(),
            aborted: false,
        })
    }

    pub fn state(&self) -> RelaxationState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.aborted || self.state.is_terminal()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn settings(&self) -> &RelaxationSettings {
        &self.settings
    }

    pub fn residual_history(&self) -> &[f64] {
        &self.residual_history
    }

    pub fn last_residual(&self) -> Option<f64> {
        self.residual_history.last().copied()
    }

    pub fn surface(&self) -> &BuiltSurface {
        &self.surface
    }

    /// Current true dof coordinates in the requested layout.
    pub fn coordinates(&self, ordering: DofOrdering) -> DVector<f64> {
        crate::fem::convert_layout(&self.coordinates, DofOrdering::ByComponent, ordering)
    }

    pub fn into_surface(self) -> BuiltSurface {
        self.surface
    }

    pub fn outcome(&self) -> RelaxationOutcome {
        RelaxationOutcome {
            state: self.state,
            converged: self.state == RelaxationState::Converged,
            iterations: self.iteration,
            residual: self.last_residual().unwrap_or(f64::INFINITY),
            residual_history: self.residual_history.clone(),
        }
    }

    /// Runs one Picard iteration. A terminal session is left untouched; an
    /// aborted one answers [`SurfaceError::SessionAborted`].
    pub fn step(&mut self, sink: &mut dyn DiagnosticsSink) -> Result<RelaxationState> {
        if self.aborted {
            return Err(SurfaceError::SessionAborted);
        }
        if self.state.is_terminal() {
            return Ok(self.state);
        }
        self.state = RelaxationState::Iterating;
        match self.iterate(sink) {
            Ok(state) => Ok(state),
            Err(err) => {
                self.aborted = true;
                Err(err)
            }
        }
    }

    /// Iterates until convergence or the iteration cap.
    pub fn solve(&mut self, sink: &mut dyn DiagnosticsSink) -> Result<RelaxationOutcome> {
        while !self.state.is_terminal() {
            self.step(sink)?;
        }
        Ok(self.outcome())
    }

    fn iterate(&mut self, sink: &mut dyn DiagnosticsSink) -> Result<RelaxationState> {
        let iteration = self.iteration;
        sink.on_geometry(iteration, &self.surface.mesh);

        self.operator.invalidate();
        self.operator.update(&self.surface.mesh)?;

        let old = &self.coordinates;
        let space = &self.surface.space;
        let essential = &self.surface.essential;
        let (new, residual, linear_iterations) = match self.settings.policy {
            UpdatePolicy::Vector => {
                vector_update(&self.operator, space, essential, old, &self.settings)?
            }
            UpdatePolicy::Componentwise => {
                componentwise_update(&self.operator, space, essential, old, &self.settings)?
            }
        };

        if let Some(i) = new.iter().position(|v| !v.is_finite()) {
            return Err(instability(format!(
                "coordinate {i} became non-finite in iteration {iteration}"
            )));
        }
        if !residual.is_finite() {
            return Err(instability(format!(
                "residual became non-finite in iteration {iteration}"
            )));
        }

        self.surface
            .space
            .scatter_coordinates(&mut self.surface.mesh, &new, DofOrdering::ByComponent)?;
        self.coordinates = new;
        self.iteration += 1;
        self.residual_history.push(residual);
        info!("Linearized iteration {iteration}: rnorm = {residual:e}");
        sink.on_iteration(&IterationReport {
            iteration,
            residual,
            linear_iterations,
        });

        if residual < self.settings.tolerance {
            info!("Converged after {} iterations", self.iteration);
            self.state = RelaxationState::Converged;
        } else if self.iteration >= self.settings.iter_max {
            info!(
                "Stopped at the iteration cap {} with rnorm = {residual:e}",
                self.settings.iter_max
            );
            self.state = RelaxationState::IterationLimitReached;
        }
        Ok(self.state)
    }
}

/// Operator of one iteration, shared by every solve in it.
enum PreparedSystem<'a> {
    MatrixFree {
        scalar: MatrixFreeLaplace<'a>,
        blocks: usize,
    },
    Assembled {
        matrix: CsrMatrix<f64>,
        eliminated: CsrMatrix<f64>,
    },
}

impl<'a> PreparedSystem<'a> {
    fn new(
        operator: &'a LaplaceOperator,
        space: &'a FunctionSpace,
        blocks: usize,
        essential: &[usize],
        partial_assembly: bool,
    ) -> Result<Self> {
        if partial_assembly {
            return Ok(Self::MatrixFree {
                scalar: operator.matrix_free(space)?,
                blocks,
            });
        }
        let scalar = operator.assemble(space)?;
        let matrix = if blocks == 1 {
            scalar
        } else {
            block_diagonal(&scalar, blocks)
        };
        let mut eliminated = matrix.clone();
        eliminate_essential(&mut eliminated, essential)?;
        Ok(Self::Assembled { matrix, eliminated })
    }

    /// Solves `A X = 0` with `X[e] = boundary[e]`, starting from zero.
    fn solve(
        &self,
        essential: &[usize],
        boundary: &DVector<f64>,
        settings: &LinearSolverSettings,
    ) -> Result<(DVector<f64>, CgReport)> {
        match self {
            Self::MatrixFree { scalar, blocks } => {
                let block = BlockDiagonal::new(scalar, *blocks);
                solve_constrained(&block, None, essential, boundary, settings)
            }
            Self::Assembled { matrix, eliminated } => {
                solve_constrained(matrix, Some(eliminated), essential, boundary, settings)
            }
        }
    }
}

fn solve_constrained(
    unconstrained: &dyn LinearOperator,
    eliminated: Option<&CsrMatrix<f64>>,
    essential: &[usize],
    boundary: &DVector<f64>,
    settings: &LinearSolverSettings,
) -> Result<(DVector<f64>, CgReport)> {
    let rhs = eliminated_rhs(unconstrained, essential, boundary);
    let mut x = DVector::zeros(rhs.len());
    let report = match eliminated {
        Some(matrix) => {
            let smoother = GaussSeidelSmoother::new(matrix)?;
            conjugate_gradient(matrix, Some(&smoother), &rhs, &mut x, settings)
        }
        None => {
            let constrained = ConstrainedOperator::new(unconstrained, essential);
            conjugate_gradient(&constrained, None, &rhs, &mut x, settings)
        }
    };
    for &i in essential {
        x[i] = boundary[i];
    }
    Ok((x, report))
}

fn relative_change(new: &DVector<f64>, old: &DVector<f64>) -> f64 {
    let distance = (new - old).norm();
    let scale = old.norm();
    if scale > 0.0 {
        distance / scale
    } else {
        distance
    }
}

fn vector_update(
    operator: &LaplaceOperator,
    space: &FunctionSpace,
    essential: &[usize],
    old: &DVector<f64>,
    settings: &RelaxationSettings,
) -> Result<(DVector<f64>, f64, usize)> {
    let n = space.num_true_dofs();
    let essential = vector_essential(essential, n);
    let system = PreparedSystem::new(operator, space, 3, &essential, settings.partial_assembly)?;
    let (solution, report) = system.solve(&essential, old, &settings.linear)?;
    debug!("vector solve: {} CG iterations", report.iterations);

    let keep = settings.lambda;
    let new = if settings.radial {
        let mut new = old.clone();
        for i in 0..n {
            let position = [old[i], old[n + i], old[2 * n + i]];
            let mut along = 0.0;
            let mut length2 = 0.0;
            for d in 0..3 {
                along += position[d] * (solution[d * n + i] - old[d * n + i]);
                length2 += position[d] * position[d];
            }
            let scale = if length2 > 0.0 { along / length2 } else { 0.0 };
            for d in 0..3 {
                new[d * n + i] = old[d * n + i] + (1.0 - keep) * scale * position[d];
            }
        }
        new
    } else {
        old * keep + solution * (1.0 - keep)
    };
    let residual = relative_change(&new, old);
    Ok((new, residual, report.iterations))
}

fn componentwise_update(
    operator: &LaplaceOperator,
    space: &FunctionSpace,
    essential: &[usize],
    old: &DVector<f64>,
    settings: &RelaxationSettings,
) -> Result<(DVector<f64>, f64, usize)> {
    let n = space.num_true_dofs();
    let system = PreparedSystem::new(operator, space, 1, essential, settings.partial_assembly)?;
    let mut new = old.clone();
    let mut residual: f64 = 0.0;
    let mut linear_iterations = 0;
    for d in 0..3 {
        let component = old.rows(d * n, n).into_owned();
        let (solution, report) = system.solve(essential, &component, &settings.linear)?;
        debug!("component {d} solve: {} CG iterations", report.iterations);
        residual = residual.max(relative_change(&solution, &component));
        linear_iterations += report.iterations;
        new.rows_mut(d * n, n).copy_from(&solution);
    }
    Ok((new, residual, linear_iterations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SurfaceOptions;
    use crate::diagnostics::RecordingSink;
    use crate::factory::create_surface;

    fn small_surface(code: i32) -> BuiltSurface {
        let options = SurfaceOptions {
            order: 2,
            nx: 3,
            ny: 3,
            refine: 0,
            ..SurfaceOptions::default()
        };
        create_surface(code, &options).expect("small surface")
    }

    #[test]
    fn componentwise_rejects_relaxation_and_radial() {
        let settings = RelaxationSettings {
            policy: UpdatePolicy::Componentwise,
            lambda: 0.5,
            ..RelaxationSettings::default()
        };
        assert!(matches!(
            RelaxationSession::new(small_surface(4), settings),
            Err(SurfaceError::InvalidConfiguration(_))
        ));
        let settings = RelaxationSettings {
            policy: UpdatePolicy::Componentwise,
            radial: true,
            ..RelaxationSettings::default()
        };
        assert!(RelaxationSession::new(small_surface(4), settings).is_err());
    }

    #[test]
    fn steps_report_to_the_sink_and_count() {
        let mut session =
            RelaxationSession::new(small_surface(4), RelaxationSettings::default()).expect("session");
        assert_eq!(session.state(), RelaxationState::Initialized);
        let mut sink = RecordingSink::default();
        let state = session.step(&mut sink).expect("first step");
        assert!(matches!(
            state,
            RelaxationState::Iterating | RelaxationState::Converged
        ));
        assert_eq!(session.iteration(), 1);
        assert_eq!(sink.geometries, 1);
        assert_eq!(sink.reports.len(), 1);
        assert_eq!(sink.reports[0].iteration, 0);
        assert!(sink.reports[0].residual > 0.0);
        assert!(sink.reports[0].linear_iterations > 0);
    }

    #[test]
    fn essential_dofs_do_not_move() {
        let surface = small_surface(3);
        let before = surface
            .space
            .true_coordinates(&surface.mesh, DofOrdering::ByNode);
        let essential = surface.essential.clone();
        let mut session =
            RelaxationSession::new(surface, RelaxationSettings::default()).expect("session");
        session.step(&mut ()).expect("step");
        let after = session.coordinates(DofOrdering::ByNode);
        for &e in &essential {
            for d in 0..3 {
                assert_eq!(after[3 * e + d], before[3 * e + d], "dof {e} moved");
            }
        }
    }

    #[test]
    fn assembled_and_matrix_free_iterations_agree() {
        let run = |partial_assembly: bool| {
            let settings = RelaxationSettings {
                partial_assembly,
                ..RelaxationSettings::default()
            };
            let mut session = RelaxationSession::new(small_surface(4), settings).expect("session");
            session.step(&mut ()).expect("step");
            session.coordinates(DofOrdering::ByComponent)
        };
        let diff = (run(true) - run(false)).amax();
        assert!(diff < 1e-8, "assembled and matrix-free differ by {diff}");
    }

    #[test]
    fn iteration_cap_is_a_result_not_an_error() {
        let settings = RelaxationSettings {
            iter_max: 2,
            tolerance: 1e-300,
            ..RelaxationSettings::default()
        };
        let mut session = RelaxationSession::new(small_surface(4), settings).expect("session");
        let outcome = session.solve(&mut ()).expect("solve");
        assert_eq!(outcome.state, RelaxationState::IterationLimitReached);
        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.residual_history.len(), 2);
        assert_eq!(session.step(&mut ()).expect("terminal"), outcome.state);
        assert_eq!(session.iteration(), 2);
    }

    #[test]
    fn degenerate_geometry_aborts_the_session() {
        let mut surface = small_surface(4);
        surface
            .mesh
            .map_nodes(|x| {
                *x = [0.0, 0.0, 0.0];
                Ok(())
            })
            .expect("collapse");
        let mut session =
            RelaxationSession::new(surface, RelaxationSettings::default()).expect("session");
        assert!(matches!(
            session.step(&mut ()),
            Err(SurfaceError::NumericalInstability(_))
        ));
        assert!(session.is_aborted());
        assert_eq!(session.step(&mut ()), Err(SurfaceError::SessionAborted));
        assert_eq!(session.solve(&mut ()).unwrap_err(), SurfaceError::SessionAborted);
    }
}
