use crate::error::{invalid_config, Result};
use serde::{Deserialize, Serialize};

/// Options controlling how a surface mesh is built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceOptions {
    /// Polynomial order of both the geometry and the function space.
    pub order: usize,
    pub nx: usize,
    pub ny: usize,
    /// Number of uniform refinement passes.
    pub refine: usize,
    /// Randomly refine a fraction of the cells after the uniform passes.
    pub amr: bool,
    pub amr_fraction: f64,
    pub seed: u64,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            order: 3,
            nx: 6,
            ny: 6,
            refine: 2,
            amr: false,
            amr_fraction: 0.25,
            seed: 0,
        }
    }
}

impl SurfaceOptions {
    pub fn validate(&self) -> Result<()> {
        if self.order == 0 {
            return Err(invalid_config("order must be at least 1"));
        }
        if self.nx == 0 || self.ny == 0 {
            return Err(invalid_config(format!(
                "grid must have at least one cell per direction, got {}x{}",
                self.nx, self.ny
            )));
        }
        if !(0.0..=1.0).contains(&self.amr_fraction) {
            return Err(invalid_config(format!(
                "amr_fraction must lie in [0, 1], got {}",
                self.amr_fraction
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdatePolicy {
    /// One block-diagonal vector diffusion solve per iteration.
    Vector,
    /// Three scalar diffusion solves sharing one operator.
    Componentwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearSolverSettings {
    pub rel_tol: f64,
    pub abs_tol: f64,
    pub max_iter: usize,
}

impl Default for LinearSolverSettings {
    fn default() -> Self {
        Self {
            rel_tol: 1e-14,
            abs_tol: 1e-28,
            max_iter: 2000,
        }
    }
}

impl LinearSolverSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_iter == 0 {
            return Err(invalid_config("linear max_iter must be greater than zero"));
        }
        if !(self.rel_tol >= 0.0) || !(self.abs_tol >= 0.0) {
            return Err(invalid_config("linear tolerances must be non-negative"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaxationSettings {
    pub iter_max: usize,
    /// Weight kept on the previous geometry, in `[0, 1]`.
    pub lambda: f64,
    /// Restrict each node's displacement to its position direction.
    pub radial: bool,
    pub policy: UpdatePolicy,
    /// Apply the operator matrix-free instead of assembling a CSR matrix.
    pub partial_assembly: bool,
    /// Picard convergence threshold on the relative nodal displacement.
    pub tolerance: f64,
    pub linear: LinearSolverSettings,
}

impl Default for RelaxationSettings {
    fn default() -> Self {
        Self {
            iter_max: 32,
            lambda: 0.0,
            radial: false,
            policy: UpdatePolicy::Vector,
            partial_assembly: true,
            tolerance: 1e-4,
            linear: LinearSolverSettings::default(),
        }
    }
}

impl RelaxationSettings {
    pub fn validate(&self) -> Result<()> {
        if self.iter_max == 0 {
            return Err(invalid_config("iter_max must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.lambda) {
            return Err(invalid_config(format!(
                "lambda must lie in [0, 1], got {}",
                self.lambda
            )));
        }
        if !(self.tolerance > 0.0) {
            return Err(invalid_config("tolerance must be positive"));
        }
        if self.policy == UpdatePolicy::Componentwise {
            if self.lambda != 0.0 {
                return Err(invalid_config(
                    "componentwise update requires lambda == 0",
                ));
            }
            if self.radial {
                return Err(invalid_config(
                    "componentwise update cannot use radial projection",
                ));
            }
        }
        self.linear.validate()
    }
}
