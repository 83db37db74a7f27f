//! The `minsurf_core` crate builds curved quadrilateral surface meshes and
//! relaxes them towards minimal surfaces.
//!
//! Key components:
//! - **Surfaces**: the `Surface` trait and the `SurfaceKind` catalogue
//!   (catenoid, helicoid, Enneper, Scherk, Hold, peaches, slotted sphere,
//!   Costa, shell), built through `create_surface`.
//! - **Mesh / FE**: high-order `SurfaceMesh` with refinement and hanging
//!   edges, the `FunctionSpace` dof numbering and the Laplace–Beltrami
//!   `LaplaceOperator` (assembled or matrix-free).
//! - **Solvers**: `LinearOperator`-based preconditioned conjugate gradients.
//! - **Relaxation**: `RelaxationSession`, the Picard state machine.
//! - **Special functions**: Jacobi theta and Weierstrass ℘ / ζ.
pub mod basis;
pub mod builder;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod factory;
pub mod fem;
pub mod mesh;
pub mod quadrature;
pub mod relaxation;
pub mod solvers;
pub mod special;
pub mod surfaces;
pub mod traits;

pub use config::{LinearSolverSettings, RelaxationSettings, SurfaceOptions, UpdatePolicy};
pub use error::{Result, SurfaceError};
pub use factory::{create_surface, BuiltSurface};
pub use relaxation::{RelaxationOutcome, RelaxationSession, RelaxationState};
pub use surfaces::SurfaceKind;
