//! Catalogue of surfaces the builder knows how to construct.
//!
//! Each surface is a unit struct implementing [`Surface`]. The hooks mirror the
//! build pipeline: topology, parametrization of the element nodes, boundary
//! post-processing, snapping, and selection of the essential dofs.

mod costa;
mod grid;
mod sphere;

pub use costa::Costa;
pub use grid::{Catenoid, Enneper, Helicoid, Hold, QuarterPeach, Scherk, Shell};
pub use sphere::{FullPeach, SlottedSphere};

use crate::config::SurfaceOptions;
use crate::error::{invalid_config, Result, SurfaceError};
use crate::fem::FunctionSpace;
use crate::mesh::SurfaceMesh;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinates whose magnitude is below this are treated as zero.
pub const SNAP_EPS: f64 = 1e-14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfaceKind {
    Catenoid,
    Helicoid,
    Enneper,
    Scherk,
    Hold,
    QuarterPeach,
    FullPeach,
    SlottedSphere,
    Costa,
    Shell,
}

impl SurfaceKind {
    pub const ALL: [SurfaceKind; 10] = [
        SurfaceKind::Catenoid,
        SurfaceKind::Helicoid,
        SurfaceKind::Enneper,
        SurfaceKind::Scherk,
        SurfaceKind::Hold,
        SurfaceKind::QuarterPeach,
        SurfaceKind::FullPeach,
        SurfaceKind::SlottedSphere,
        SurfaceKind::Costa,
        SurfaceKind::Shell,
    ];

    pub fn from_code(code: i32) -> Result<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
            .ok_or(SurfaceError::InvalidSelection(code))
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            SurfaceKind::Catenoid => "catenoid",
            SurfaceKind::Helicoid => "helicoid",
            SurfaceKind::Enneper => "enneper",
            SurfaceKind::Scherk => "scherk",
            SurfaceKind::Hold => "hold",
            SurfaceKind::QuarterPeach => "quarter-peach",
            SurfaceKind::FullPeach => "full-peach",
            SurfaceKind::SlottedSphere => "slotted-sphere",
            SurfaceKind::Costa => "costa",
            SurfaceKind::Shell => "shell",
        }
    }

    /// The registered implementation for this kind.
    pub fn surface(self) -> &'static dyn Surface {
        match self {
            SurfaceKind::Catenoid => &Catenoid,
            SurfaceKind::Helicoid => &Helicoid,
            SurfaceKind::Enneper => &Enneper,
            SurfaceKind::Scherk => &Scherk,
            SurfaceKind::Hold => &Hold,
            SurfaceKind::QuarterPeach => &QuarterPeach,
            SurfaceKind::FullPeach => &FullPeach,
            SurfaceKind::SlottedSphere => &SlottedSphere,
            SurfaceKind::Costa => &Costa,
            SurfaceKind::Shell => &Shell,
        }
    }
}

impl fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Running per-axis maxima of parametrized coordinates, starting at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinateExtent {
    pub max: [f64; 3],
}

impl CoordinateExtent {
    pub fn record(&mut self, p: &[f64; 3]) {
        for d in 0..3 {
            self.max[d] = self.max[d].max(p[d]);
        }
    }
}

pub trait Surface: Sync {
    fn kind(&self) -> SurfaceKind;

    /// Maps reference coordinates `(u, v)` to a point in 3D.
    fn parametrize(&self, u: f64, v: f64, extent: &mut CoordinateExtent) -> Result<[f64; 3]>;

    /// Whether the builder should run [`Surface::parametrize`] over the nodes.
    fn has_parametrization(&self) -> bool {
        true
    }

    /// Reference topology; the default is the structured unit-square grid
    /// curved at the configured order.
    fn build_topology(&self, options: &SurfaceOptions) -> Result<SurfaceMesh> {
        let mut mesh = SurfaceMesh::cartesian(options.nx, options.ny)?;
        mesh.set_curvature(options.order)?;
        Ok(mesh)
    }

    fn postprocess_boundary(&self, _mesh: &mut SurfaceMesh) -> Result<()> {
        Ok(())
    }

    fn snap(&self, mesh: &mut SurfaceMesh, _extent: &CoordinateExtent) -> Result<()> {
        snap_near_zero(mesh)
    }

    /// Essential true dofs; the default fixes every boundary facet.
    fn essential_dofs(&self, space: &FunctionSpace, mesh: &SurfaceMesh) -> Result<Vec<usize>> {
        space.essential_dofs_from_attributes(mesh, None)
    }
}

pub fn snap_near_zero(mesh: &mut SurfaceMesh) -> Result<()> {
    mesh.map_nodes(|x| {
        for c in x.iter_mut() {
            if c.abs() < SNAP_EPS {
                *c = 0.0;
            }
        }
        Ok(())
    })
}

pub fn snap_to_unit_sphere(mesh: &mut SurfaceMesh) -> Result<()> {
    mesh.map_nodes(|x| {
        let norm = (x[0] * x[0] + x[1] * x[1] + x[2] * x[2]).sqrt();
        if !(norm > 0.0) {
            return Err(invalid_config("cannot project the origin onto the unit sphere"));
        }
        for c in x.iter_mut() {
            *c /= norm;
        }
        Ok(())
    })
}

/// Identifies the last grid column with the first one, closing the seam of a
/// periodic parametrization.
pub(crate) fn weld_periodic_columns(mesh: &mut SurfaceMesh, options: &SurfaceOptions) -> Result<()> {
    if options.nx < 3 {
        return Err(invalid_config(format!(
            "a periodic grid needs nx >= 3, got {}",
            options.nx
        )));
    }
    let mut map: Vec<usize> = (0..mesh.num_vertices()).collect();
    for j in 0..=options.ny {
        map[options.nx + j * (options.nx + 1)] = j * (options.nx + 1);
    }
    mesh.weld_vertices(&map)?;
    mesh.remove_unused_vertices();
    mesh.remove_internal_boundaries();
    Ok(())
}
