use super::{weld_periodic_columns, CoordinateExtent, Surface, SurfaceKind, SNAP_EPS};
use crate::config::SurfaceOptions;
use crate::error::Result;
use crate::mesh::SurfaceMesh;
use std::f64::consts::PI;

/// Catenoid neck stretched to radius 3.2, seam welded along `u = 0`.
pub struct Catenoid;

impl Surface for Catenoid {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Catenoid
    }

    fn parametrize(&self, x: f64, y: f64, _extent: &mut CoordinateExtent) -> Result<[f64; 3]> {
        let u = 2.0 * PI * x;
        let v = 2.0 * PI * (2.0 * y - 1.0) / 3.0;
        Ok([3.2 * u.cos(), 3.2 * u.sin(), v])
    }

    fn build_topology(&self, options: &SurfaceOptions) -> Result<SurfaceMesh> {
        let mut mesh = SurfaceMesh::cartesian(options.nx, options.ny)?;
        mesh.set_curvature(options.order)?;
        weld_periodic_columns(&mut mesh, options)?;
        Ok(mesh)
    }
}

pub struct Helicoid;

impl Surface for Helicoid {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Helicoid
    }

    fn parametrize(&self, x: f64, y: f64, _extent: &mut CoordinateExtent) -> Result<[f64; 3]> {
        let a = 1.0;
        let u = 2.0 * PI * x;
        let v = 2.0 * PI * (2.0 * y - 1.0) / 3.0;
        Ok([a * u.cos() * v.sinh(), a * u.sin() * v.sinh(), a * u])
    }
}

pub struct Enneper;

impl Surface for Enneper {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Enneper
    }

    fn parametrize(&self, x: f64, y: f64, _extent: &mut CoordinateExtent) -> Result<[f64; 3]> {
        // (u, v) in [-2, 2]^2
        let u = 2.0 * (2.0 * x - 1.0);
        let v = 2.0 * (2.0 * y - 1.0);
        Ok([
            u - u * u * u / 3.0 + u * v * v,
            -v - u * u * v + v * v * v / 3.0,
            u * u - v * v,
        ])
    }
}

/// One cell of Scherk's doubly periodic surface.
pub struct Scherk;

impl Surface for Scherk {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Scherk
    }

    fn parametrize(&self, x: f64, y: f64, _extent: &mut CoordinateExtent) -> Result<[f64; 3]> {
        let alpha = 0.49;
        let u = alpha * PI * (2.0 * x - 1.0);
        let v = alpha * PI * (2.0 * y - 1.0);
        Ok([u, v, (u.cos() / v.cos()).ln()])
    }
}

/// Wavy band around the z axis, welded like the catenoid.
pub struct Hold;

impl Surface for Hold {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Hold
    }

    fn parametrize(&self, x: f64, y: f64, _extent: &mut CoordinateExtent) -> Result<[f64; 3]> {
        let u = 2.0 * PI * x;
        let v = y;
        let radius = 1.0 + 0.3 * (3.0 * u + PI * v).sin();
        Ok([u.cos() * radius, u.sin() * radius, v])
    }

    fn build_topology(&self, options: &SurfaceOptions) -> Result<SurfaceMesh> {
        let mut mesh = SurfaceMesh::cartesian(options.nx, options.ny)?;
        mesh.set_curvature(options.order)?;
        weld_periodic_columns(&mut mesh, options)?;
        Ok(mesh)
    }
}

/// Logarithmic spiral shell.
pub struct Shell;

impl Surface for Shell {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Shell
    }

    fn parametrize(&self, x: f64, y: f64, _extent: &mut CoordinateExtent) -> Result<[f64; 3]> {
        let u = 2.0 * PI * x;
        let v = 21.0 * y - 15.0;
        let growth = 1.16f64.powf(v);
        Ok([
            growth * v.cos() * (1.0 + u.cos()),
            -growth * v.sin() * (1.0 + u.cos()),
            -2.0 * growth * (1.0 + u.sin()),
        ])
    }
}

/// Quarter of a square tent pinned along the `y = 0` base line.
///
/// The map is applied to straight (order 1) geometry; boundary facets lying
/// on the base line away from the apex get attribute 1, every other facet 2.
pub struct QuarterPeach;

impl Surface for QuarterPeach {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::QuarterPeach
    }

    fn parametrize(&self, x0: f64, x1: f64, _extent: &mut CoordinateExtent) -> Result<[f64; 3]> {
        let x = 2.0 * x0 - 1.0;
        let y = x1;
        let r = (x * x + y * y).sqrt();
        let t = if x == 0.0 {
            PI / 2.0
        } else if y == 0.0 && x > 0.0 {
            0.0
        } else if y == 0.0 && x < 0.0 {
            PI
        } else {
            (x / r).acos()
        };
        let on_y_axis = PI / 4.0 < t && t < 3.0 * PI / 4.0;
        let radius = if on_y_axis {
            (1.0 + x * x).sqrt()
        } else {
            (1.0 + y * y).sqrt()
        };
        let gamma = r / radius;
        Ok([gamma * t.cos(), gamma * t.sin(), 1.0 - gamma])
    }

    fn build_topology(&self, options: &SurfaceOptions) -> Result<SurfaceMesh> {
        SurfaceMesh::cartesian(options.nx, options.ny)
    }

    fn postprocess_boundary(&self, mesh: &mut SurfaceMesh) -> Result<()> {
        let vertices = mesh.vertices().to_vec();
        for facet in mesh.boundary_mut() {
            let [a, b] = facet.vertices.map(|v| vertices[v]);
            let radius_sq = |p: [f64; 3]| p[0] * p[0] + p[1] * p[1];
            let on_base = a[1].abs() <= SNAP_EPS && b[1].abs() <= SNAP_EPS;
            facet.attribute = if on_base && (radius_sq(a) > 0.1 || radius_sq(b) > 0.1) {
                1
            } else {
                2
            };
        }
        Ok(())
    }
}
