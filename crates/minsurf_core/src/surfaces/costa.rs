use super::{CoordinateExtent, Surface, SurfaceKind};
use crate::config::SurfaceOptions;
use crate::error::{instability, invalid_config, Result};
use crate::mesh::{Cell, SurfaceMesh};
use crate::special::WeierstrassLattice;
use num_complex::Complex64;
use std::f64::consts::PI;

/// Costa's minimal surface from the Weierstrass data on the square lattice.
///
/// The unit square is folded onto its lower-left quarter; the other quarters
/// are mirror images. Cells touching the ends and the poles of the
/// representation are left out of the grid.
pub struct Costa;

fn skipped(i: usize, j: usize, nx: usize, ny: usize) -> bool {
    let corner = (i == 0 || i + 1 == nx) && (j == 0 || j + 1 == ny);
    let horizontal_pole = (j == 0 || j + 1 == ny) && (nx as i64 - 2 * i as i64 - 1).abs() <= 1;
    let vertical_pole = (i == 0 || i + 1 == nx) && (ny as i64 - 2 * j as i64 - 1).abs() <= 1;
    corner || horizontal_pole || vertical_pole
}

impl Surface for Costa {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Costa
    }

    fn parametrize(&self, x: f64, y: f64, extent: &mut CoordinateExtent) -> Result<[f64; 3]> {
        let x_top = x > 0.5;
        let y_top = y > 0.5;
        let u = if x_top { 1.0 - x } else { x };
        let v = if y_top { 1.0 - y } else { y };

        let lattice = WeierstrassLattice::square()?;
        let i = Complex64::i();
        let w = Complex64::new(u, v);
        let e1 = lattice.e1();
        let pw = lattice.p(w)?;
        let zw = lattice.zeta(w)?;
        let dw = lattice.zeta(w - lattice.w1)? - lattice.zeta(w - lattice.w3)?;

        let mut p = [
            0.5 * (PI * (u + PI / (4.0 * e1)) - zw + PI / (2.0 * e1) * dw).re,
            0.5 * (PI * (v + PI / (4.0 * e1)) - i * zw - PI * i / (2.0 * e1) * dw).re,
            (PI / 2.0).sqrt() * ((pw - e1) / (pw + e1)).norm().ln(),
        ];
        if y_top {
            p[1] = -p[1];
        }
        if x_top {
            p[0] = -p[0];
        }
        if p.iter().any(|c| c.is_nan()) {
            return Err(instability(format!("Costa parametrization is NaN at ({x}, {y})")));
        }
        extent.record(&p);
        Ok(p)
    }

    fn build_topology(&self, options: &SurfaceOptions) -> Result<SurfaceMesh> {
        let (nx, ny) = (options.nx, options.ny);
        if nx <= 2 || ny <= 2 {
            return Err(invalid_config(format!(
                "Costa needs nx, ny > 2, got {nx}x{ny}"
            )));
        }
        let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1));
        for j in 0..=ny {
            for i in 0..=nx {
                vertices.push([i as f64 / nx as f64, j as f64 / ny as f64, 0.0]);
            }
        }
        let mut cells = Vec::new();
        for j in 0..ny {
            for i in 0..nx {
                if skipped(i, j, nx, ny) {
                    continue;
                }
                let v = |i: usize, j: usize| i + j * (nx + 1);
                cells.push(Cell {
                    vertices: [v(i, j), v(i + 1, j), v(i + 1, j + 1), v(i, j + 1)],
                    attribute: 1,
                });
            }
        }
        let mut mesh = SurfaceMesh::new(vertices, cells, Vec::new())?;
        mesh.remove_unused_vertices();
        mesh.generate_boundary(1);
        mesh.set_curvature(options.order)?;
        Ok(mesh)
    }

    /// Rescales each axis by its parametrized maximum, z by the golden ratio
    /// on top.
    fn snap(&self, mesh: &mut SurfaceMesh, extent: &CoordinateExtent) -> Result<()> {
        if extent.max.iter().any(|&m| !(m > 0.0)) {
            return Err(instability(format!(
                "Costa extent must be positive on every axis, got {:?}",
                extent.max
            )));
        }
        let phi = (1.0 + 5.0f64.sqrt()) / 2.0;
        let scale = [extent.max[0], extent.max[1], phi * extent.max[2]];
        mesh.map_nodes(|x| {
            for d in 0..3 {
                x[d] /= scale[d];
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_grid_drops_corner_and_pole_cells() {
        let options = SurfaceOptions {
            order: 1,
            ..SurfaceOptions::default()
        };
        let mesh = Costa.build_topology(&options).expect("costa grid");
        // 6x6 grid minus 4 corners and 2 pole cells per side.
        assert_eq!(mesh.num_cells(), 36 - 4 - 8);
        mesh.validate().expect("valid");

        let odd = SurfaceOptions { nx: 5, ny: 5, ..options };
        let mesh = Costa.build_topology(&odd).expect("odd costa grid");
        assert_eq!(mesh.num_cells(), 25 - 4 - 4);
    }

    #[test]
    fn small_grids_are_rejected() {
        let options = SurfaceOptions {
            nx: 2,
            ..SurfaceOptions::default()
        };
        assert!(matches!(
            Costa.build_topology(&options),
            Err(crate::error::SurfaceError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn parametrization_is_mirror_symmetric() {
        let mut extent = CoordinateExtent::default();
        let p = Costa.parametrize(0.2, 0.3, &mut extent).expect("lower left");
        let q = Costa.parametrize(0.8, 0.3, &mut extent).expect("lower right");
        let r = Costa.parametrize(0.2, 0.7, &mut extent).expect("upper left");
        assert!((p[0] + q[0]).abs() < 1e-12 && (p[1] - q[1]).abs() < 1e-12);
        assert!((p[1] + r[1]).abs() < 1e-12 && (p[2] - r[2]).abs() < 1e-12);
        assert!(p.iter().all(|c| c.is_finite()));
        assert!(extent.max.iter().all(|&m| m >= 0.0));
    }
}
