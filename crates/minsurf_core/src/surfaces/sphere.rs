use super::{snap_to_unit_sphere, CoordinateExtent, Surface, SurfaceKind, SNAP_EPS};
use crate::config::SurfaceOptions;
use crate::error::{invalid_config, Result};
use crate::fem::FunctionSpace;
use crate::mesh::{Cell, SurfaceMesh};

fn no_parametrization(kind: SurfaceKind) -> crate::error::SurfaceError {
    invalid_config(format!("{kind} is built from explicit vertices and has no parametrization"))
}

/// Closed cube projected onto the unit sphere, pinned along two half great
/// circles.
pub struct FullPeach;

const CUBE_VERTICES: [[f64; 3]; 8] = [
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, 1.0],
];

const CUBE_FACES: [[usize; 4]; 6] = [
    [3, 2, 1, 0],
    [0, 1, 5, 4],
    [1, 2, 6, 5],
    [2, 3, 7, 6],
    [3, 0, 4, 7],
    [4, 5, 6, 7],
];

impl Surface for FullPeach {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::FullPeach
    }

    fn parametrize(&self, _u: f64, _v: f64, _extent: &mut CoordinateExtent) -> Result<[f64; 3]> {
        Err(no_parametrization(self.kind()))
    }

    fn has_parametrization(&self) -> bool {
        false
    }

    fn build_topology(&self, _options: &SurfaceOptions) -> Result<SurfaceMesh> {
        let cells = CUBE_FACES
            .iter()
            .enumerate()
            .map(|(j, &vertices)| Cell {
                vertices,
                attribute: j as i32 + 1,
            })
            .collect();
        let mut mesh = SurfaceMesh::new(CUBE_VERTICES.to_vec(), cells, Vec::new())?;
        mesh.uniform_refinement()?;
        Ok(mesh)
    }

    fn snap(&self, mesh: &mut SurfaceMesh, _extent: &CoordinateExtent) -> Result<()> {
        snap_to_unit_sphere(mesh)
    }

    fn essential_dofs(&self, space: &FunctionSpace, mesh: &SurfaceMesh) -> Result<Vec<usize>> {
        Ok(space.essential_dofs_where(mesh, |x| {
            let half_x = x[0].abs() < SNAP_EPS && x[1] <= 0.0;
            let half_z = x[2].abs() < SNAP_EPS && x[1] >= 0.0;
            half_x || half_z
        }))
    }
}

/// Cube lattice of 3x3 panels per face with fourteen panels cut out,
/// projected onto the unit sphere.
pub struct SlottedSphere;

const LATTICE: usize = 4;
const PANELS_PER_FACE: usize = (LATTICE - 1) * (LATTICE - 1);

/// `(face, panel)` pairs removed from the lattice.
const SLOTS: [(usize, usize); 14] = [
    (0, 1 + 2 * 3),
    (0, 1 + 3),
    (1, 1 + 2 * 3),
    (1, 1 + 3),
    (3, 1),
    (3, 1 + 3),
    (5, 3),
    (5, 1 + 3),
    (5, 2 + 3),
    (4, 1),
    (4, 1 + 3),
    (4, 1 + 2 * 3),
    (2, 1),
    (2, 1 + 3),
];

impl SlottedSphere {
    fn lattice_vertices() -> Vec<[f64; 3]> {
        let delta = 0.15;
        let coords = [-1.0, -delta, delta, 1.0];
        (0..LATTICE * LATTICE * LATTICE)
            .map(|iv| {
                let ix = iv % LATTICE;
                let iy = (iv / LATTICE) % LATTICE;
                let iz = iv / (LATTICE * LATTICE);
                [coords[ix], coords[iy], coords[iz]]
            })
            .collect()
    }

    /// Panel corners for all six faces, indexed `face * 9 + ix + iy * 3`.
    fn lattice_panels() -> Vec<[usize; 4]> {
        let n = LATTICE;
        let mut panels = vec![[0usize; 4]; 6 * PANELS_PER_FACE];
        for ix in 0..n - 1 {
            for iy in 0..n - 1 {
                let offset = ix + iy * (n - 1);
                panels[offset] = [
                    n * ix + n * n * iy,
                    n * (ix + 1) + n * n * iy,
                    n * (ix + 1) + n * n * (iy + 1),
                    n * ix + n * n * (iy + 1),
                ];
                let x_off = n - 1;
                panels[PANELS_PER_FACE + offset] = [
                    x_off + n * ix + n * n * (iy + 1),
                    x_off + n * (ix + 1) + n * n * (iy + 1),
                    x_off + n * (ix + 1) + n * n * iy,
                    x_off + n * ix + n * n * iy,
                ];
                panels[2 * PANELS_PER_FACE + offset] = [
                    n * n * iy + ix,
                    n * n * iy + ix + 1,
                    n * n * (iy + 1) + ix + 1,
                    n * n * (iy + 1) + ix,
                ];
                let y_off = n * (n - 1);
                panels[3 * PANELS_PER_FACE + offset] = [
                    y_off + n * n * iy + ix,
                    y_off + n * n * iy + ix + 1,
                    y_off + n * n * (iy + 1) + ix + 1,
                    y_off + n * n * (iy + 1) + ix,
                ];
                panels[4 * PANELS_PER_FACE + offset] = [
                    n * iy + ix,
                    n * iy + ix + 1,
                    n * (iy + 1) + ix + 1,
                    n * (iy + 1) + ix,
                ];
                let z_off = n * n * (n - 1);
                panels[5 * PANELS_PER_FACE + offset] = [
                    z_off + n * iy + ix,
                    z_off + n * iy + ix + 1,
                    z_off + n * (iy + 1) + ix + 1,
                    z_off + n * (iy + 1) + ix,
                ];
            }
        }
        panels
    }
}

impl Surface for SlottedSphere {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::SlottedSphere
    }

    fn parametrize(&self, _u: f64, _v: f64, _extent: &mut CoordinateExtent) -> Result<[f64; 3]> {
        Err(no_parametrization(self.kind()))
    }

    fn has_parametrization(&self) -> bool {
        false
    }

    fn build_topology(&self, _options: &SurfaceOptions) -> Result<SurfaceMesh> {
        let removed: Vec<usize> = SLOTS
            .iter()
            .map(|&(face, panel)| face * PANELS_PER_FACE + panel)
            .collect();
        let cells = Self::lattice_panels()
            .into_iter()
            .enumerate()
            .filter(|(j, _)| !removed.contains(j))
            .map(|(j, vertices)| Cell {
                vertices,
                attribute: j as i32 + 1,
            })
            .collect();
        let mut mesh = SurfaceMesh::new(Self::lattice_vertices(), cells, Vec::new())?;
        mesh.remove_unused_vertices();
        mesh.generate_boundary(1);
        Ok(mesh)
    }

    fn snap(&self, mesh: &mut SurfaceMesh, _extent: &CoordinateExtent) -> Result<()> {
        snap_to_unit_sphere(mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_peach_is_a_closed_refined_cube() {
        let mesh = FullPeach
            .build_topology(&SurfaceOptions::default())
            .expect("cube");
        assert_eq!(mesh.num_cells(), 24);
        assert_eq!(mesh.num_vertices(), 26);
        assert!(mesh.boundary().is_empty());
        assert!(mesh.topological_boundary_edges().is_empty());
        mesh.validate().expect("closed cube");
    }

    #[test]
    fn slotted_sphere_has_forty_panels_and_slot_boundaries() {
        let mesh = SlottedSphere
            .build_topology(&SurfaceOptions::default())
            .expect("lattice");
        assert_eq!(mesh.num_cells(), 40);
        assert_eq!(mesh.num_vertices(), 56, "interior lattice points are dropped");
        assert!(!mesh.boundary().is_empty());
        assert_eq!(mesh.boundary_attributes(), vec![1]);
        mesh.validate().expect("slotted lattice");
    }
}
