//! Continuous H1 Lagrange space of order `p` over a [`SurfaceMesh`].
//!
//! Scalar dofs are numbered vertices first (dof `v` is vertex `v`), then
//! `p - 1` dofs per edge, then `(p - 1)^2` interior dofs per cell. Edge dofs
//! run from the edge's smaller vertex index to the larger one. Dofs sitting
//! on the fine side of a hanging edge are slaves: their values are fixed by
//! the coarse edge's trace, and only the remaining "true" dofs are unknowns.

mod assembly;

pub use assembly::{block_diagonal, BlockDiagonal, LaplaceOperator, MatrixFreeLaplace};

use crate::basis::LagrangeBasis;
use crate::error::{corruption, invalid_config, Result};
use crate::mesh::{edge_key, Edge, SurfaceMesh, CELL_EDGES};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Layout of a three-component dof array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DofOrdering {
    /// `x0 y0 z0 x1 y1 z1 ...`
    ByNode,
    /// `x0 x1 ... y0 y1 ... z0 z1 ...`
    ByComponent,
}

impl DofOrdering {
    pub fn index(self, num_nodes: usize, node: usize, component: usize) -> usize {
        match self {
            DofOrdering::ByNode => 3 * node + component,
            DofOrdering::ByComponent => component * num_nodes + node,
        }
    }
}

/// Rewrites a three-component array from one layout into another.
pub fn convert_layout(values: &DVector<f64>, from: DofOrdering, to: DofOrdering) -> DVector<f64> {
    if from == to {
        return values.clone();
    }
    let n = values.len() / 3;
    let mut out = DVector::zeros(values.len());
    for i in 0..n {
        for d in 0..3 {
            out[to.index(n, i, d)] = values[from.index(n, i, d)];
        }
    }
    out
}

/// Expands a scalar essential set to the three blocks of a `ByComponent` vector.
pub fn vector_essential(essential: &[usize], num_true_dofs: usize) -> Vec<usize> {
    (0..3)
        .flat_map(|d| essential.iter().map(move |&i| d * num_true_dofs + i))
        .collect()
}

#[derive(Debug, Clone)]
pub struct FunctionSpace {
    order: usize,
    num_dofs: usize,
    element_dofs: Vec<Vec<usize>>,
    edge_offsets: HashMap<Edge, usize>,
    /// Full dof -> weighted true dofs. Identity for non-slave dofs.
    expansion: Vec<Vec<(usize, f64)>>,
    true_to_full: Vec<usize>,
    num_slaves: usize,
}

impl FunctionSpace {
    pub fn new(mesh: &SurfaceMesh, order: usize) -> Result<Self> {
        if order == 0 {
            return Err(invalid_config("function space order must be at least 1"));
        }
        if mesh.order() != order {
            return Err(invalid_config(format!(
                "mesh geometry has order {} but the space needs order {order}",
                mesh.order()
            )));
        }
        let p = order;
        let n1 = p + 1;
        let mut next = mesh.num_vertices();

        let mut edge_offsets: HashMap<Edge, usize> = HashMap::new();
        for cell in mesh.cells() {
            for [a, b] in CELL_EDGES {
                edge_offsets
                    .entry(edge_key(cell.vertices[a], cell.vertices[b]))
                    .or_insert_with(|| {
                        let offset = next;
                        next += p - 1;
                        offset
                    });
            }
        }

        let mut element_dofs = Vec::with_capacity(mesh.num_cells());
        for cell in mesh.cells() {
            let mut dofs = vec![0usize; n1 * n1];
            let local = |a: usize, b: usize| a + b * n1;
            dofs[local(0, 0)] = cell.vertices[0];
            dofs[local(p, 0)] = cell.vertices[1];
            dofs[local(p, p)] = cell.vertices[2];
            dofs[local(0, p)] = cell.vertices[3];

            for (e, [a, b]) in CELL_EDGES.into_iter().enumerate() {
                let (start, end) = (cell.vertices[a], cell.vertices[b]);
                let key = edge_key(start, end);
                let offset = edge_offsets
                    .get(&key)
                    .copied()
                    .ok_or_else(|| corruption(format!("edge {key:?} has no dofs")))?;
                for k in 1..p {
                    let position = match e {
                        0 => local(k, 0),
                        1 => local(p, k),
                        2 => local(p - k, p),
                        _ => local(0, p - k),
                    };
                    let j = if start == key.0 { k - 1 } else { p - 1 - k };
                    dofs[position] = offset + j;
                }
            }

            for b in 1..p {
                for a in 1..p {
                    dofs[local(a, b)] = next + (a - 1) + (b - 1) * (p - 1);
                }
            }
            next += (p - 1) * (p - 1);
            element_dofs.push(dofs);
        }
        let num_dofs = next;

        // Slave dofs of hanging edges, each a combination of the coarse
        // edge's dofs listed from its smaller vertex to its larger one.
        let basis = LagrangeBasis::new(p);
        let mut constraints: HashMap<usize, Vec<(usize, f64)>> = HashMap::new();
        for hanging in mesh.hanging_edges() {
            let (lo, hi) = hanging.parent;
            let parent_offset = edge_offsets
                .get(&hanging.parent)
                .copied()
                .ok_or_else(|| corruption(format!("hanging edge {:?} has no dofs", hanging.parent)))?;
            let masters: Vec<usize> = (0..=p)
                .map(|k| match k {
                    0 => lo,
                    k if k == p => hi,
                    k => parent_offset + k - 1,
                })
                .collect();
            let weights_at = |sigma: f64| -> Vec<(usize, f64)> {
                basis
                    .values(sigma)
                    .into_iter()
                    .zip(&masters)
                    .filter(|(w, _)| w.abs() > 1e-15)
                    .map(|(w, &m)| (m, w))
                    .collect()
            };

            constraints.insert(hanging.midpoint, weights_at(0.5));
            for end in [lo, hi] {
                let half = edge_key(end, hanging.midpoint);
                let offset = edge_offsets
                    .get(&half)
                    .copied()
                    .ok_or_else(|| corruption(format!("half edge {half:?} has no dofs")))?;
                for j in 0..p - 1 {
                    let along = (j + 1) as f64 / p as f64;
                    let from_end = if half.0 == end { along } else { 1.0 - along };
                    let sigma = if end == lo {
                        0.5 * from_end
                    } else {
                        1.0 - 0.5 * from_end
                    };
                    constraints.insert(offset + j, weights_at(sigma));
                }
            }
        }

        let mut true_index = vec![usize::MAX; num_dofs];
        let mut true_to_full = Vec::with_capacity(num_dofs - constraints.len());
        for dof in 0..num_dofs {
            if !constraints.contains_key(&dof) {
                true_index[dof] = true_to_full.len();
                true_to_full.push(dof);
            }
        }
        let mut expansion = Vec::with_capacity(num_dofs);
        for dof in 0..num_dofs {
            match constraints.get(&dof) {
                Some(masters) => {
                    let mut row = Vec::with_capacity(masters.len());
                    for &(m, w) in masters {
                        if true_index[m] == usize::MAX {
                            return Err(corruption(format!(
                                "dof {dof} is constrained by another slave dof {m}"
                            )));
                        }
                        row.push((true_index[m], w));
                    }
                    expansion.push(row);
                }
                None => expansion.push(vec![(true_index[dof], 1.0)]),
            }
        }

        Ok(Self {
            order,
            num_dofs,
            element_dofs,
            edge_offsets,
            expansion,
            true_to_full,
            num_slaves: constraints.len(),
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of scalar dofs including slaves.
    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    pub fn num_true_dofs(&self) -> usize {
        self.true_to_full.len()
    }

    pub fn num_slave_dofs(&self) -> usize {
        self.num_slaves
    }

    pub fn element_dofs(&self, cell: usize) -> &[usize] {
        &self.element_dofs[cell]
    }

    pub fn num_cells(&self) -> usize {
        self.element_dofs.len()
    }

    /// Weighted true dofs a full dof is made of.
    pub fn expansion(&self, dof: usize) -> &[(usize, f64)] {
        &self.expansion[dof]
    }

    /// Full dof values from true dof values.
    pub fn prolong(&self, x: &[f64]) -> Vec<f64> {
        self.expansion
            .iter()
            .map(|row| row.iter().map(|&(t, w)| w * x[t]).sum())
            .collect()
    }

    /// Accumulates the transpose of the prolongation: `y += P^T y_full`.
    pub fn restrict_transpose_add(&self, y_full: &[f64], y: &mut [f64]) {
        for (row, &value) in self.expansion.iter().zip(y_full) {
            for &(t, w) in row {
                y[t] += w * value;
            }
        }
    }

    /// Coordinates of every full dof, read from the mesh's element nodes.
    pub fn node_values(&self, mesh: &SurfaceMesh) -> Vec<[f64; 3]> {
        let mut values = vec![[0.0; 3]; self.num_dofs];
        for (c, dofs) in self.element_dofs.iter().enumerate() {
            for (&dof, node) in dofs.iter().zip(mesh.cell_nodes(c)) {
                values[dof] = *node;
            }
        }
        values
    }

    /// Three-component coordinates of the true dofs.
    pub fn true_coordinates(&self, mesh: &SurfaceMesh, ordering: DofOrdering) -> DVector<f64> {
        let values = self.node_values(mesh);
        let n = self.num_true_dofs();
        let mut out = DVector::zeros(3 * n);
        for (t, &dof) in self.true_to_full.iter().enumerate() {
            for d in 0..3 {
                out[ordering.index(n, t, d)] = values[dof][d];
            }
        }
        out
    }

    /// Writes true dof coordinates back into the mesh's element nodes,
    /// interpolating slave dofs from their masters.
    pub fn scatter_coordinates(
        &self,
        mesh: &mut SurfaceMesh,
        coordinates: &DVector<f64>,
        ordering: DofOrdering,
    ) -> Result<()> {
        let n = self.num_true_dofs();
        if coordinates.len() != 3 * n {
            return Err(corruption(format!(
                "expected {} coordinates, got {}",
                3 * n,
                coordinates.len()
            )));
        }
        let mut full = Vec::with_capacity(3);
        for d in 0..3 {
            let component: Vec<f64> = (0..n).map(|t| coordinates[ordering.index(n, t, d)]).collect();
            full.push(self.prolong(&component));
        }
        let mut nodes = Vec::with_capacity(mesh.nodes().len());
        for dofs in &self.element_dofs {
            for &dof in dofs {
                nodes.push([full[0][dof], full[1][dof], full[2][dof]]);
            }
        }
        mesh.set_nodes(nodes)
    }

    /// True dofs on boundary facets whose attribute is listed, or on every
    /// boundary facet when `attributes` is `None`. Sorted, without repeats.
    pub fn essential_dofs_from_attributes(
        &self,
        mesh: &SurfaceMesh,
        attributes: Option<&[i32]>,
    ) -> Result<Vec<usize>> {
        let mut full = Vec::new();
        for facet in mesh.boundary() {
            if attributes.map_or(false, |set| !set.contains(&facet.attribute)) {
                continue;
            }
            let [a, b] = facet.vertices;
            full.push(a);
            full.push(b);
            let key = edge_key(a, b);
            let offset = self
                .edge_offsets
                .get(&key)
                .copied()
                .ok_or_else(|| corruption(format!("boundary facet {key:?} is not a mesh edge")))?;
            full.extend(offset..offset + self.order - 1);
        }
        let mut essential: Vec<usize> = full
            .into_iter()
            .filter_map(|dof| match self.expansion[dof].as_slice() {
                [(t, w)] if *w == 1.0 && self.true_to_full[*t] == dof => Some(*t),
                _ => None,
            })
            .collect();
        essential.sort_unstable();
        essential.dedup();
        Ok(essential)
    }

    /// True dofs whose current coordinate satisfies `predicate`.
    pub fn essential_dofs_where<F>(&self, mesh: &SurfaceMesh, predicate: F) -> Vec<usize>
    where
        F: Fn(&[f64; 3]) -> bool,
    {
        let values = self.node_values(mesh);
        self.true_to_full
            .iter()
            .enumerate()
            .filter(|(_, &dof)| predicate(&values[dof]))
            .map(|(t, _)| t)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn curved_grid(nx: usize, ny: usize, order: usize) -> SurfaceMesh {
        let mut mesh = SurfaceMesh::cartesian(nx, ny).expect("grid");
        mesh.set_curvature(order).expect("curvature");
        mesh
    }

    #[test]
    fn dof_count_matches_a_structured_grid() {
        for order in 1..=3 {
            let mesh = curved_grid(3, 2, order);
            let space = FunctionSpace::new(&mesh, order).expect("space");
            let expected = (3 * order + 1) * (2 * order + 1);
            assert_eq!(space.num_dofs(), expected, "order {order}");
            assert_eq!(space.num_true_dofs(), expected);
        }
    }

    #[test]
    fn shared_edges_share_dofs_in_matching_positions() {
        let mesh = curved_grid(2, 1, 3);
        let space = FunctionSpace::new(&mesh, 3).expect("space");
        let values = space.node_values(&mesh);
        // Every element node must agree with the coordinate stored for its dof.
        for c in 0..mesh.num_cells() {
            for (&dof, node) in space.element_dofs(c).iter().zip(mesh.cell_nodes(c)) {
                for d in 0..3 {
                    assert!((values[dof][d] - node[d]).abs() < 1e-14, "dof {dof} of cell {c}");
                }
            }
        }
    }

    #[test]
    fn layout_conversion_is_lossless() {
        let values = DVector::from_iterator(12, (0..12).map(|i| i as f64));
        let by_component = convert_layout(&values, DofOrdering::ByNode, DofOrdering::ByComponent);
        assert_eq!(by_component[1], 3.0);
        assert_eq!(by_component[4], 1.0);
        let back = convert_layout(&by_component, DofOrdering::ByComponent, DofOrdering::ByNode);
        assert_eq!(back, values);
    }

    #[test]
    fn boundary_dofs_cover_the_perimeter() {
        let mesh = curved_grid(2, 2, 2);
        let space = FunctionSpace::new(&mesh, 2).expect("space");
        let all = space
            .essential_dofs_from_attributes(&mesh, None)
            .expect("boundary dofs");
        assert_eq!(all.len(), 16);
        let bottom = space
            .essential_dofs_from_attributes(&mesh, Some(&[1]))
            .expect("bottom dofs");
        assert_eq!(bottom.len(), 5);
        let values = space.node_values(&mesh);
        let on_left = space.essential_dofs_where(&mesh, |x| x[0].abs() < 1e-14);
        assert_eq!(on_left.len(), 5);
        assert!(on_left.iter().all(|&t| values[t][0].abs() < 1e-14));
        assert_eq!(vector_essential(&bottom, space.num_true_dofs()).len(), 15);
    }

    #[test]
    fn hanging_dofs_interpolate_the_coarse_trace() {
        let order = 2;
        let mut mesh = curved_grid(3, 3, order);
        let mut rng = StdRng::seed_from_u64(3);
        mesh.random_refinement(0.4, &mut rng).expect("refine");
        let space = FunctionSpace::new(&mesh, order).expect("space");
        assert_eq!(
            space.num_slave_dofs(),
            mesh.hanging_edges().len() * (2 * order - 1)
        );
        // A quadratic field is reproduced exactly through the constraints.
        let f = |x: &[f64; 3]| x[0] * x[0] - 2.0 * x[0] * x[1] + x[1];
        let values = space.node_values(&mesh);
        let mut true_values = vec![0.0; space.num_true_dofs()];
        for t in 0..space.num_true_dofs() {
            let dof = space.true_to_full[t];
            true_values[t] = f(&values[dof]);
        }
        let full = space.prolong(&true_values);
        for (dof, value) in full.iter().enumerate() {
            assert!((value - f(&values[dof])).abs() < 1e-12, "dof {dof}");
        }
    }

    #[test]
    fn scatter_round_trips_the_mesh_geometry() {
        let mut mesh = curved_grid(2, 2, 3);
        mesh.map_nodes(|x| {
            x[2] = (x[0] * 3.0).sin() * x[1];
            Ok(())
        })
        .expect("lift");
        let space = FunctionSpace::new(&mesh, 3).expect("space");
        let before = mesh.nodes().to_vec();
        let coords = space.true_coordinates(&mesh, DofOrdering::ByComponent);
        space
            .scatter_coordinates(&mut mesh, &coords, DofOrdering::ByComponent)
            .expect("scatter");
        for (after, before) in mesh.nodes().iter().zip(&before) {
            for d in 0..3 {
                assert!((after[d] - before[d]).abs() < 1e-13, "{after:?} vs {before:?}");
            }
        }
    }
}
