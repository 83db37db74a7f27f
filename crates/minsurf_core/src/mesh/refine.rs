use super::{edge_key, BoundaryFacet, Cell, Edge, HangingEdge, SurfaceMesh, CELL_EDGES};
use crate::basis::LagrangeBasis;
use crate::error::{invalid_config, Result};
use log::debug;
use rand::Rng;
use std::collections::HashMap;

/// Reference coordinates of the midpoints of the four cell edges.
const EDGE_MIDPOINTS: [[f64; 2]; 4] = [[0.5, 0.0], [1.0, 0.5], [0.5, 1.0], [0.0, 0.5]];

/// Offsets of the four children in the parent's reference square.
const CHILD_OFFSETS: [[f64; 2]; 4] = [[0.0, 0.0], [0.5, 0.0], [0.5, 0.5], [0.0, 0.5]];

impl SurfaceMesh {
    /// Splits every cell into four.
    pub fn uniform_refinement(&mut self) -> Result<()> {
        let marked = vec![true; self.cells.len()];
        self.refine_cells(&marked)?;
        Ok(())
    }

    /// Splits each cell with probability `fraction`, leaving hanging edges
    /// between refined and unrefined neighbors. Returns the number of cells
    /// that were split.
    pub fn random_refinement<R: Rng>(&mut self, fraction: f64, rng: &mut R) -> Result<usize> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(invalid_config(format!(
                "refinement fraction must lie in [0, 1], got {fraction}"
            )));
        }
        let marked: Vec<bool> = (0..self.cells.len()).map(|_| rng.gen_bool(fraction)).collect();
        self.refine_cells(&marked)
    }

    fn refine_cells(&mut self, marked: &[bool]) -> Result<usize> {
        if !self.hanging.is_empty() {
            return Err(invalid_config(
                "mesh already has hanging edges; only one non-conforming level is supported",
            ));
        }
        let basis = LagrangeBasis::new(self.order);
        let mut incident: HashMap<Edge, Vec<usize>> = HashMap::new();
        for (c, cell) in self.cells.iter().enumerate() {
            for [a, b] in CELL_EDGES {
                incident
                    .entry(edge_key(cell.vertices[a], cell.vertices[b]))
                    .or_default()
                    .push(c);
            }
        }

        let mut vertices = self.vertices.clone();
        let mut midpoints: HashMap<Edge, usize> = HashMap::new();
        let mut cells = Vec::with_capacity(self.cells.len() * 2);
        let mut nodes = Vec::with_capacity(self.nodes.len() * 2);
        let mut hanging = Vec::new();
        let per_cell = self.nodes_per_cell();
        let mut refined = 0usize;

        for (c, cell) in self.cells.iter().enumerate() {
            if !marked[c] {
                cells.push(*cell);
                nodes.extend_from_slice(&self.nodes[c * per_cell..(c + 1) * per_cell]);
                continue;
            }
            refined += 1;

            let mut m = [0usize; 4];
            for (e, [a, b]) in CELL_EDGES.into_iter().enumerate() {
                let key = edge_key(cell.vertices[a], cell.vertices[b]);
                m[e] = match midpoints.get(&key) {
                    Some(&index) => index,
                    None => {
                        let [s, t] = EDGE_MIDPOINTS[e];
                        let index = vertices.len();
                        vertices.push(self.eval_cell(&basis, c, s, t));
                        midpoints.insert(key, index);
                        let coarse_neighbor = incident
                            .get(&key)
                            .map(|owners| owners.iter().any(|&o| o != c && !marked[o]))
                            .unwrap_or(false);
                        if coarse_neighbor {
                            hanging.push(HangingEdge {
                                parent: key,
                                midpoint: index,
                            });
                        }
                        index
                    }
                };
            }
            let center = vertices.len();
            vertices.push(self.eval_cell(&basis, c, 0.5, 0.5));

            let [v0, v1, v2, v3] = cell.vertices;
            let children = [
                [v0, m[0], center, m[3]],
                [m[0], v1, m[1], center],
                [center, m[1], v2, m[2]],
                [m[3], center, m[2], v3],
            ];
            for (child, [ds, dt]) in children.into_iter().zip(CHILD_OFFSETS) {
                cells.push(Cell {
                    vertices: child,
                    attribute: cell.attribute,
                });
                for &t in basis.nodes() {
                    for &s in basis.nodes() {
                        nodes.push(self.eval_cell(&basis, c, ds + 0.5 * s, dt + 0.5 * t));
                    }
                }
            }
        }

        let mut boundary = Vec::with_capacity(self.boundary.len() * 2);
        for facet in &self.boundary {
            let [a, b] = facet.vertices;
            match midpoints.get(&edge_key(a, b)) {
                Some(&mid) => {
                    boundary.push(BoundaryFacet {
                        vertices: [a, mid],
                        attribute: facet.attribute,
                    });
                    boundary.push(BoundaryFacet {
                        vertices: [mid, b],
                        attribute: facet.attribute,
                    });
                }
                None => boundary.push(*facet),
            }
        }

        self.vertices = vertices;
        self.cells = cells;
        self.nodes = nodes;
        self.boundary = boundary;
        self.hanging = hanging;
        self.sync_vertices();
        debug!(
            "refined {refined} cells: {} vertices, {} cells, {} hanging edges",
            self.vertices.len(),
            self.cells.len(),
            self.hanging.len()
        );
        Ok(refined)
    }
}
