//! Quadrilateral surface meshes embedded in 3D.
//!
//! Topology lives on the vertex/cell/boundary arrays. Geometry lives on
//! element-local nodes of order `p`: each cell stores `(p + 1)^2` points laid
//! out lexicographically (`a + b * (p + 1)`) over equispaced reference
//! coordinates. Vertex coordinates are kept in sync with the cell corners.

mod refine;

use crate::basis::{eval_tensor, LagrangeBasis};
use crate::error::{corruption, invalid_config, Result};
use std::collections::{HashMap, HashSet};

/// Unordered edge key, smaller vertex first.
pub type Edge = (usize, usize);

pub fn edge_key(a: usize, b: usize) -> Edge {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Corner pairs of the four cell edges, following the cell winding.
pub const CELL_EDGES: [[usize; 2]; 4] = [[0, 1], [1, 2], [2, 3], [3, 0]];

/// Reference coordinates of the four cell corners.
pub const CELL_CORNERS: [[f64; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub vertices: [usize; 4],
    pub attribute: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryFacet {
    pub vertices: [usize; 2],
    pub attribute: i32,
}

/// A coarse edge whose neighbor across it was split once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HangingEdge {
    pub parent: Edge,
    pub midpoint: usize,
}

impl HangingEdge {
    pub fn halves(&self) -> [Edge; 2] {
        [
            edge_key(self.parent.0, self.midpoint),
            edge_key(self.midpoint, self.parent.1),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct SurfaceMesh {
    vertices: Vec<[f64; 3]>,
    cells: Vec<Cell>,
    boundary: Vec<BoundaryFacet>,
    hanging: Vec<HangingEdge>,
    order: usize,
    nodes: Vec<[f64; 3]>,
}

impl SurfaceMesh {
    /// Builds a mesh with straight (order 1) geometry taken from the vertices.
    pub fn new(
        vertices: Vec<[f64; 3]>,
        cells: Vec<Cell>,
        boundary: Vec<BoundaryFacet>,
    ) -> Result<Self> {
        let n = vertices.len();
        if cells.iter().flat_map(|c| c.vertices).any(|v| v >= n)
            || boundary.iter().flat_map(|f| f.vertices).any(|v| v >= n)
        {
            return Err(corruption("vertex index out of range"));
        }
        let mut nodes = Vec::with_capacity(cells.len() * 4);
        for cell in &cells {
            for corner in [0, 1, 3, 2] {
                nodes.push(vertices[cell.vertices[corner]]);
            }
        }
        Ok(Self {
            vertices,
            cells,
            boundary,
            hanging: Vec::new(),
            order: 1,
            nodes,
        })
    }

    /// Structured `nx` x `ny` grid of the unit square in the `z = 0` plane.
    ///
    /// Vertex `(i, j)` has index `i + j * (nx + 1)`. Boundary attributes are
    /// 1 (bottom), 2 (right), 3 (top) and 4 (left).
    pub fn cartesian(nx: usize, ny: usize) -> Result<Self> {
        if nx == 0 || ny == 0 {
            return Err(invalid_config(format!("grid needs nx, ny >= 1, got {nx}x{ny}")));
        }
        let v = |i: usize, j: usize| i + j * (nx + 1);
        let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1));
        for j in 0..=ny {
            for i in 0..=nx {
                vertices.push([i as f64 / nx as f64, j as f64 / ny as f64, 0.0]);
            }
        }
        let mut cells = Vec::with_capacity(nx * ny);
        for j in 0..ny {
            for i in 0..nx {
                cells.push(Cell {
                    vertices: [v(i, j), v(i + 1, j), v(i + 1, j + 1), v(i, j + 1)],
                    attribute: 1,
                });
            }
        }
        let mut boundary = Vec::with_capacity(2 * (nx + ny));
        for i in 0..nx {
            boundary.push(BoundaryFacet {
                vertices: [v(i, 0), v(i + 1, 0)],
                attribute: 1,
            });
        }
        for j in 0..ny {
            boundary.push(BoundaryFacet {
                vertices: [v(nx, j), v(nx, j + 1)],
                attribute: 2,
            });
        }
        for i in 0..nx {
            boundary.push(BoundaryFacet {
                vertices: [v(i + 1, ny), v(i, ny)],
                attribute: 3,
            });
        }
        for j in 0..ny {
            boundary.push(BoundaryFacet {
                vertices: [v(0, j + 1), v(0, j)],
                attribute: 4,
            });
        }
        Self::new(vertices, cells, boundary)
    }

    pub fn vertices(&self) -> &[[f64; 3]] {
        &self.vertices
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn boundary(&self) -> &[BoundaryFacet] {
        &self.boundary
    }

    pub fn boundary_mut(&mut self) -> &mut [BoundaryFacet] {
        &mut self.boundary
    }

    pub fn hanging_edges(&self) -> &[HangingEdge] {
        &self.hanging
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Geometry (curvature) order.
    pub fn order(&self) -> usize {
        self.order
    }

    pub fn nodes_per_cell(&self) -> usize {
        (self.order + 1) * (self.order + 1)
    }

    pub fn nodes(&self) -> &[[f64; 3]] {
        &self.nodes
    }

    pub fn cell_nodes(&self, cell: usize) -> &[[f64; 3]] {
        let n = self.nodes_per_cell();
        &self.nodes[cell * n..(cell + 1) * n]
    }

    /// Replaces every element-local node and re-syncs the vertices.
    pub fn set_nodes(&mut self, nodes: Vec<[f64; 3]>) -> Result<()> {
        if nodes.len() != self.nodes.len() {
            return Err(corruption(format!(
                "expected {} nodes, got {}",
                self.nodes.len(),
                nodes.len()
            )));
        }
        self.nodes = nodes;
        self.sync_vertices();
        Ok(())
    }

    /// Applies `f` to every element-local node, then re-syncs the vertices.
    pub fn map_nodes<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&mut [f64; 3]) -> Result<()>,
    {
        for node in &mut self.nodes {
            f(node)?;
        }
        self.sync_vertices();
        Ok(())
    }

    /// Local node index of a cell corner.
    pub fn corner_node(&self, corner: usize) -> usize {
        let p = self.order;
        match corner {
            0 => 0,
            1 => p,
            2 => p + p * (p + 1),
            _ => p * (p + 1),
        }
    }

    fn sync_vertices(&mut self) {
        let n = self.nodes_per_cell();
        for (c, cell) in self.cells.iter().enumerate() {
            for corner in 0..4 {
                let node = self.nodes[c * n + self.corner_node(corner)];
                self.vertices[cell.vertices[corner]] = node;
            }
        }
    }

    /// Evaluates the geometry of `cell` at reference point `(s, t)`.
    pub fn eval_cell(&self, basis: &LagrangeBasis, cell: usize, s: f64, t: f64) -> [f64; 3] {
        eval_tensor(basis, self.cell_nodes(cell), s, t)
    }

    /// Re-interpolates the geometry at curvature order `order`.
    pub fn set_curvature(&mut self, order: usize) -> Result<()> {
        if order == 0 {
            return Err(invalid_config("curvature order must be at least 1"));
        }
        if order == self.order {
            return Ok(());
        }
        let old_basis = LagrangeBasis::new(self.order);
        let new_basis = LagrangeBasis::new(order);
        let mut nodes = Vec::with_capacity(self.cells.len() * (order + 1) * (order + 1));
        for c in 0..self.cells.len() {
            for &t in new_basis.nodes() {
                for &s in new_basis.nodes() {
                    nodes.push(self.eval_cell(&old_basis, c, s, t));
                }
            }
        }
        self.order = order;
        self.nodes = nodes;
        self.sync_vertices();
        Ok(())
    }

    /// Redirects every cell, boundary and hanging reference through `map`.
    ///
    /// Element-local geometry is untouched, so cells on both sides of a seam
    /// keep their own nodes. Call [`Self::remove_unused_vertices`] afterwards.
    pub fn weld_vertices(&mut self, map: &[usize]) -> Result<()> {
        if map.len() != self.vertices.len() || map.iter().any(|&v| v >= self.vertices.len()) {
            return Err(corruption("vertex map does not match the mesh"));
        }
        for cell in &mut self.cells {
            for v in &mut cell.vertices {
                *v = map[*v];
            }
        }
        for facet in &mut self.boundary {
            for v in &mut facet.vertices {
                *v = map[*v];
            }
        }
        for edge in &mut self.hanging {
            edge.parent = edge_key(map[edge.parent.0], map[edge.parent.1]);
            edge.midpoint = map[edge.midpoint];
        }
        Ok(())
    }

    /// Drops vertices no cell references and renumbers the rest in order.
    /// Boundary facets touching a dropped vertex are dropped with it.
    pub fn remove_unused_vertices(&mut self) {
        let mut used = vec![false; self.vertices.len()];
        for cell in &self.cells {
            for &v in &cell.vertices {
                used[v] = true;
            }
        }
        let mut renumber = vec![usize::MAX; self.vertices.len()];
        let mut vertices = Vec::with_capacity(self.vertices.len());
        for (v, &keep) in used.iter().enumerate() {
            if keep {
                renumber[v] = vertices.len();
                vertices.push(self.vertices[v]);
            }
        }
        self.vertices = vertices;
        for cell in &mut self.cells {
            for v in &mut cell.vertices {
                *v = renumber[*v];
            }
        }
        self.boundary.retain(|f| used[f.vertices[0]] && used[f.vertices[1]]);
        for facet in &mut self.boundary {
            for v in &mut facet.vertices {
                *v = renumber[*v];
            }
        }
        for edge in &mut self.hanging {
            edge.parent = edge_key(renumber[edge.parent.0], renumber[edge.parent.1]);
            edge.midpoint = renumber[edge.midpoint];
        }
    }

    /// Number of cells incident to every edge.
    pub fn edge_incidence(&self) -> HashMap<Edge, usize> {
        let mut counts = HashMap::with_capacity(self.cells.len() * 2);
        for cell in &self.cells {
            for [a, b] in CELL_EDGES {
                *counts
                    .entry(edge_key(cell.vertices[a], cell.vertices[b]))
                    .or_insert(0) += 1;
            }
        }
        counts
    }

    fn hanging_edge_set(&self) -> HashSet<Edge> {
        let mut set = HashSet::new();
        for edge in &self.hanging {
            set.insert(edge.parent);
            set.extend(edge.halves());
        }
        set
    }

    /// Edges with a single incident cell that are not matched through a
    /// hanging-edge record, oriented along the owning cell's winding.
    pub fn topological_boundary_edges(&self) -> Vec<[usize; 2]> {
        let counts = self.edge_incidence();
        let hanging = self.hanging_edge_set();
        let mut edges = Vec::new();
        for cell in &self.cells {
            for [a, b] in CELL_EDGES {
                let (va, vb) = (cell.vertices[a], cell.vertices[b]);
                let key = edge_key(va, vb);
                if counts.get(&key) == Some(&1) && !hanging.contains(&key) {
                    edges.push([va, vb]);
                }
            }
        }
        edges
    }

    /// Drops boundary facets that lie on an edge shared by two cells.
    pub fn remove_internal_boundaries(&mut self) {
        let counts = self.edge_incidence();
        let hanging = self.hanging_edge_set();
        self.boundary.retain(|f| {
            let key = edge_key(f.vertices[0], f.vertices[1]);
            counts.get(&key) == Some(&1) && !hanging.contains(&key)
        });
    }

    /// Replaces the boundary with one facet per topological boundary edge.
    pub fn generate_boundary(&mut self, attribute: i32) {
        self.boundary = self
            .topological_boundary_edges()
            .into_iter()
            .map(|vertices| BoundaryFacet {
                vertices,
                attribute,
            })
            .collect();
    }

    /// Sorted distinct boundary attributes.
    pub fn boundary_attributes(&self) -> Vec<i32> {
        let mut attributes: Vec<i32> = self.boundary.iter().map(|f| f.attribute).collect();
        attributes.sort_unstable();
        attributes.dedup();
        attributes
    }

    pub fn validate(&self) -> Result<()> {
        let nv = self.vertices.len();
        if self.cells.is_empty() {
            return Err(corruption("mesh has no cells"));
        }
        let mut used = vec![false; nv];
        for (c, cell) in self.cells.iter().enumerate() {
            for (k, &v) in cell.vertices.iter().enumerate() {
                if v >= nv {
                    return Err(corruption(format!("cell {c} references vertex {v} of {nv}")));
                }
                if cell.vertices[..k].contains(&v) {
                    return Err(corruption(format!("cell {c} repeats vertex {v}")));
                }
                used[v] = true;
            }
        }
        if let Some(v) = used.iter().position(|&u| !u) {
            return Err(corruption(format!("vertex {v} is not used by any cell")));
        }
        if self.nodes.len() != self.cells.len() * self.nodes_per_cell() {
            return Err(corruption("node array does not match the cell count"));
        }
        if self
            .nodes
            .iter()
            .chain(&self.vertices)
            .any(|x| x.iter().any(|c| !c.is_finite()))
        {
            return Err(corruption("mesh has non-finite coordinates"));
        }

        let counts = self.edge_incidence();
        if let Some((edge, n)) = counts.iter().find(|(_, &n)| n > 2) {
            return Err(corruption(format!(
                "edge {edge:?} is shared by {n} cells"
            )));
        }
        for edge in &self.hanging {
            let [h0, h1] = edge.halves();
            if edge.midpoint >= nv
                || counts.get(&edge.parent) != Some(&1)
                || counts.get(&h0) != Some(&1)
                || counts.get(&h1) != Some(&1)
            {
                return Err(corruption(format!(
                    "hanging edge {:?} is not matched by its halves",
                    edge.parent
                )));
            }
        }

        let expected: HashSet<Edge> = self
            .topological_boundary_edges()
            .into_iter()
            .map(|[a, b]| edge_key(a, b))
            .collect();
        let mut seen = HashSet::with_capacity(self.boundary.len());
        for facet in &self.boundary {
            let [a, b] = facet.vertices;
            if a >= nv || b >= nv {
                return Err(corruption("boundary facet references a missing vertex"));
            }
            let key = edge_key(a, b);
            if !expected.contains(&key) {
                return Err(corruption(format!("boundary facet {key:?} is not on the boundary")));
            }
            if !seen.insert(key) {
                return Err(corruption(format!("boundary facet {key:?} is duplicated")));
            }
        }
        if seen.len() != expected.len() {
            return Err(corruption(format!(
                "{} boundary edges but {} boundary facets",
                expected.len(),
                seen.len()
            )));
        }
        Ok(())
    }
}
