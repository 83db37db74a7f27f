//! Surface construction exposed to JavaScript.

use crate::{parse_or_default, to_js, to_js_error};
use anyhow::Context;
use minsurf_core::{create_surface, BuiltSurface, SurfaceOptions};
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// Flattened mesh arrays for rendering.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct MeshSnapshot {
    pub kind: String,
    pub order: usize,
    pub vertices: Vec<[f64; 3]>,
    pub cells: Vec<[usize; 4]>,
    /// Element-local geometry nodes, `(order + 1)^2` per cell.
    pub nodes: Vec<[f64; 3]>,
    pub boundary: Vec<[usize; 2]>,
    pub boundary_attributes: Vec<i32>,
    pub essential: Vec<usize>,
}

impl MeshSnapshot {
    pub(crate) fn of(built: &BuiltSurface) -> Self {
        let mesh = &built.mesh;
        Self {
            kind: built.kind.name().to_string(),
            order: mesh.order(),
            vertices: mesh.vertices().to_vec(),
            cells: mesh.cells().iter().map(|c| c.vertices).collect(),
            nodes: mesh.nodes().to_vec(),
            boundary: mesh.boundary().iter().map(|f| f.vertices).collect(),
            boundary_attributes: mesh.boundary().iter().map(|f| f.attribute).collect(),
            essential: built.essential.clone(),
        }
    }
}

pub(crate) fn build_surface(code: i32, options: &SurfaceOptions) -> anyhow::Result<BuiltSurface> {
    create_surface(code, options).with_context(|| format!("Failed to build surface {code}"))
}

pub(crate) fn flatten(points: &[[f64; 3]]) -> Vec<f64> {
    points.iter().flatten().copied().collect()
}

#[wasm_bindgen]
pub struct WasmSurface {
    pub(crate) built: BuiltSurface,
}

#[wasm_bindgen]
impl WasmSurface {
    /// Builds surface `code` (0..=9). `options` may be `undefined` or a
    /// partial `SurfaceOptions` object.
    #[wasm_bindgen(constructor)]
    pub fn new(code: i32, options: JsValue) -> Result<WasmSurface, JsValue> {
        console_error_panic_hook::set_once();
        let options: SurfaceOptions = parse_or_default(options, "surface options")?;
        let built = build_surface(code, &options).map_err(to_js_error)?;
        Ok(WasmSurface { built })
    }

    pub fn kind(&self) -> String {
        self.built.kind.name().to_string()
    }

    pub fn order(&self) -> usize {
        self.built.mesh.order()
    }

    pub fn num_vertices(&self) -> usize {
        self.built.mesh.num_vertices()
    }

    pub fn num_cells(&self) -> usize {
        self.built.mesh.num_cells()
    }

    pub fn num_true_dofs(&self) -> usize {
        self.built.space.num_true_dofs()
    }

    /// Vertex coordinates as `[x0, y0, z0, x1, ...]`.
    pub fn vertices(&self) -> Vec<f64> {
        flatten(self.built.mesh.vertices())
    }

    /// Cell corner indices, four per cell.
    pub fn cells(&self) -> Vec<u32> {
        self.built
            .mesh
            .cells()
            .iter()
            .flat_map(|c| c.vertices.map(|v| v as u32))
            .collect()
    }

    pub fn nodes(&self) -> Vec<f64> {
        flatten(self.built.mesh.nodes())
    }

    pub fn boundary(&self) -> Vec<u32> {
        self.built
            .mesh
            .boundary()
            .iter()
            .flat_map(|f| f.vertices.map(|v| v as u32))
            .collect()
    }

    pub fn essential_dofs(&self) -> Vec<u32> {
        self.built.essential.iter().map(|&e| e as u32).collect()
    }

    pub fn get_mesh(&self) -> Result<JsValue, JsValue> {
        to_js(&MeshSnapshot::of(&self.built))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_matches_the_mesh() {
        let options = SurfaceOptions {
            order: 2,
            nx: 4,
            ny: 4,
            refine: 0,
            ..SurfaceOptions::default()
        };
        let built = build_surface(3, &options).expect("scherk");
        let snapshot = MeshSnapshot::of(&built);
        assert_eq!(snapshot.kind, "scherk");
        assert_eq!(snapshot.cells.len(), 16);
        assert_eq!(snapshot.nodes.len(), 16 * 9);
        assert_eq!(snapshot.boundary.len(), snapshot.boundary_attributes.len());
        assert_eq!(flatten(&snapshot.vertices).len(), 3 * built.mesh.num_vertices());
    }

    #[test]
    fn build_errors_carry_context() {
        let err = build_surface(42, &SurfaceOptions::default()).expect_err("unknown code");
        let message = format!("{err:#}");
        assert!(message.contains("Failed to build surface 42"), "{message}");
        assert!(message.contains("unknown surface selection code 42"), "{message}");
    }
}
