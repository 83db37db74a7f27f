use crate::config::SurfaceOptions;
use crate::error::Result;
use crate::mesh::SurfaceMesh;
use crate::surfaces::{CoordinateExtent, Surface};
use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Runs the construction pipeline of `surface`: topology, parametrization of
/// every element node, curving to the configured order, boundary fixups,
/// refinement, snapping and validation.
pub fn build_mesh(surface: &dyn Surface, options: &SurfaceOptions) -> Result<SurfaceMesh> {
    options.validate()?;
    let kind = surface.kind();

    let mut mesh = surface.build_topology(options)?;
    let mut extent = CoordinateExtent::default();
    if surface.has_parametrization() {
        mesh.map_nodes(|x| {
            *x = surface.parametrize(x[0], x[1], &mut extent)?;
            Ok(())
        })?;
    }
    mesh.set_curvature(options.order)?;
    surface.postprocess_boundary(&mut mesh)?;

    for _ in 0..options.refine {
        mesh.uniform_refinement()?;
    }
    if options.amr {
        let mut rng = StdRng::seed_from_u64(options.seed);
        let refined = mesh.random_refinement(options.amr_fraction, &mut rng)?;
        debug!("{kind}: randomly refined {refined} cells");
    }

    surface.snap(&mut mesh, &extent)?;
    mesh.validate()?;
    debug!(
        "{kind}: {} vertices, {} cells, {} boundary facets, order {}",
        mesh.num_vertices(),
        mesh.num_cells(),
        mesh.boundary().len(),
        mesh.order()
    );
    Ok(mesh)
}
