use crate::builder::build_mesh;
use crate::config::SurfaceOptions;
use crate::error::Result;
use crate::fem::FunctionSpace;
use crate::mesh::SurfaceMesh;
use crate::surfaces::SurfaceKind;
use log::info;

/// A constructed surface ready for relaxation.
#[derive(Debug, Clone)]
pub struct BuiltSurface {
    pub kind: SurfaceKind,
    pub mesh: SurfaceMesh,
    pub space: FunctionSpace,
    /// Essential scalar true dofs, sorted.
    pub essential: Vec<usize>,
}

/// Builds the surface registered under selection `code` (0..=9).
pub fn create_surface(code: i32, options: &SurfaceOptions) -> Result<BuiltSurface> {
    let kind = SurfaceKind::from_code(code)?;
    build_surface(kind, options)
}

pub fn build_surface(kind: SurfaceKind, options: &SurfaceOptions) -> Result<BuiltSurface> {
    let surface = kind.surface();
    let mesh = build_mesh(surface, options)?;
    let space = FunctionSpace::new(&mesh, options.order)?;
    let essential = surface.essential_dofs(&space, &mesh)?;
    info!(
        "built {kind}: {} cells, {} true dofs, {} essential",
        mesh.num_cells(),
        space.num_true_dofs(),
        essential.len()
    );
    Ok(BuiltSurface {
        kind,
        mesh,
        space,
        essential,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SurfaceError;

    #[test]
    fn unknown_codes_are_rejected() {
        let options = SurfaceOptions::default();
        assert_eq!(
            create_surface(99, &options).unwrap_err(),
            SurfaceError::InvalidSelection(99)
        );
        assert!(matches!(
            create_surface(-3, &options),
            Err(SurfaceError::InvalidSelection(-3))
        ));
    }

    #[test]
    fn invalid_options_are_rejected_before_building() {
        let options = SurfaceOptions {
            order: 0,
            ..SurfaceOptions::default()
        };
        assert!(matches!(
            create_surface(1, &options),
            Err(SurfaceError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn full_peach_pins_two_half_circles() {
        let options = SurfaceOptions {
            order: 2,
            refine: 0,
            ..SurfaceOptions::default()
        };
        let built = create_surface(6, &options).expect("full peach");
        assert_eq!(built.kind, SurfaceKind::FullPeach);
        assert!(!built.essential.is_empty());
        assert!(built.essential.len() < built.space.num_true_dofs());
        let values = built.space.node_values(&built.mesh);
        let coordinates = built
            .space
            .true_coordinates(&built.mesh, crate::fem::DofOrdering::ByNode);
        for &t in &built.essential {
            let x = [coordinates[3 * t], coordinates[3 * t + 1], coordinates[3 * t + 2]];
            assert!(x[0].abs() < 1e-14 || x[2].abs() < 1e-14, "{x:?}");
        }
        assert_eq!(values.len(), built.space.num_dofs());
    }
}
