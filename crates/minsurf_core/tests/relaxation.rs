use minsurf_core::diagnostics::RecordingSink;
use minsurf_core::fem::DofOrdering;
use minsurf_core::{
    create_surface, BuiltSurface, RelaxationSession, RelaxationSettings, RelaxationState,
    SurfaceKind, SurfaceOptions, UpdatePolicy,
};

fn build(kind: SurfaceKind, options: SurfaceOptions) -> BuiltSurface {
    create_surface(kind.code(), &options).unwrap_or_else(|e| panic!("{kind}: {e}"))
}

fn coarse(order: usize) -> SurfaceOptions {
    SurfaceOptions {
        order,
        nx: 4,
        ny: 4,
        refine: 0,
        ..SurfaceOptions::default()
    }
}

#[test]
fn catenoid_converges_with_decreasing_residual() {
    let options = SurfaceOptions {
        order: 2,
        nx: 6,
        ny: 6,
        refine: 1,
        ..SurfaceOptions::default()
    };
    let settings = RelaxationSettings {
        iter_max: 48,
        ..RelaxationSettings::default()
    };
    let mut session =
        RelaxationSession::new(build(SurfaceKind::Catenoid, options), settings).expect("session");
    let mut sink = RecordingSink::default();
    let outcome = session.solve(&mut sink).expect("relaxation");

    assert!(outcome.converged, "stopped in {:?}: {:?}", outcome.state, outcome.residual_history);
    assert_eq!(outcome.state, RelaxationState::Converged);
    assert!(outcome.residual < 1e-4);
    assert_eq!(sink.reports.len(), outcome.iterations);
    assert_eq!(sink.geometries, outcome.iterations);
    for pair in outcome.residual_history[2..].windows(2) {
        assert!(
            pair[1] < pair[0],
            "residual increased: {:?}",
            outcome.residual_history
        );
    }

    let surface = session.into_surface();
    // Seam stays closed: only the two rings bound the surface.
    assert_eq!(surface.mesh.boundary().len(), 2 * 12);
    surface.mesh.validate().expect("relaxed mesh");
}

#[test]
fn componentwise_matches_vector_update() {
    let run = |policy: UpdatePolicy| {
        let settings = RelaxationSettings {
            policy,
            ..RelaxationSettings::default()
        };
        let mut session = RelaxationSession::new(build(SurfaceKind::Scherk, coarse(2)), settings)
            .expect("session");
        session.step(&mut ()).expect("step");
        session.coordinates(DofOrdering::ByComponent)
    };
    let vector = run(UpdatePolicy::Vector);
    let componentwise = run(UpdatePolicy::Componentwise);
    let diff = (&vector - &componentwise).amax();
    assert!(diff < 1e-8, "policies differ by {diff}");
}

#[test]
fn radial_updates_move_nodes_along_their_position() {
    let surface = build(SurfaceKind::SlottedSphere, coarse(2));
    let before = surface
        .space
        .true_coordinates(&surface.mesh, DofOrdering::ByNode);
    let settings = RelaxationSettings {
        radial: true,
        lambda: 0.5,
        ..RelaxationSettings::default()
    };
    let mut session = RelaxationSession::new(surface, settings).expect("session");
    session.step(&mut ()).expect("radial step");
    let after = session.coordinates(DofOrdering::ByNode);

    let mut moved = 0;
    for node in 0..before.len() / 3 {
        let x = [before[3 * node], before[3 * node + 1], before[3 * node + 2]];
        let d = [
            after[3 * node] - x[0],
            after[3 * node + 1] - x[1],
            after[3 * node + 2] - x[2],
        ];
        let cross = [
            x[1] * d[2] - x[2] * d[1],
            x[2] * d[0] - x[0] * d[2],
            x[0] * d[1] - x[1] * d[0],
        ];
        let cross_norm = cross.iter().map(|c| c * c).sum::<f64>().sqrt();
        let d_norm = d.iter().map(|c| c * c).sum::<f64>().sqrt();
        assert!(
            cross_norm <= 1e-12 * d_norm.max(1.0),
            "node {node} moved off its ray: {d:?}"
        );
        if d_norm > 1e-10 {
            moved += 1;
        }
    }
    assert!(moved > 0, "no node moved");
}

#[test]
fn relaxation_runs_on_a_non_conforming_mesh() {
    let options = SurfaceOptions {
        amr: true,
        refine: 1,
        seed: 3,
        ..coarse(2)
    };
    let surface = build(SurfaceKind::Enneper, options);
    let hanging = surface.mesh.hanging_edges().len();
    let settings = RelaxationSettings {
        iter_max: 2,
        partial_assembly: false,
        ..RelaxationSettings::default()
    };
    let mut session = RelaxationSession::new(surface, settings).expect("session");
    let outcome = session.solve(&mut ()).expect("relaxation");
    assert!(outcome.residual_history.iter().all(|r| r.is_finite()));

    let surface = session.into_surface();
    assert_eq!(surface.mesh.hanging_edges().len(), hanging);
    surface.mesh.validate().expect("relaxed mesh");
    assert!(surface.mesh.nodes().iter().flatten().all(|c| c.is_finite()));
}

#[test]
fn default_catenoid_converges_within_the_cap() {
    let surface = build(SurfaceKind::Catenoid, SurfaceOptions::default());
    let mut session =
        RelaxationSession::new(surface, RelaxationSettings::default()).expect("session");
    let outcome = session.solve(&mut ()).expect("relaxation");

    assert!(outcome.converged, "stopped in {:?}: {:?}", outcome.state, outcome.residual_history);
    assert!(outcome.iterations <= 32, "took {} iterations", outcome.iterations);
    assert!(outcome.residual < 1e-4);
    for pair in outcome.residual_history[2..].windows(2) {
        assert!(
            pair[1] < pair[0],
            "residual increased: {:?}",
            outcome.residual_history
        );
    }
    // 6 cells per ring, refined twice.
    assert_eq!(session.into_surface().mesh.boundary().len(), 48);
}
