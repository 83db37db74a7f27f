//! Stepped relaxation runner.

use crate::surface::{build_surface, flatten, MeshSnapshot, WasmSurface};
use crate::{parse_or_default, to_js, to_js_error};
use anyhow::Context;
use minsurf_core::diagnostics::LogSink;
use minsurf_core::{
    BuiltSurface, RelaxationOutcome, RelaxationSession, RelaxationSettings, RelaxationState,
    SurfaceOptions,
};
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// Progress payload for the stepped relaxation.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct RelaxationProgress {
    done: bool,
    state: RelaxationState,
    iterations: usize,
    iter_max: usize,
    residual: Option<f64>,
}

#[derive(Serialize)]
pub(crate) struct RelaxationResult {
    outcome: RelaxationOutcome,
    mesh: MeshSnapshot,
}

/// Session plus the bookkeeping the runner needs between batches.
pub(crate) struct RunnerState {
    session: RelaxationSession,
}

impl RunnerState {
    pub(crate) fn new(surface: BuiltSurface, settings: RelaxationSettings) -> anyhow::Result<Self> {
        let kind = surface.kind;
        let session = RelaxationSession::new(surface, settings)
            .with_context(|| format!("Failed to start relaxation of {kind}"))?;
        Ok(Self { session })
    }

    pub(crate) fn is_done(&self) -> bool {
        self.session.is_done()
    }

    pub(crate) fn advance(&mut self, batch_size: u32) -> anyhow::Result<RelaxationProgress> {
        for _ in 0..batch_size {
            if self.session.is_done() {
                break;
            }
            let iteration = self.session.iteration();
            self.session
                .step(&mut LogSink)
                .with_context(|| format!("Relaxation failed in iteration {iteration}"))?;
        }
        Ok(self.progress())
    }

    fn progress(&self) -> RelaxationProgress {
        RelaxationProgress {
            done: self.session.is_done(),
            state: self.session.state(),
            iterations: self.session.iteration(),
            iter_max: self.session.settings().iter_max,
            residual: self.session.last_residual(),
        }
    }

    fn result(&self) -> RelaxationResult {
        RelaxationResult {
            outcome: self.session.outcome(),
            mesh: MeshSnapshot::of(self.session.surface()),
        }
    }
}

#[wasm_bindgen]
pub struct WasmRelaxationRunner {
    state: Option<RunnerState>,
}

#[wasm_bindgen]
impl WasmRelaxationRunner {
    /// Builds surface `code` and prepares its relaxation. Both option
    /// objects may be `undefined` or partial.
    #[wasm_bindgen(constructor)]
    pub fn new(
        code: i32,
        options: JsValue,
        settings: JsValue,
    ) -> Result<WasmRelaxationRunner, JsValue> {
        console_error_panic_hook::set_once();
        let options: SurfaceOptions = parse_or_default(options, "surface options")?;
        let settings: RelaxationSettings = parse_or_default(settings, "relaxation settings")?;
        let surface = build_surface(code, &options).map_err(to_js_error)?;
        let state = RunnerState::new(surface, settings).map_err(to_js_error)?;
        Ok(WasmRelaxationRunner { state: Some(state) })
    }

    /// Relaxes an already built surface, taking it over.
    pub fn from_surface(
        surface: WasmSurface,
        settings: JsValue,
    ) -> Result<WasmRelaxationRunner, JsValue> {
        console_error_panic_hook::set_once();
        let settings: RelaxationSettings = parse_or_default(settings, "relaxation settings")?;
        let state = RunnerState::new(surface.built, settings).map_err(to_js_error)?;
        Ok(WasmRelaxationRunner { state: Some(state) })
    }

    pub fn is_done(&self) -> bool {
        self.state.as_ref().map_or(true, |state| state.is_done())
    }

    pub fn run_steps(&mut self, batch_size: u32) -> Result<JsValue, JsValue> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| JsValue::from_str("Runner not initialized"))?;
        let progress = state.advance(batch_size).map_err(to_js_error)?;
        to_js(&progress)
    }

    pub fn get_progress(&self) -> Result<JsValue, JsValue> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| JsValue::from_str("Runner not initialized"))?;
        to_js(&state.progress())
    }

    pub fn get_result(&self) -> Result<JsValue, JsValue> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| JsValue::from_str("Runner not initialized"))?;
        if state.session.is_aborted() {
            return Err(JsValue::from_str("Relaxation was aborted by a numerical failure."));
        }
        if !state.is_done() {
            return Err(JsValue::from_str("Relaxation has not finished yet."));
        }
        to_js(&state.result())
    }

    /// Current element nodes as `[x0, y0, z0, x1, ...]`.
    pub fn nodes(&self) -> Vec<f64> {
        self.state
            .as_ref()
            .map(|state| flatten(state.session.surface().mesh.nodes()))
            .unwrap_or_default()
    }

    pub fn vertices(&self) -> Vec<f64> {
        self.state
            .as_ref()
            .map(|state| flatten(state.session.surface().mesh.vertices()))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_runner(settings: RelaxationSettings) -> RunnerState {
        let options = SurfaceOptions {
            order: 2,
            nx: 4,
            ny: 4,
            refine: 0,
            ..SurfaceOptions::default()
        };
        let surface = build_surface(3, &options).expect("scherk");
        RunnerState::new(surface, settings).expect("runner")
    }

    #[test]
    fn batches_stop_at_the_iteration_cap() {
        let mut runner = small_runner(RelaxationSettings {
            iter_max: 3,
            tolerance: 1e-300,
            ..RelaxationSettings::default()
        });
        let progress = runner.advance(2).expect("first batch");
        assert!(!progress.done);
        assert_eq!(progress.iterations, 2);
        assert!(progress.residual.is_some());

        let progress = runner.advance(10).expect("second batch");
        assert!(progress.done);
        assert_eq!(progress.iterations, 3);
        assert_eq!(progress.state, RelaxationState::IterationLimitReached);
        assert!(runner.is_done());

        let result = runner.result();
        assert_eq!(result.outcome.residual_history.len(), 3);
        assert_eq!(result.mesh.cells.len(), 16);
    }

    #[test]
    fn invalid_settings_fail_with_context() {
        let options = SurfaceOptions {
            order: 1,
            nx: 3,
            ny: 3,
            refine: 0,
            ..SurfaceOptions::default()
        };
        let surface = build_surface(3, &options).expect("scherk");
        let err = RunnerState::new(
            surface,
            RelaxationSettings {
                lambda: 2.0,
                ..RelaxationSettings::default()
            },
        )
        .err()
        .expect("lambda out of range");
        let message = format!("{err:#}");
        assert!(message.contains("Failed to start relaxation of scherk"), "{message}");
    }
}
