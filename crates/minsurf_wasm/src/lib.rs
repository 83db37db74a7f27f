//! WASM bindings for surface construction and relaxation.

mod relaxation;
mod surface;

pub use relaxation::WasmRelaxationRunner;
pub use surface::WasmSurface;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

pub(crate) fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    to_value(value).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

pub(crate) fn to_js_error(err: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{err:#}"))
}

/// Deserializes `value`, falling back to `T::default()` for `undefined`/`null`.
pub(crate) fn parse_or_default<T: DeserializeOwned + Default>(
    value: JsValue,
    what: &str,
) -> Result<T, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(T::default());
    }
    from_value(value).map_err(|e| JsValue::from_str(&format!("Invalid {}: {}", what, e)))
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use super::*;
    use minsurf_core::{RelaxationSettings, SurfaceOptions};
    use wasm_bindgen_test::wasm_bindgen_test;

    fn small_options() -> JsValue {
        to_value(&SurfaceOptions {
            order: 2,
            nx: 4,
            ny: 4,
            refine: 0,
            ..SurfaceOptions::default()
        })
        .expect("options")
    }

    #[wasm_bindgen_test]
    fn surface_rejects_unknown_code() {
        let result = WasmSurface::new(99, JsValue::UNDEFINED);
        let message = result
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.contains("unknown surface selection code 99"));
    }

    #[wasm_bindgen_test]
    fn runner_reports_progress_until_done() {
        let settings = to_value(&RelaxationSettings {
            iter_max: 2,
            ..RelaxationSettings::default()
        })
        .expect("settings");
        let mut runner =
            WasmRelaxationRunner::new(3, small_options(), settings).expect("runner");
        assert!(runner.get_result().is_err(), "result before any step");
        while !runner.is_done() {
            runner.run_steps(1).expect("batch");
        }
        assert!(runner.get_result().is_ok());
        assert_eq!(runner.nodes().len(), 16 * 9 * 3);
    }
}
