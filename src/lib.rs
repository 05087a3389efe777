pub mod config;
pub mod dsp;
pub mod error;
pub mod model;
pub mod proposal;
pub mod scheduler;
pub mod sequencer;

use crate::config::{EffectsConfig, EngineSettings};
use crate::error::SpindleError;
use crate::model::{Note, TrackLayout};
use crate::sequencer::Sequencer;
use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the spindle-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// Parse and check a proposal batch against the default track layout.
pub fn check_proposals(json: &str) -> Result<Vec<proposal::ProposedNote>, SpindleError> {
    let proposals = proposal::parse_proposals(json)?;
    proposal::validate_proposals(&proposals, &TrackLayout::default())?;
    Ok(proposals)
}

/// WASM-exposed: validate a JSON batch of `{track, angle, colorIndex}`
/// proposals. Resolves to the parsed entries, or rejects the whole batch.
#[wasm_bindgen]
pub fn validate_proposals(json: &str) -> Result<JsValue, JsValue> {
    let proposals = check_proposals(json).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    serde_wasm_bindgen::to_value(&proposals).map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed sequencer: one per application session.
#[wasm_bindgen]
pub struct WasmSequencer {
    inner: Sequencer,
}

#[wasm_bindgen]
impl WasmSequencer {
    /// `settings` is an optional `EngineSettings` object; omitted fields
    /// take their defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(settings: JsValue) -> Result<WasmSequencer, JsValue> {
        let settings: EngineSettings = if settings.is_undefined() || settings.is_null() {
            EngineSettings::default()
        } else {
            serde_wasm_bindgen::from_value(settings).map_err(|e| JsValue::from_str(&format!("{e}")))?
        };
        Ok(WasmSequencer {
            inner: Sequencer::new(settings),
        })
    }

    #[wasm_bindgen(js_name = resumeSession)]
    pub fn resume_session(&mut self) -> Result<(), JsValue> {
        self.inner
            .resume_session()
            .map_err(|e| JsValue::from_str(&format!("{e}")))
    }

    #[wasm_bindgen(js_name = applyEffects)]
    pub fn apply_effects(&mut self, config: JsValue) -> Result<(), JsValue> {
        let config: EffectsConfig =
            serde_wasm_bindgen::from_value(config).map_err(|e| JsValue::from_str(&format!("{e}")))?;
        self.inner.apply_effects(&config);
        Ok(())
    }

    #[wasm_bindgen(js_name = setNotes)]
    pub fn set_notes(&mut self, notes: JsValue) -> Result<(), JsValue> {
        let notes: Vec<Note> =
            serde_wasm_bindgen::from_value(notes).map_err(|e| JsValue::from_str(&format!("{e}")))?;
        self.inner
            .set_notes(notes)
            .map_err(|e| JsValue::from_str(&format!("{e}")))
    }

    #[wasm_bindgen(js_name = setTrackEnabled)]
    pub fn set_track_enabled(&mut self, track: usize, enabled: bool) -> Result<(), JsValue> {
        self.inner
            .set_track_enabled(track, enabled)
            .map_err(|e| JsValue::from_str(&format!("{e}")))
    }

    #[wasm_bindgen(js_name = setPlaying)]
    pub fn set_playing(&mut self, playing: bool) {
        self.inner.set_playing(playing);
    }

    #[wasm_bindgen(js_name = setRotationPeriod)]
    pub fn set_rotation_period(&mut self, seconds: f64) {
        self.inner.set_rotation_period(seconds);
    }

    #[wasm_bindgen(getter)]
    pub fn rotation(&self) -> f64 {
        self.inner.rotation()
    }

    /// Advance one animation frame. Returns the notes triggered, started
    /// and stopped, for highlighting.
    pub fn frame(&mut self, delta_seconds: f64, now_seconds: f64) -> Result<JsValue, JsValue> {
        let decisions = self.inner.frame(delta_seconds, now_seconds);
        serde_wasm_bindgen::to_value(&decisions).map_err(|e| JsValue::from_str(&format!("{e}")))
    }

    /// Render interleaved stereo f32 frames for the AudioWorklet.
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        self.inner.render(frames)
    }

    #[wasm_bindgen(js_name = triggerPreview)]
    pub fn trigger_preview(&mut self, frequency: f64) {
        self.inner.trigger_preview(frequency);
    }

    #[wasm_bindgen(js_name = mergeProposals)]
    pub fn merge_proposals(&mut self, json: &str) -> Result<usize, JsValue> {
        self.inner
            .merge_proposals(json)
            .map_err(|e| JsValue::from_str(&format!("{}", SpindleError::from(e))))
    }

    #[wasm_bindgen(js_name = startCapture)]
    pub fn start_capture(&mut self) -> bool {
        self.inner.start_capture()
    }

    /// Finish the capture and return the WAV bytes (empty if none ran).
    #[wasm_bindgen(js_name = stopCapture)]
    pub fn stop_capture(&mut self) -> Result<Vec<u8>, JsValue> {
        let clip = self
            .inner
            .stop_capture()
            .map_err(|e| JsValue::from_str(&format!("{e}")))?;
        Ok(clip.bytes)
    }

    #[wasm_bindgen(getter, js_name = isCapturing)]
    pub fn is_capturing(&self) -> bool {
        self.inner.is_capturing()
    }
}
