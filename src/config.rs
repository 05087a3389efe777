//! Configuration data consumed by the engine.
//!
//! `EffectsConfig` is the declarative snapshot the UI edits: one strongly
//! typed record per effect, each with an `on` flag. The engine only reads
//! snapshots; it never writes back. `EngineSettings` holds session-wide
//! constants (ramp window, debounce, playhead convention).

use serde::{Deserialize, Serialize};

use crate::dsp::shaper::ClipShape;
use crate::error::EngineError;

// Fixed wet levels for effects whose mix is not exposed as a parameter.
pub const PANNER_WET: f64 = 0.7;
pub const PHASER_WET: f64 = 0.5;
pub const FLANGER_WET: f64 = 0.5;
pub const TREMOLO_WET: f64 = 0.7;
pub const VIBRATO_WET: f64 = 0.6;

/// The effect units of the signal graph, in processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    Distortion,
    Panner,
    Phaser,
    Flanger,
    Chorus,
    Tremolo,
    Delay,
    Reverb,
    Bitcrusher,
    Vibrato,
}

impl EffectKind {
    pub const ALL: [EffectKind; 10] = [
        EffectKind::Distortion,
        EffectKind::Panner,
        EffectKind::Phaser,
        EffectKind::Flanger,
        EffectKind::Chorus,
        EffectKind::Tremolo,
        EffectKind::Delay,
        EffectKind::Reverb,
        EffectKind::Bitcrusher,
        EffectKind::Vibrato,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EffectKind::Distortion => "distortion",
            EffectKind::Panner => "panner",
            EffectKind::Phaser => "phaser",
            EffectKind::Flanger => "flanger",
            EffectKind::Chorus => "chorus",
            EffectKind::Tremolo => "tremolo",
            EffectKind::Delay => "delay",
            EffectKind::Reverb => "reverb",
            EffectKind::Bitcrusher => "bitcrusher",
            EffectKind::Vibrato => "vibrato",
        }
    }
}

/// Common view over every per-effect record.
pub trait EffectSettings {
    fn is_on(&self) -> bool;
    /// Wet level while the effect is on.
    fn level(&self) -> f64;

    /// Gain the unit's output should settle at: its level when on, else 0.
    fn wet_target(&self) -> f64 {
        if self.is_on() { self.level().clamp(0.0, 1.0) } else { 0.0 }
    }
}

macro_rules! effect_settings {
    ($ty:ty, fixed $wet:expr) => {
        impl EffectSettings for $ty {
            fn is_on(&self) -> bool {
                self.on
            }
            fn level(&self) -> f64 {
                $wet
            }
        }
    };
    ($ty:ty, field $field:ident) => {
        impl EffectSettings for $ty {
            fn is_on(&self) -> bool {
                self.on
            }
            fn level(&self) -> f64 {
                self.$field
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DistortionConfig {
    pub on: bool,
    /// Saturation amount, 0..1.
    pub drive: f64,
    /// Tone low-pass cutoff in Hz.
    pub tone: f64,
    /// Output level of the distorted signal, 0..1.
    pub output: f64,
    pub shape: ClipShape,
}

impl Default for DistortionConfig {
    fn default() -> Self {
        DistortionConfig {
            on: false,
            drive: 0.4,
            tone: 3000.0,
            output: 0.6,
            shape: ClipShape::Soft,
        }
    }
}

effect_settings!(DistortionConfig, field output);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PannerConfig {
    pub on: bool,
    /// -1 (left) .. 1 (right).
    pub pan: f64,
}

impl Default for PannerConfig {
    fn default() -> Self {
        PannerConfig { on: false, pan: 0.0 }
    }
}

effect_settings!(PannerConfig, fixed PANNER_WET);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PhaserConfig {
    pub on: bool,
    /// Sweep rate in Hz.
    pub rate: f64,
    /// Sweep depth as a fraction of `frequency`, 0..1.
    pub depth: f64,
    pub feedback: f64,
    /// Sweep centre in Hz.
    pub frequency: f64,
}

impl Default for PhaserConfig {
    fn default() -> Self {
        PhaserConfig {
            on: false,
            rate: 0.5,
            depth: 0.7,
            feedback: 0.3,
            frequency: 1000.0,
        }
    }
}

effect_settings!(PhaserConfig, fixed PHASER_WET);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FlangerConfig {
    pub on: bool,
    /// Centre delay in milliseconds.
    pub delay: f64,
    /// Sweep depth in milliseconds.
    pub depth: f64,
    pub feedback: f64,
    /// Sweep rate in Hz.
    pub rate: f64,
}

impl Default for FlangerConfig {
    fn default() -> Self {
        FlangerConfig {
            on: false,
            delay: 5.0,
            depth: 2.0,
            feedback: 0.5,
            rate: 0.25,
        }
    }
}

effect_settings!(FlangerConfig, fixed FLANGER_WET);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChorusConfig {
    pub on: bool,
    pub rate: f64,
    /// Sweep depth in milliseconds.
    pub depth: f64,
    /// Centre delay in milliseconds.
    pub delay: f64,
    pub wet: f64,
}

impl Default for ChorusConfig {
    fn default() -> Self {
        ChorusConfig {
            on: false,
            rate: 1.5,
            depth: 2.0,
            delay: 15.0,
            wet: 0.4,
        }
    }
}

effect_settings!(ChorusConfig, field wet);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TremoloConfig {
    pub on: bool,
    pub rate: f64,
    /// 0..1
    pub depth: f64,
}

impl Default for TremoloConfig {
    fn default() -> Self {
        TremoloConfig {
            on: false,
            rate: 5.0,
            depth: 0.5,
        }
    }
}

effect_settings!(TremoloConfig, fixed TREMOLO_WET);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DelayConfig {
    pub on: bool,
    /// Echo time in seconds.
    pub time: f64,
    pub feedback: f64,
    pub wet: f64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        DelayConfig {
            on: false,
            time: 0.3,
            feedback: 0.35,
            wet: 0.3,
        }
    }
}

effect_settings!(DelayConfig, field wet);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReverbConfig {
    pub on: bool,
    /// Impulse response length in seconds (time to -60 dB).
    pub decay: f64,
    pub wet: f64,
}

impl Default for ReverbConfig {
    fn default() -> Self {
        ReverbConfig {
            on: false,
            decay: 2.0,
            wet: 0.3,
        }
    }
}

effect_settings!(ReverbConfig, field wet);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BitcrusherConfig {
    pub on: bool,
    /// Output resolution, 1..16 bits.
    pub bits: u32,
    pub wet: f64,
}

impl Default for BitcrusherConfig {
    fn default() -> Self {
        BitcrusherConfig {
            on: false,
            bits: 8,
            wet: 0.5,
        }
    }
}

effect_settings!(BitcrusherConfig, field wet);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VibratoConfig {
    pub on: bool,
    pub rate: f64,
    /// Sweep depth in milliseconds.
    pub depth: f64,
}

impl Default for VibratoConfig {
    fn default() -> Self {
        VibratoConfig {
            on: false,
            rate: 5.0,
            depth: 2.0,
        }
    }
}

effect_settings!(VibratoConfig, fixed VIBRATO_WET);

/// The full effects snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EffectsConfig {
    pub distortion: DistortionConfig,
    pub panner: PannerConfig,
    pub phaser: PhaserConfig,
    pub flanger: FlangerConfig,
    pub chorus: ChorusConfig,
    pub tremolo: TremoloConfig,
    pub delay: DelayConfig,
    pub reverb: ReverbConfig,
    pub bitcrusher: BitcrusherConfig,
    pub vibrato: VibratoConfig,
}

impl EffectsConfig {
    /// The record for `kind`, viewed through its common on/level interface.
    pub fn settings(&self, kind: EffectKind) -> &dyn EffectSettings {
        match kind {
            EffectKind::Distortion => &self.distortion,
            EffectKind::Panner => &self.panner,
            EffectKind::Phaser => &self.phaser,
            EffectKind::Flanger => &self.flanger,
            EffectKind::Chorus => &self.chorus,
            EffectKind::Tremolo => &self.tremolo,
            EffectKind::Delay => &self.delay,
            EffectKind::Reverb => &self.reverb,
            EffectKind::Bitcrusher => &self.bitcrusher,
            EffectKind::Vibrato => &self.vibrato,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(|e| EngineError::Config(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string(self).map_err(|e| EngineError::Config(e.to_string()))
    }
}

/// Session-wide engine constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineSettings {
    pub sample_rate: f64,
    /// Length of every configuration ramp, in seconds.
    pub ramp_seconds: f64,
    /// Minimum wall-clock gap between two triggers of the same point note.
    pub debounce_seconds: f64,
    /// Fixed angle of the playhead, degrees.
    pub playhead_angle: f64,
    /// Seconds per disc revolution.
    pub rotation_period: f64,
    pub master_gain: f64,
    /// One-shot voices beyond this count steal the oldest.
    pub max_one_shots: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            sample_rate: 44100.0,
            ramp_seconds: 0.08,
            debounce_seconds: 0.25,
            playhead_angle: 0.0,
            rotation_period: 8.0,
            master_gain: 0.8,
            max_one_shots: 32,
        }
    }
}

impl EngineSettings {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(|e| EngineError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wet_target_follows_on_flag() {
        let mut cfg = EffectsConfig::default();
        assert_eq!(cfg.settings(EffectKind::Reverb).wet_target(), 0.0);
        cfg.reverb.on = true;
        cfg.reverb.wet = 0.7;
        assert!((cfg.settings(EffectKind::Reverb).wet_target() - 0.7).abs() < 1e-12);
        cfg.panner.on = true;
        assert!((cfg.settings(EffectKind::Panner).wet_target() - PANNER_WET).abs() < 1e-12);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg = EffectsConfig::from_json(r#"{"reverb":{"on":true,"decay":3.5}}"#).unwrap();
        assert!(cfg.reverb.on);
        assert_eq!(cfg.reverb.decay, 3.5);
        assert_eq!(cfg.reverb.wet, ReverbConfig::default().wet);
        assert_eq!(cfg.delay, DelayConfig::default());
    }

    #[test]
    fn json_round_trip_is_lossless() {
        let mut cfg = EffectsConfig::default();
        cfg.distortion.on = true;
        cfg.distortion.shape = ClipShape::Hard;
        cfg.bitcrusher.bits = 4;
        cfg.flanger.feedback = 0.66;
        let json = cfg.to_json().unwrap();
        assert!(json.contains("\"shape\":\"hard\""));
        assert_eq!(EffectsConfig::from_json(&json).unwrap(), cfg);
    }

    #[test]
    fn settings_parse_camel_case() {
        let s = EngineSettings::from_json(r#"{"sampleRate":48000,"playheadAngle":90}"#).unwrap();
        assert_eq!(s.sample_rate, 48000.0);
        assert_eq!(s.playhead_angle, 90.0);
        assert_eq!(s.ramp_seconds, 0.08);
        assert!(EngineSettings::from_json("[").is_err());
    }
}
