//! Signal graph — the persistent effects network of an audio session.
//!
//! Voices sum into a single stereo input. The input always reaches the
//! output through the dry path at unity gain; every effect unit runs as a
//! parallel send whose output is scaled by its own `wet` parameter. Turning
//! an effect off ramps that parameter to zero, nothing is ever disconnected.
//!
//! ```text
//! input ─┬──────────────────────────────┬─> output
//!        ├─> distortion ─> wet ─────────┤
//!        ├─> panner     ─> wet ─────────┤
//!        ├─> ...                        │
//!        └─> vibrato    ─> wet ─────────┘
//! ```

use std::collections::BTreeMap;

use crate::config::EffectKind;

use super::chorus::ModulatedDelay;
use super::delay::Delay;
use super::param::Param;
use super::phaser::Phaser;
use super::reverb::Reverb;
use super::shaper::{Bitcrusher, Distortion};
use super::tremolo::{Panner, Tremolo};

/// A stereo processor inside the graph. `process` returns the unit's wet
/// output only; mixing with the dry signal happens in the graph.
pub trait EffectUnit {
    fn process(&mut self, time: f64, left: f32, right: f32) -> (f32, f32);

    /// Drop any internal state (delay lines, filter memory, tails).
    fn clear(&mut self);

    /// Called once per sample while the send is skipped. Free-running
    /// modulation keeps its phase here so a re-enabled unit resumes in step.
    fn idle(&mut self, _time: f64) {}
}

/// One effect unit plus the gain that feeds its output into the bus.
#[derive(Debug, Clone)]
pub struct EffectSend<U> {
    pub unit: U,
    /// Contribution of the unit to the output, 0..1.
    pub wet: Param,
    idle: bool,
}

impl<U: EffectUnit> EffectSend<U> {
    fn new(unit: U) -> Self {
        EffectSend {
            unit,
            wet: Param::with_range(0.0, 0.0, 1.0),
            idle: true,
        }
    }

    /// Whether the unit is currently skipped (silent, nothing scheduled).
    pub fn is_idle(&self) -> bool {
        self.idle
    }

    #[inline]
    fn process(&mut self, time: f64, left: f32, right: f32) -> (f32, f32) {
        let wet = self.wet.advance(time);
        if wet <= 0.0 && self.wet.pending_events() == 0 {
            if !self.idle {
                self.unit.clear();
                self.idle = true;
            }
            self.unit.idle(time);
            return (0.0, 0.0);
        }
        self.idle = false;
        let (l, r) = self.unit.process(time, left, right);
        let wet = wet as f32;
        (l * wet, r * wet)
    }
}

/// The built graph. Constructed once per session by the engine.
#[derive(Debug)]
pub struct SignalGraph {
    sample_rate: f64,
    pub distortion: EffectSend<Distortion>,
    pub panner: EffectSend<Panner>,
    pub phaser: EffectSend<Phaser>,
    pub flanger: EffectSend<ModulatedDelay>,
    pub chorus: EffectSend<ModulatedDelay>,
    pub tremolo: EffectSend<Tremolo>,
    pub delay: EffectSend<Delay>,
    pub reverb: EffectSend<Reverb>,
    pub bitcrusher: EffectSend<Bitcrusher>,
    pub vibrato: EffectSend<ModulatedDelay>,
}

impl SignalGraph {
    pub fn build(sample_rate: f64) -> Self {
        SignalGraph {
            sample_rate,
            distortion: EffectSend::new(Distortion::new(sample_rate)),
            panner: EffectSend::new(Panner::new()),
            phaser: EffectSend::new(Phaser::new(sample_rate)),
            flanger: EffectSend::new(ModulatedDelay::flanger(sample_rate)),
            chorus: EffectSend::new(ModulatedDelay::chorus(sample_rate)),
            tremolo: EffectSend::new(Tremolo::new(sample_rate)),
            delay: EffectSend::new(Delay::new(sample_rate)),
            reverb: EffectSend::new(Reverb::new(sample_rate)),
            bitcrusher: EffectSend::new(Bitcrusher::new()),
            vibrato: EffectSend::new(ModulatedDelay::vibrato(sample_rate)),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Run one stereo frame through the dry path and every send.
    pub fn process(&mut self, time: f64, left: f32, right: f32) -> (f32, f32) {
        let mut out_l = left;
        let mut out_r = right;
        let sends = [
            self.distortion.process(time, left, right),
            self.panner.process(time, left, right),
            self.phaser.process(time, left, right),
            self.flanger.process(time, left, right),
            self.chorus.process(time, left, right),
            self.tremolo.process(time, left, right),
            self.delay.process(time, left, right),
            self.reverb.process(time, left, right),
            self.bitcrusher.process(time, left, right),
            self.vibrato.process(time, left, right),
        ];
        for (l, r) in sends {
            out_l += l;
            out_r += r;
        }
        (out_l, out_r)
    }

    /// The wet gain parameter of `kind`.
    pub fn wet(&self, kind: EffectKind) -> &Param {
        match kind {
            EffectKind::Distortion => &self.distortion.wet,
            EffectKind::Panner => &self.panner.wet,
            EffectKind::Phaser => &self.phaser.wet,
            EffectKind::Flanger => &self.flanger.wet,
            EffectKind::Chorus => &self.chorus.wet,
            EffectKind::Tremolo => &self.tremolo.wet,
            EffectKind::Delay => &self.delay.wet,
            EffectKind::Reverb => &self.reverb.wet,
            EffectKind::Bitcrusher => &self.bitcrusher.wet,
            EffectKind::Vibrato => &self.vibrato.wet,
        }
    }

    /// Live wet level of `kind`.
    pub fn wet_level(&self, kind: EffectKind) -> f64 {
        self.wet(kind).current()
    }

    /// Every control parameter's settled target, keyed `effect.param`.
    /// Two graphs given the same configuration report identical maps.
    pub fn parameter_state(&self) -> BTreeMap<String, f64> {
        let mut state = BTreeMap::new();
        let mut put = |key: &str, value: f64| {
            state.insert(key.to_string(), value);
        };

        for kind in EffectKind::ALL {
            put(&format!("{}.wet", kind.name()), self.wet(kind).target());
        }

        put("distortion.tone", self.distortion.unit.tone.target());
        put("panner.pan", self.panner.unit.pan.target());
        put("phaser.frequency", self.phaser.unit.base_frequency.target());
        put("phaser.feedback", self.phaser.unit.feedback.target());
        put("phaser.rate", self.phaser.unit.lfo.rate.target());
        put("phaser.depth", self.phaser.unit.lfo.depth.target());
        for (name, unit) in [
            ("flanger", &self.flanger.unit),
            ("chorus", &self.chorus.unit),
            ("vibrato", &self.vibrato.unit),
        ] {
            put(&format!("{name}.delay"), unit.delay.target());
            put(&format!("{name}.feedback"), unit.feedback.target());
            put(&format!("{name}.rate"), unit.lfo.rate.target());
            put(&format!("{name}.depth"), unit.lfo.depth.target());
        }
        put("tremolo.rate", self.tremolo.unit.lfo.rate.target());
        put("tremolo.depth", self.tremolo.unit.lfo.depth.target());
        put("delay.time", self.delay.unit.time.target());
        put("delay.feedback", self.delay.unit.feedback.target());
        if let Some(decay) = self.reverb.unit.decay() {
            put("reverb.decay", decay);
        }
        put("distortion.curve", f64::from(self.distortion.unit.curve_generation()));
        put("bitcrusher.curve", f64::from(self.bitcrusher.unit.curve_generation()));
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_path_passes_signal_with_all_effects_off() {
        let mut graph = SignalGraph::build(8000.0);
        for i in 0..100 {
            let x = (i as f32 * 0.1).sin();
            let (l, r) = graph.process(i as f64 / 8000.0, x, -x);
            assert_eq!(l, x);
            assert_eq!(r, -x);
        }
        assert!(EffectKind::ALL.iter().all(|&k| graph.wet_level(k) == 0.0));
    }

    #[test]
    fn send_wakes_and_returns_to_idle() {
        let mut graph = SignalGraph::build(8000.0);
        assert!(graph.tremolo.is_idle());
        graph.tremolo.wet.ramp_to(0.7, 0.0, 0.01);
        graph.process(0.0, 1.0, 1.0);
        assert!(!graph.tremolo.is_idle());

        graph.tremolo.wet.ramp_to(0.0, 0.01, 0.01);
        for i in 1..400 {
            graph.process(i as f64 / 8000.0, 0.0, 0.0);
        }
        assert!(graph.tremolo.is_idle());
    }

    #[test]
    fn idle_modulation_keeps_running() {
        let sr = 8000.0;
        let mut graph = SignalGraph::build(sr);
        graph.tremolo.unit.lfo.rate = Param::new(2.0);
        graph.phaser.unit.lfo.rate = Param::new(2.0);
        let start = graph.tremolo.unit.lfo.phase();
        for i in 0..1000 {
            graph.process(i as f64 / sr, 0.0, 0.0);
        }
        assert!(graph.tremolo.is_idle());
        // 1000 samples at 2 Hz is a quarter cycle
        assert!((graph.tremolo.unit.lfo.phase() - start - 0.25).abs() < 1e-9);
        assert!((graph.phaser.unit.lfo.phase() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn wet_send_adds_to_dry() {
        let mut graph = SignalGraph::build(8000.0);
        graph.panner.wet = Param::with_range(0.5, 0.0, 1.0);
        let (l, r) = graph.process(0.0, 1.0, 1.0);
        // centred equal-power pan: cos(pi/4) of the mono sum, at half level
        let expected = 1.0 + 0.5 * std::f32::consts::FRAC_1_SQRT_2;
        assert!((l - expected).abs() < 1e-5);
        assert!((r - expected).abs() < 1e-5);
    }

    #[test]
    fn parameter_state_covers_every_wet() {
        let graph = SignalGraph::build(44100.0);
        let state = graph.parameter_state();
        for kind in EffectKind::ALL {
            assert_eq!(state.get(&format!("{}.wet", kind.name())), Some(&0.0));
        }
        assert!(!state.contains_key("reverb.decay"));
    }
}
