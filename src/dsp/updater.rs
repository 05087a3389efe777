//! Effect parameter updater — maps an `EffectsConfig` snapshot onto the live
//! graph.
//!
//! Every continuous parameter glides to its new target over the ramp window.
//! Buffers that depend on configuration (the reverb response and the shaper
//! curves) are regenerated synchronously first, and only when the values
//! that define them changed. Each ramp cancels whatever was scheduled for its
//! parameter, so repeated calls never pile up automation events.

use tracing::debug;

use crate::config::{EffectKind, EffectSettings, EffectsConfig};

use super::graph::SignalGraph;
use super::param::Param;

/// Target values within this distance are treated as unchanged.
const EPSILON: f64 = 1e-9;

/// When and how fast parameter changes happen.
#[derive(Debug, Clone, Copy)]
pub struct Ramp {
    pub now: f64,
    pub duration: f64,
}

impl Ramp {
    pub fn new(now: f64, duration: f64) -> Self {
        Ramp { now, duration: duration.max(0.0) }
    }

    /// Glide `param` to `value` unless it is already heading there.
    /// Non-finite values are ignored and the old target kept.
    fn to(&self, param: &mut Param, value: f64) {
        if !value.is_finite() || (param.target() - value).abs() < EPSILON {
            return;
        }
        param.ramp_to(value, self.now, self.duration);
    }
}

type UpdateFn = fn(&mut SignalGraph, &EffectsConfig, Ramp);

/// The updater responsible for `kind`.
fn updater_for(kind: EffectKind) -> UpdateFn {
    match kind {
        EffectKind::Distortion => update_distortion,
        EffectKind::Panner => update_panner,
        EffectKind::Phaser => update_phaser,
        EffectKind::Flanger => update_flanger,
        EffectKind::Chorus => update_chorus,
        EffectKind::Tremolo => update_tremolo,
        EffectKind::Delay => update_delay,
        EffectKind::Reverb => update_reverb,
        EffectKind::Bitcrusher => update_bitcrusher,
        EffectKind::Vibrato => update_vibrato,
    }
}

/// Apply a full configuration snapshot to `graph`.
pub fn apply_effects(graph: &mut SignalGraph, config: &EffectsConfig, ramp: Ramp) {
    for kind in EffectKind::ALL {
        updater_for(kind)(graph, config, ramp);
    }
    let active: Vec<&str> = EffectKind::ALL
        .into_iter()
        .filter(|&k| config.settings(k).is_on())
        .map(EffectKind::name)
        .collect();
    debug!(?active, at = ramp.now, "effects applied");
}

fn ms(value: f64) -> f64 {
    value / 1000.0
}

fn update_distortion(graph: &mut SignalGraph, config: &EffectsConfig, ramp: Ramp) {
    let c = &config.distortion;
    let send = &mut graph.distortion;
    if send.unit.set_curve(c.drive, c.shape) {
        debug!(drive = c.drive, shape = ?c.shape, "distortion curve rebuilt");
    }
    ramp.to(&mut send.unit.tone, c.tone);
    ramp.to(&mut send.wet, c.wet_target());
}

fn update_panner(graph: &mut SignalGraph, config: &EffectsConfig, ramp: Ramp) {
    let c = &config.panner;
    ramp.to(&mut graph.panner.unit.pan, c.pan.clamp(-1.0, 1.0));
    ramp.to(&mut graph.panner.wet, c.wet_target());
}

fn update_phaser(graph: &mut SignalGraph, config: &EffectsConfig, ramp: Ramp) {
    let c = &config.phaser;
    let unit = &mut graph.phaser.unit;
    ramp.to(&mut unit.base_frequency, c.frequency);
    ramp.to(&mut unit.feedback, c.feedback);
    ramp.to(&mut unit.lfo.rate, c.rate);
    ramp.to(&mut unit.lfo.depth, c.depth.clamp(0.0, 1.0));
    ramp.to(&mut graph.phaser.wet, c.wet_target());
}

fn update_flanger(graph: &mut SignalGraph, config: &EffectsConfig, ramp: Ramp) {
    let c = &config.flanger;
    let unit = &mut graph.flanger.unit;
    ramp.to(&mut unit.delay, ms(c.delay));
    ramp.to(&mut unit.lfo.depth, ms(c.depth));
    ramp.to(&mut unit.feedback, c.feedback);
    ramp.to(&mut unit.lfo.rate, c.rate);
    ramp.to(&mut graph.flanger.wet, c.wet_target());
}

fn update_chorus(graph: &mut SignalGraph, config: &EffectsConfig, ramp: Ramp) {
    let c = &config.chorus;
    let unit = &mut graph.chorus.unit;
    ramp.to(&mut unit.delay, ms(c.delay));
    ramp.to(&mut unit.lfo.depth, ms(c.depth));
    ramp.to(&mut unit.lfo.rate, c.rate);
    ramp.to(&mut graph.chorus.wet, c.wet_target());
}

fn update_tremolo(graph: &mut SignalGraph, config: &EffectsConfig, ramp: Ramp) {
    let c = &config.tremolo;
    let lfo = &mut graph.tremolo.unit.lfo;
    ramp.to(&mut lfo.rate, c.rate);
    ramp.to(&mut lfo.depth, c.depth.clamp(0.0, 1.0));
    ramp.to(&mut graph.tremolo.wet, c.wet_target());
}

fn update_delay(graph: &mut SignalGraph, config: &EffectsConfig, ramp: Ramp) {
    let c = &config.delay;
    let unit = &mut graph.delay.unit;
    ramp.to(&mut unit.time, c.time);
    ramp.to(&mut unit.feedback, c.feedback);
    ramp.to(&mut graph.delay.wet, c.wet_target());
}

fn update_reverb(graph: &mut SignalGraph, config: &EffectsConfig, ramp: Ramp) {
    let c = &config.reverb;
    // The response is only worth synthesizing once the unit is audible.
    if c.on && graph.reverb.unit.set_decay(c.decay) {
        debug!(decay = c.decay, "reverb impulse response rebuilt");
    }
    ramp.to(&mut graph.reverb.wet, c.wet_target());
}

fn update_bitcrusher(graph: &mut SignalGraph, config: &EffectsConfig, ramp: Ramp) {
    let c = &config.bitcrusher;
    if graph.bitcrusher.unit.set_bits(c.bits) {
        debug!(bits = c.bits, "bitcrusher curve rebuilt");
    }
    ramp.to(&mut graph.bitcrusher.wet, c.wet_target());
}

fn update_vibrato(graph: &mut SignalGraph, config: &EffectsConfig, ramp: Ramp) {
    let c = &config.vibrato;
    let unit = &mut graph.vibrato.unit;
    ramp.to(&mut unit.lfo.rate, c.rate);
    ramp.to(&mut unit.lfo.depth, ms(c.depth));
    ramp.to(&mut graph.vibrato.wet, c.wet_target());
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 8000.0;
    const WINDOW: f64 = 0.08;

    fn run(graph: &mut SignalGraph, from: f64, to: f64) -> Vec<f64> {
        let start = (from * SR) as usize;
        let end = (to * SR) as usize;
        (start..end)
            .map(|i| {
                graph.process(i as f64 / SR, 0.0, 0.0);
                graph.wet_level(EffectKind::Reverb)
            })
            .collect()
    }

    #[test]
    fn toggling_on_ramps_wet_monotonically() {
        let mut graph = SignalGraph::build(SR);
        let mut config = EffectsConfig::default();
        config.reverb.on = true;
        config.reverb.wet = 0.7;
        apply_effects(&mut graph, &config, Ramp::new(0.0, WINDOW));

        let levels = run(&mut graph, 0.0, 0.2);
        for pair in levels.windows(2) {
            assert!(pair[1] >= pair[0], "wet must never fall during the ramp");
            assert!(pair[1] - pair[0] < 0.01, "wet must not step");
        }
        let at_window = (WINDOW * SR) as usize;
        assert!(levels[at_window / 2] > 0.2 && levels[at_window / 2] < 0.5);
        assert!((levels[at_window + 1] - 0.7).abs() < 1e-9);
    }

    #[test]
    fn toggling_off_ramps_to_zero() {
        let mut graph = SignalGraph::build(SR);
        let mut config = EffectsConfig::default();
        config.delay.on = true;
        apply_effects(&mut graph, &config, Ramp::new(0.0, WINDOW));
        run(&mut graph, 0.0, 0.1);
        assert!((graph.wet_level(EffectKind::Delay) - config.delay.wet).abs() < 1e-9);

        config.delay.on = false;
        apply_effects(&mut graph, &config, Ramp::new(0.1, WINDOW));
        run(&mut graph, 0.1, 0.14);
        let midway = graph.wet_level(EffectKind::Delay);
        assert!(midway > 0.0 && midway < config.delay.wet);
        run(&mut graph, 0.14, 0.3);
        assert_eq!(graph.wet_level(EffectKind::Delay), 0.0);
    }

    #[test]
    fn repeated_updates_stay_bounded() {
        let mut graph = SignalGraph::build(SR);
        let mut config = EffectsConfig::default();
        config.chorus.on = true;
        for step in 0..200 {
            config.chorus.wet = 0.2 + (step % 7) as f64 * 0.1;
            config.chorus.rate = 0.5 + (step % 3) as f64;
            apply_effects(&mut graph, &config, Ramp::new(step as f64 * 0.001, WINDOW));
        }
        assert_eq!(graph.chorus.wet.pending_events(), 1);
        assert!(graph.chorus.unit.lfo.rate.pending_events() <= 1);
    }

    #[test]
    fn reverb_response_built_only_when_needed() {
        let mut graph = SignalGraph::build(SR);
        let mut config = EffectsConfig::default();
        apply_effects(&mut graph, &config, Ramp::new(0.0, WINDOW));
        assert_eq!(graph.reverb.unit.ir_generation(), 0);

        config.reverb.on = true;
        apply_effects(&mut graph, &config, Ramp::new(0.0, WINDOW));
        apply_effects(&mut graph, &config, Ramp::new(0.01, WINDOW));
        assert_eq!(graph.reverb.unit.ir_generation(), 1);

        config.reverb.decay = 1.0;
        apply_effects(&mut graph, &config, Ramp::new(0.02, WINDOW));
        assert_eq!(graph.reverb.unit.ir_generation(), 2);
    }

    #[test]
    fn curves_regenerate_on_their_own_parameters() {
        let mut graph = SignalGraph::build(SR);
        let mut config = EffectsConfig::default();
        apply_effects(&mut graph, &config, Ramp::new(0.0, WINDOW));
        let distortion = graph.distortion.unit.curve_generation();
        let bits = graph.bitcrusher.unit.curve_generation();

        config.distortion.tone = 5000.0;
        apply_effects(&mut graph, &config, Ramp::new(0.0, WINDOW));
        assert_eq!(graph.distortion.unit.curve_generation(), distortion);

        config.distortion.drive = 0.9;
        config.bitcrusher.bits = 3;
        apply_effects(&mut graph, &config, Ramp::new(0.0, WINDOW));
        assert_eq!(graph.distortion.unit.curve_generation(), distortion + 1);
        assert_eq!(graph.bitcrusher.unit.curve_generation(), bits + 1);
    }

    #[test]
    fn non_finite_values_keep_previous_targets() {
        let mut graph = SignalGraph::build(SR);
        let mut config = EffectsConfig::default();
        config.delay.on = true;
        config.reverb.on = true;
        apply_effects(&mut graph, &config, Ramp::new(0.0, WINDOW));
        let before = graph.parameter_state();
        let reverb = graph.reverb.unit.ir_generation();
        let curve = graph.distortion.unit.curve_generation();

        config.delay.feedback = f64::NAN;
        config.delay.wet = f64::NAN;
        config.reverb.decay = f64::NAN;
        config.distortion.drive = f64::NAN;
        apply_effects(&mut graph, &config, Ramp::new(0.01, WINDOW));
        apply_effects(&mut graph, &config, Ramp::new(0.02, WINDOW));
        assert_eq!(graph.parameter_state(), before);
        assert_eq!(graph.reverb.unit.ir_generation(), reverb);
        assert_eq!(graph.distortion.unit.curve_generation(), curve);

        for i in 0..800 {
            let (l, r) = graph.process(i as f64 / SR, 0.5, 0.5);
            assert!(l.is_finite() && r.is_finite());
        }
    }

    #[test]
    fn serialized_snapshot_reapplies_identically() {
        let mut config = EffectsConfig::default();
        config.reverb.on = true;
        config.reverb.decay = 1.2;
        config.flanger.on = true;
        config.flanger.delay = 7.0;
        config.panner.on = true;
        config.panner.pan = -0.4;

        let mut graph = SignalGraph::build(SR);
        apply_effects(&mut graph, &config, Ramp::new(0.0, WINDOW));
        let before = graph.parameter_state();

        let json = serde_json::to_string(&config).unwrap();
        let restored: EffectsConfig = serde_json::from_str(&json).unwrap();
        apply_effects(&mut graph, &restored, Ramp::new(0.05, WINDOW));
        assert_eq!(graph.parameter_state(), before);

        let mut fresh = SignalGraph::build(SR);
        apply_effects(&mut fresh, &restored, Ramp::new(0.0, WINDOW));
        assert_eq!(fresh.parameter_state(), before);
    }
}
