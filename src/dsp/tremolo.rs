//! Amplitude units: LFO tremolo and the equal-power stereo panner.

use std::f64::consts::FRAC_PI_4;

use super::graph::EffectUnit;
use super::oscillator::Lfo;
use super::param::Param;

/// Gain modulation between `1 - depth` and `1`.
#[derive(Debug, Clone)]
pub struct Tremolo {
    /// `rate` in Hz; `depth` in 0..1.
    pub lfo: Lfo,
}

impl Tremolo {
    pub fn new(sample_rate: f64) -> Self {
        Tremolo {
            lfo: Lfo::new(sample_rate, 5.0, 0.5),
        }
    }
}

impl EffectUnit for Tremolo {
    #[inline]
    fn process(&mut self, time: f64, left: f32, right: f32) -> (f32, f32) {
        let swing = self.lfo.next(time);
        let depth = self.lfo.depth.current().clamp(0.0, 1.0);
        let gain = (1.0 - depth * 0.5 + swing * 0.5).clamp(0.0, 1.0) as f32;
        (left * gain, right * gain)
    }

    fn clear(&mut self) {}

    fn idle(&mut self, time: f64) {
        self.lfo.next(time);
    }
}

/// Equal-power placement of the mono sum between the two channels.
#[derive(Debug, Clone)]
pub struct Panner {
    /// -1 = hard left, 0 = centre, 1 = hard right.
    pub pan: Param,
}

impl Panner {
    pub fn new() -> Self {
        Panner {
            pan: Param::with_range(0.0, -1.0, 1.0),
        }
    }
}

impl Default for Panner {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectUnit for Panner {
    #[inline]
    fn process(&mut self, time: f64, left: f32, right: f32) -> (f32, f32) {
        let angle = (self.pan.advance(time) + 1.0) * FRAC_PI_4;
        let mono = (left + right) * 0.5;
        (mono * angle.cos() as f32, mono * angle.sin() as f32)
    }

    fn clear(&mut self) {}
}
