//! Phaser — a chain of all-pass stages whose centre frequency is swept by an
//! LFO, with feedback around the chain.

use super::filter::{BiquadFilter, FilterType};
use super::graph::EffectUnit;
use super::oscillator::Lfo;
use super::param::Param;

const STAGES: usize = 4;
/// All-pass coefficients are refreshed every this many samples.
const CONTROL_INTERVAL: usize = 16;
const STAGE_Q: f64 = 0.7;

#[derive(Debug, Clone)]
pub struct Phaser {
    stages_l: [BiquadFilter; STAGES],
    stages_r: [BiquadFilter; STAGES],
    last_l: f32,
    last_r: f32,
    counter: usize,

    /// Centre of the sweep in Hz.
    pub base_frequency: Param,
    /// Feedback around the all-pass chain.
    pub feedback: Param,
    /// `rate` in Hz; `depth` as a fraction of `base_frequency` (0..1).
    pub lfo: Lfo,
}

impl Phaser {
    pub fn new(sample_rate: f64) -> Self {
        let stage = BiquadFilter::with_params(FilterType::Allpass, sample_rate, 1000.0, STAGE_Q);
        Phaser {
            stages_l: std::array::from_fn(|_| stage.clone()),
            stages_r: std::array::from_fn(|_| stage.clone()),
            last_l: 0.0,
            last_r: 0.0,
            counter: 0,
            base_frequency: Param::with_range(1000.0, 50.0, 8000.0),
            feedback: Param::with_range(0.3, 0.0, 0.9),
            lfo: Lfo::new(sample_rate, 0.5, 0.7),
        }
    }

    fn retune(&mut self, centre_l: f64, centre_r: f64) {
        for stage in &mut self.stages_l {
            stage.set_frequency(centre_l);
        }
        for stage in &mut self.stages_r {
            stage.set_frequency(centre_r);
        }
    }
}

impl EffectUnit for Phaser {
    fn process(&mut self, time: f64, left: f32, right: f32) -> (f32, f32) {
        let base = self.base_frequency.advance(time);
        let feedback = self.feedback.advance(time) as f32;
        let (sweep_l, sweep_r) = self.lfo.next_stereo(time, 0.25);

        if self.counter == 0 {
            // depth is a fraction of base, so the sweep never crosses 0 Hz
            let depth_limit = 0.95;
            self.retune(
                base * (1.0 + sweep_l.clamp(-depth_limit, depth_limit)),
                base * (1.0 + sweep_r.clamp(-depth_limit, depth_limit)),
            );
        }
        self.counter = (self.counter + 1) % CONTROL_INTERVAL;

        let mut l = (left + self.last_l * feedback) as f64;
        let mut r = (right + self.last_r * feedback) as f64;
        for stage in &mut self.stages_l {
            l = stage.process(l);
        }
        for stage in &mut self.stages_r {
            r = stage.process(r);
        }
        self.last_l = l as f32;
        self.last_r = r as f32;

        (self.last_l, self.last_r)
    }

    fn clear(&mut self) {
        for stage in self.stages_l.iter_mut().chain(self.stages_r.iter_mut()) {
            stage.reset();
        }
        self.last_l = 0.0;
        self.last_r = 0.0;
    }

    fn idle(&mut self, time: f64) {
        self.lfo.next(time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_moves_stage_frequency() {
        let sr = 44100.0;
        let mut phaser = Phaser::new(sr);
        let mut seen = Vec::new();
        for i in 0..(sr as usize) {
            phaser.process(i as f64 / sr, 0.0, 0.0);
            if i % 4410 == 0 {
                seen.push(phaser.stages_l[0].frequency());
            }
        }
        let min = seen.iter().cloned().fold(f64::MAX, f64::min);
        let max = seen.iter().cloned().fold(f64::MIN, f64::max);
        assert!(max - min > 500.0, "sweep range too small: {min}..{max}");
    }

    #[test]
    fn output_is_finite_with_feedback() {
        let sr = 44100.0;
        let mut phaser = Phaser::new(sr);
        phaser.feedback = Param::new(0.5);
        for i in 0..44100 {
            let x = if i % 100 == 0 { 1.0 } else { 0.0 };
            let (l, r) = phaser.process(i as f64 / sr, x, x);
            assert!(l.is_finite() && r.is_finite());
            assert!(l.abs() < 20.0 && r.abs() < 20.0);
        }
    }
}
