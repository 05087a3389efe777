//! Waveshaping units: distortion (saturating curve + tone filter) and the
//! bitcrusher (quantizing curve).
//!
//! Both precompute a transfer curve and look it up per sample, the way a
//! WebAudio `WaveShaperNode` does. Curves are rebuilt only when the
//! parameters that define them change.

use serde::{Deserialize, Serialize};

use super::filter::{BiquadFilter, FilterType};
use super::graph::EffectUnit;
use super::param::Param;

/// Number of points in a transfer curve.
pub const CURVE_LEN: usize = 4096;
const CONTROL_INTERVAL: usize = 16;

/// Shape of the distortion transfer curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClipShape {
    /// Smooth saturation, `(1 + k)x / (1 + k|x|)`.
    #[default]
    Soft,
    /// Gain then hard clamp at ±1.
    Hard,
}

/// Build a saturating curve for `drive` in 0..1.
pub fn distortion_curve(drive: f64, shape: ClipShape) -> Vec<f32> {
    let drive = drive.clamp(0.0, 1.0);
    (0..CURVE_LEN)
        .map(|i| {
            let x = curve_input(i);
            let y = match shape {
                ClipShape::Soft => {
                    let k = drive * 100.0;
                    (1.0 + k) * x / (1.0 + k * x.abs())
                }
                ClipShape::Hard => (x * (1.0 + drive * 20.0)).clamp(-1.0, 1.0),
            };
            y as f32
        })
        .collect()
}

/// Build a staircase curve with `2^bits` output levels.
pub fn bitcrush_curve(bits: u32) -> Vec<f32> {
    let levels = 2.0_f64.powi(bits.clamp(1, 16) as i32);
    let step = 2.0 / (levels - 1.0);
    (0..CURVE_LEN)
        .map(|i| {
            let x = curve_input(i);
            (((x + 1.0) / step).round() * step - 1.0) as f32
        })
        .collect()
}

/// Input value in [-1, 1] that curve index `i` represents.
#[inline]
fn curve_input(i: usize) -> f64 {
    i as f64 * 2.0 / (CURVE_LEN - 1) as f64 - 1.0
}

/// Look up `curve` at `x`, interpolating between neighbouring points.
/// Inputs outside [-1, 1] take the end values.
#[inline]
pub fn shape(curve: &[f32], x: f32) -> f32 {
    let n = curve.len();
    if n == 0 {
        return x;
    }
    let pos = ((x.clamp(-1.0, 1.0) + 1.0) * 0.5) * (n - 1) as f32;
    let i = pos as usize;
    if i >= n - 1 {
        return curve[n - 1];
    }
    let frac = pos - i as f32;
    curve[i] + (curve[i + 1] - curve[i]) * frac
}

/// Curve → tone low-pass. Output level is the unit's wet gain.
#[derive(Debug, Clone)]
pub struct Distortion {
    curve: Vec<f32>,
    curve_key: Option<(u64, ClipShape)>,
    generation: u32,
    tone_l: BiquadFilter,
    tone_r: BiquadFilter,
    counter: usize,

    /// Tone low-pass cutoff in Hz.
    pub tone: Param,
}

impl Distortion {
    pub fn new(sample_rate: f64) -> Self {
        let mut d = Distortion {
            curve: Vec::new(),
            curve_key: None,
            generation: 0,
            tone_l: BiquadFilter::with_params(FilterType::Lowpass, sample_rate, 3000.0, 0.707),
            tone_r: BiquadFilter::with_params(FilterType::Lowpass, sample_rate, 3000.0, 0.707),
            counter: 0,
            tone: Param::with_range(3000.0, 200.0, 18000.0),
        };
        d.set_curve(0.4, ClipShape::Soft);
        d
    }

    /// Rebuild the transfer curve if `drive`/`shape` differ from the current
    /// one. Returns whether a rebuild happened.
    pub fn set_curve(&mut self, drive: f64, shape: ClipShape) -> bool {
        if !drive.is_finite() {
            return false;
        }
        let key = (drive.to_bits(), shape);
        if self.curve_key == Some(key) {
            return false;
        }
        self.curve = distortion_curve(drive, shape);
        self.curve_key = Some(key);
        self.generation += 1;
        true
    }

    /// How many times the curve has been built.
    pub fn curve_generation(&self) -> u32 {
        self.generation
    }
}

impl EffectUnit for Distortion {
    fn process(&mut self, time: f64, left: f32, right: f32) -> (f32, f32) {
        let tone = self.tone.advance(time);
        if self.counter == 0 {
            self.tone_l.set_frequency(tone);
            self.tone_r.set_frequency(tone);
        }
        self.counter = (self.counter + 1) % CONTROL_INTERVAL;

        let l = self.tone_l.process(shape(&self.curve, left) as f64);
        let r = self.tone_r.process(shape(&self.curve, right) as f64);
        (l as f32, r as f32)
    }

    fn clear(&mut self) {
        self.tone_l.reset();
        self.tone_r.reset();
    }
}

/// Quantizing waveshaper.
#[derive(Debug, Clone)]
pub struct Bitcrusher {
    curve: Vec<f32>,
    bits: Option<u32>,
    generation: u32,
}

impl Bitcrusher {
    pub fn new() -> Self {
        let mut b = Bitcrusher {
            curve: Vec::new(),
            bits: None,
            generation: 0,
        };
        b.set_bits(8);
        b
    }

    /// Rebuild the staircase if the bit depth changed.
    pub fn set_bits(&mut self, bits: u32) -> bool {
        if self.bits == Some(bits) {
            return false;
        }
        self.curve = bitcrush_curve(bits);
        self.bits = Some(bits);
        self.generation += 1;
        true
    }

    pub fn curve_generation(&self) -> u32 {
        self.generation
    }
}

impl Default for Bitcrusher {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectUnit for Bitcrusher {
    #[inline]
    fn process(&mut self, _time: f64, left: f32, right: f32) -> (f32, f32) {
        (shape(&self.curve, left), shape(&self.curve, right))
    }

    fn clear(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_curve_is_odd_and_bounded() {
        let curve = distortion_curve(0.8, ClipShape::Soft);
        assert_eq!(curve.len(), CURVE_LEN);
        assert!((curve[0] + 1.0).abs() < 1e-6);
        assert!((curve[CURVE_LEN - 1] - 1.0).abs() < 1e-6);
        for (i, &y) in curve.iter().enumerate() {
            assert!(y.abs() <= 1.0 + 1e-6);
            let mirrored = curve[CURVE_LEN - 1 - i];
            assert!((y + mirrored).abs() < 1e-5, "curve not odd at {i}");
        }
    }

    #[test]
    fn more_drive_saturates_harder() {
        let gentle = distortion_curve(0.1, ClipShape::Soft);
        let heavy = distortion_curve(0.9, ClipShape::Soft);
        assert!(shape(&heavy, 0.2) > shape(&gentle, 0.2));
    }

    #[test]
    fn hard_clip_clamps() {
        let curve = distortion_curve(1.0, ClipShape::Hard);
        assert!((shape(&curve, 0.5) - 1.0).abs() < 1e-6);
        assert!((shape(&curve, -0.5) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn bitcrush_levels() {
        let curve = bitcrush_curve(2);
        let mut levels: Vec<i32> = curve.iter().map(|&y| (y * 1000.0).round() as i32).collect();
        levels.dedup();
        assert_eq!(levels.len(), 4, "2 bits should give 4 levels: {levels:?}");
    }

    #[test]
    fn curves_rebuild_only_on_change() {
        let mut d = Distortion::new(44100.0);
        let before = d.curve_generation();
        assert!(!d.set_curve(0.4, ClipShape::Soft));
        assert_eq!(d.curve_generation(), before);
        assert!(d.set_curve(0.5, ClipShape::Soft));
        assert!(d.set_curve(0.5, ClipShape::Hard));
        assert_eq!(d.curve_generation(), before + 2);

        let mut b = Bitcrusher::new();
        assert!(!b.set_bits(8));
        assert!(b.set_bits(4));
        assert_eq!(b.curve_generation(), 2);
    }

    #[test]
    fn shape_clamps_out_of_range_input() {
        let curve = bitcrush_curve(4);
        assert_eq!(shape(&curve, 3.0), curve[CURVE_LEN - 1]);
        assert_eq!(shape(&curve, -3.0), curve[0]);
    }
}
