//! Convolution reverb.
//!
//! The impulse response is synthesized offline (stereo, exponentially
//! decaying low-passed noise) and convolved with the signal using a uniformly
//! partitioned overlap-save FFT convolver. The response is built on first use
//! and rebuilt only when the decay time changes.

use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use super::filter::{BiquadFilter, FilterType};
use super::graph::EffectUnit;

/// Convolution block size; also the unit's latency in samples.
const BLOCK: usize = 512;
pub const MIN_DECAY: f64 = 0.1;
pub const MAX_DECAY: f64 = 10.0;
/// Cutoff of the noise colouring filter.
const IR_LOWPASS_HZ: f64 = 6000.0;

/// Synthesize one channel of an impulse response lasting `decay` seconds.
/// The envelope reaches -60 dB at `decay`; the result is normalized to unit
/// energy so the wet level does not depend on length.
pub fn impulse_response(sample_rate: f64, decay: f64, seed: u64) -> Vec<f32> {
    let decay = decay.clamp(MIN_DECAY, MAX_DECAY);
    let len = (decay * sample_rate).ceil() as usize;
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut colour = BiquadFilter::with_params(FilterType::Lowpass, sample_rate, IR_LOWPASS_HZ, 0.707);
    // ln(1000): amplitude falls by 60 dB over `decay`
    let rate = 6.907_755 / decay;

    let mut ir: Vec<f32> = (0..len)
        .map(|i| {
            let t = i as f64 / sample_rate;
            let noise = rng.f64() * 2.0 - 1.0;
            (colour.process(noise) * (-rate * t).exp()) as f32
        })
        .collect();

    let energy: f32 = ir.iter().map(|s| s * s).sum();
    if energy > 0.0 {
        let norm = energy.sqrt().recip();
        ir.iter_mut().for_each(|s| *s *= norm);
    }
    ir
}

/// Uniformly partitioned overlap-save convolver (mono).
pub struct Convolver {
    r2c: Arc<dyn RealToComplex<f32>>,
    c2r: Arc<dyn ComplexToReal<f32>>,
    /// Spectra of the response, one per `BLOCK`-sized partition.
    partitions: Vec<Vec<Complex<f32>>>,
    /// Spectra of past input blocks; `head` is the newest.
    history: Vec<Vec<Complex<f32>>>,
    head: usize,
    prev_input: Vec<f32>,
    input: Vec<f32>,
    output: Vec<f32>,
    pos: usize,
    time_scratch: Vec<f32>,
    acc: Vec<Complex<f32>>,
}

impl std::fmt::Debug for Convolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Convolver")
            .field("partitions", &self.partitions.len())
            .field("pos", &self.pos)
            .finish()
    }
}

impl Convolver {
    pub fn new(response: &[f32]) -> Self {
        let fft_len = 2 * BLOCK;
        let mut planner = RealFftPlanner::<f32>::new();
        let r2c = planner.plan_fft_forward(fft_len);
        let c2r = planner.plan_fft_inverse(fft_len);

        let count = response.len().div_ceil(BLOCK).max(1);
        let mut time_scratch = r2c.make_input_vec();
        let partitions: Vec<Vec<Complex<f32>>> = (0..count)
            .map(|p| {
                time_scratch.fill(0.0);
                let start = p * BLOCK;
                let end = (start + BLOCK).min(response.len());
                if start < end {
                    time_scratch[..end - start].copy_from_slice(&response[start..end]);
                }
                let mut spectrum = r2c.make_output_vec();
                if r2c.process(&mut time_scratch, &mut spectrum).is_err() {
                    spectrum.fill(Complex::new(0.0, 0.0));
                }
                spectrum
            })
            .collect();

        let bins = r2c.make_output_vec().len();
        Convolver {
            history: vec![vec![Complex::new(0.0, 0.0); bins]; count],
            head: 0,
            prev_input: vec![0.0; BLOCK],
            input: vec![0.0; BLOCK],
            output: vec![0.0; BLOCK],
            pos: 0,
            acc: vec![Complex::new(0.0, 0.0); bins],
            time_scratch,
            partitions,
            r2c,
            c2r,
        }
    }

    /// Push one input sample and pop one output sample (`BLOCK` samples late).
    #[inline]
    pub fn process(&mut self, sample: f32) -> f32 {
        let out = self.output[self.pos];
        self.input[self.pos] = sample;
        self.pos += 1;
        if self.pos == BLOCK {
            self.run_block();
            self.pos = 0;
        }
        out
    }

    fn run_block(&mut self) {
        let count = self.partitions.len();
        self.head = (self.head + count - 1) % count;

        self.time_scratch[..BLOCK].copy_from_slice(&self.prev_input);
        self.time_scratch[BLOCK..].copy_from_slice(&self.input);
        if self
            .r2c
            .process(&mut self.time_scratch, &mut self.history[self.head])
            .is_err()
        {
            self.output.fill(0.0);
            return;
        }

        self.acc.fill(Complex::new(0.0, 0.0));
        for (p, partition) in self.partitions.iter().enumerate() {
            let past = &self.history[(self.head + p) % count];
            for ((acc, x), h) in self.acc.iter_mut().zip(past).zip(partition) {
                *acc += x * h;
            }
        }
        // DC and Nyquist bins of a real signal carry no imaginary part.
        let last = self.acc.len() - 1;
        self.acc[0].im = 0.0;
        self.acc[last].im = 0.0;

        if self.c2r.process(&mut self.acc, &mut self.time_scratch).is_err() {
            self.output.fill(0.0);
        } else {
            let scale = 1.0 / (2 * BLOCK) as f32;
            for (out, s) in self.output.iter_mut().zip(&self.time_scratch[BLOCK..]) {
                *out = s * scale;
            }
        }

        std::mem::swap(&mut self.prev_input, &mut self.input);
    }

    pub fn clear(&mut self) {
        for spectrum in &mut self.history {
            spectrum.fill(Complex::new(0.0, 0.0));
        }
        self.prev_input.fill(0.0);
        self.input.fill(0.0);
        self.output.fill(0.0);
        self.pos = 0;
    }
}

/// Stereo convolution reverb; silent until a response has been built.
#[derive(Debug)]
pub struct Reverb {
    sample_rate: f64,
    decay: Option<f64>,
    generation: u32,
    left: Option<Convolver>,
    right: Option<Convolver>,
}

impl Reverb {
    pub fn new(sample_rate: f64) -> Self {
        Reverb {
            sample_rate,
            decay: None,
            generation: 0,
            left: None,
            right: None,
        }
    }

    /// Build the impulse response for `decay` seconds unless one for the same
    /// decay already exists. Returns whether a rebuild happened.
    pub fn set_decay(&mut self, decay: f64) -> bool {
        if !decay.is_finite() {
            return false;
        }
        let decay = decay.clamp(MIN_DECAY, MAX_DECAY);
        if self.decay == Some(decay) {
            return false;
        }
        let seed = decay.to_bits();
        let ir_l = impulse_response(self.sample_rate, decay, seed);
        let ir_r = impulse_response(self.sample_rate, decay, seed.rotate_left(17) ^ 0x5eed);
        self.left = Some(Convolver::new(&ir_l));
        self.right = Some(Convolver::new(&ir_r));
        self.decay = Some(decay);
        self.generation += 1;
        true
    }

    /// Decay of the current response, if one has been built.
    pub fn decay(&self) -> Option<f64> {
        self.decay
    }

    /// How many impulse responses have been synthesized.
    pub fn ir_generation(&self) -> u32 {
        self.generation
    }
}

impl EffectUnit for Reverb {
    #[inline]
    fn process(&mut self, _time: f64, left: f32, right: f32) -> (f32, f32) {
        match (&mut self.left, &mut self.right) {
            (Some(l), Some(r)) => (l.process(left), r.process(right)),
            _ => (0.0, 0.0),
        }
    }

    fn clear(&mut self) {
        if let Some(l) = &mut self.left {
            l.clear();
        }
        if let Some(r) = &mut self.right {
            r.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impulse_response_decays() {
        let sr = 8000.0;
        let ir = impulse_response(sr, 1.0, 7);
        assert_eq!(ir.len(), 8000);
        let head: f32 = ir[..800].iter().map(|s| s.abs()).sum();
        let tail: f32 = ir[7200..].iter().map(|s| s.abs()).sum();
        assert!(tail < head * 0.01, "tail {tail} vs head {head}");
        let energy: f32 = ir.iter().map(|s| s * s).sum();
        assert!((energy - 1.0).abs() < 1e-3);
    }

    #[test]
    fn convolver_matches_direct_convolution() {
        let response: Vec<f32> = (0..1300).map(|i| ((i * 37 % 101) as f32 / 101.0) - 0.5).collect();
        let input: Vec<f32> = (0..3000).map(|i| ((i * 13 % 29) as f32 / 29.0) - 0.5).collect();
        let mut conv = Convolver::new(&response);
        let out: Vec<f32> = input.iter().map(|&x| conv.process(x)).collect();

        for n in [BLOCK, BLOCK + 1, 1500, 2999] {
            let k = n - BLOCK; // latency
            let expected: f32 = (0..=k)
                .filter(|&j| k - j < response.len())
                .map(|j| input[j] * response[k - j])
                .sum();
            assert!(
                (out[n] - expected).abs() < 1e-2,
                "sample {n}: got {}, expected {expected}",
                out[n]
            );
        }
    }

    #[test]
    fn reverb_is_silent_until_built() {
        let mut reverb = Reverb::new(8000.0);
        assert_eq!(reverb.process(0.0, 1.0, 1.0), (0.0, 0.0));
        assert!(reverb.decay().is_none());
    }

    #[test]
    fn response_rebuilt_only_when_decay_changes() {
        let mut reverb = Reverb::new(8000.0);
        assert!(reverb.set_decay(1.5));
        assert!(!reverb.set_decay(1.5));
        assert_eq!(reverb.ir_generation(), 1);
        assert!(reverb.set_decay(2.0));
        assert_eq!(reverb.ir_generation(), 2);
    }

    #[test]
    fn reverb_produces_tail() {
        let mut reverb = Reverb::new(8000.0);
        reverb.set_decay(0.5);
        reverb.process(0.0, 1.0, 1.0);
        let tail = (1..4000).any(|_| {
            let (l, r) = reverb.process(0.0, 0.0, 0.0);
            l.abs() > 1e-3 || r.abs() > 1e-3
        });
        assert!(tail);
    }
}
