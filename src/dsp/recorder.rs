//! Recorder — captures the master output into an in-memory WAV clip.

use std::io::Cursor;

use tracing::info;

use crate::error::EngineError;

pub const WAV_MIME: &str = "audio/wav";

/// A finished capture. Empty when nothing was being recorded.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Clip {
    /// Encoded file contents (16-bit stereo PCM WAV).
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    /// Number of stereo frames captured.
    pub frames: usize,
}

impl Clip {
    pub fn empty() -> Self {
        Clip::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn duration_seconds(&self, sample_rate: u32) -> f64 {
        self.frames as f64 / sample_rate as f64
    }
}

/// Tap on the master output. Frames are only kept between `start` and `stop`.
#[derive(Debug, Default)]
pub struct Recorder {
    capturing: bool,
    /// Interleaved stereo samples.
    samples: Vec<f32>,
}

impl Recorder {
    pub fn new() -> Self {
        Recorder::default()
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    /// Begin a fresh capture, discarding anything held from before.
    pub fn start(&mut self) {
        self.samples.clear();
        self.capturing = true;
        info!("capture started");
    }

    #[inline]
    pub fn push(&mut self, left: f32, right: f32) {
        if self.capturing {
            self.samples.push(left);
            self.samples.push(right);
        }
    }

    /// Finish the capture and encode it. Stopping an idle recorder yields an
    /// empty clip.
    pub fn stop(&mut self, sample_rate: u32) -> Result<Clip, EngineError> {
        if !self.capturing {
            return Ok(Clip::empty());
        }
        self.capturing = false;
        let samples = std::mem::take(&mut self.samples);
        let clip = encode_wav(&samples, sample_rate)?;
        info!(frames = clip.frames, bytes = clip.bytes.len(), "capture finished");
        Ok(clip)
    }
}

/// Encode interleaved stereo f32 samples as a 16-bit PCM WAV clip.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Clip, EngineError> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in samples {
            writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
    }
    Ok(Clip {
        bytes: cursor.into_inner(),
        mime_type: WAV_MIME,
        frames: samples.len() / 2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_without_start_is_empty() {
        let mut rec = Recorder::new();
        let clip = rec.stop(44100).unwrap();
        assert!(clip.is_empty());
        assert_eq!(clip.frames, 0);
    }

    #[test]
    fn frames_outside_capture_are_ignored() {
        let mut rec = Recorder::new();
        rec.push(0.5, 0.5);
        rec.start();
        for _ in 0..100 {
            rec.push(0.25, -0.25);
        }
        let clip = rec.stop(8000).unwrap();
        rec.push(0.5, 0.5);
        assert_eq!(clip.frames, 100);
        assert!(!rec.is_capturing());
    }

    #[test]
    fn clip_is_valid_wav() {
        let mut rec = Recorder::new();
        rec.start();
        for i in 0..441 {
            let s = (i as f32 / 441.0 * std::f32::consts::TAU).sin() * 0.5;
            rec.push(s, -s);
        }
        let clip = rec.stop(44100).unwrap();
        assert_eq!(clip.mime_type, "audio/wav");
        assert_eq!(&clip.bytes[0..4], b"RIFF");
        assert_eq!(&clip.bytes[8..12], b"WAVE");

        let reader = hound::WavReader::new(Cursor::new(clip.bytes.clone())).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 44100);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len(), 882);
        assert!((clip.duration_seconds(44100) - 0.01).abs() < 1e-9);
    }
}
