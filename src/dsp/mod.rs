//! DSP Engine — Pure Rust audio synthesis and effects.
//!
//! Everything that runs on the audio clock lives here: the automation
//! timeline, the effect units and the graph that wires them, the voices,
//! the master bus and the recording tap. `engine::AudioEngine` owns them
//! all for one audio session.

pub mod chorus;
pub mod delay;
pub mod engine;
pub mod filter;
pub mod graph;
pub mod mixer;
pub mod oscillator;
pub mod param;
pub mod phaser;
pub mod recorder;
pub mod reverb;
pub mod shaper;
pub mod tremolo;
pub mod updater;
pub mod voice;
