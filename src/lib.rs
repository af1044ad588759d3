//! # Triad: Three-Voice Polyphonic Keyboard Engine
//!
//! `triad` is the real-time core of a small polyphonic keyboard module: keys,
//! knobs, a thumb joystick and a serial link on the input side, a 22 kHz
//! 8-bit mono DAC stream on the output side. The crate turns physical key
//! state into audio samples with no perceptible latency, applies an optional
//! Schroeder reverb, and exchanges textual note events with peer modules.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐  step sizes,   ┌─────────────────┐   220-byte   ┌──────────────┐
//! │ key scanner   │  mode flags    │ sample producer │   frames     │ output stage │
//! │ serial inlet  │ ───atomics───▶ │ saw/sine/square │ ──buffers──▶ │ 22 kHz tick  │──▶ DAC
//! │ (50 ms, 5 ms) │                │ + reverb        │ ◀─returns──  │ volume shift │
//! └──────┬────────┘                └─────────────────┘  semaphores  └──────────────┘
//!        │ note events
//!        ▼
//! ┌───────────────┐
//! │ outbox drain  │──▶ serial out
//! └───────────────┘
//! ```
//!
//! Input tasks publish small scalars through atomics and touch the larger
//! voice table behind a short-hold lock; the producer and the DAC-clocked
//! output stage exchange whole frames through a semaphore-gated double
//! buffer, so the sample path never blocks.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use triad::prelude::*;
//!
//! # struct Board;
//! # impl KeyMatrix for Board {
//! #     fn select_row(&mut self, _: usize) {}
//! #     fn read_columns(&mut self) -> u8 { 0x0F }
//! # }
//! # impl JoystickAdc for Board {
//! #     fn read_x(&mut self) -> u16 { 512 }
//! #     fn read_y(&mut self) -> u16 { 512 }
//! # }
//! # impl SerialIn for Board {
//! #     fn read_byte(&mut self) -> Option<u8> { None }
//! # }
//! # impl SerialOut for Board {
//! #     fn write(&mut self, _: &[u8]) {}
//! # }
//! # impl Dac for Board {
//! #     fn write(&mut self, _: u8) {}
//! # }
//! # let (matrix, joystick, rx, tx, mut dac) = (Board, Board, Board, Board, Board);
//! // Wire the engine to the board's hardware.
//! let mut engine = Engine::start(matrix, joystick, rx, tx, EngineConfig::default());
//!
//! // The DAC clock drives the output stage at 22 kHz.
//! let mut output = engine.output_stage().expect("taken once");
//! loop {
//!     // ... on each sample tick:
//!     output.drive(&mut dac);
//! }
//! ```
//!
//! ## Module map
//!
//! - [`tables`] - sine lookup and equal-temperament step tables
//! - [`knob`] - quadrature knob decoding
//! - [`voices`] - the left-packed three-slot voice table
//! - [`shared`] - published state between tasks
//! - [`reverb`] - the Schroeder reverberation network
//! - [`buffer`] - the audio double buffer and output stage
//! - [`producer`] - oscillators, voice multiplexing, frame production
//! - [`scanner`] - key-matrix scanning and control decoding
//! - [`serial`] - the `Pxy`/`Rxy` wire protocol
//! - [`engine`] - task wiring and lifecycle

pub mod buffer;
pub mod engine;
pub mod knob;
pub mod producer;
pub mod reverb;
pub mod scanner;
pub mod serial;
pub mod shared;
pub mod tables;
pub mod voices;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::buffer::{Dac, DoubleBuffer, OutputStage, BUFFER_LEN};
    pub use crate::engine::{Engine, EngineConfig};
    pub use crate::knob::Knob;
    pub use crate::producer::SampleProducer;
    pub use crate::reverb::Reverb;
    pub use crate::scanner::{JoystickAdc, KeyMatrix, KeyScanner};
    pub use crate::serial::{NoteEvent, OutboxDrainer, SerialIn, SerialIngester, SerialOut};
    pub use crate::shared::{ReverbParams, SharedState, StateSnapshot, WaveForm};
    pub use crate::tables::{Tables, SAMPLE_RATE, SINE_TABLE_LEN};
    pub use crate::voices::{Note, VoiceTable, VOICE_COUNT};
}

// Re-export key types at crate root for convenience
pub use prelude::*;
