//! Sample production.
//!
//! One producer iteration claims a fillable buffer and writes 220 consecutive
//! sample bytes from the active source, optionally post-filtered by the
//! reverb. Each byte is independent; there is no look-ahead.
//!
//! # Sources
//!
//! **Sawtooth** — a single 32-bit phase accumulator advanced every sample by
//! the step size of whichever voice's turn it is; the audible output is the
//! accumulator's high byte.
//!
//! **Sine** — a single position counter walking the 5000-entry lookup table,
//! advanced modulo the table length by the selected voice's sine step.
//!
//! **Square** — the joystick LFO: output alternates 0x00/0xFF with high and
//! low phase lengths published by the scanner.
//!
//! # Polyphony
//!
//! With `k` active voices, successive samples round-robin among them: a
//! counter increments every produced sample and the voice turn advances every
//! 750 samples. At 22 kHz the rotation is far below audible pitch, so the ear
//! integrates the interleaved phases into a chord. The voice count is derived
//! from the highest slot with a non-zero published step; a transiently stale
//! lower slot then contributes no phase advance, which is harmless. With no
//! active voice the output holds its last value.

use std::sync::Arc;
use std::time::Duration;

use crate::buffer::{DoubleBuffer, BUFFER_LEN};
use crate::reverb::Reverb;
use crate::shared::{SharedState, WaveForm};
use crate::tables::{Tables, SINE_TABLE_LEN};
use crate::voices::VOICE_COUNT;

/// Samples between advances of the round-robin voice turn.
pub const VOICE_ROTATION: u32 = 750;

/// Fills audio buffers from the published state.
pub struct SampleProducer {
    shared: Arc<SharedState>,
    buffers: Arc<DoubleBuffer>,
    tables: Arc<Tables>,
    reverb: Reverb,
    saw_accumulator: u32,
    sine_position: u32,
    rotation: u32,
    turn: u32,
    square_level: bool,
    square_remaining: u32,
    frame: [u8; BUFFER_LEN],
}

impl SampleProducer {
    /// Build a producer; the reverb delay lengths are fixed from the
    /// time-scale published at this moment.
    pub fn new(shared: Arc<SharedState>, buffers: Arc<DoubleBuffer>, tables: Arc<Tables>) -> Self {
        let reverb = Reverb::new(shared.reverb_params().time_scale);
        Self {
            shared,
            buffers,
            tables,
            reverb,
            saw_accumulator: 0,
            sine_position: 0,
            rotation: 0,
            turn: 0,
            square_level: false,
            square_remaining: 0,
            frame: [0; BUFFER_LEN],
        }
    }

    /// One producer iteration: claim a buffer and write a frame into it.
    ///
    /// Returns `false` if no buffer became fillable within `timeout`; the
    /// iteration is skipped and the output stage replays stale samples.
    pub fn run_once(&mut self, timeout: Duration) -> bool {
        let Some(index) = self.buffers.acquire(timeout) else {
            return false;
        };
        self.fill();
        self.buffers.commit(index, &self.frame);
        true
    }

    /// Produce one frame from the currently published state.
    ///
    /// Mode flags, step sizes and square timing are snapshotted once per
    /// frame; the wet mix is copied out of its short-hold lock.
    pub fn fill(&mut self) -> &[u8; BUFFER_LEN] {
        let joystick = self.shared.joystick_mode();
        let wave = self.shared.wave();
        let reverb_on = self.shared.reverb_enabled();
        let saw_steps = self.shared.saw_steps();
        let sine_steps = self.shared.sine_steps();
        let square_high = self.shared.square_high();
        let square_low = self.shared.square_low();
        self.reverb.set_wet(self.shared.reverb_params().wet);

        for i in 0..BUFFER_LEN {
            let dry = if joystick {
                self.square_sample(square_high, square_low)
            } else {
                match wave {
                    WaveForm::Sawtooth => self.saw_sample(&saw_steps),
                    WaveForm::Sine => self.sine_sample(&sine_steps),
                }
            };
            self.frame[i] = if reverb_on {
                self.reverb.process(f32::from(dry)).clamp(0.0, 255.0) as u8
            } else {
                dry
            };
        }
        &self.frame
    }

    fn saw_sample(&mut self, steps: &[u32; VOICE_COUNT]) -> u8 {
        if let Some(turn) = self.advance_mux(steps) {
            self.saw_accumulator = self.saw_accumulator.wrapping_add(steps[turn]);
        }
        (self.saw_accumulator >> 24) as u8
    }

    fn sine_sample(&mut self, steps: &[u32; VOICE_COUNT]) -> u8 {
        if let Some(turn) = self.advance_mux(steps) {
            self.sine_position = (self.sine_position + steps[turn]) % SINE_TABLE_LEN as u32;
        }
        self.tables.sine(self.sine_position as usize)
    }

    /// Advance the sample counter and pick this sample's voice, or `None`
    /// when no voice is active (the oscillators then hold).
    fn advance_mux(&mut self, steps: &[u32; VOICE_COUNT]) -> Option<usize> {
        let voices = active_voices(steps);
        if voices == 0 {
            return None;
        }
        self.rotation += 1;
        if self.rotation >= VOICE_ROTATION {
            self.rotation = 0;
            self.turn = self.turn.wrapping_add(1);
        }
        Some((self.turn % voices) as usize)
    }

    fn square_sample(&mut self, high: u32, low: u32) -> u8 {
        if self.square_remaining == 0 {
            // Re-arm the next phase, skipping over one with zero length
            // (full-off or full-on duty).
            self.square_level = !self.square_level;
            self.square_remaining = if self.square_level { high } else { low };
            if self.square_remaining == 0 {
                self.square_level = !self.square_level;
                self.square_remaining = if self.square_level { high } else { low };
            }
            if self.square_remaining == 0 {
                return 0x00;
            }
        }
        self.square_remaining -= 1;
        if self.square_level {
            0xFF
        } else {
            0x00
        }
    }
}

/// Voice count derived from the highest slot with a non-zero step.
fn active_voices(steps: &[u32; VOICE_COUNT]) -> u32 {
    if steps[2] != 0 {
        3
    } else if steps[1] != 0 {
        2
    } else if steps[0] != 0 {
        1
    } else {
        0
    }
}
