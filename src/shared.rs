//! Published shared state.
//!
//! Every field here has one writer and a known set of readers, and the
//! protection matches the access pattern:
//!
//! - scalars the audio pipeline reads every buffer (step sizes, mode flags,
//!   knob counters, square-wave timing) are plain atomics with relaxed
//!   ordering — update from the scanner or ingester, read from the audio
//!   side, never block;
//! - the reverb parameters are floats, so they sit behind a short-hold lock
//!   instead of assuming float atomics;
//! - the voice table and the key-matrix snapshot are multi-word values read
//!   rarely (display rate), so they also take a short-hold lock.
//!
//! The display composer reads everything through [`SharedState::snapshot`]
//! and never writes back.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::voices::{Note, VoiceTable, VOICE_COUNT};

/// Number of quadrature knobs on the panel.
pub const KNOB_COUNT: usize = 4;

/// Rows in the key/switch matrix.
pub const KEY_ROWS: usize = 7;

/// Knob that sets the output volume.
pub const VOLUME_KNOB: usize = 3;

/// Knob that sets the reverb wet mix.
pub const REVERB_KNOB: usize = 0;

/// Knob that sets the reverb time scale.
pub const TIME_SCALE_KNOB: usize = 1;

/// Waveform for the keyed voices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WaveForm {
    #[default]
    Sawtooth,
    Sine,
}

impl WaveForm {
    fn from_u8(value: u8) -> Self {
        if value == 0 {
            WaveForm::Sawtooth
        } else {
            WaveForm::Sine
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            WaveForm::Sawtooth => 0,
            WaveForm::Sine => 1,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            WaveForm::Sawtooth => WaveForm::Sine,
            WaveForm::Sine => WaveForm::Sawtooth,
        }
    }
}

/// Reverb parameters, both in `[0, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct ReverbParams {
    /// Wet/dry mix; 0 is fully dry.
    pub wet: f32,
    /// Scale applied to the delay-line lengths at startup.
    pub time_scale: f32,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            wet: 0.0,
            time_scale: 1.0,
        }
    }
}

/// Everything the display composer needs, copied out in one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateSnapshot {
    pub volume: u32,
    pub reverb_amount: u32,
    pub reverb_enabled: bool,
    pub wave: WaveForm,
    pub joystick_mode: bool,
    pub voices: [Option<Note>; VOICE_COUNT],
    pub keys: [u8; KEY_ROWS],
}

/// State published between the periodic tasks and the audio pipeline.
#[derive(Debug)]
pub struct SharedState {
    saw_steps: [AtomicU32; VOICE_COUNT],
    sine_steps: [AtomicU32; VOICE_COUNT],
    wave: AtomicU8,
    joystick_mode: AtomicBool,
    reverb_enabled: AtomicBool,
    knobs: [AtomicU32; KNOB_COUNT],
    square_high: AtomicU32,
    square_low: AtomicU32,
    reverb: Mutex<ReverbParams>,
    voices: Mutex<VoiceTable>,
    keys: Mutex<[u8; KEY_ROWS]>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            saw_steps: core::array::from_fn(|_| AtomicU32::new(0)),
            sine_steps: core::array::from_fn(|_| AtomicU32::new(0)),
            wave: AtomicU8::new(WaveForm::Sawtooth.as_u8()),
            joystick_mode: AtomicBool::new(false),
            reverb_enabled: AtomicBool::new(false),
            knobs: core::array::from_fn(|_| AtomicU32::new(0)),
            square_high: AtomicU32::new(0),
            square_low: AtomicU32::new(0),
            reverb: Mutex::new(ReverbParams::default()),
            voices: Mutex::new(VoiceTable::new()),
            keys: Mutex::new([0x0F; KEY_ROWS]),
        }
    }

    /// Publish both step sizes for a voice slot; zero marks it inactive.
    pub fn set_steps(&self, slot: usize, saw: u32, sine: u32) {
        self.saw_steps[slot].store(saw, Ordering::Relaxed);
        self.sine_steps[slot].store(sine, Ordering::Relaxed);
    }

    #[inline]
    pub fn saw_step(&self, slot: usize) -> u32 {
        self.saw_steps[slot].load(Ordering::Relaxed)
    }

    #[inline]
    pub fn sine_step(&self, slot: usize) -> u32 {
        self.sine_steps[slot].load(Ordering::Relaxed)
    }

    /// Snapshot of all sawtooth steps, in slot order.
    pub fn saw_steps(&self) -> [u32; VOICE_COUNT] {
        core::array::from_fn(|slot| self.saw_step(slot))
    }

    /// Snapshot of all sine steps, in slot order.
    pub fn sine_steps(&self) -> [u32; VOICE_COUNT] {
        core::array::from_fn(|slot| self.sine_step(slot))
    }

    pub fn wave(&self) -> WaveForm {
        WaveForm::from_u8(self.wave.load(Ordering::Relaxed))
    }

    pub fn set_wave(&self, wave: WaveForm) {
        self.wave.store(wave.as_u8(), Ordering::Relaxed);
    }

    pub fn toggle_wave(&self) {
        self.set_wave(self.wave().toggled());
    }

    pub fn joystick_mode(&self) -> bool {
        self.joystick_mode.load(Ordering::Relaxed)
    }

    pub fn set_joystick_mode(&self, on: bool) {
        self.joystick_mode.store(on, Ordering::Relaxed);
    }

    pub fn toggle_joystick_mode(&self) {
        self.joystick_mode.fetch_xor(true, Ordering::Relaxed);
    }

    pub fn reverb_enabled(&self) -> bool {
        self.reverb_enabled.load(Ordering::Relaxed)
    }

    pub fn set_reverb_enabled(&self, on: bool) {
        self.reverb_enabled.store(on, Ordering::Relaxed);
    }

    pub fn toggle_reverb(&self) {
        self.reverb_enabled.fetch_xor(true, Ordering::Relaxed);
    }

    /// Rotation counter of a knob, in `[0, 16]`.
    #[inline]
    pub fn knob(&self, index: usize) -> u32 {
        self.knobs[index].load(Ordering::Relaxed)
    }

    pub fn set_knob(&self, index: usize, counter: u32) {
        self.knobs[index].store(counter, Ordering::Relaxed);
    }

    /// Output volume in `[0, 16]` (knob 3).
    #[inline]
    pub fn volume(&self) -> u32 {
        self.knob(VOLUME_KNOB)
    }

    /// Square-wave high time in samples.
    #[inline]
    pub fn square_high(&self) -> u32 {
        self.square_high.load(Ordering::Relaxed)
    }

    /// Square-wave low time in samples.
    #[inline]
    pub fn square_low(&self) -> u32 {
        self.square_low.load(Ordering::Relaxed)
    }

    /// Publish both square-wave phase lengths; the audio side never divides.
    pub fn set_square(&self, high: u32, low: u32) {
        self.square_high.store(high, Ordering::Relaxed);
        self.square_low.store(low, Ordering::Relaxed);
    }

    /// Copy of the reverb parameters (the lock is held only for the copy).
    pub fn reverb_params(&self) -> ReverbParams {
        *self.reverb.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_reverb_wet(&self, wet: f32) {
        self.reverb
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .wet = wet.clamp(0.0, 1.0);
    }

    pub fn set_reverb_time_scale(&self, time_scale: f32) {
        self.reverb
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .time_scale = time_scale.clamp(0.0, 1.0);
    }

    /// Lock the voice table. Held only for slot rearrangement and publication.
    pub fn voices(&self) -> MutexGuard<'_, VoiceTable> {
        self.voices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish the latest key-matrix snapshot.
    pub fn set_keys(&self, snapshot: [u8; KEY_ROWS]) {
        *self.keys.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    /// Copy of the latest key-matrix snapshot.
    pub fn keys(&self) -> [u8; KEY_ROWS] {
        *self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One-call copy of everything the display renders.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            volume: self.volume(),
            reverb_amount: self.knob(REVERB_KNOB),
            reverb_enabled: self.reverb_enabled(),
            wave: self.wave(),
            joystick_mode: self.joystick_mode(),
            voices: self.voices().slots(),
            keys: self.keys(),
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn steps_default_to_inactive() {
        let shared = SharedState::new();
        for slot in 0..VOICE_COUNT {
            assert_eq!(shared.saw_step(slot), 0);
            assert_eq!(shared.sine_step(slot), 0);
        }
    }

    #[test]
    fn step_snapshots_reflect_publication() {
        let shared = SharedState::new();
        shared.set_steps(1, 51_000_000, 67);
        assert_eq!(shared.saw_steps(), [0, 51_000_000, 0]);
        assert_eq!(shared.sine_steps(), [0, 67, 0]);
    }

    #[test]
    fn toggles_flip_state() {
        let shared = SharedState::new();
        assert_eq!(shared.wave(), WaveForm::Sawtooth);
        shared.toggle_wave();
        assert_eq!(shared.wave(), WaveForm::Sine);
        shared.toggle_wave();
        assert_eq!(shared.wave(), WaveForm::Sawtooth);

        shared.toggle_joystick_mode();
        assert!(shared.joystick_mode());
        shared.toggle_reverb();
        assert!(shared.reverb_enabled());
        shared.toggle_reverb();
        assert!(!shared.reverb_enabled());
    }

    #[test]
    fn reverb_params_are_clamped() {
        let shared = SharedState::new();
        shared.set_reverb_wet(1.5);
        shared.set_reverb_time_scale(-0.25);
        let params = shared.reverb_params();
        assert_eq!(params.wet, 1.0);
        assert_eq!(params.time_scale, 0.0);
    }

    #[test]
    fn snapshot_collects_published_fields() {
        let shared = SharedState::new();
        shared.set_knob(VOLUME_KNOB, 12);
        shared.set_knob(REVERB_KNOB, 4);
        shared.set_reverb_enabled(true);
        shared.set_wave(WaveForm::Sine);
        shared.set_keys([0x0E, 0x0F, 0x0F, 0x0F, 0x0F, 0x0F, 0x0F]);

        let snap = shared.snapshot();
        assert_eq!(snap.volume, 12);
        assert_eq!(snap.reverb_amount, 4);
        assert!(snap.reverb_enabled);
        assert_eq!(snap.wave, WaveForm::Sine);
        assert_eq!(snap.keys[0], 0x0E);
        assert_eq!(snap.voices, [None, None, None]);
    }

    #[test]
    fn steps_cross_thread_publication() {
        let shared = Arc::new(SharedState::new());
        let writer = Arc::clone(&shared);

        std::thread::spawn(move || {
            writer.set_steps(0, 42, 7);
        })
        .join()
        .unwrap();

        assert_eq!(shared.saw_step(0), 42);
        assert_eq!(shared.sine_step(0), 7);
    }
}
