//! Key-matrix scanning and control-surface decoding.
//!
//! Every scan period the scanner walks the seven matrix rows, publishes the
//! snapshot for the display, emits a note event for every piano key that
//! changed, rebuilds the voice assignment when one did, derives the
//! square-wave timing from the joystick, services the mode buttons, and runs
//! the knob decoders.
//!
//! Matrix layout:
//!
//! | Row | Bits 0..3 |
//! |-----|-----------|
//! | 0..2 | 12 piano keys, active low; key index = `row · 4 + bit` |
//! | 3 | knob 3 (bits 0, 1) and knob 2 (bits 2, 3) quadrature pairs |
//! | 4 | knob 1 (bits 0, 1) and knob 0 (bits 2, 3) quadrature pairs |
//! | 5 | bit 1 waveform toggle, bit 2 joystick-mode toggle |
//! | 6 | bit 0 reverb toggle |

use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::trace;

use crate::knob::Knob;
use crate::serial::NoteEvent;
use crate::shared::{SharedState, KEY_ROWS as MATRIX_ROWS, KNOB_COUNT, REVERB_KNOB, TIME_SCALE_KNOB};
use crate::tables::Tables;
use crate::voices::{Note, VOICE_COUNT};

/// Columns per matrix row.
pub const MATRIX_COLS: usize = 4;

/// Rows holding the piano keys.
const PIANO_ROWS: usize = 3;

/// Row settling time after driving a select line.
const SETTLE: Duration = Duration::from_micros(10);

/// The switch matrix as the board wires it up.
pub trait KeyMatrix {
    /// Drive the select line for `row` (0..7).
    fn select_row(&mut self, row: usize);

    /// Read the four column bits into the low nibble; 0 means pressed.
    fn read_columns(&mut self) -> u8;
}

/// The two joystick ADC channels, each 0..=1023.
pub trait JoystickAdc {
    fn read_x(&mut self) -> u16;
    fn read_y(&mut self) -> u16;
}

/// The 50 ms scan task.
pub struct KeyScanner<M, J> {
    matrix: M,
    joystick: J,
    shared: Arc<SharedState>,
    tables: Arc<Tables>,
    outbox: SyncSender<NoteEvent>,
    previous: [u8; MATRIX_ROWS],
    knobs: [Knob; KNOB_COUNT],
}

impl<M: KeyMatrix, J: JoystickAdc> KeyScanner<M, J> {
    pub fn new(
        matrix: M,
        joystick: J,
        shared: Arc<SharedState>,
        tables: Arc<Tables>,
        outbox: SyncSender<NoteEvent>,
    ) -> Self {
        Self {
            matrix,
            joystick,
            shared,
            tables,
            outbox,
            previous: [0x0F; MATRIX_ROWS],
            knobs: core::array::from_fn(|_| Knob::new()),
        }
    }

    /// One scan period.
    pub fn scan(&mut self) {
        let mut snapshot = [0u8; MATRIX_ROWS];
        for (row, bits) in snapshot.iter_mut().enumerate() {
            self.matrix.select_row(row);
            thread::sleep(SETTLE);
            *bits = self.matrix.read_columns() & 0x0F;
        }

        self.shared.set_keys(snapshot);

        let keys_changed = self.emit_key_events(&snapshot);
        if keys_changed {
            self.rebuild_voices(&snapshot);
        }

        self.update_square_timing();
        self.update_toggles(&snapshot);
        self.update_knobs(&snapshot);

        self.previous = snapshot;
    }

    /// Queue a press/release event for every piano key that changed since the
    /// previous scan. Returns whether any did.
    fn emit_key_events(&mut self, snapshot: &[u8; MATRIX_ROWS]) -> bool {
        let mut changed_any = false;
        for row in 0..PIANO_ROWS {
            let changed = (snapshot[row] ^ self.previous[row]) & 0x0F;
            if changed == 0 {
                continue;
            }
            changed_any = true;
            for bit in 0..MATRIX_COLS {
                if changed & (1 << bit) == 0 {
                    continue;
                }
                let key = (row * MATRIX_COLS + bit) as u8;
                let Some(note) = Note::new(key, 0) else {
                    continue;
                };
                let event = if self.previous[row] & (1 << bit) != 0 {
                    NoteEvent::Press(note)
                } else {
                    NoteEvent::Release(note)
                };
                trace!("key {key}: {event:?}");
                // A full outbox blocks until the drainer frees a slot.
                let _ = self.outbox.send(event);
            }
        }
        changed_any
    }

    /// Reassign voices from the currently pressed keys, row-major, and
    /// publish the matching step sizes.
    fn rebuild_voices(&mut self, snapshot: &[u8; MATRIX_ROWS]) {
        let mut pressed = Vec::with_capacity(VOICE_COUNT);
        'rows: for row in 0..PIANO_ROWS {
            for bit in 0..MATRIX_COLS {
                if snapshot[row] & (1 << bit) != 0 {
                    continue;
                }
                let Some(note) = Note::new((row * MATRIX_COLS + bit) as u8, 0) else {
                    continue;
                };
                pressed.push(note);
                if pressed.len() == VOICE_COUNT {
                    break 'rows;
                }
            }
        }

        let mut voices = self.shared.voices();
        voices.assign(&pressed);
        voices.publish(&self.shared, &self.tables);
    }

    /// Derive the square-wave phase lengths from the joystick axes, so the
    /// audio side never divides.
    fn update_square_timing(&mut self) {
        let x = u32::from(self.joystick.read_x());
        let y = u32::from(self.joystick.read_y()).min(1023);
        let period = 56 + x / 50;
        let high = period * y / 1024;
        self.shared.set_square(high, period - high);
    }

    /// Service the mode buttons on their press edges.
    fn update_toggles(&mut self, snapshot: &[u8; MATRIX_ROWS]) {
        if self.pressed_edge(snapshot, 5, 1) {
            self.shared.toggle_wave();
        }
        if self.pressed_edge(snapshot, 5, 2) {
            self.shared.toggle_joystick_mode();
        }
        if self.pressed_edge(snapshot, 6, 0) {
            self.shared.toggle_reverb();
        }
    }

    fn pressed_edge(&self, snapshot: &[u8; MATRIX_ROWS], row: usize, bit: usize) -> bool {
        let mask = 1 << bit;
        self.previous[row] & mask != 0 && snapshot[row] & mask == 0
    }

    /// Run all four knob decoders and publish their counters; knobs 0 and 1
    /// additionally drive the reverb wet mix and time scale.
    fn update_knobs(&mut self, snapshot: &[u8; MATRIX_ROWS]) {
        let pairs = [
            (3, snapshot[3] & 0b11),
            (2, (snapshot[3] >> 2) & 0b11),
            (1, snapshot[4] & 0b11),
            (0, (snapshot[4] >> 2) & 0b11),
        ];
        for (index, pair) in pairs {
            self.knobs[index].update(pair);
            self.shared.set_knob(index, self.knobs[index].counter());
        }

        self.shared
            .set_reverb_wet(self.knobs[REVERB_KNOB].counter() as f32 / 16.0);
        self.shared
            .set_reverb_time_scale(self.knobs[TIME_SCALE_KNOB].counter() as f32 / 16.0);
    }
}
