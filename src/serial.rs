//! Serial note-event protocol.
//!
//! Peer modules exchange newline-terminated three-character messages at
//! 115200 baud: `Pxy` presses a note and `Rxy` releases one, where `x` is an
//! octave digit '0'..'8' ('4' is unshifted) and `y` is the semitone as a hex
//! digit '0'..'B'. Anything else is silently ignored.
//!
//! The ingester drains the receive side every 5 ms and edits the voice table
//! by slot compaction; the drainer blocks on the outbox and forwards queued
//! events, each as its three wire bytes plus a trailing newline.

use std::sync::mpsc::Receiver;
use std::sync::Arc;

use log::trace;

use crate::shared::SharedState;
use crate::tables::Tables;
use crate::voices::Note;

/// Characters in a wire message, excluding the terminator.
pub const MESSAGE_LEN: usize = 3;

/// A note press or release crossing the serial link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NoteEvent {
    Press(Note),
    Release(Note),
}

impl NoteEvent {
    pub fn note(&self) -> Note {
        match self {
            NoteEvent::Press(note) | NoteEvent::Release(note) => *note,
        }
    }

    /// The three wire bytes, e.g. `P4A`.
    pub fn encode(&self) -> [u8; MESSAGE_LEN] {
        let (tag, note) = match self {
            NoteEvent::Press(note) => (b'P', note),
            NoteEvent::Release(note) => (b'R', note),
        };
        let octave = b'0' + (note.octave() + 4) as u8;
        let semitone = match note.semitone() {
            s @ 0..=9 => b'0' + s,
            s => b'A' + (s - 10),
        };
        [tag, octave, semitone]
    }

    /// Parse one received line. `None` for anything malformed.
    pub fn parse(line: &[u8]) -> Option<Self> {
        let &[tag, octave, semitone] = line else {
            return None;
        };
        let octave = match octave {
            b'0'..=b'8' => octave as i8 - b'4' as i8,
            _ => return None,
        };
        let semitone = match semitone {
            b'0'..=b'9' => semitone - b'0',
            b'A' | b'B' => semitone - b'A' + 10,
            _ => return None,
        };
        let note = Note::new(semitone, octave)?;
        match tag {
            b'P' => Some(NoteEvent::Press(note)),
            b'R' => Some(NoteEvent::Release(note)),
            _ => None,
        }
    }
}

/// Receive side of the serial link; `None` when no byte is buffered.
pub trait SerialIn {
    fn read_byte(&mut self) -> Option<u8>;
}

/// Transmit side of the serial link.
pub trait SerialOut {
    fn write(&mut self, bytes: &[u8]);
}

/// The 5 ms serial-ingest task.
///
/// Accumulates characters up to a newline and applies well-formed events to
/// the voice table, republishing step sizes after every change.
pub struct SerialIngester<R> {
    port: R,
    shared: Arc<SharedState>,
    tables: Arc<Tables>,
    line: [u8; MESSAGE_LEN],
    len: usize,
    overflowed: bool,
}

impl<R: SerialIn> SerialIngester<R> {
    pub fn new(port: R, shared: Arc<SharedState>, tables: Arc<Tables>) -> Self {
        Self {
            port,
            shared,
            tables,
            line: [0; MESSAGE_LEN],
            len: 0,
            overflowed: false,
        }
    }

    /// Drain everything the port has buffered.
    pub fn poll(&mut self) {
        while let Some(byte) = self.port.read_byte() {
            if byte == b'\n' {
                self.finish_line();
            } else if self.len < MESSAGE_LEN {
                self.line[self.len] = byte;
                self.len += 1;
            } else {
                self.overflowed = true;
            }
        }
    }

    fn finish_line(&mut self) {
        let event = if self.overflowed {
            None
        } else {
            NoteEvent::parse(&self.line[..self.len])
        };
        match event {
            Some(event) => self.apply(event),
            None => trace!("ignoring malformed serial line"),
        }
        self.len = 0;
        self.overflowed = false;
    }

    fn apply(&mut self, event: NoteEvent) {
        let mut voices = self.shared.voices();
        let changed = match event {
            NoteEvent::Press(note) => voices.press(note).is_some(),
            NoteEvent::Release(note) => voices.release(note).is_some(),
        };
        if changed {
            voices.publish(&self.shared, &self.tables);
        }
    }
}

/// Forwards queued note events to the transmit side.
///
/// Runs at the scanner's priority but blocks whenever the outbox is empty,
/// so it costs nothing between key changes.
pub struct OutboxDrainer<W> {
    outbox: Receiver<NoteEvent>,
    port: W,
}

impl<W: SerialOut> OutboxDrainer<W> {
    pub fn new(outbox: Receiver<NoteEvent>, port: W) -> Self {
        Self { outbox, port }
    }

    /// Forward one event; `false` once every sender is gone.
    pub fn pump(&mut self) -> bool {
        match self.outbox.recv() {
            Ok(event) => {
                let mut wire = [0u8; MESSAGE_LEN + 1];
                wire[..MESSAGE_LEN].copy_from_slice(&event.encode());
                wire[MESSAGE_LEN] = b'\n';
                self.port.write(&wire);
                true
            }
            Err(_) => false,
        }
    }

    /// Forward events until the sending side shuts down.
    pub fn run(&mut self) {
        while self.pump() {}
    }
}
