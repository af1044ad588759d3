//! Voice assignment.
//!
//! The mixer has three voice slots. Occupied slots always form a prefix:
//! releasing a note shifts everything above it down, and a new note takes the
//! lowest empty slot. A note that is already held is never assigned twice.
//!
//! The table itself lives behind the voice-table lock in
//! [`SharedState`](crate::shared::SharedState); the per-slot step sizes the
//! audio pipeline actually reads are published separately as atomics via
//! [`VoiceTable::publish`], with zero meaning "slot inactive".

use crate::shared::SharedState;
use crate::tables::{Tables, OCTAVE_SHIFT_MAX, OCTAVE_SHIFT_MIN, SEMITONES};

/// Number of simultaneous voices.
pub const VOICE_COUNT: usize = 3;

/// A held note: semitone index plus octave shift relative to octave 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Note {
    semitone: u8,
    octave: i8,
}

impl Note {
    /// Build a note, rejecting out-of-range fields.
    pub fn new(semitone: u8, octave: i8) -> Option<Self> {
        if usize::from(semitone) < SEMITONES && (OCTAVE_SHIFT_MIN..=OCTAVE_SHIFT_MAX).contains(&octave)
        {
            Some(Self { semitone, octave })
        } else {
            None
        }
    }

    /// Semitone index in `0..12`; 0 is C, 9 is A.
    #[inline]
    pub fn semitone(&self) -> u8 {
        self.semitone
    }

    /// Octave shift in `-4..=4`; 0 is octave 4.
    #[inline]
    pub fn octave(&self) -> i8 {
        self.octave
    }
}

/// The ordered set of held notes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceTable {
    slots: [Option<Note>; VOICE_COUNT],
}

impl VoiceTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn slot(&self, index: usize) -> Option<Note> {
        self.slots[index]
    }

    #[inline]
    pub fn slots(&self) -> [Option<Note>; VOICE_COUNT] {
        self.slots
    }

    /// Number of occupied slots (always a prefix).
    pub fn active(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots[0].is_none()
    }

    pub fn holds(&self, note: Note) -> bool {
        self.slots.contains(&Some(note))
    }

    /// Assign `note` to the lowest empty slot.
    ///
    /// A duplicate of an already-held note and a full table are both no-ops.
    /// Returns the slot index on a new assignment.
    pub fn press(&mut self, note: Note) -> Option<usize> {
        if self.holds(note) {
            return None;
        }
        let slot = self.slots.iter().position(Option::is_none)?;
        self.slots[slot] = Some(note);
        Some(slot)
    }

    /// Release `note` and compact the remaining slots left.
    ///
    /// Returns the slot the note occupied, or `None` if it was not held.
    pub fn release(&mut self, note: Note) -> Option<usize> {
        let slot = self.slots.iter().position(|held| *held == Some(note))?;
        for i in slot..VOICE_COUNT - 1 {
            self.slots[i] = self.slots[i + 1];
        }
        self.slots[VOICE_COUNT - 1] = None;
        Some(slot)
    }

    /// Replace the whole assignment from a key scan.
    ///
    /// `notes` holds the pressed keys in row-major order; anything beyond the
    /// voice count is dropped, and trailing slots are cleared.
    pub fn assign(&mut self, notes: &[Note]) {
        for (slot, entry) in self.slots.iter_mut().enumerate() {
            *entry = notes.get(slot).copied();
        }
    }

    /// Publish per-slot step sizes for the audio pipeline.
    ///
    /// Empty slots publish zero for both oscillators, so a slot is inactive
    /// exactly when its published steps are.
    pub fn publish(&self, shared: &SharedState, tables: &Tables) {
        for (slot, held) in self.slots.iter().enumerate() {
            match held {
                Some(note) => shared.set_steps(
                    slot,
                    tables.saw_step(note.semitone, note.octave),
                    tables.sine_step(note.semitone, note.octave),
                ),
                None => shared.set_steps(slot, 0, 0),
            }
        }
    }

    /// Occupied slots form a prefix of the table.
    #[cfg(test)]
    fn is_left_packed(&self) -> bool {
        let mut seen_empty = false;
        for slot in &self.slots {
            match slot {
                None => seen_empty = true,
                Some(_) if seen_empty => return false,
                Some(_) => {}
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::SharedState;

    fn note(semitone: u8) -> Note {
        Note::new(semitone, 0).unwrap()
    }

    #[test]
    fn note_rejects_out_of_range_fields() {
        assert!(Note::new(12, 0).is_none());
        assert!(Note::new(0, 5).is_none());
        assert!(Note::new(0, -5).is_none());
        assert!(Note::new(11, 4).is_some());
        assert!(Note::new(0, -4).is_some());
    }

    #[test]
    fn press_fills_lowest_empty_slot() {
        let mut table = VoiceTable::new();
        assert_eq!(table.press(note(0)), Some(0));
        assert_eq!(table.press(note(1)), Some(1));
        assert_eq!(table.press(note(2)), Some(2));
        assert_eq!(table.active(), 3);
    }

    #[test]
    fn duplicate_press_is_ignored() {
        let mut table = VoiceTable::new();
        table.press(note(5));
        assert_eq!(table.press(note(5)), None);
        assert_eq!(table.active(), 1);
    }

    #[test]
    fn fourth_press_is_ignored_until_a_slot_frees() {
        let mut table = VoiceTable::new();
        for semitone in 0..3 {
            table.press(note(semitone));
        }
        assert_eq!(table.press(note(3)), None);

        table.release(note(1));
        assert_eq!(table.press(note(3)), Some(2));
    }

    #[test]
    fn release_compacts_left() {
        let mut table = VoiceTable::new();
        table.press(note(0));
        table.press(note(1));
        table.press(note(2));

        assert_eq!(table.release(note(0)), Some(0));
        assert_eq!(table.slot(0), Some(note(1)));
        assert_eq!(table.slot(1), Some(note(2)));
        assert_eq!(table.slot(2), None);
    }

    #[test]
    fn release_of_unheld_note_is_a_no_op() {
        let mut table = VoiceTable::new();
        table.press(note(0));
        assert_eq!(table.release(note(7)), None);
        assert_eq!(table.active(), 1);
    }

    #[test]
    fn table_stays_left_packed_through_arbitrary_traffic() {
        let mut table = VoiceTable::new();
        let ops: [(bool, u8); 12] = [
            (true, 0),
            (true, 4),
            (true, 7),
            (false, 4),
            (true, 9),
            (false, 0),
            (false, 9),
            (true, 2),
            (true, 3),
            (false, 7),
            (false, 2),
            (false, 3),
        ];
        for (press, semitone) in ops {
            if press {
                table.press(note(semitone));
            } else {
                table.release(note(semitone));
            }
            assert!(table.is_left_packed(), "not left-packed after {semitone}");
        }
        assert!(table.is_empty());
    }

    #[test]
    fn assign_replaces_and_clears_trailing_slots() {
        let mut table = VoiceTable::new();
        table.press(note(10));
        table.assign(&[note(0), note(1)]);
        assert_eq!(table.slot(0), Some(note(0)));
        assert_eq!(table.slot(1), Some(note(1)));
        assert_eq!(table.slot(2), None);

        table.assign(&[]);
        assert!(table.is_empty());
    }

    #[test]
    fn publish_zeroes_inactive_slots() {
        let shared = SharedState::new();
        let tables = Tables::new();
        let mut table = VoiceTable::new();
        table.press(note(9));
        table.press(note(0));
        table.publish(&shared, &tables);

        assert_eq!(shared.saw_step(0), tables.saw_step(9, 0));
        assert_eq!(shared.sine_step(1), tables.sine_step(0, 0));
        assert_eq!(shared.saw_step(2), 0);
        assert_eq!(shared.sine_step(2), 0);

        table.release(note(9));
        table.publish(&shared, &tables);
        assert_eq!(shared.saw_step(0), tables.saw_step(0, 0));
        assert_eq!(shared.saw_step(1), 0);
        assert_eq!(shared.sine_step(1), 0);
    }
}
