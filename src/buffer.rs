//! The audio double buffer and the sample-clock output stage.
//!
//! Two 220-byte buffers alternate between the producer and the output stage.
//! Each buffer has a binary "may be filled" semaphore: the producer claims a
//! fillable buffer (blocking up to its timeout), writes a whole frame, and is
//! done; the output stage drains the other buffer one byte per DAC tick and,
//! on wrap-around, flips to the just-filled buffer and hands the drained one
//! back.
//!
//! The output side runs on the sample clock and must never block: buffer
//! bytes are atomics, and handing a buffer back is an atomic flag store plus
//! a condvar wake — no lock is taken on that path. The producer's claim path
//! owns the only mutex; a wake that slips past it is covered by its bounded
//! wait.

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::shared::SharedState;

/// Bytes allocated per audio buffer.
pub const BUFFER_LEN: usize = 220;

/// Index at which the output stage wraps; indices `0..=218` are drained and
/// the final allocated byte is filled but never read back.
pub const DRAIN_LEN: usize = 219;

/// The digital-to-analog converter the output stage feeds.
pub trait Dac {
    fn write(&mut self, sample: u8);
}

/// One audio buffer whose bytes may be read while the other side writes a
/// different buffer.
struct Frame {
    bytes: [AtomicU8; BUFFER_LEN],
}

impl Frame {
    fn new() -> Self {
        Self {
            bytes: core::array::from_fn(|_| AtomicU8::new(0)),
        }
    }
}

/// Double buffer with per-buffer fill semaphores.
pub struct DoubleBuffer {
    frames: [Frame; 2],
    fillable: [AtomicBool; 2],
    gate: Mutex<()>,
    ready: Condvar,
}

impl DoubleBuffer {
    /// At boot the output stage owns buffer 0 (initially silent); buffer 1
    /// is waiting to be filled.
    pub fn new() -> Self {
        Self {
            frames: [Frame::new(), Frame::new()],
            fillable: [AtomicBool::new(false), AtomicBool::new(true)],
            gate: Mutex::new(()),
            ready: Condvar::new(),
        }
    }

    /// Producer side: claim a fillable buffer, waiting up to `timeout`.
    ///
    /// Buffer 1 is tried before buffer 0. Returns `None` if neither frees up
    /// in time; the output stage will keep replaying the stale buffer.
    pub fn acquire(&self, timeout: Duration) -> Option<usize> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            for index in [1, 0] {
                if self.fillable[index].swap(false, Ordering::Acquire) {
                    return Some(index);
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (next, _) = self
                .ready
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            guard = next;
        }
    }

    /// Producer side: copy a completed frame into a claimed buffer.
    pub fn commit(&self, index: usize, frame: &[u8; BUFFER_LEN]) {
        for (slot, &byte) in self.frames[index].bytes.iter().zip(frame) {
            slot.store(byte, Ordering::Relaxed);
        }
    }

    /// Output side: hand a drained buffer back to the producer.
    pub fn release(&self, index: usize) {
        self.fillable[index].store(true, Ordering::Release);
        self.ready.notify_one();
    }

    /// Output side: one byte of a buffer.
    #[inline]
    pub fn read(&self, index: usize, position: usize) -> u8 {
        self.frames[index].bytes[position].load(Ordering::Relaxed)
    }
}

impl Default for DoubleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// The sample-clock side of the hand-off.
///
/// `tick` is called once per DAC sample (22 kHz). It never blocks and never
/// takes a lock; see the module docs.
pub struct OutputStage {
    buffers: Arc<DoubleBuffer>,
    shared: Arc<SharedState>,
    position: usize,
    current: usize,
}

impl OutputStage {
    pub fn new(buffers: Arc<DoubleBuffer>, shared: Arc<SharedState>) -> Self {
        Self {
            buffers,
            shared,
            position: 0,
            current: 0,
        }
    }

    /// Fetch, scale and return the next sample byte.
    ///
    /// The raw byte is right-shifted by `8 - volume/2`, a logarithmic curve
    /// that mutes at volume 0 and passes unscaled at volume 16.
    pub fn tick(&mut self) -> u8 {
        let raw = self.buffers.read(self.current, self.position);
        self.position += 1;
        if self.position == DRAIN_LEN {
            self.position = 0;
            let drained = self.current;
            self.current ^= 1;
            self.buffers.release(drained);
        }

        let volume = self.shared.volume().min(16);
        let shift = 8 - volume / 2;
        if shift >= 8 {
            0
        } else {
            raw >> shift
        }
    }

    /// Advance one tick and push the sample to a DAC.
    pub fn drive<D: Dac>(&mut self, dac: &mut D) {
        let sample = self.tick();
        dac.write(sample);
    }

    /// Buffer currently being drained (0 or 1).
    pub fn current(&self) -> usize {
        self.current
    }
}
