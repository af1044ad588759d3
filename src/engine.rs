//! Task wiring.
//!
//! Four periodic activities cooperate around [`SharedState`] and the audio
//! double buffer:
//!
//! | Task | Pace |
//! |------|------|
//! | sample producer | whenever a buffer frees up, 10 ms claim timeout |
//! | serial ingester | 5 ms |
//! | key scanner | 50 ms |
//! | outbox drainer | blocks on the outbox |
//!
//! The fifth activity, the 22 kHz output stage, is clocked by the DAC: the
//! board layer takes it via [`Engine::output_stage`] and calls
//! [`OutputStage::tick`](crate::buffer::OutputStage::tick) from its sample
//! interrupt or audio callback. A display composer polls
//! [`Engine::snapshot`] at its own rate.
//!
//! On the device the tasks run forever; hosted builds and tests stop them
//! with [`Engine::shutdown`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::sync_channel;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::debug;

use crate::buffer::{DoubleBuffer, OutputStage};
use crate::producer::SampleProducer;
use crate::scanner::{JoystickAdc, KeyMatrix, KeyScanner};
use crate::serial::{OutboxDrainer, SerialIn, SerialIngester, SerialOut};
use crate::shared::{SharedState, StateSnapshot};
use crate::tables::Tables;

/// Periods and capacities for the periodic tasks.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Key-matrix scan period.
    pub scan_period: Duration,
    /// Serial-ingest period.
    pub serial_period: Duration,
    /// How long the producer waits for a fillable buffer before skipping
    /// an iteration.
    pub producer_timeout: Duration,
    /// Outgoing note-event queue depth.
    pub outbox_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_period: Duration::from_millis(50),
            serial_period: Duration::from_millis(5),
            producer_timeout: Duration::from_millis(10),
            outbox_capacity: 8,
        }
    }
}

/// The running core: owns the task threads and hands out the output stage.
pub struct Engine {
    shared: Arc<SharedState>,
    output: Option<OutputStage>,
    running: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Wire the tasks to the board's hardware and start them.
    pub fn start<M, J, R, W>(
        matrix: M,
        joystick: J,
        serial_in: R,
        serial_out: W,
        config: EngineConfig,
    ) -> Self
    where
        M: KeyMatrix + Send + 'static,
        J: JoystickAdc + Send + 'static,
        R: SerialIn + Send + 'static,
        W: SerialOut + Send + 'static,
    {
        let shared = Arc::new(SharedState::new());
        let tables = Arc::new(Tables::new());
        let buffers = Arc::new(DoubleBuffer::new());
        let running = Arc::new(AtomicBool::new(true));
        let (outbox, outbox_rx) = sync_channel(config.outbox_capacity);

        let mut producer = SampleProducer::new(
            Arc::clone(&shared),
            Arc::clone(&buffers),
            Arc::clone(&tables),
        );
        let mut scanner = KeyScanner::new(
            matrix,
            joystick,
            Arc::clone(&shared),
            Arc::clone(&tables),
            outbox,
        );
        let mut ingester = SerialIngester::new(serial_in, Arc::clone(&shared), tables);
        let mut drainer = OutboxDrainer::new(outbox_rx, serial_out);

        let producer_running = Arc::clone(&running);
        let producer_timeout = config.producer_timeout;
        let scanner_running = Arc::clone(&running);
        let scan_period = config.scan_period;
        let ingester_running = Arc::clone(&running);
        let serial_period = config.serial_period;

        let tasks = vec![
            thread::spawn(move || {
                while producer_running.load(Ordering::Relaxed) {
                    producer.run_once(producer_timeout);
                }
            }),
            thread::spawn(move || {
                while ingester_running.load(Ordering::Relaxed) {
                    ingester.poll();
                    thread::sleep(serial_period);
                }
            }),
            // The scanner owns the outbox sender; when its loop ends the
            // drainer's queue closes and the drainer exits too.
            thread::spawn(move || {
                while scanner_running.load(Ordering::Relaxed) {
                    scanner.scan();
                    thread::sleep(scan_period);
                }
            }),
            thread::spawn(move || drainer.run()),
        ];

        debug!("engine started: producer, ingester, scanner, drainer");
        Self {
            output: Some(OutputStage::new(buffers, Arc::clone(&shared))),
            shared,
            running,
            tasks,
        }
    }

    /// The sample-clock consumer. There is exactly one; the first caller
    /// takes it.
    pub fn output_stage(&mut self) -> Option<OutputStage> {
        self.output.take()
    }

    /// Handle to the published state, e.g. for a display composer.
    pub fn shared(&self) -> Arc<SharedState> {
        Arc::clone(&self.shared)
    }

    /// One-call state copy for the display composer.
    pub fn snapshot(&self) -> StateSnapshot {
        self.shared.snapshot()
    }

    /// Stop every task and wait for them to finish.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        for task in self.tasks.drain(..) {
            let _ = task.join();
        }
        debug!("engine stopped");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::DRAIN_LEN;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Clone)]
    struct FakeMatrix {
        rows: Arc<Mutex<[u8; 7]>>,
    }

    impl FakeMatrix {
        fn idle() -> Self {
            Self {
                rows: Arc::new(Mutex::new([0x0F; 7])),
            }
        }

        fn press_key(&self, key: usize) {
            self.rows.lock().unwrap()[key / 4] &= !(1 << (key % 4));
        }
    }

    struct FakeMatrixPort {
        rows: Arc<Mutex<[u8; 7]>>,
        selected: usize,
    }

    impl KeyMatrix for FakeMatrixPort {
        fn select_row(&mut self, row: usize) {
            self.selected = row;
        }

        fn read_columns(&mut self) -> u8 {
            self.rows.lock().unwrap()[self.selected]
        }
    }

    struct FakeJoystick;

    impl JoystickAdc for FakeJoystick {
        fn read_x(&mut self) -> u16 {
            0
        }

        fn read_y(&mut self) -> u16 {
            512
        }
    }

    #[derive(Clone, Default)]
    struct FakeSerial {
        incoming: Arc<Mutex<VecDeque<u8>>>,
        outgoing: Arc<Mutex<Vec<u8>>>,
    }

    impl FakeSerial {
        fn feed(&self, text: &str) {
            self.incoming.lock().unwrap().extend(text.bytes());
        }

        fn transcript(&self) -> Vec<u8> {
            self.outgoing.lock().unwrap().clone()
        }
    }

    impl SerialIn for FakeSerial {
        fn read_byte(&mut self) -> Option<u8> {
            self.incoming.lock().unwrap().pop_front()
        }
    }

    impl SerialOut for FakeSerial {
        fn write(&mut self, bytes: &[u8]) {
            self.outgoing.lock().unwrap().extend_from_slice(bytes);
        }
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            scan_period: Duration::from_millis(5),
            serial_period: Duration::from_millis(2),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn config_defaults_match_the_task_rates() {
        let config = EngineConfig::default();
        assert_eq!(config.scan_period, Duration::from_millis(50));
        assert_eq!(config.serial_period, Duration::from_millis(5));
        assert_eq!(config.producer_timeout, Duration::from_millis(10));
        assert_eq!(config.outbox_capacity, 8);
    }

    #[test]
    fn output_stage_is_taken_once() {
        let matrix = FakeMatrix::idle();
        let serial = FakeSerial::default();
        let mut engine = Engine::start(
            FakeMatrixPort {
                rows: matrix.rows.clone(),
                selected: 0,
            },
            FakeJoystick,
            serial.clone(),
            serial,
            fast_config(),
        );
        assert!(engine.output_stage().is_some());
        assert!(engine.output_stage().is_none());
        engine.shutdown();
    }

    #[test]
    fn local_press_remote_release_end_to_end() {
        let matrix = FakeMatrix::idle();
        let serial = FakeSerial::default();
        let mut engine = Engine::start(
            FakeMatrixPort {
                rows: matrix.rows.clone(),
                selected: 0,
            },
            FakeJoystick,
            serial.clone(),
            serial.clone(),
            fast_config(),
        );
        let mut output = engine.output_stage().expect("output stage");

        // Press key 0 (C4) and give the scanner a couple of periods.
        matrix.press_key(0);
        thread::sleep(Duration::from_millis(60));

        let snapshot = engine.snapshot();
        assert!(snapshot.voices[0].is_some());
        assert_eq!(serial.transcript(), b"P40\n");

        // Drain a few frames; once the producer has seen the voice the
        // stream stops being flat.
        let mut samples = Vec::new();
        for _ in 0..6 {
            for _ in 0..DRAIN_LEN {
                samples.push(output.tick());
            }
            thread::sleep(Duration::from_millis(5));
        }
        let tail = &samples[samples.len() - DRAIN_LEN..];
        assert!(tail.iter().any(|&sample| sample != tail[0]));

        // A remote release empties the table without echoing an R event.
        serial.feed("R40\n");
        thread::sleep(Duration::from_millis(30));
        assert!(engine.snapshot().voices[0].is_none());
        let shared = engine.shared();
        for slot in 0..3 {
            assert_eq!(shared.saw_step(slot), 0);
        }
        assert_eq!(serial.transcript(), b"P40\n");

        engine.shutdown();
    }
}
