//! Background pose sampler.
//!
//! A dedicated thread polls the three encoder channels and the height sensor
//! on a fixed period and publishes the latest reading of each field into a
//! lock-free cell. Controllers read snapshots without ever touching the bus,
//! so a slow transaction can delay fresh data but never block a control loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel as xch;
use gantry_traits::{Encoder, HeightSensor};
use gantry_traits::clock::Clock;

use crate::channel::EncoderChannel;

/// Point-in-time copy of the shared pose fields.
///
/// Each field is published independently; a snapshot is not guaranteed to
/// come from a single sampler pass. The controllers tolerate this because
/// only one axis is in motion at a time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSnapshot {
    /// Left X carriage position in ticks.
    pub x1: u16,
    /// Right X carriage position in ticks.
    pub x2: u16,
    /// Y carriage position in ticks.
    pub y: u16,
    /// Vertical height, normalized sensor units.
    pub height: f32,
}

/// Per-field atomic pose store shared between the sampler thread and
/// whichever controller is running.
struct PoseCell {
    x1: AtomicU32,
    x2: AtomicU32,
    y: AtomicU32,
    /// f32 stored via `to_bits`.
    height: AtomicU32,
    /// ms since sampler epoch of the last fully successful pass.
    last_ok: AtomicU64,
}

impl PoseCell {
    fn new() -> Self {
        Self {
            x1: AtomicU32::new(0),
            x2: AtomicU32::new(0),
            y: AtomicU32::new(0),
            height: AtomicU32::new(0),
            last_ok: AtomicU64::new(0),
        }
    }
}

/// A sensor fault observed by the sampler thread, delivered out-of-band.
#[derive(Debug, Clone)]
pub struct SampleFault {
    pub source: &'static str,
    pub message: String,
}

pub struct PoseSampler {
    cell: Arc<PoseCell>,
    faults: xch::Receiver<SampleFault>,
    epoch: Instant,
    clock: Arc<dyn Clock + Send + Sync>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl PoseSampler {
    /// Spawn the sampler thread. The channels and sensor move into the
    /// thread; afterwards the only view of the plant is through snapshots.
    pub fn spawn<E1, E2, E3, H>(
        mut x1: EncoderChannel<E1>,
        mut x2: EncoderChannel<E2>,
        mut y: EncoderChannel<E3>,
        mut height: H,
        period: Duration,
        timeout: Duration,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self
    where
        E1: Encoder + Send + 'static,
        E2: Encoder + Send + 'static,
        E3: Encoder + Send + 'static,
        H: HeightSensor + Send + 'static,
    {
        let cell = Arc::new(PoseCell::new());
        let cell_thread = cell.clone();
        let (fault_tx, fault_rx) = xch::bounded(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let clock_thread = clock.clone();
        let epoch = clock.now();

        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_thread.load(Ordering::Relaxed) {
                    tracing::debug!("pose sampler thread received shutdown signal");
                    break;
                }

                let mut pass_ok = true;
                match x1.read(timeout) {
                    Ok(t) => cell_thread.x1.store(u32::from(t), Ordering::Relaxed),
                    Err(e) => {
                        pass_ok = false;
                        report(&fault_tx, "x1", &*e);
                    }
                }
                match x2.read(timeout) {
                    Ok(t) => cell_thread.x2.store(u32::from(t), Ordering::Relaxed),
                    Err(e) => {
                        pass_ok = false;
                        report(&fault_tx, "x2", &*e);
                    }
                }
                match y.read(timeout) {
                    Ok(t) => cell_thread.y.store(u32::from(t), Ordering::Relaxed),
                    Err(e) => {
                        pass_ok = false;
                        report(&fault_tx, "y", &*e);
                    }
                }
                match height.read(timeout) {
                    Ok(h) => cell_thread.height.store(h.to_bits(), Ordering::Relaxed),
                    Err(e) => {
                        pass_ok = false;
                        report(&fault_tx, "height", &*e);
                    }
                }

                if pass_ok {
                    cell_thread
                        .last_ok
                        .store(clock_thread.ms_since(epoch), Ordering::Relaxed);
                }

                if shutdown_thread.load(Ordering::Relaxed) {
                    break;
                }
                clock_thread.sleep(period);
            }
            tracing::trace!("pose sampler thread exiting cleanly");
        });

        Self {
            cell,
            faults: fault_rx,
            epoch,
            clock,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Latest published value of every field. Never blocks.
    pub fn snapshot(&self) -> PoseSnapshot {
        PoseSnapshot {
            x1: self.cell.x1.load(Ordering::Relaxed) as u16,
            x2: self.cell.x2.load(Ordering::Relaxed) as u16,
            y: self.cell.y.load(Ordering::Relaxed) as u16,
            height: f32::from_bits(self.cell.height.load(Ordering::Relaxed)),
        }
    }

    /// ms since the last fully successful sampling pass.
    pub fn staleness_ms(&self) -> u64 {
        let now_ms = self.clock.ms_since(self.epoch);
        now_ms.saturating_sub(self.cell.last_ok.load(Ordering::Relaxed))
    }

    /// Drain the most recent sensor fault, if any. The mailbox holds one
    /// entry; bursts collapse to the first unread fault.
    pub fn take_fault(&self) -> Option<SampleFault> {
        self.faults.try_recv().ok()
    }
}

impl Drop for PoseSampler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            if handle.join().is_err() {
                tracing::warn!("pose sampler thread panicked before join");
            }
        }
    }
}

fn report(
    tx: &xch::Sender<SampleFault>,
    source: &'static str,
    err: &(dyn std::error::Error + Send + Sync),
) {
    tracing::warn!(source, error = %err, "pose sample failed");
    // try_send: an unread fault already describes the condition.
    let _ = tx.try_send(SampleFault {
        source,
        message: err.to_string(),
    });
}
