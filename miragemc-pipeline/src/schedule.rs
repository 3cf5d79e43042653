//! Tick scheduling and packet delivery capabilities.
//!
//! Repair packets must go out on the tick after the interaction, not inline,
//! so the pipeline defers them through a scheduler the host provides.

use std::sync::Mutex;
use std::time::Duration;

use crate::packet::BlockChangePacket;
use miragemc_context::ViewerId;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Fire-and-forget deferral to the next server tick. No result, no
/// cancellation; tasks must tolerate the world having moved on.
pub trait TickScheduler: Send + Sync {
    fn schedule_next_tick(&self, task: Task);
}

/// Host capability for delivering a packet to one player.
pub trait PacketSink: Send + Sync {
    fn send_block_change(&self, viewer: ViewerId, packet: BlockChangePacket);
}

/// Scheduler backed by a tokio runtime handle, the handle threaded in by the
/// host the same way the rest of the engine receives its capabilities.
pub struct TokioTicker {
    handle: tokio::runtime::Handle,
    tick: Duration,
}

impl TokioTicker {
    /// Standard 20 TPS tick.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self::with_tick(handle, Duration::from_millis(50))
    }

    pub fn with_tick(handle: tokio::runtime::Handle, tick: Duration) -> Self {
        Self { handle, tick }
    }
}

impl TickScheduler for TokioTicker {
    fn schedule_next_tick(&self, task: Task) {
        let tick = self.tick;
        self.handle.spawn(async move {
            tokio::time::sleep(tick).await;
            task();
        });
    }
}

/// Deterministic scheduler for tests and embedders that drive their own
/// tick loop: tasks queue up until `run_pending` is called.
#[derive(Default)]
pub struct ManualTicker {
    pending: Mutex<Vec<Task>>,
}

impl ManualTicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Run everything scheduled so far; tasks scheduled while running land
    /// in the next batch.
    pub fn run_pending(&self) {
        let tasks: Vec<Task> = std::mem::take(&mut *self.pending.lock().unwrap());
        for task in tasks {
            task();
        }
    }
}

impl TickScheduler for ManualTicker {
    fn schedule_next_tick(&self, task: Task) {
        self.pending.lock().unwrap().push(task);
    }
}
