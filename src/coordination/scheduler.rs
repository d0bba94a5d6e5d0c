//! Cooperative task scheduler
//!
//! A fixed set of looping tasks, each ticked on the caller's task and told
//! how long to wait before its next tick. Tasks never run concurrently with
//! each other: a slow tick delays every other task until it returns.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Wake interval used when no task is running
const IDLE_WAKE: Duration = Duration::from_millis(100);

/// One indefinitely-looping unit of work
#[async_trait]
pub trait ScheduledTask<C>: Send {
    fn name(&self) -> &'static str;

    /// Perform one iteration and return how long to yield before the next
    async fn tick(&mut self, ctx: &mut C, control: &TaskControl) -> Duration;
}

/// Start/stop switch for one task, cloneable across threads
#[derive(Debug, Clone)]
pub struct TaskControl {
    name: &'static str,
    running: Arc<AtomicBool>,
}

impl TaskControl {
    pub(crate) fn new(name: &'static str, running: bool) -> Self {
        Self {
            name,
            running: Arc::new(AtomicBool::new(running)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns true if the task was running
    pub fn stop(&self) -> bool {
        self.running.swap(false, Ordering::SeqCst)
    }

    fn start(&self) -> bool {
        !self.running.swap(true, Ordering::SeqCst)
    }
}

struct Slot<C> {
    task: Box<dyn ScheduledTask<C>>,
    control: TaskControl,
    next_due: Instant,
    ticks: u64,
}

pub struct CooperativeScheduler<C> {
    slots: Vec<Slot<C>>,
}

impl<C: Send> Default for CooperativeScheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Send> CooperativeScheduler<C> {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Register a task; a running task is due immediately
    pub fn add(&mut self, task: Box<dyn ScheduledTask<C>>, running: bool) -> TaskControl {
        let control = TaskControl::new(task.name(), running);
        debug!("Registered task {} (running: {})", control.name(), running);
        self.slots.push(Slot {
            task,
            control: control.clone(),
            next_due: Instant::now(),
            ticks: 0,
        });
        control
    }

    /// Start a task by name. Returns false if unknown or already running.
    pub fn start(&mut self, name: &str) -> bool {
        let Some(slot) = self.slots.iter_mut().find(|s| s.control.name() == name) else {
            return false;
        };
        if !slot.control.start() {
            return false;
        }
        slot.next_due = Instant::now();
        info!("Task {} started", name);
        true
    }

    /// Stop a task by name. Returns false if unknown or already stopped.
    pub fn stop(&self, name: &str) -> bool {
        let stopped = self
            .control(name)
            .map(|control| control.stop())
            .unwrap_or(false);
        if stopped {
            info!("Task {} stopped", name);
        }
        stopped
    }

    pub fn control(&self, name: &str) -> Option<TaskControl> {
        self.slots
            .iter()
            .find(|s| s.control.name() == name)
            .map(|s| s.control.clone())
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.control(name).is_some_and(|c| c.is_running())
    }

    /// Completed ticks of a task, for diagnostics
    pub fn tick_count(&self, name: &str) -> u64 {
        self.slots
            .iter()
            .find(|s| s.control.name() == name)
            .map_or(0, |s| s.ticks)
    }

    /// Earliest instant any running task is due
    pub fn next_wake(&self) -> Option<Instant> {
        self.slots
            .iter()
            .filter(|s| s.control.is_running())
            .map(|s| s.next_due)
            .min()
    }

    /// When the driver should wake next; polls at `IDLE_WAKE` while nothing runs
    pub fn wake_deadline(&self) -> Instant {
        self.next_wake().unwrap_or_else(|| Instant::now() + IDLE_WAKE)
    }

    /// Tick every running task due at `now`, in registration order.
    ///
    /// The next deadline counts from when the tick returned, so a slow tick
    /// pushes its own schedule back. Returns the number of ticks performed.
    pub async fn run_due(&mut self, ctx: &mut C, now: Instant) -> usize {
        let mut ran = 0;
        for slot in self.slots.iter_mut() {
            if !slot.control.is_running() || slot.next_due > now {
                continue;
            }

            let wait = slot.task.tick(ctx, &slot.control).await;
            slot.ticks += 1;
            ran += 1;

            if !slot.control.is_running() {
                debug!("Task {} stopped during its tick", slot.control.name());
                continue;
            }
            slot.next_due = now.max(Instant::now()) + wait;
            trace!("Task {} yields for {:?}", slot.control.name(), wait);
        }
        ran
    }
}
