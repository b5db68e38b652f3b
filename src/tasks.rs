//! Background tasks that move items from the wait list to the ready buffer.
//!
//! Three threads run per started queue:
//!
//! * the sort task orders the wait list every tick and hands a "sorted" notification to the
//!   mover,
//! * the mover task promotes matured heads into the ready buffer,
//! * the signal task wakes blocked consumers every tick while the ready buffer is non-empty.
//!
//! Notifications travel over zero-capacity channels, so a sender blocks until a receiver takes
//! it. Every blocking point also listens on a stop channel that is disconnected on shutdown.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use log::{debug, trace, warn};

use crate::config::QueueConfig;
use crate::delayed::{DelayItem, Delayed};
use crate::error::{QueueError, QueueResult};
use crate::ready_buffer::ReadyBuffer;
use crate::wait_list::WaitList;

/// The two structures shared between the queue handles and the background tasks.
#[derive(Debug)]
pub(crate) struct Buffers<T> {
    pub(crate) wait_list: WaitList<T>,
    pub(crate) ready: ReadyBuffer<T>,
}

impl<T> Buffers<T> {
    pub(crate) fn new() -> Buffers<T> {
        Buffers {
            wait_list: WaitList::new(),
            ready: ReadyBuffer::new(),
        }
    }

    pub(crate) fn clear(&self) {
        self.wait_list.clear();
        self.ready.clear();
    }
}

/// Receivers a consumer blocks on.
#[derive(Debug, Clone)]
pub(crate) struct Wakeups {
    /// Receives one message per woken consumer attempt.
    pub(crate) has_item: Receiver<()>,
    /// Never receives a message; disconnects when the tasks are stopped.
    pub(crate) stopped: Receiver<()>,
}

/// Handles to the running background tasks.
#[derive(Debug)]
pub(crate) struct Workers {
    stop: Sender<()>,
    wakeups: Wakeups,
    handles: Vec<JoinHandle<()>>,
}

impl Workers {
    /// Starts the sort, mover and signal tasks over `buffers`.
    pub(crate) fn spawn<T>(buffers: Arc<Buffers<T>>, config: &QueueConfig) -> QueueResult<Workers>
    where
        T: Send + Sync + 'static,
    {
        config.validate()?;

        let (stop, stop_rx) = bounded::<()>(0);
        let (sorted_tx, sorted_rx) = bounded::<()>(0);
        let (has_item_tx, has_item_rx) = bounded::<()>(0);

        let mut workers = Workers {
            stop,
            wakeups: Wakeups {
                has_item: has_item_rx,
                stopped: stop_rx.clone(),
            },
            handles: Vec::with_capacity(3),
        };

        let sort_task = SortTask {
            buffers: buffers.clone(),
            ticker: tick(config.tick_interval()),
            sorted: sorted_tx,
            stop: stop_rx.clone(),
        };
        let mover_task = MoverTask {
            buffers: buffers.clone(),
            sorted: sorted_rx,
            stop: stop_rx.clone(),
            threshold: config.enqueue_threshold(),
        };
        let signal_task = SignalTask {
            buffers,
            ticker: tick(config.tick_interval()),
            has_item: has_item_tx,
            stop: stop_rx,
        };

        // On a failed spawn `workers` is dropped, which disconnects the stop channel for any
        // task already started. Those threads then exit on their own.
        workers.spawn_task("delay-queue-sort", move || sort_task.run())?;
        workers.spawn_task("delay-queue-mover", move || mover_task.run())?;
        workers.spawn_task("delay-queue-signal", move || signal_task.run())?;

        debug!(
            "delay queue tasks started (tick {:?}, enqueue threshold {:?})",
            config.tick_interval(),
            config.enqueue_threshold()
        );
        Ok(workers)
    }

    fn spawn_task<F>(&mut self, name: &str, task: F) -> QueueResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(task)
            .map_err(QueueError::Spawn)?;
        self.handles.push(handle);
        Ok(())
    }

    pub(crate) fn wakeups(&self) -> Wakeups {
        self.wakeups.clone()
    }

    /// Disconnects the stop channel and joins every task.
    pub(crate) fn stop(self) {
        let Workers { stop, handles, .. } = self;
        drop(stop);

        for handle in handles {
            let name = handle.thread().name().unwrap_or("delay-queue-task").to_string();
            if handle.join().is_err() {
                warn!("{} panicked before shutdown", name);
            }
        }
        debug!("delay queue tasks stopped");
    }
}

/// Sorts the wait list once per tick and notifies the mover.
struct SortTask<T> {
    buffers: Arc<Buffers<T>>,
    ticker: Receiver<Instant>,
    sorted: Sender<()>,
    stop: Receiver<()>,
}

impl<T> SortTask<T> {
    fn run(self) {
        loop {
            select! {
                recv(self.ticker) -> _ => {},
                recv(self.stop) -> _ => break,
            }

            if self.buffers.wait_list.is_empty() {
                continue;
            }
            self.buffers.wait_list.sort();

            select! {
                send(self.sorted, ()) -> res => if res.is_err() { break },
                recv(self.stop) -> _ => break,
            }
        }
        trace!("sort task exiting");
    }
}

/// What woke the mover while it held a near-ready item.
enum Wake {
    Matured,
    Sorted,
    Stop,
}

/// Promotes matured items from the wait list to the ready buffer.
struct MoverTask<T> {
    buffers: Arc<Buffers<T>>,
    sorted: Receiver<()>,
    stop: Receiver<()>,
    threshold: Duration,
}

impl<T> MoverTask<T> {
    fn run(self) {
        loop {
            select! {
                recv(self.sorted) -> msg => if msg.is_err() { break },
                recv(self.stop) -> _ => break,
            }

            if self.promote().is_break() {
                break;
            }
        }
        trace!("mover task exiting");
    }

    /// Moves heads to the ready buffer for as long as they are matured or close to it.
    ///
    /// An item further away than the threshold goes back to the wait list and ends the pass.
    fn promote(&self) -> ControlFlow<()> {
        while let Some(item) = self.buffers.wait_list.pop_head() {
            let now = Instant::now();
            if item.is_matured_at(now) {
                self.buffers.ready.append(item.into_value());
                continue;
            }

            let remaining = item.remaining_at(now);
            if remaining >= self.threshold {
                trace!("head matures in {:?}, returning it to the wait list", remaining);
                self.buffers.wait_list.add(item);
                return ControlFlow::Continue(());
            }

            if self.wait_out(item).is_break() {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Holds `item` until it matures.
    ///
    /// Sort notifications arriving meanwhile are used to check whether a newer head expires
    /// earlier; if so `item` is returned to the wait list so the earlier one is handled first.
    fn wait_out(&self, item: DelayItem<T>) -> ControlFlow<()> {
        let until = item.delayed_until();

        loop {
            let timeout = until.saturating_duration_since(Instant::now());
            let wake = select! {
                recv(self.stop) -> _ => Wake::Stop,
                recv(self.sorted) -> msg => if msg.is_ok() { Wake::Sorted } else { Wake::Stop },
                default(timeout) => Wake::Matured,
            };

            match wake {
                Wake::Matured => {
                    self.buffers.ready.append(item.into_value());
                    return ControlFlow::Continue(());
                }
                Wake::Sorted => {
                    let preempted = self
                        .buffers
                        .wait_list
                        .head_expiry()
                        .map_or(false, |head| head < until);
                    if preempted {
                        trace!("an earlier head arrived, returning held item to the wait list");
                        self.buffers.wait_list.add(item);
                        return ControlFlow::Continue(());
                    }
                }
                Wake::Stop => {
                    self.buffers.wait_list.add(item);
                    return ControlFlow::Break(());
                }
            }
        }
    }
}

/// Wakes blocked consumers once per tick while the ready buffer holds values.
struct SignalTask<T> {
    buffers: Arc<Buffers<T>>,
    ticker: Receiver<Instant>,
    has_item: Sender<()>,
    stop: Receiver<()>,
}

impl<T> SignalTask<T> {
    fn run(self) {
        loop {
            select! {
                recv(self.ticker) -> _ => {},
                recv(self.stop) -> _ => break,
            }

            let ready = self.buffers.ready.len();
            if ready == 0 {
                continue;
            }

            select! {
                send(self.has_item, ()) -> res => if res.is_err() { break },
                recv(self.stop) -> _ => break,
            }

            // Other consumers already parked on the channel get a wakeup too, one per
            // remaining value. Nobody waiting means the handoff fails immediately.
            for _ in 1..ready {
                if self.has_item.try_send(()).is_err() {
                    break;
                }
            }
        }
        trace!("signal task exiting");
    }
}
