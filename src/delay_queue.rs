use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::select;
use log::{debug, trace};
use parking_lot::{Mutex, RwLock};

use crate::config::QueueConfig;
use crate::delayed::DelayItem;
use crate::error::{QueueError, QueueResult};
use crate::tasks::{Buffers, Wakeups, Workers};

/// A concurrent unbounded blocking queue where each value can only be retrieved once its delay
/// has elapsed.
///
/// Inserted values wait in a wait list. Background tasks sort that list on every tick, promote
/// matured values into a ready buffer and wake blocked consumers. Values are therefore delivered
/// in ascending order of expiry, to the precision of the configured tick interval.
///
/// The background tasks are started lazily by the first `insert` or retrieve call, and stopped by
/// `shutdown` or when the last handle to the queue is dropped.
///
/// # Examples
///
/// Basic usage:
///
/// ```no_run
/// use polling_delay_queue::DelayQueue;
/// use std::time::Duration;
///
/// let queue = DelayQueue::new();
/// queue.insert(Duration::from_secs(5), "2nd").unwrap();
/// queue.insert(Duration::from_secs(0), "1st").unwrap();
///
/// println!("First retrieve: {}", queue.retrieve().unwrap());
/// println!("Second retrieve: {}", queue.retrieve().unwrap());
/// assert!(queue.is_empty());
/// queue.shutdown().unwrap();
/// ```
#[derive(Debug)]
pub struct DelayQueue<T> {
    /// Points to the data that is shared between instances of the same queue (created by
    /// cloning a queue). Usually the different instances of a queue will live in different
    /// threads.
    shared_data: Arc<DelayQueueSharedData<T>>,
}

/// Lifecycle of a queue, as reported by `DelayQueue::state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// No operation has been called yet; no background task is running.
    NotStarted,
    /// Background tasks are running.
    Running,
    /// `shutdown` is joining the background tasks.
    Stopping,
    /// Terminal. Every operation fails with `QueueError::Stopped`.
    Stopped,
}

#[derive(Debug)]
enum Lifecycle {
    NotStarted,
    Running(Workers),
    Stopping,
    Stopped,
}

impl Lifecycle {
    fn state(&self) -> QueueState {
        match self {
            Lifecycle::NotStarted => QueueState::NotStarted,
            Lifecycle::Running(_) => QueueState::Running,
            Lifecycle::Stopping => QueueState::Stopping,
            Lifecycle::Stopped => QueueState::Stopped,
        }
    }
}

/// The underlying data of a queue.
///
/// When a `DelayQueue` is cloned, its clone points to the same `DelayQueueSharedData`.
#[derive(Debug)]
struct DelayQueueSharedData<T> {
    config: QueueConfig,

    /// Wait list and ready buffer, also held by the background tasks.
    buffers: Arc<Buffers<T>>,

    /// Values inserted and not yet retrieved, wherever they currently are. This includes a value
    /// held by the mover task, which is in neither buffer while it is being waited out.
    pending: AtomicUsize,

    last_insert: Mutex<Option<Instant>>,

    /// Inserts hold this shared for their whole duration so that `shutdown`, holding it
    /// exclusively, sees a stable `pending` count.
    lifecycle: RwLock<Lifecycle>,
}

impl<T> Drop for DelayQueueSharedData<T> {
    fn drop(&mut self) {
        if let Lifecycle::Running(workers) =
            mem::replace(self.lifecycle.get_mut(), Lifecycle::Stopped)
        {
            trace!("last queue handle dropped, stopping tasks");
            workers.stop();
        }
    }
}

impl<T: Send + Sync + 'static> DelayQueue<T> {
    /// Creates an empty `DelayQueue<T>` with the default configuration.
    ///
    /// # Examples
    ///
    /// Basic usage:
    ///
    /// ```
    /// use polling_delay_queue::DelayQueue;
    ///
    /// let queue: DelayQueue<i32> = DelayQueue::new();
    /// ```
    pub fn new() -> DelayQueue<T> {
        DelayQueue::with_config_unchecked(QueueConfig::default())
    }

    /// Creates an empty `DelayQueue<T>` driven by `config`.
    ///
    /// # Examples
    ///
    /// Basic usage:
    ///
    /// ```
    /// use polling_delay_queue::{DelayQueue, QueueConfig};
    /// use std::time::Duration;
    ///
    /// let config = QueueConfig::default().with_tick_interval(Duration::from_millis(5));
    /// let queue: DelayQueue<&str> = DelayQueue::with_config(config).unwrap();
    /// ```
    pub fn with_config(config: QueueConfig) -> QueueResult<DelayQueue<T>> {
        config.validate()?;
        Ok(DelayQueue::with_config_unchecked(config))
    }

    fn with_config_unchecked(config: QueueConfig) -> DelayQueue<T> {
        DelayQueue {
            shared_data: Arc::new(DelayQueueSharedData {
                config,
                buffers: Arc::new(Buffers::new()),
                pending: AtomicUsize::new(0),
                last_insert: Mutex::new(None),
                lifecycle: RwLock::new(Lifecycle::NotStarted),
            }),
        }
    }

    /// Inserts `value`, to be released once `delay` has elapsed.
    ///
    /// Never blocks beyond lock acquisition. A zero delay makes the value available on the next
    /// tick.
    ///
    /// # Errors
    ///
    /// `QueueError::Stopped` once the queue is shutting down or stopped.
    ///
    /// # Examples
    ///
    /// Basic usage:
    ///
    /// ```
    /// use polling_delay_queue::DelayQueue;
    /// use std::time::Duration;
    ///
    /// let queue = DelayQueue::new();
    /// queue.insert(Duration::from_secs(5), "2nd").unwrap();
    /// assert_eq!(queue.len(), 1);
    /// ```
    pub fn insert(&self, delay: Duration, value: T) -> QueueResult<()> {
        self.insert_item(DelayItem::for_duration(value, delay))
    }

    /// Inserts `value`, to be released at `until`. An `Instant` in the past behaves like a zero
    /// delay.
    pub fn insert_at(&self, until: Instant, value: T) -> QueueResult<()> {
        self.insert_item(DelayItem::until_instant(value, until))
    }

    fn insert_item(&self, item: DelayItem<T>) -> QueueResult<()> {
        let shared = &self.shared_data;
        self.with_running(|_| {
            shared.pending.fetch_add(1, Ordering::SeqCst);
            *shared.last_insert.lock() = Some(Instant::now());
            trace!("inserting item with delay {:?}", item.delay());
            shared.buffers.wait_list.add(item);
        })
    }

    /// Retrieves the next matured value, blocking until one is available.
    ///
    /// When several consumers are blocked, each wakeup releases one retrieve attempt; there is no
    /// fairness between them.
    ///
    /// # Errors
    ///
    /// `QueueError::Stopped` if the queue is stopped before or while waiting.
    ///
    /// # Examples
    ///
    /// Basic usage:
    ///
    /// ```no_run
    /// use polling_delay_queue::DelayQueue;
    /// use std::time::Duration;
    ///
    /// let queue = DelayQueue::new();
    ///
    /// queue.insert(Duration::from_secs(0), "1st").unwrap();
    ///
    /// // Returns on the next tick, since the delay has expired.
    /// println!("First retrieve: {}", queue.retrieve().unwrap());
    ///
    /// queue.insert(Duration::from_secs(5), "2nd").unwrap();
    ///
    /// // Blocks for approximately 5 seconds before returning the value.
    /// println!("Second retrieve: {}", queue.retrieve().unwrap());
    /// ```
    pub fn retrieve(&self) -> QueueResult<T> {
        self.retrieve_until(None)
    }

    /// Retrieves the next matured value, blocking for at most `timeout`.
    ///
    /// # Errors
    ///
    /// `QueueError::Timeout` if no value became available in time, `QueueError::Stopped` if the
    /// queue is stopped before or while waiting.
    ///
    /// # Examples
    ///
    /// Basic usage:
    ///
    /// ```no_run
    /// use polling_delay_queue::{DelayQueue, QueueError};
    /// use std::time::Duration;
    ///
    /// let queue = DelayQueue::new();
    ///
    /// queue.insert(Duration::from_secs(5), "1st").unwrap();
    ///
    /// // Blocks for approximately 2 seconds before timing out.
    /// assert!(matches!(
    ///     queue.retrieve_timeout(Duration::from_secs(2)),
    ///     Err(QueueError::Timeout)
    /// ));
    ///
    /// // Blocks for approximately 3 seconds before returning the value.
    /// println!("{}", queue.retrieve_timeout(Duration::from_secs(5)).unwrap());
    /// ```
    pub fn retrieve_timeout(&self, timeout: Duration) -> QueueResult<T> {
        self.retrieve_until(Instant::now().checked_add(timeout))
    }

    /// Retrieves the next matured value, blocking until `deadline` at the latest.
    ///
    /// # Errors
    ///
    /// Same as `retrieve_timeout`.
    pub fn retrieve_deadline(&self, deadline: Instant) -> QueueResult<T> {
        self.retrieve_until(Some(deadline))
    }

    /// Retrieves a matured value if one is ready right now.
    pub fn try_retrieve(&self) -> QueueResult<Option<T>> {
        self.with_running(|_| self.take_ready())
    }

    fn retrieve_until(&self, deadline: Option<Instant>) -> QueueResult<T> {
        let wakeups: Wakeups = self.with_running(|workers| workers.wakeups())?;

        loop {
            // Another consumer may have been woken for the same value; if it won, wait again.
            if let Some(value) = self.take_ready() {
                return Ok(value);
            }

            let woken = match deadline {
                None => select! {
                    recv(wakeups.has_item) -> msg => msg.is_ok(),
                    recv(wakeups.stopped) -> _ => false,
                },
                Some(deadline) => {
                    let timeout = deadline.saturating_duration_since(Instant::now());
                    select! {
                        recv(wakeups.has_item) -> msg => msg.is_ok(),
                        recv(wakeups.stopped) -> _ => false,
                        default(timeout) => return Err(QueueError::Timeout),
                    }
                }
            };

            if !woken {
                return Err(QueueError::Stopped);
            }
        }
    }

    fn take_ready(&self) -> Option<T> {
        let value = self.shared_data.buffers.ready.pop_head()?;
        self.shared_data.pending.fetch_sub(1, Ordering::SeqCst);
        Some(value)
    }

    /// Stops the background tasks and releases the internal buffers, provided that no value is
    /// pending.
    ///
    /// Consumers blocked in a retrieve call are released with `QueueError::Stopped`. Calling
    /// this on a stopped queue does nothing; on a queue that was never started it only marks the
    /// queue as stopped.
    ///
    /// # Errors
    ///
    /// `QueueError::NotEmpty` if values are still waiting or ready. The queue keeps running.
    ///
    /// # Examples
    ///
    /// Basic usage:
    ///
    /// ```
    /// use polling_delay_queue::{DelayQueue, QueueError, QueueState};
    /// use std::time::Duration;
    ///
    /// let queue = DelayQueue::new();
    /// queue.insert(Duration::from_secs(3600), "later").unwrap();
    ///
    /// assert!(matches!(queue.shutdown(), Err(QueueError::NotEmpty { .. })));
    /// assert_eq!(queue.state(), QueueState::Running);
    /// ```
    pub fn shutdown(&self) -> QueueResult<()> {
        let workers = {
            let mut lifecycle = self.shared_data.lifecycle.write();
            match *lifecycle {
                Lifecycle::NotStarted => {
                    *lifecycle = Lifecycle::Stopped;
                    debug!("delay queue stopped before it was started");
                    return Ok(());
                }
                Lifecycle::Stopping | Lifecycle::Stopped => return Ok(()),
                Lifecycle::Running(_) => {}
            }

            let pending = self.shared_data.pending.load(Ordering::SeqCst);
            if pending > 0 {
                let ready = self.shared_data.buffers.ready.len();
                debug!("shutdown refused, {} values pending", pending);
                return Err(QueueError::NotEmpty {
                    waiting: pending.saturating_sub(ready),
                    ready,
                });
            }

            match mem::replace(&mut *lifecycle, Lifecycle::Stopping) {
                Lifecycle::Running(workers) => workers,
                other => {
                    *lifecycle = other;
                    return Ok(());
                }
            }
        };

        workers.stop();
        self.shared_data.buffers.clear();
        *self.shared_data.lifecycle.write() = Lifecycle::Stopped;
        debug!("delay queue stopped");
        Ok(())
    }

    /// Runs `f` against the running tasks, starting them first if needed.
    fn with_running<R>(&self, f: impl FnOnce(&Workers) -> R) -> QueueResult<R> {
        loop {
            {
                let lifecycle = self.shared_data.lifecycle.read();
                match &*lifecycle {
                    Lifecycle::Running(workers) => return Ok(f(workers)),
                    Lifecycle::Stopping | Lifecycle::Stopped => return Err(QueueError::Stopped),
                    Lifecycle::NotStarted => {}
                }
            }
            self.start()?;
        }
    }

    /// Spawns the background tasks unless another caller already did.
    fn start(&self) -> QueueResult<()> {
        let mut lifecycle = self.shared_data.lifecycle.write();
        if let Lifecycle::NotStarted = *lifecycle {
            let workers = Workers::spawn(self.shared_data.buffers.clone(), &self.shared_data.config)?;
            *lifecycle = Lifecycle::Running(workers);
        }
        Ok(())
    }
}

impl<T> DelayQueue<T> {
    /// Current lifecycle state. Does not start the queue.
    pub fn state(&self) -> QueueState {
        self.shared_data.lifecycle.read().state()
    }

    /// Number of values inserted and not yet retrieved.
    pub fn len(&self) -> usize {
        self.shared_data.pending.load(Ordering::SeqCst)
    }

    /// Checks if no value is pending.
    ///
    /// # Examples
    ///
    /// Basic usage:
    ///
    /// ```
    /// use polling_delay_queue::DelayQueue;
    /// use std::time::Duration;
    ///
    /// let queue = DelayQueue::new();
    /// assert!(queue.is_empty());
    ///
    /// queue.insert(Duration::from_secs(0), "val").unwrap();
    /// assert!(!queue.is_empty());
    ///
    /// println!("First retrieve: {}", queue.retrieve().unwrap());
    /// assert!(queue.is_empty());
    /// ```
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of values currently in the wait list.
    pub fn waiting_len(&self) -> usize {
        self.shared_data.buffers.wait_list.len()
    }

    /// Number of matured values waiting for a consumer.
    pub fn ready_len(&self) -> usize {
        self.shared_data.buffers.ready.len()
    }

    /// When a value was last inserted.
    pub fn last_insert(&self) -> Option<Instant> {
        *self.shared_data.last_insert.lock()
    }

    /// The configuration this queue was built with.
    pub fn config(&self) -> &QueueConfig {
        &self.shared_data.config
    }
}

impl<T: Send + Sync + 'static> Default for DelayQueue<T> {
    /// Creates an empty `DelayQueue<T>`.
    fn default() -> DelayQueue<T> {
        DelayQueue::new()
    }
}

impl<T> Clone for DelayQueue<T> {
    /// Returns a new `DelayQueue` that points to the same underlying data.
    ///
    /// This method can be used to share a queue between different threads.
    ///
    /// # Examples
    ///
    /// Basic usage:
    ///
    /// ```no_run
    /// use polling_delay_queue::DelayQueue;
    /// use std::time::Duration;
    /// use std::thread;
    ///
    /// let queue = DelayQueue::new();
    ///
    /// queue.insert(Duration::from_secs(1), "1st").unwrap();
    ///
    /// let cloned_queue = queue.clone();
    ///
    /// let handle = thread::spawn(move || {
    ///     println!("First retrieve: {}", cloned_queue.retrieve().unwrap());
    ///     println!("Second retrieve: {}", cloned_queue.retrieve().unwrap());
    /// });
    ///
    /// queue.insert(Duration::from_secs(2), "2nd").unwrap();
    ///
    /// handle.join().unwrap();
    /// ```
    fn clone(&self) -> DelayQueue<T> {
        DelayQueue {
            shared_data: self.shared_data.clone(),
        }
    }
}
