use std::any::Any;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use delimited_config::shared::BufferConfig;
use futures::FutureExt;
use metrics::counter;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::buffer::base::{BufferOperation, DispatchHandler, ExceptionOrigin};
use crate::concurrency::pause::{PauseRx, PauseTx, create_pause_channel, wait_until_resumed};
use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use crate::error::{DelimitedError, DelimitedResult, ErrorKind};
use crate::metrics::{
    DELIMITED_BUFFER_EXCEPTIONS_TOTAL, DELIMITED_BUFFER_ITEMS_DISCARDED_TOTAL, ERROR_KIND_LABEL,
    OPERATION_LABEL,
};
use crate::{bail, delimited_error};

#[derive(Debug)]
struct Entry<T> {
    sequence: u64,
    item: T,
    hold: bool,
}

#[derive(Debug)]
struct Queue<T> {
    entries: VecDeque<Entry<T>>,
    next_sequence: u64,
}

/// State shared between the buffer and its worker task.
struct Shared<T, H> {
    queue: Mutex<Queue<T>>,
    notify: Notify,
    pause_tx: PauseTx,
    handler: H,
}

impl<T, H> Shared<T, H>
where
    H: DispatchHandler<T>,
{
    fn lock_queue(&self) -> DelimitedResult<MutexGuard<'_, Queue<T>>> {
        self.queue.lock().map_err(|_| {
            delimited_error!(
                ErrorKind::BufferPoisoned,
                "Dispatch buffer queue lock poisoned"
            )
        })
    }

    fn report(&self, operation: BufferOperation, error: DelimitedError) {
        counter!(
            DELIMITED_BUFFER_EXCEPTIONS_TOTAL,
            OPERATION_LABEL => operation.as_str(),
            ERROR_KIND_LABEL => format!("{:?}", error.kind())
        )
        .increment(1);
        error!(%operation, error = %error, "dispatch buffer operation failed");

        guard_callback("exception", || {
            self.handler
                .exception(ExceptionOrigin::Buffer(operation), error)
        });
    }

    /// Removes every queued item and returns how many were dropped.
    fn clear(&self) -> DelimitedResult<usize> {
        let mut queue = self.lock_queue()?;
        let discarded = queue.entries.len();
        queue.entries.clear();

        if discarded > 0 {
            counter!(DELIMITED_BUFFER_ITEMS_DISCARDED_TOTAL).increment(discarded as u64);
        }

        Ok(discarded)
    }
}

#[derive(Debug)]
enum WorkerState {
    Idle,
    Running(JoinHandle<()>),
    Stopped,
}

/// Thread-safe FIFO of items serviced by a single background worker task.
///
/// The worker is spawned on the tokio runtime of the first [`DispatchBuffer::enqueue`] call and
/// hands each item to the [`DispatchHandler`] in submission order. Delivery can be paused with
/// [`DispatchBuffer::stop`] and continued with [`DispatchBuffer::resume`]; enqueueing is never
/// blocked by the gate. An item enqueued with [`DispatchBuffer::enqueue_with_hold`] closes the
/// gate as it is delivered, so the items behind it wait for an explicit resume.
///
/// Failures never escape to the caller: handler errors, handler panics and control-plane
/// failures are all routed to [`DispatchHandler::exception`], and the worker keeps delivering.
///
/// [`DispatchBuffer::shutdown`] stops the worker after the item currently being delivered and
/// discards whatever is still queued. Dropping the buffer signals the same shutdown without
/// waiting for the worker.
pub struct DispatchBuffer<T, H> {
    shared: Arc<Shared<T, H>>,
    shutdown_tx: ShutdownTx,
    worker: Mutex<WorkerState>,
    shutdown_timeout: Duration,
}

impl<T, H> DispatchBuffer<T, H>
where
    T: Send + Sync + 'static,
    H: DispatchHandler<T>,
{
    /// Creates a buffer with the default [`BufferConfig`].
    pub fn new(handler: H) -> Self {
        Self::with_config(handler, &BufferConfig::default())
    }

    /// Creates a buffer whose shutdown waits at most `config.shutdown_timeout()` for the worker.
    pub fn with_config(handler: H, config: &BufferConfig) -> Self {
        let (pause_tx, _) = create_pause_channel();
        let (shutdown_tx, _) = create_shutdown_channel();

        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue {
                    entries: VecDeque::new(),
                    next_sequence: 0,
                }),
                notify: Notify::new(),
                pause_tx,
                handler,
            }),
            shutdown_tx,
            worker: Mutex::new(WorkerState::Idle),
            shutdown_timeout: config.shutdown_timeout(),
        }
    }

    /// Returns the handler the buffer delivers to.
    pub fn handler(&self) -> &H {
        &self.shared.handler
    }

    /// Appends `item` to the tail of the queue and returns its sequence number.
    ///
    /// Returns [`None`] when the item could not be queued; the cause has then been reported
    /// through [`DispatchHandler::exception`].
    pub fn enqueue(&self, item: T) -> Option<u64> {
        self.push(item, false)
    }

    /// Like [`DispatchBuffer::enqueue`], but the gate closes when this item is delivered.
    pub fn enqueue_with_hold(&self, item: T) -> Option<u64> {
        self.push(item, true)
    }

    /// Closes the gate. The item being delivered, if any, is not interrupted.
    pub fn stop(&self) {
        if self.shutdown_tx.is_shutdown() {
            self.shared.report(
                BufferOperation::Stop,
                delimited_error!(ErrorKind::BufferShutdown, "Dispatch buffer is shut down"),
            );
            return;
        }

        self.shared.pause_tx.pause();
        debug!("dispatch buffer stopped");
    }

    /// Opens the gate. Delivery continues from the head of the queue.
    pub fn resume(&self) {
        if self.shutdown_tx.is_shutdown() {
            self.shared.report(
                BufferOperation::Resume,
                delimited_error!(ErrorKind::BufferShutdown, "Dispatch buffer is shut down"),
            );
            return;
        }

        self.shared.pause_tx.resume();
        debug!("dispatch buffer resumed");
    }

    /// Returns whether the gate is closed.
    pub fn is_paused(&self) -> bool {
        self.shared.pause_tx.is_paused()
    }

    /// Returns whether [`DispatchBuffer::shutdown`] was called or the buffer was dropped.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown_tx.is_shutdown()
    }

    /// Discards every queued item and reopens the gate.
    ///
    /// Items already handed to the handler are unaffected. Returns the number of discarded items.
    pub fn reset(&self) -> usize {
        self.shared.pause_tx.pause();

        let discarded = match self.shared.clear() {
            Ok(discarded) => discarded,
            Err(err) => {
                self.shared.report(BufferOperation::Reset, err);
                0
            }
        };

        self.shared.pause_tx.resume();
        debug!(discarded, "dispatch buffer reset");

        discarded
    }

    /// Reorders the queued items with `compare` and reopens the gate.
    ///
    /// The sort is stable. Items enqueued while the sort runs are queued behind the reordered
    /// batch. Hold flags travel with their items.
    pub fn sort_by<F>(&self, mut compare: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        self.shared.pause_tx.pause();

        match self.shared.lock_queue() {
            Ok(mut queue) => {
                let mut entries: Vec<Entry<T>> = queue.entries.drain(..).collect();
                entries.sort_by(|a, b| compare(&a.item, &b.item));
                queue.entries.extend(entries);

                debug!(items = queue.entries.len(), "dispatch buffer sorted");
            }
            Err(err) => self.shared.report(BufferOperation::Sort, err),
        }

        self.shared.pause_tx.resume();
    }

    /// Returns whether items are waiting to be delivered.
    pub fn has_more(&self) -> bool {
        self.len() > 0
    }

    /// Returns the number of items waiting to be delivered.
    pub fn len(&self) -> usize {
        self.shared
            .lock_queue()
            .map(|queue| queue.entries.len())
            .unwrap_or(0)
    }

    /// Returns `true` when no item is waiting to be delivered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops the worker and waits for it to exit.
    ///
    /// The worker finishes the item it is delivering and exits. Items still queued afterwards are
    /// discarded. Waiting is bounded by the configured shutdown timeout, after which the worker is
    /// aborted and [`ErrorKind::WorkerShutdownTimeout`] is returned. Calling this more than once
    /// is harmless.
    pub async fn shutdown(&self) -> DelimitedResult<()> {
        let first_shutdown = self.shutdown_tx.shutdown();
        // A worker parked on a closed gate must not outlive the shutdown.
        self.shared.pause_tx.resume();

        let worker = match self.worker.lock() {
            Ok(mut worker) => std::mem::replace(&mut *worker, WorkerState::Stopped),
            Err(_) => {
                let err = delimited_error!(
                    ErrorKind::BufferPoisoned,
                    "Dispatch buffer worker lock poisoned"
                );
                self.shared.report(BufferOperation::Shutdown, err.clone());
                return Err(err);
            }
        };

        let result = match worker {
            WorkerState::Running(handle) => self.join_worker(handle).await,
            WorkerState::Idle | WorkerState::Stopped => Ok(()),
        };

        match self.shared.clear() {
            Ok(0) => {}
            Ok(discarded) => warn!(discarded, "discarded items still queued at shutdown"),
            Err(err) => self.shared.report(BufferOperation::Shutdown, err),
        }

        if first_shutdown {
            info!("dispatch buffer shut down");
        }

        result
    }

    fn push(&self, item: T, hold: bool) -> Option<u64> {
        match self.try_push(item, hold) {
            Ok(sequence) => Some(sequence),
            Err(err) => {
                self.shared.report(BufferOperation::Enqueue, err);
                None
            }
        }
    }

    fn try_push(&self, item: T, hold: bool) -> DelimitedResult<u64> {
        if self.shutdown_tx.is_shutdown() {
            bail!(
                ErrorKind::BufferShutdown,
                "Dispatch buffer is shut down",
                "enqueue rejected"
            );
        }

        self.ensure_worker()?;

        let sequence = {
            let mut queue = self.shared.lock_queue()?;
            let sequence = queue.next_sequence;
            queue.next_sequence += 1;
            queue.entries.push_back(Entry {
                sequence,
                item,
                hold,
            });

            sequence
        };

        self.shared.notify.notify_one();

        Ok(sequence)
    }

    /// Spawns the worker on the current runtime unless it already runs.
    fn ensure_worker(&self) -> DelimitedResult<()> {
        let mut worker = self.worker.lock().map_err(|_| {
            delimited_error!(
                ErrorKind::BufferPoisoned,
                "Dispatch buffer worker lock poisoned"
            )
        })?;

        match *worker {
            WorkerState::Running(_) => Ok(()),
            WorkerState::Stopped => bail!(
                ErrorKind::BufferShutdown,
                "Dispatch buffer is shut down",
                "worker already stopped"
            ),
            WorkerState::Idle => {
                let runtime = Handle::try_current().map_err(|err| {
                    delimited_error!(
                        ErrorKind::RuntimeUnavailable,
                        "No tokio runtime available for the dispatch buffer worker",
                        source: err
                    )
                })?;

                let handle = runtime.spawn(run_worker(
                    self.shared.clone(),
                    self.shared.pause_tx.subscribe(),
                    self.shutdown_tx.subscribe(),
                ));
                *worker = WorkerState::Running(handle);
                debug!("dispatch buffer worker started");

                Ok(())
            }
        }
    }

    async fn join_worker(&self, mut handle: JoinHandle<()>) -> DelimitedResult<()> {
        match timeout(self.shutdown_timeout, &mut handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) if err.is_panic() => Err(delimited_error!(
                ErrorKind::WorkerPanic,
                "Dispatch buffer worker panicked",
                source: err
            )),
            Ok(Err(_)) => Ok(()),
            Err(_) => {
                handle.abort();
                let timeout_ms = self.shutdown_timeout.as_millis();
                warn!(timeout_ms, "dispatch buffer worker did not stop in time, aborting it");

                Err(delimited_error!(
                    ErrorKind::WorkerShutdownTimeout,
                    "Dispatch buffer worker did not stop in time",
                    format!("worker still running after {timeout_ms} ms")
                ))
            }
        }
    }
}

impl<T, H> Drop for DispatchBuffer<T, H> {
    fn drop(&mut self) {
        self.shutdown_tx.shutdown();
        self.shared.pause_tx.resume();
    }
}

async fn run_worker<T, H>(
    shared: Arc<Shared<T, H>>,
    mut pause_rx: PauseRx,
    mut shutdown_rx: ShutdownRx,
) where
    T: Send + Sync + 'static,
    H: DispatchHandler<T>,
{
    let mut delivered_since_drain = false;

    loop {
        let paused = *pause_rx.borrow_and_update();
        if paused {
            tokio::select! {
                biased;

                _ = shutdown_rx.wait_for_shutdown() => break,

                resumed = wait_until_resumed(&mut pause_rx) => {
                    if !resumed {
                        break;
                    }
                }
            }
        }

        if shutdown_rx.is_shutdown() {
            break;
        }

        let entry = match shared.lock_queue() {
            Ok(mut queue) => queue.entries.pop_front(),
            Err(err) => {
                shared.report(BufferOperation::Deliver, err);
                break;
            }
        };

        match entry {
            Some(entry) => {
                if entry.hold {
                    shared.pause_tx.pause();
                }

                deliver(&shared, entry).await;
                delivered_since_drain = true;
            }
            None => {
                if delivered_since_drain {
                    delivered_since_drain = false;
                    guard_callback("drained", || shared.handler.drained());
                }

                tokio::select! {
                    biased;

                    _ = shutdown_rx.wait_for_shutdown() => break,

                    _ = shared.notify.notified() => {}
                }
            }
        }
    }

    debug!("dispatch buffer worker stopped");
}

async fn deliver<T, H>(shared: &Shared<T, H>, entry: Entry<T>)
where
    T: Send + Sync + 'static,
    H: DispatchHandler<T>,
{
    let Entry {
        sequence,
        item,
        hold,
    } = entry;

    debug!(sequence, hold, "delivering buffered item");

    let result = AssertUnwindSafe(shared.handler.handle(&item))
        .catch_unwind()
        .await;

    let error = match result {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err),
        Err(panic) => Some(delimited_error!(
            ErrorKind::ProcessorPanic,
            "Item handler panicked",
            panic_message(panic.as_ref())
        )),
    };

    if let Some(error) = error {
        counter!(
            DELIMITED_BUFFER_EXCEPTIONS_TOTAL,
            OPERATION_LABEL => BufferOperation::Deliver.as_str(),
            ERROR_KIND_LABEL => format!("{:?}", error.kind())
        )
        .increment(1);
        error!(sequence, error = %error, "dispatch handler failed");

        guard_callback("exception", || {
            shared.handler.exception(
                ExceptionOrigin::Item {
                    sequence,
                    item: &item,
                },
                error,
            )
        });
    }

    guard_callback("settled", || shared.handler.settled(sequence));
}

/// Runs a synchronous handler callback, logging instead of unwinding when it panics.
fn guard_callback(callback: &'static str, f: impl FnOnce()) {
    if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(f)) {
        error!(
            callback,
            panic = %panic_message(panic.as_ref()),
            "dispatch handler callback panicked"
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
