use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::watch;

use crate::delimited_error;
use crate::error::{DelimitedResult, ErrorKind};

/// Message carried by the completion notification.
pub const COMPLETED_MESSAGE: &str = "Completed";

/// Payload of the one-shot completion notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCompleted {
    /// Human readable completion message.
    pub message: String,
    /// Number of rows produced from the stream, equal to the number of rows processed.
    pub row_count: u64,
}

impl fmt::Display for ProcessCompleted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Receiver of the completion notification of a [`crate::reader::DelimitedReader`].
#[derive(Debug, Clone)]
pub struct CompletionRx(watch::Receiver<Option<ProcessCompleted>>);

impl CompletionRx {
    pub(crate) fn new(rx: watch::Receiver<Option<ProcessCompleted>>) -> Self {
        Self(rx)
    }

    /// Returns the completion payload if processing already completed.
    pub fn get(&self) -> Option<ProcessCompleted> {
        self.0.borrow().clone()
    }

    /// Returns whether processing completed.
    pub fn is_completed(&self) -> bool {
        self.0.borrow().is_some()
    }

    /// Waits until every produced row has been processed.
    ///
    /// Fails with [`ErrorKind::CompletionSignalLost`] when the reader is dropped first.
    pub async fn wait(&mut self) -> DelimitedResult<ProcessCompleted> {
        let completed = match self.0.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };

        completed.ok_or_else(|| {
            delimited_error!(
                ErrorKind::CompletionSignalLost,
                "Reader dropped before processing completed"
            )
        })
    }
}

/// Counts produced and processed rows and decides, exactly once, when processing completed.
///
/// The producer calls [`CompletionTracker::record_input`] for every queued row and
/// [`CompletionTracker::finish_input`] after the last one. The consumer calls
/// [`CompletionTracker::record_processed`] once per row. Whichever call observes the input as
/// finished and both counts equal wins the `completed` flag and returns `true`.
#[derive(Debug, Default)]
pub(crate) struct CompletionTracker {
    input_count: AtomicU64,
    processed_count: AtomicU64,
    input_finished: AtomicBool,
    completed: AtomicBool,
}

impl CompletionTracker {
    pub(crate) fn input_count(&self) -> u64 {
        self.input_count.load(Ordering::SeqCst)
    }

    pub(crate) fn processed_count(&self) -> u64 {
        self.processed_count.load(Ordering::SeqCst)
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Returns the new input count.
    pub(crate) fn record_input(&self) -> u64 {
        self.input_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn finish_input(&self) -> bool {
        self.input_finished.store(true, Ordering::SeqCst);
        self.try_complete()
    }

    pub(crate) fn record_processed(&self) -> bool {
        self.processed_count.fetch_add(1, Ordering::SeqCst);
        self.try_complete()
    }

    fn try_complete(&self) -> bool {
        if !self.input_finished.load(Ordering::SeqCst) {
            return false;
        }

        // The input count is final once the input is finished.
        if self.processed_count.load(Ordering::SeqCst) != self.input_count.load(Ordering::SeqCst) {
            return false;
        }

        self.completed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}
