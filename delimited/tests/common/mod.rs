#![allow(dead_code)]

use std::collections::HashSet;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use std::{fmt, future};

use delimited::bail;
use delimited::buffer::{DispatchHandler, ExceptionOrigin};
use delimited::error::{DelimitedError, DelimitedResult, ErrorKind};
use delimited::processor::RowProcessor;
use delimited::reader::ProcessCompleted;
use delimited::types::Row;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::Notify;
use tokio::time::timeout;

/// Default timeout for test notifications.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// A [`Notify`] whose wait panics after a timeout instead of hanging the test.
#[derive(Clone)]
pub struct TimedNotify {
    notify: Arc<Notify>,
    timeout_duration: Duration,
}

impl TimedNotify {
    pub fn new(notify: Arc<Notify>) -> Self {
        Self::with_timeout(notify, DEFAULT_NOTIFY_TIMEOUT)
    }

    pub fn with_timeout(notify: Arc<Notify>, timeout_duration: Duration) -> Self {
        Self {
            notify,
            timeout_duration,
        }
    }

    /// Waits for the notification.
    ///
    /// # Panics
    ///
    /// Panics if the timeout elapses first.
    pub async fn notified(&self) {
        if timeout(self.timeout_duration, self.notify.notified())
            .await
            .is_err()
        {
            panic!(
                "Test notification timed out after {:?}. \
                 The expected number of items was likely never reached.",
                self.timeout_duration
            );
        }
    }
}

impl fmt::Debug for TimedNotify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedNotify")
            .field("timeout_duration", &self.timeout_duration)
            .finish()
    }
}

/// Notifies waiters once a counter reaches their target.
#[derive(Default)]
struct CountConditions {
    count: AtomicUsize,
    waiters: Mutex<Vec<(usize, Arc<Notify>)>>,
}

impl CountConditions {
    fn increment(&self) {
        let count = self.count.fetch_add(1, Ordering::SeqCst) + 1;

        let mut waiters = self.waiters.lock().unwrap();
        waiters.retain(|(target, notify)| {
            if count >= *target {
                notify.notify_one();
                false
            } else {
                true
            }
        });
    }

    fn wait_for(&self, target: usize) -> TimedNotify {
        let notify = Arc::new(Notify::new());

        let mut waiters = self.waiters.lock().unwrap();
        if self.count.load(Ordering::SeqCst) >= target {
            notify.notify_one();
        } else {
            waiters.push((target, notify.clone()));
        }

        TimedNotify::new(notify)
    }

    fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct RecordingProcessorInner {
    rows: Mutex<Vec<Row>>,
    messages: Mutex<Vec<(String, Option<ErrorKind>)>>,
    completions: Mutex<Vec<ProcessCompleted>>,
    processed: CountConditions,
    reject_lines: HashSet<String>,
    fail_lines: HashSet<String>,
    panic_lines: HashSet<String>,
    block_lines: HashSet<String>,
}

/// [`RowProcessor`] recording every row it sees.
///
/// Rows whose raw line was registered with [`RecordingProcessor::reject_line`],
/// [`RecordingProcessor::fail_line`] or [`RecordingProcessor::panic_line`] are rejected, fail
/// with [`ErrorKind::ProcessorFailed`] or panic. Every row is recorded before that happens.
#[derive(Clone, Default)]
pub struct RecordingProcessor {
    inner: Arc<RecordingProcessorInner>,
}

impl RecordingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_line(self, line: &str) -> Self {
        self.configure(|inner| {
            inner.reject_lines.insert(line.to_string());
        })
    }

    pub fn fail_line(self, line: &str) -> Self {
        self.configure(|inner| {
            inner.fail_lines.insert(line.to_string());
        })
    }

    pub fn panic_line(self, line: &str) -> Self {
        self.configure(|inner| {
            inner.panic_lines.insert(line.to_string());
        })
    }

    /// Makes the processor never finish the row with raw line `line`.
    pub fn block_line(self, line: &str) -> Self {
        self.configure(|inner| {
            inner.block_lines.insert(line.to_string());
        })
    }

    fn configure(mut self, f: impl FnOnce(&mut RecordingProcessorInner)) -> Self {
        let inner = Arc::get_mut(&mut self.inner)
            .expect("processor must be configured before it is shared");
        f(inner);
        self
    }

    /// Returns a notification fired once `count` rows were handed to the processor.
    pub fn wait_for_rows(&self, count: usize) -> TimedNotify {
        self.inner.processed.wait_for(count)
    }

    pub fn rows(&self) -> Vec<Row> {
        self.inner.rows.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.rows()
            .iter()
            .map(|row| row.line().to_string())
            .collect()
    }

    pub fn messages(&self) -> Vec<(String, Option<ErrorKind>)> {
        self.inner.messages.lock().unwrap().clone()
    }

    pub fn completions(&self) -> Vec<ProcessCompleted> {
        self.inner.completions.lock().unwrap().clone()
    }
}

impl RowProcessor for RecordingProcessor {
    async fn process_row(&self, row: &Row) -> DelimitedResult<bool> {
        self.inner.rows.lock().unwrap().push(row.clone());
        self.inner.processed.increment();

        let line = row.line();
        if self.inner.block_lines.contains(line) {
            future::pending::<()>().await;
        }
        if self.inner.panic_lines.contains(line) {
            panic!("processor panicked on '{line}'");
        }
        if self.inner.fail_lines.contains(line) {
            bail!(
                ErrorKind::ProcessorFailed,
                "Row processing failed",
                format!("refusing '{line}'")
            );
        }

        Ok(!self.inner.reject_lines.contains(line))
    }

    fn report_message(&self, message: &str, error: Option<&DelimitedError>) {
        self.inner
            .messages
            .lock()
            .unwrap()
            .push((message.to_string(), error.map(DelimitedError::kind)));
    }

    fn completed(&self, completed: &ProcessCompleted) {
        self.inner
            .completions
            .lock()
            .unwrap()
            .push(completed.clone());
    }
}

#[derive(Default)]
struct RecordingHandlerInner {
    items: Mutex<Vec<u32>>,
    errors: Mutex<Vec<(Option<u32>, ErrorKind)>>,
    settled: CountConditions,
    started: CountConditions,
    drained: AtomicUsize,
    fail_items: HashSet<u32>,
    panic_items: HashSet<u32>,
    block_items: HashSet<u32>,
}

/// [`DispatchHandler`] for `u32` items recording deliveries, failures and settlements.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    inner: Arc<RecordingHandlerInner>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(self, item: u32) -> Self {
        self.configure(|inner| {
            inner.fail_items.insert(item);
        })
    }

    pub fn panic_on(self, item: u32) -> Self {
        self.configure(|inner| {
            inner.panic_items.insert(item);
        })
    }

    /// Makes the handler never finish `item`.
    pub fn block_on(self, item: u32) -> Self {
        self.configure(|inner| {
            inner.block_items.insert(item);
        })
    }

    fn configure(mut self, f: impl FnOnce(&mut RecordingHandlerInner)) -> Self {
        let inner = Arc::get_mut(&mut self.inner)
            .expect("handler must be configured before it is shared");
        f(inner);
        self
    }

    /// Returns a notification fired once `count` items have settled.
    pub fn wait_for_settled(&self, count: usize) -> TimedNotify {
        self.inner.settled.wait_for(count)
    }

    /// Returns a notification fired once `count` items were handed to the handler.
    pub fn wait_for_started(&self, count: usize) -> TimedNotify {
        self.inner.started.wait_for(count)
    }

    pub fn items(&self) -> Vec<u32> {
        self.inner.items.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<(Option<u32>, ErrorKind)> {
        self.inner.errors.lock().unwrap().clone()
    }

    pub fn settled_count(&self) -> usize {
        self.inner.settled.get()
    }

    pub fn drained_count(&self) -> usize {
        self.inner.drained.load(Ordering::SeqCst)
    }
}

impl DispatchHandler<u32> for RecordingHandler {
    async fn handle(&self, item: &u32) -> DelimitedResult<()> {
        let item = *item;
        self.inner.items.lock().unwrap().push(item);
        self.inner.started.increment();

        if self.inner.block_items.contains(&item) {
            future::pending::<()>().await;
        }
        if self.inner.panic_items.contains(&item) {
            panic!("handler panicked on {item}");
        }
        if self.inner.fail_items.contains(&item) {
            bail!(
                ErrorKind::ProcessorFailed,
                "Item processing failed",
                format!("refusing {item}")
            );
        }

        Ok(())
    }

    fn exception(&self, origin: ExceptionOrigin<'_, u32>, error: DelimitedError) {
        let item = match origin {
            ExceptionOrigin::Buffer(_) => None,
            ExceptionOrigin::Item { item, .. } => Some(*item),
        };
        self.inner.errors.lock().unwrap().push((item, error.kind()));
    }

    fn settled(&self, _sequence: u64) {
        self.inner.settled.increment();
    }

    fn drained(&self) {
        self.inner.drained.fetch_add(1, Ordering::SeqCst);
    }
}

/// Async reader returning at most `chunk_size` bytes per read.
pub struct ChunkedReader {
    data: Vec<u8>,
    position: usize,
    chunk_size: usize,
}

pub fn chunked_reader(data: impl Into<Vec<u8>>, chunk_size: usize) -> ChunkedReader {
    ChunkedReader {
        data: data.into(),
        position: 0,
        chunk_size: chunk_size.max(1),
    }
}

impl AsyncRead for ChunkedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let remaining = self.data.len() - self.position;
        let len = remaining.min(self.chunk_size).min(buf.remaining());

        let start = self.position;
        buf.put_slice(&self.data[start..start + len]);
        self.position += len;

        Poll::Ready(Ok(()))
    }
}

/// Async reader that yields `data` and then fails.
pub struct FailingReader {
    data: Option<Vec<u8>>,
}

pub fn failing_reader(data: impl Into<Vec<u8>>) -> FailingReader {
    FailingReader {
        data: Some(data.into()),
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.data.take() {
            Some(data) => {
                let len = data.len().min(buf.remaining());
                buf.put_slice(&data[..len]);
                Poll::Ready(Ok(()))
            }
            None => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "source went away",
            ))),
        }
    }
}

/// Async reader that yields `data` and then never produces anything again.
pub struct StallingReader {
    data: Option<Vec<u8>>,
}

pub fn stalling_reader(data: impl Into<Vec<u8>>) -> StallingReader {
    StallingReader {
        data: Some(data.into()),
    }
}

impl AsyncRead for StallingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.data.take() {
            Some(data) => {
                let len = data.len().min(buf.remaining());
                buf.put_slice(&data[..len]);
                Poll::Ready(Ok(()))
            }
            None => Poll::Pending,
        }
    }
}

/// Async reader that never produces data.
pub struct StalledReader;

impl AsyncRead for StalledReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}
