use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use delimited_config::shared::{DelimitedFormat, ReaderConfig};
use metrics::counter;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::buffer::{DispatchBuffer, DispatchHandler, ExceptionOrigin};
use crate::error::{DelimitedError, DelimitedResult, ErrorKind};
use crate::metrics::{
    DELIMITED_ROWS_PROCESSED_TOTAL, DELIMITED_ROWS_PRODUCED_TOTAL, DELIMITED_ROWS_REJECTED_TOTAL,
};
use crate::processor::{FnRowProcessor, RowProcessor};
use crate::reader::completion::{
    COMPLETED_MESSAGE, CompletionRx, CompletionTracker, ProcessCompleted,
};
use crate::reader::tokenizer::{LineKind, LineTokenizer, TokenizedLine, TokenizerState};
use crate::types::{Row, split_line};
use crate::{bail, delimited_error};

/// Lifecycle phase of a [`DelimitedReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderPhase {
    /// Reading lines up to and including the header line.
    ReadingHeader,
    /// Producing a row for every line after the header line.
    ReadingRows,
    /// The stream is exhausted; a trailing unterminated line is being flushed.
    Draining,
    /// Every row was produced; waiting for the consumer to process the rest.
    AwaitingCompletion,
    /// Every produced row was processed.
    Completed,
}

impl From<TokenizerState> for ReaderPhase {
    fn from(state: TokenizerState) -> Self {
        match state {
            TokenizerState::ReadingHeader => ReaderPhase::ReadingHeader,
            TokenizerState::ReadingRows => ReaderPhase::ReadingRows,
            TokenizerState::Draining => ReaderPhase::Draining,
        }
    }
}

/// Outcome of [`DelimitedReader::process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Message of the completion notification.
    pub message: String,
    /// Number of rows produced from the stream.
    pub input_count: u64,
    /// Number of rows processed, accepted or not.
    pub processed_count: u64,
    /// Raw lines of the rows the processor did not accept, in processing order.
    ///
    /// This covers rows for which it returned `false` as well as rows whose processing returned
    /// an error or panicked; the latter are also reported through
    /// [`RowProcessor::report_message`].
    pub rejected_lines: Vec<String>,
}

impl ProcessSummary {
    /// Returns whether every row was accepted.
    pub fn is_clean(&self) -> bool {
        self.rejected_lines.is_empty()
    }
}

/// Consumer side of a reader: runs the processor and keeps the completion bookkeeping.
struct RowDispatchHandler<P> {
    processor: P,
    tracker: CompletionTracker,
    rejected_lines: Mutex<Vec<String>>,
    completion_tx: watch::Sender<Option<ProcessCompleted>>,
    phase_tx: watch::Sender<ReaderPhase>,
}

impl<P> RowDispatchHandler<P>
where
    P: RowProcessor,
{
    fn set_phase(&self, phase: ReaderPhase) {
        self.phase_tx.send_if_modified(|current| {
            if *current == phase || *current == ReaderPhase::Completed {
                return false;
            }

            *current = phase;
            true
        });
    }

    fn reject(&self, line: &str) {
        counter!(DELIMITED_ROWS_REJECTED_TOTAL).increment(1);

        match self.rejected_lines.lock() {
            Ok(mut lines) => lines.push(line.to_owned()),
            Err(_) => error!("rejected line collection poisoned, dropping line"),
        }
    }

    fn rejected_count(&self) -> usize {
        self.rejected_lines
            .lock()
            .map(|lines| lines.len())
            .unwrap_or_default()
    }

    fn rejected_lines(&self) -> Vec<String> {
        self.rejected_lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    fn complete(&self) {
        let completed = ProcessCompleted {
            message: COMPLETED_MESSAGE.to_string(),
            row_count: self.tracker.input_count(),
        };

        info!(
            row_count = completed.row_count,
            rejected_count = self.rejected_count(),
            "delimited stream processed"
        );

        self.set_phase(ReaderPhase::Completed);
        self.processor.completed(&completed);
        self.completion_tx.send_replace(Some(completed));
    }
}

impl<P> DispatchHandler<Row> for RowDispatchHandler<P>
where
    P: RowProcessor,
{
    async fn handle(&self, row: &Row) -> DelimitedResult<()> {
        let accepted = self
            .processor
            .process_row(row)
            .await
            .map_err(|err| err.with_detail(format!("row {}", row.index())))?;

        if !accepted {
            debug!(row_index = row.index(), "row rejected");
            self.reject(row.line());
        }

        Ok(())
    }

    fn exception(&self, origin: ExceptionOrigin<'_, Row>, error: DelimitedError) {
        match origin {
            ExceptionOrigin::Item { item, .. } => {
                self.reject(item.line());
                self.processor
                    .report_message(&format!("Row {} failed", item.index()), Some(&error));
            }
            ExceptionOrigin::Buffer(operation) => {
                self.processor.report_message(
                    &format!("Row buffer {operation} failed"),
                    Some(&error),
                );
            }
        }
    }

    fn settled(&self, sequence: u64) {
        counter!(DELIMITED_ROWS_PROCESSED_TOTAL).increment(1);

        if self.tracker.record_processed() {
            debug!(sequence, "last row processed");
            self.complete();
        }
    }

    fn drained(&self) {
        debug!(
            processed_count = self.tracker.processed_count(),
            "row buffer drained"
        );
    }
}

/// Streams a delimited byte source into rows and feeds them to a [`RowProcessor`].
///
/// The reader consumes the source in chunks of the configured buffer size, splits it into lines
/// and turns every line after the header line into a [`Row`]. Rows are queued on a dispatch
/// buffer and processed by its worker task, so reading never waits for processing. Once the
/// source is exhausted and every produced row has been processed, the completion notification
/// fires exactly once.
///
/// A reader consumes exactly one stream.
pub struct DelimitedReader<P> {
    config: ReaderConfig,
    delimiters: Arc<[String]>,
    columns: OnceLock<Arc<[String]>>,
    started: AtomicBool,
    buffer: DispatchBuffer<Row, RowDispatchHandler<P>>,
}

impl<F> DelimitedReader<FnRowProcessor<F>>
where
    F: Fn(&Row) -> bool + Send + Sync + 'static,
{
    /// Creates a comma-delimited reader that accepts or rejects rows with `process`.
    pub fn csv(process: F) -> Self {
        Self::build(
            FnRowProcessor::new(process),
            ReaderConfig::for_format(DelimitedFormat::Csv),
        )
    }
}

impl<P> DelimitedReader<P>
where
    P: RowProcessor,
{
    /// Creates a reader from a validated configuration.
    pub fn new(processor: P, config: ReaderConfig) -> DelimitedResult<Self> {
        config.validate()?;

        Ok(Self::build(processor, config))
    }

    /// Creates a reader splitting on `delimiters`, with defaults elsewhere.
    ///
    /// An empty delimiter list means a single comma.
    pub fn with_delimiters<I, S>(processor: P, delimiters: I) -> DelimitedResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(processor, ReaderConfig::with_delimiters(delimiters))
    }

    fn build(processor: P, config: ReaderConfig) -> Self {
        let delimiters: Arc<[String]> = config.effective_delimiters().into();
        let (completion_tx, _) = watch::channel(None);
        let (phase_tx, _) = watch::channel(ReaderPhase::ReadingHeader);

        let handler = RowDispatchHandler {
            processor,
            tracker: CompletionTracker::default(),
            rejected_lines: Mutex::new(Vec::new()),
            completion_tx,
            phase_tx,
        };
        let buffer = DispatchBuffer::with_config(handler, &config.buffer);

        Self {
            config,
            delimiters,
            columns: OnceLock::new(),
            started: AtomicBool::new(false),
            buffer,
        }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn processor(&self) -> &P {
        &self.rows().processor
    }

    /// Returns the trimmed column names, once the header line has been read.
    pub fn columns(&self) -> Option<&[String]> {
        self.columns.get().map(|columns| columns.as_ref())
    }

    pub fn phase(&self) -> ReaderPhase {
        *self.rows().phase_tx.borrow()
    }

    /// Returns the number of rows produced so far.
    pub fn input_count(&self) -> u64 {
        self.rows().tracker.input_count()
    }

    /// Returns the number of rows processed so far, accepted or not.
    pub fn processed_count(&self) -> u64 {
        self.rows().tracker.processed_count()
    }

    /// Returns the raw lines of the rows rejected so far.
    pub fn rejected_lines(&self) -> Vec<String> {
        self.rows().rejected_lines()
    }

    pub fn is_completed(&self) -> bool {
        self.rows().tracker.is_completed()
    }

    /// Subscribes to the completion notification.
    pub fn completion(&self) -> CompletionRx {
        CompletionRx::new(self.rows().completion_tx.subscribe())
    }

    /// Holds back delivery of further rows to the processor.
    pub fn stop(&self) {
        self.buffer.stop();
    }

    /// Continues delivery of rows to the processor.
    pub fn resume(&self) {
        self.buffer.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.buffer.is_paused()
    }

    /// Reads `input` to its end, queueing a row for every data line.
    ///
    /// Returns the number of rows produced once the source is exhausted. Rows may still be
    /// processing at that point; use [`DelimitedReader::completion`] to wait for them.
    pub async fn read<R>(&self, mut input: R) -> DelimitedResult<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            bail!(
                ErrorKind::InvalidState,
                "Reader already consumed a stream",
                "a reader processes exactly one stream"
            );
        }

        let buffer_size = self.config.effective_buffer_size();
        let header_line = self.config.effective_header_line();
        let read_timeout = self.config.read_timeout();

        info!(buffer_size, header_line, "reading delimited stream");

        let mut chunk = vec![0u8; buffer_size];
        let mut tokenizer = LineTokenizer::new(header_line);

        loop {
            let bytes_read = timeout(read_timeout, input.read(&mut chunk))
                .await
                .map_err(|elapsed| {
                    DelimitedError::from(elapsed)
                        .with_detail(format!("no data within {} ms", read_timeout.as_millis()))
                })?
                .map_err(|err| {
                    DelimitedError::from(err)
                        .with_detail(format!("after {} lines", tokenizer.lines_completed()))
                })?;

            if bytes_read == 0 {
                break;
            }

            for line in tokenizer.push(&chunk[..bytes_read]) {
                self.accept_line(line)?;
            }
            self.rows().set_phase(tokenizer.state().into());
        }

        let trailing = tokenizer.finish();
        self.rows().set_phase(tokenizer.state().into());
        if let Some(line) = trailing {
            self.accept_line(line)?;
        }

        self.rows().set_phase(ReaderPhase::AwaitingCompletion);
        let input_count = self.input_count();
        info!(
            input_count,
            lines = tokenizer.lines_completed(),
            "delimited stream read"
        );

        if self.rows().tracker.finish_input() {
            self.rows().complete();
        }

        Ok(input_count)
    }

    /// Reads `input`, waits until every row has been processed and shuts the reader down.
    ///
    /// The wait is bounded by the configured completion timeout, if any. The dispatch buffer is
    /// shut down on every exit path; when both the run and the shutdown fail, the returned error
    /// aggregates the two, run failure first.
    pub async fn process<R>(&self, input: R) -> DelimitedResult<ProcessSummary>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut completion = self.completion();
        let result = self.read_to_completion(input, &mut completion).await;
        let shutdown_result = self.shutdown().await;

        let completed = match (result, shutdown_result) {
            (Ok(completed), Ok(())) => completed,
            (Ok(_), Err(err)) | (Err(err), Ok(())) => return Err(err),
            (Err(err), Err(shutdown_err)) => return Err(vec![err, shutdown_err].into()),
        };

        Ok(ProcessSummary {
            message: completed.message,
            input_count: self.input_count(),
            processed_count: self.processed_count(),
            rejected_lines: self.rejected_lines(),
        })
    }

    /// Stops the dispatch buffer worker. Calling this more than once is harmless.
    pub async fn shutdown(&self) -> DelimitedResult<()> {
        self.buffer.shutdown().await
    }

    async fn read_to_completion<R>(
        &self,
        input: R,
        completion: &mut CompletionRx,
    ) -> DelimitedResult<ProcessCompleted>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.read(input).await?;

        let Some(limit) = self.config.completion_timeout() else {
            return completion.wait().await;
        };

        match timeout(limit, completion.wait()).await {
            Ok(result) => result,
            Err(_) => bail!(
                ErrorKind::CompletionTimeout,
                "Rows were not processed in time",
                format!(
                    "{} of {} rows processed after {} ms",
                    self.processed_count(),
                    self.input_count(),
                    limit.as_millis()
                )
            ),
        }
    }

    fn accept_line(&self, line: TokenizedLine) -> DelimitedResult<()> {
        match line.kind {
            LineKind::Header => {
                let columns: Arc<[String]> = split_line(&line.text, &self.delimiters)
                    .into_iter()
                    .map(|name| name.trim().to_string())
                    .collect();
                debug!(columns = ?columns, "header line read");

                if self.columns.set(columns).is_err() {
                    bail!(
                        ErrorKind::InvalidState,
                        "Header line read twice",
                        format!("line {}", line.number)
                    );
                }
            }
            LineKind::Data => {
                // Rows before the header line have no column names.
                let columns = self
                    .columns
                    .get()
                    .cloned()
                    .unwrap_or_else(|| Arc::from(Vec::new()));
                let index = self.input_count();
                let row = Row::new(index, line.text, columns, self.delimiters.clone());

                if self.buffer.enqueue(row).is_none() {
                    return Err(delimited_error!(
                        ErrorKind::BufferShutdown,
                        "Row could not be queued",
                        format!("row {index} from line {}", line.number)
                    ));
                }

                let input_count = self.rows().tracker.record_input();
                counter!(DELIMITED_ROWS_PRODUCED_TOTAL).increment(1);
                debug!(row_index = index, input_count, "row queued");
            }
        }

        Ok(())
    }

    fn rows(&self) -> &RowDispatchHandler<P> {
        self.buffer.handler()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reader_processes_csv() {
        let reader = DelimitedReader::csv(|row: &Row| row.field("name").is_ok());
        let summary = reader
            .process(&b"id,name\n1,Alice\n2,Bob\n"[..])
            .await
            .unwrap();

        assert_eq!(summary.message, "Completed");
        assert_eq!(summary.input_count, 2);
        assert_eq!(summary.processed_count, 2);
        assert!(summary.is_clean());
        assert_eq!(reader.columns().unwrap(), ["id", "name"]);
        assert_eq!(reader.phase(), ReaderPhase::Completed);
    }

    #[tokio::test]
    async fn test_header_only_input_completes_immediately() {
        let reader = DelimitedReader::csv(|_: &Row| true);
        let completion = reader.completion();

        assert_eq!(reader.read(&b"id,name\n"[..]).await.unwrap(), 0);
        assert!(reader.is_completed());
        assert_eq!(completion.get().unwrap().row_count, 0);
        reader.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_second_read_is_rejected() {
        let reader = DelimitedReader::csv(|_: &Row| true);
        reader.read(&b"id\n1\n"[..]).await.unwrap();

        let err = reader.read(&b"id\n2\n"[..]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        reader.shutdown().await.unwrap();
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let err = DelimitedReader::with_delimiters(FnRowProcessor::new(|_: &Row| true), [""])
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }

    #[tokio::test]
    async fn test_read_after_shutdown_fails() {
        let reader = DelimitedReader::csv(|_: &Row| true);
        reader.shutdown().await.unwrap();

        let err = reader.read(&b"id\n1\n"[..]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BufferShutdown);
    }
}
