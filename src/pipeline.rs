//! Streaming write pipeline
//!
//! Producers send [`DataBatch`]es into a bounded channel; a single consumer
//! owns the workbook and its stream, writes each batch at its target row and,
//! once every sender is dropped, flushes the stream and saves the file.
//!
//! Completion is reported exactly once through a oneshot channel, whether the
//! run succeeded or stopped on an error. Closing the channel is the only way
//! to end a run: there is no timeout, and a producer that never drops its
//! sender keeps the consumer waiting.

use crate::config::PipelineConfig;
use crate::engine::Spreadsheet;
use crate::error::{SheetMapError, SheetMapResult};
use crate::mapping::FieldMap;
use crate::types::DataBatch;
use crate::writer::{open_session, write_to_stream};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outcome of one pipeline run, delivered when the consumer finishes
#[derive(Debug)]
pub struct Completion<S> {
    /// First error that stopped the run; `None` means flushed and saved
    pub error: Option<SheetMapError>,
    /// Batches fully written to the stream
    pub batches: usize,
    /// Records fully written to the stream
    pub rows_written: usize,
    /// Row after the last written batch
    pub next_row: Option<u32>,
    /// The workbook, handed back to the caller
    pub book: S,
}

impl<S> Completion<S> {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// The workbook on success, the captured error otherwise
    pub fn into_result(self) -> SheetMapResult<S> {
        match self.error {
            None => Ok(self.book),
            Some(e) => Err(e),
        }
    }
}

/// Waits for the consumer's completion signal
#[derive(Debug)]
pub struct PipelineHandle<S> {
    done: oneshot::Receiver<Completion<S>>,
    worker: JoinHandle<()>,
}

impl<S> PipelineHandle<S> {
    /// Wait for the run to finish
    ///
    /// Fails only if the consumer died without reporting.
    pub async fn wait(self) -> SheetMapResult<Completion<S>> {
        match self.done.await {
            Ok(completion) => Ok(completion),
            Err(_) => {
                if let Err(e) = self.worker.await {
                    warn!(error = %e, "pipeline worker failed");
                }
                Err(SheetMapError::PipelineAborted)
            }
        }
    }

    /// Blocking variant of [`PipelineHandle::wait`] for synchronous callers
    ///
    /// Must not be called from inside an async context.
    pub fn wait_blocking(self) -> SheetMapResult<Completion<S>> {
        self.done
            .blocking_recv()
            .map_err(|_| SheetMapError::PipelineAborted)
    }
}

/// A bounded batch channel sized by `config`
pub fn channel(config: &PipelineConfig) -> (mpsc::Sender<DataBatch>, mpsc::Receiver<DataBatch>) {
    mpsc::channel(config.channel_capacity.max(1))
}

/// Open a write session on `sheet` and start the consumer
///
/// Session setup happens before this returns, so a missing sheet or a
/// failure replaying existing rows is reported here. Must be called within a
/// tokio runtime.
pub fn spawn_pipeline<S>(
    receiver: mpsc::Receiver<DataBatch>,
    book: S,
    sheet: &str,
    field_map: Arc<FieldMap>,
) -> SheetMapResult<PipelineHandle<S>>
where
    S: Spreadsheet + 'static,
    S::Stream: 'static,
{
    let stream = open_session(&book, sheet)?;
    let (done_tx, done_rx) = oneshot::channel();
    let sheet = sheet.to_string();

    let worker = tokio::task::spawn_blocking(move || {
        let completion = consume(receiver, book, stream, &field_map);
        match &completion.error {
            None => info!(
                sheet = %sheet,
                batches = completion.batches,
                rows = completion.rows_written,
                "pipeline finished"
            ),
            Some(e) => warn!(sheet = %sheet, error = %e, "pipeline stopped"),
        }
        if done_tx.send(completion).is_err() {
            debug!(sheet = %sheet, "completion dropped: handle no longer waiting");
        }
    });

    Ok(PipelineHandle {
        done: done_rx,
        worker,
    })
}

/// Channel + spawned consumer in one call
pub fn start_pipeline<S>(
    book: S,
    sheet: &str,
    field_map: Arc<FieldMap>,
    config: &PipelineConfig,
) -> SheetMapResult<(mpsc::Sender<DataBatch>, PipelineHandle<S>)>
where
    S: Spreadsheet + 'static,
    S::Stream: 'static,
{
    let (sender, receiver) = channel(config);
    let handle = spawn_pipeline(receiver, book, sheet, field_map)?;
    Ok((sender, handle))
}

/// Consumer loop; runs on a blocking thread and owns the workbook and stream
fn consume<S: Spreadsheet>(
    mut receiver: mpsc::Receiver<DataBatch>,
    mut book: S,
    mut stream: S::Stream,
    field_map: &FieldMap,
) -> Completion<S> {
    let mut batches = 0usize;
    let mut rows_written = 0usize;
    let mut next_row = None;

    let mut error = None;
    while let Some(batch) = receiver.blocking_recv() {
        match write_to_stream(&mut stream, batch.row_number, field_map, &batch.records) {
            Ok(next) => {
                batches += 1;
                rows_written += batch.len();
                next_row = Some(next);
                debug!(row = batch.row_number, records = batch.len(), "batch written");
            }
            Err(e) => {
                error = Some(e);
                break;
            }
        }
    }
    // Senders blocked on a full channel are released with an error
    receiver.close();

    if error.is_none() {
        error = book.flush_stream(stream).and_then(|_| book.save()).err();
    }

    Completion {
        error,
        batches,
        rows_written,
        next_row,
        book,
    }
}
