//! Event batching writer.
//!
//! A single consumer thread owns the buffer. Producers send records over a
//! channel; the consumer flushes when the buffer reaches `batch_rows` or
//! when `batch_seconds` of real time have passed since the first unflushed
//! record, whichever comes first. Both triggers feed one `select!`, so the
//! time trigger is independent of the simulation's acceleration.

use std::io;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::BatchingParams;
use crate::event::EventRecord;

mod sink;

pub use sink::{DirectorySink, EncodedBatch, EventSink, MemorySink};

#[derive(Debug, Clone, PartialEq)]
pub struct WriterSettings {
    pub batch_rows: usize,
    pub batch_interval: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl From<&BatchingParams> for WriterSettings {
    fn from(params: &BatchingParams) -> Self {
        Self {
            batch_rows: params.batch_rows.max(1),
            batch_interval: Duration::from_secs_f64(params.batch_seconds.max(0.001)),
            max_retries: params.max_retries,
            retry_backoff: Duration::from_millis(params.retry_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WriterStats {
    pub flushes: u64,
    pub events_written: u64,
    pub flush_sizes: Vec<usize>,
    pub retries: u64,
}

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("failed to encode event record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("writer is no longer accepting records")]
    Closed { record: Option<Box<EventRecord>> },
    #[error("flush failed after {attempts} attempts ({} events unflushed): {source}", pending.len())]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: io::Error,
        /// Every record that never reached the sink, in emission order.
        pending: Vec<EventRecord>,
    },
    #[error("writer thread panicked")]
    Panicked,
}

impl WriterError {
    /// Records that were not written, for manual recovery.
    pub fn pending(&self) -> &[EventRecord] {
        match self {
            WriterError::RetriesExhausted { pending, .. } => pending,
            _ => &[],
        }
    }
}

enum WriterCommand {
    Record(Box<EventRecord>),
    /// Flush whatever is buffered, then acknowledge.
    Flush(Sender<()>),
}

/// Producer handle of the writer thread.
pub struct BatchWriter {
    tx: Option<Sender<WriterCommand>>,
    /// Raised by the consumer once a flush has exhausted its retries.
    failed: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<WriterStats, WriterError>>>,
}

impl BatchWriter {
    pub fn spawn(location: &str, settings: WriterSettings, sink: Box<dyn EventSink>) -> Self {
        let (tx, rx) = channel::unbounded();
        let failed = Arc::new(AtomicBool::new(false));
        let consumer = Consumer {
            failed: Arc::clone(&failed),
            location: location.to_string(),
            settings,
            sink,
            buffer: Vec::new(),
            next_batch: 0,
            stats: WriterStats::default(),
        };
        let handle = thread::Builder::new()
            .name(format!("writer-{location}"))
            .spawn(move || consumer.run(rx));
        match handle {
            Ok(handle) => Self {
                tx: Some(tx),
                failed,
                handle: Some(handle),
            },
            Err(err) => {
                warn!(location, error = %err, "failed to spawn writer thread");
                Self {
                    tx: None,
                    failed,
                    handle: None,
                }
            }
        }
    }

    /// Queues a record. Fails only when the writer has stopped; call
    /// [`finish`](Self::finish) to learn why.
    pub fn send(&self, record: EventRecord) -> Result<(), WriterError> {
        let tx = match &self.tx {
            Some(tx) if !self.failed.load(Ordering::Acquire) => tx,
            _ => {
                return Err(WriterError::Closed {
                    record: Some(Box::new(record)),
                })
            }
        };
        tx.send(WriterCommand::Record(Box::new(record)))
            .map_err(|err| match err.into_inner() {
                WriterCommand::Record(record) => WriterError::Closed {
                    record: Some(record),
                },
                WriterCommand::Flush(_) => WriterError::Closed { record: None },
            })
    }

    /// Flushes everything queued so far and waits until the sink has it.
    pub fn flush(&self) -> Result<(), WriterError> {
        let Some(tx) = &self.tx else {
            return Err(WriterError::Closed { record: None });
        };
        let (ack_tx, ack_rx) = channel::bounded(1);
        tx.send(WriterCommand::Flush(ack_tx))
            .map_err(|_| WriterError::Closed { record: None })?;
        ack_rx
            .recv()
            .map_err(|_| WriterError::Closed { record: None })
    }

    /// Closes the channel, lets the consumer drain and flush, and returns
    /// its statistics.
    pub fn finish(mut self) -> Result<WriterStats, WriterError> {
        self.tx.take();
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| WriterError::Panicked)?,
            None => Err(WriterError::Closed { record: None }),
        }
    }
}

impl Drop for BatchWriter {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct Consumer {
    failed: Arc<AtomicBool>,
    location: String,
    settings: WriterSettings,
    sink: Box<dyn EventSink>,
    buffer: Vec<EventRecord>,
    next_batch: u64,
    stats: WriterStats,
}

impl Consumer {
    fn run(mut self, rx: Receiver<WriterCommand>) -> Result<WriterStats, WriterError> {
        let mut deadline: Option<Instant> = None;
        loop {
            let timer = match deadline {
                Some(at) => channel::at(at),
                None => channel::never(),
            };
            let flushed = select! {
                recv(rx) -> command => match command {
                    Ok(WriterCommand::Record(record)) => {
                        if self.buffer.is_empty() {
                            deadline = Some(Instant::now() + self.settings.batch_interval);
                        }
                        self.buffer.push(*record);
                        if self.buffer.len() >= self.settings.batch_rows {
                            deadline = None;
                            self.flush()
                        } else {
                            Ok(())
                        }
                    }
                    Ok(WriterCommand::Flush(ack)) => {
                        deadline = None;
                        let flushed = self.flush();
                        if flushed.is_ok() {
                            let _ = ack.send(());
                        }
                        flushed
                    }
                    Err(_) => {
                        let flushed = self.flush();
                        if flushed.is_ok() {
                            debug!(
                                location = %self.location,
                                flushes = self.stats.flushes,
                                events = self.stats.events_written,
                                "writer drained"
                            );
                            return Ok(self.stats);
                        }
                        flushed
                    }
                },
                recv(timer) -> _ => {
                    deadline = None;
                    self.flush()
                }
            };
            if let Err(err) = flushed {
                return Err(self.abort(&rx, err));
            }
        }
    }

    /// Stops accepting records and collects everything still queued into
    /// the error. Blocks until every producer handle is gone, so no record
    /// sent before the producer saw the failure is lost.
    fn abort(&self, rx: &Receiver<WriterCommand>, err: WriterError) -> WriterError {
        self.failed.store(true, Ordering::Release);
        match err {
            WriterError::RetriesExhausted {
                attempts,
                source,
                mut pending,
            } => {
                // Pending flush acks are dropped, which fails the waiting
                // `flush` call with `Closed`.
                pending.extend(rx.iter().filter_map(|command| match command {
                    WriterCommand::Record(record) => Some(*record),
                    WriterCommand::Flush(_) => None,
                }));
                WriterError::RetriesExhausted {
                    attempts,
                    source,
                    pending,
                }
            }
            other => other,
        }
    }

    /// Swaps the buffer out and hands it to the sink, retrying with
    /// exponential backoff. On exhaustion the swapped-out batch is returned
    /// in the error.
    fn flush(&mut self) -> Result<(), WriterError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = mem::replace(
            &mut self.buffer,
            Vec::with_capacity(self.settings.batch_rows.min(4_096)),
        );
        let mut payload = Vec::with_capacity(batch.len() * 256);
        for record in &batch {
            serde_json::to_writer(&mut payload, record)?;
            payload.push(b'\n');
        }
        let encoded = EncodedBatch {
            location: self.location.clone(),
            sequence: self.next_batch,
            flushed_at: Utc::now(),
            records: batch.len(),
            payload,
        };

        let mut attempt = 0u32;
        loop {
            match self.sink.write_batch(&encoded) {
                Ok(()) => break,
                Err(err) if attempt < self.settings.max_retries => {
                    let backoff = self.settings.retry_backoff.saturating_mul(1u32 << attempt.min(16));
                    attempt += 1;
                    self.stats.retries += 1;
                    warn!(
                        location = %self.location,
                        batch = self.next_batch,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "flush failed, retrying"
                    );
                    thread::sleep(backoff);
                }
                Err(source) => {
                    return Err(WriterError::RetriesExhausted {
                        attempts: attempt + 1,
                        source,
                        pending: batch,
                    });
                }
            }
        }

        debug!(
            location = %self.location,
            batch = self.next_batch,
            records = encoded.records,
            "batch flushed"
        );
        self.next_batch += 1;
        self.stats.flushes += 1;
        self.stats.events_written += encoded.records as u64;
        self.stats.flush_sizes.push(encoded.records);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventBody, OrderEvent};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    fn record(sequence: u32) -> EventRecord {
        OrderEvent {
            event_id: Uuid::nil(),
            order_id: Uuid::nil(),
            sequence,
            ts_ms: 0,
            body: EventBody::GkStarted { queue_mins: 1.0 },
        }
        .into_record("gk", "loc")
        .expect("record")
    }

    fn settings(rows: usize, interval: Duration) -> WriterSettings {
        WriterSettings {
            batch_rows: rows,
            batch_interval: interval,
            max_retries: 2,
            retry_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn count_trigger_splits_batches() {
        let sink = MemorySink::new();
        let writer = BatchWriter::spawn(
            "loc",
            settings(4, Duration::from_secs(3_600)),
            Box::new(sink.clone()),
        );
        for seq in 0..10 {
            writer.send(record(seq)).expect("send");
        }
        let stats = writer.finish().expect("finish");
        assert_eq!(stats.flush_sizes, vec![4, 4, 2]);
        assert_eq!(stats.events_written, 10);
        let sequences: Vec<u64> = sink.batches().iter().map(|b| b.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[test]
    fn time_trigger_flushes_partial_batch() {
        let sink = MemorySink::new();
        let writer = BatchWriter::spawn(
            "loc",
            settings(1_000, Duration::from_millis(50)),
            Box::new(sink.clone()),
        );
        writer.send(record(0)).expect("send");
        writer.send(record(1)).expect("send");
        let waited = Instant::now();
        while sink.batches().is_empty() && waited.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(sink.batches().len(), 1);
        assert_eq!(sink.batches()[0].records, 2);
        let stats = writer.finish().expect("finish");
        assert_eq!(stats.flushes, 1);
    }

    #[test]
    fn explicit_flush_is_acknowledged() {
        let sink = MemorySink::new();
        let writer = BatchWriter::spawn(
            "loc",
            settings(1_000, Duration::from_secs(3_600)),
            Box::new(sink.clone()),
        );
        writer.send(record(0)).expect("send");
        writer.flush().expect("flush");
        assert_eq!(sink.batches().len(), 1);
        writer.flush().expect("empty flush");
        assert_eq!(sink.batches().len(), 1);
        writer.finish().expect("finish");
    }

    struct FlakySink {
        failures_left: Arc<AtomicU32>,
        inner: MemorySink,
    }

    impl EventSink for FlakySink {
        fn write_batch(&mut self, batch: &EncodedBatch) -> io::Result<()> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(io::Error::new(io::ErrorKind::Other, "volume unavailable"));
            }
            self.inner.write_batch(batch)
        }
    }

    #[test]
    fn transient_failures_are_retried() {
        let inner = MemorySink::new();
        let writer = BatchWriter::spawn(
            "loc",
            settings(2, Duration::from_secs(3_600)),
            Box::new(FlakySink {
                failures_left: Arc::new(AtomicU32::new(2)),
                inner: inner.clone(),
            }),
        );
        writer.send(record(0)).expect("send");
        writer.send(record(1)).expect("send");
        let stats = writer.finish().expect("finish");
        assert_eq!(stats.retries, 2);
        assert_eq!(inner.batches().len(), 1);
    }

    #[test]
    fn exhausted_retries_return_pending_records() {
        let writer = BatchWriter::spawn(
            "loc",
            settings(2, Duration::from_secs(3_600)),
            Box::new(FlakySink {
                failures_left: Arc::new(AtomicU32::new(u32::MAX)),
                inner: MemorySink::new(),
            }),
        );
        writer.send(record(0)).expect("send");
        writer.send(record(1)).expect("send");
        let err = writer.finish().expect_err("must fail");
        match err {
            WriterError::RetriesExhausted {
                attempts, pending, ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(pending.len(), 2);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn records_after_a_failed_flush_are_kept_or_refused() {
        let writer = BatchWriter::spawn(
            "loc",
            settings(1, Duration::from_secs(3_600)),
            Box::new(FlakySink {
                failures_left: Arc::new(AtomicU32::new(u32::MAX)),
                inner: MemorySink::new(),
            }),
        );
        let mut refused = Vec::new();
        for seq in 0..50 {
            if let Err(WriterError::Closed { record }) = writer.send(record(seq)) {
                refused.extend(record.map(|r| r.sequence));
            }
        }
        assert!(writer.flush().is_err());
        let err = writer.finish().expect_err("must fail");
        let mut sequences: Vec<u32> = err.pending().iter().map(|r| r.sequence).collect();
        sequences.extend(refused);
        assert_eq!(sequences, (0..50).collect::<Vec<u32>>());
    }
}
