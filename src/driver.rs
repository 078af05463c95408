//! Driver runs the per-link ingestion loop

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::assembler::StreamAssembler;
use crate::config::LinkConfig;
use crate::counters::LinkCounters;
use crate::sink::Sink;
use crate::transport::Transport;
use crate::types::{ReadoutRecord, SampleRecord};
use crate::{ReadoutError, Result};

/// Resources owned by the worker while it runs, handed back when it exits.
pub struct WorkerState {
    pub transport: Box<dyn Transport>,
    pub assembler: StreamAssembler,

    /// An identity part was drained and its payload part has not been received.
    pub awaiting_payload: bool,

    /// Transport connection epoch the buffered bytes belong to.
    pub connection_epoch: u64,
}

impl WorkerState {
    pub fn new(transport: Box<dyn Transport>, assembler: StreamAssembler) -> Self {
        let connection_epoch = transport.connection_epoch();
        Self { transport, assembler, awaiting_payload: false, connection_epoch }
    }

    /// Drop bytes buffered from an earlier peer once the transport reports a new one.
    fn follow_connection(&mut self) -> usize {
        let epoch = self.transport.connection_epoch();
        if epoch == self.connection_epoch {
            return 0;
        }
        self.connection_epoch = epoch;
        self.assembler.clear()
    }
}

/// Outcome of processing one payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PayloadReport {
    pub records: usize,
    pub forwarded: usize,
    pub dropped: usize,
    pub desynchronized: bool,
    /// Bytes discarded by resynchronization or the buffer cap.
    pub discarded_bytes: usize,
}

/// Ingestion loop for one link: transport, then assembler, then sink.
///
/// All decoding and sink sends happen on the task running [`Driver::run`];
/// only the counters are shared with other threads.
pub struct Driver {
    config: LinkConfig,
    sink: Arc<dyn Sink>,
    counters: Arc<LinkCounters>,
}

impl Driver {
    pub fn new(config: LinkConfig, sink: Arc<dyn Sink>, counters: Arc<LinkCounters>) -> Self {
        Self { config, sink, counters }
    }

    /// Run until `cancel` fires, then release the transport and hand back the state.
    ///
    /// Cancellation is observed between iterations and while polling the
    /// transport. Once a part is ready the message is received, decoded and
    /// forwarded to completion.
    pub async fn run(&self, mut state: WorkerState, cancel: CancellationToken) -> WorkerState {
        let link = state.transport.describe();
        let timeout = self.config.receiver_timeout();
        info!(%link, card_id = self.config.card_id, link_tag = self.config.link_tag, "Ingestion loop started");

        let mut payload_count = 0u64;
        let mut error_count = 0u32;

        loop {
            if cancel.is_cancelled() {
                info!(%link, "Ingestion loop cancelled");
                break;
            }

            let polled = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(%link, "Ingestion loop cancelled during poll");
                    break;
                }
                polled = state.transport.poll(timeout) => polled,
            };

            let received = match polled {
                Ok(false) => {
                    self.counters.set_connected(state.transport.is_connected());
                    continue;
                }
                Ok(true) => self.receive_message(&mut state, timeout).await,
                Err(e) => Err(e),
            };
            self.counters.set_connected(state.transport.is_connected());

            match received {
                Ok(None) => {
                    error_count = 0;
                }
                Ok(Some(payload)) => {
                    error_count = 0;
                    payload_count += 1;
                    let stale = state.follow_connection();
                    if stale > 0 {
                        warn!(%link, stale, "New peer connected, discarding bytes buffered from the previous one");
                    }
                    self.process_payload(&mut state.assembler, &payload).await;
                }
                Err(e) => {
                    // Transport errors never end the loop; only stop does.
                    error_count = error_count.saturating_add(1);
                    self.counters.record_transport_error();
                    error!(%link, "Transport error ({} consecutive): {}", error_count, e);

                    // Exponential backoff: 50ms, 100ms, 200ms, ... capped at 1.6s
                    let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        state.transport.release().await;
        self.counters.set_connected(false);
        info!(%link, "Ingestion loop ended (processed {} payloads)", payload_count);
        state
    }

    /// Receive one payload, draining the identity part in identity-framed mode.
    ///
    /// Called only after `poll` reported a ready part. Returns `Ok(None)` when
    /// the payload part does not follow its identity within `timeout`; the
    /// next call then resumes with the payload.
    async fn receive_message(&self, state: &mut WorkerState, timeout: Duration) -> Result<Option<Vec<u8>>> {
        if self.config.mode.identity_framed() && !state.awaiting_payload {
            let identity = state.transport.recv().await?;
            trace!(identity_len = identity.len(), "Drained identity part");
            state.awaiting_payload = true;
            if !state.transport.poll(timeout).await? {
                debug!("Payload part not yet available after identity");
                return Ok(None);
            }
        }
        let payload = state.transport.recv().await?;
        state.awaiting_payload = false;
        Ok(Some(payload))
    }

    /// Accumulate one payload, decode what is complete and forward the records.
    pub async fn process_payload(&self, assembler: &mut StreamAssembler, payload: &[u8]) -> PayloadReport {
        let mut report = PayloadReport::default();

        if payload.is_empty() {
            self.counters.record_zero_receive();
            trace!("Zero-length receive");
            return report;
        }

        self.counters.record_payload(payload.len());
        assembler.extend(payload);
        if assembler.buffered() > self.config.max_buffer_bytes {
            let dropped = assembler.clear();
            report.discarded_bytes += dropped;
            error!(
                dropped,
                limit = self.config.max_buffer_bytes,
                "Accumulator exceeded its limit, discarding buffered bytes"
            );
            return report;
        }

        loop {
            let output = assembler.decode_available();
            self.counters.record_decode(&output);
            report.records += output.records.len();
            self.forward(&output.records, &mut report).await;

            if !output.status.is_fatal() {
                break;
            }
            report.desynchronized = true;
            self.counters.record_desync();
            if !self.config.resync_on_desync {
                break;
            }
            report.discarded_bytes += assembler.resynchronize();
        }

        report
    }

    async fn forward(&self, samples: &[SampleRecord], report: &mut PayloadReport) {
        let timeout = self.config.sink_timeout();
        let mut first_error: Option<ReadoutError> = None;

        for sample in samples {
            let record = ReadoutRecord::from_sample(sample, self.config.card_id, self.config.link_tag);
            match self.sink.send(record, timeout).await {
                Ok(()) => {
                    report.forwarded += 1;
                    self.counters.record_forwarded();
                }
                Err(e) => {
                    // No retry: a resend would reorder against later records.
                    report.dropped += 1;
                    self.counters.record_dropped();
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_error {
            warn!(
                sink = self.sink.name(),
                dropped = report.dropped,
                "Records dropped: {}",
                e
            );
        } else if !samples.is_empty() {
            debug!(sink = self.sink.name(), forwarded = samples.len(), "Forwarded records");
        }
    }
}
