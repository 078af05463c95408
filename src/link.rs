//! Link lifecycle: configure, start and stop one ingestion worker
//!
//! ```text
//! Stopped --configure--> Configured --start--> Running --stop--> Stopped
//!    ^                                                              |
//!    +------------------------- start (config kept) ----------------+
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::assembler::StreamAssembler;
use crate::config::LinkConfig;
use crate::counters::{LinkCounters, LinkInfo, LinkStatus};
use crate::decoder::FrameDecoder;
use crate::driver::{Driver, WorkerState};
use crate::sink::Sink;
use crate::transport::Transport;
use crate::transports::TcpTransport;
use crate::{ReadoutError, Result};

/// Interval at which `stop` checks whether the worker has exited.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Lifecycle state of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Stopped,
    Configured,
    Running,
}

/// Capability interface a host framework drives a link through.
pub trait LinkHandler {
    /// Attach the downstream sink. The first sink set is kept.
    fn set_sink(&mut self, sink: Arc<dyn Sink>);

    /// Apply a configuration. A no-op unless the link is stopped.
    fn configure(&mut self, config: LinkConfig) -> Result<()>;

    /// Spawn the worker. A no-op if already running.
    fn start(&mut self) -> Result<()>;

    /// Stop the worker and wait until it has exited. A no-op if not running.
    fn stop(&mut self) -> Result<()>;

    fn counters(&self) -> Arc<LinkCounters>;

    /// Telemetry snapshot; safe to call while running.
    fn info(&self) -> LinkInfo;

    fn state(&self) -> LinkState;
}

struct Worker {
    handle: JoinHandle<WorkerState>,
    cancel: CancellationToken,
}

/// Link reading a raw byte stream of TOAD frames from one transport.
pub struct StreamLink {
    state: LinkState,
    config: Option<LinkConfig>,
    sink: Option<Arc<dyn Sink>>,
    counters: Arc<LinkCounters>,
    run_marker: Arc<AtomicBool>,
    transport_description: String,

    /// Resources held while no worker runs.
    idle: Option<WorkerState>,
    worker: Option<Worker>,
    transport: Option<Box<dyn Transport>>,
}

impl StreamLink {
    pub fn new(transport: impl Transport) -> Self {
        Self {
            state: LinkState::Stopped,
            config: None,
            sink: None,
            counters: Arc::new(LinkCounters::new()),
            run_marker: Arc::new(AtomicBool::new(false)),
            transport_description: transport.describe(),
            idle: None,
            worker: None,
            transport: Some(Box::new(transport)),
        }
    }

    /// Bind a TCP transport for `config.source_link` and configure a link around it.
    pub fn from_config(config: LinkConfig, sink: Arc<dyn Sink>) -> Result<Self> {
        config.validate()?;
        let transport = TcpTransport::bind(&config.bind_address(), config.mode.identity_framed())?;
        let mut link = Self::new(transport);
        link.set_sink(sink);
        link.configure(config)?;
        Ok(link)
    }

    pub fn is_running(&self) -> bool {
        self.run_marker.load(Ordering::Acquire)
    }

    /// Resources for the next run. A partial frame left by the previous run is
    /// kept; bytes that do not start with a header word are skipped.
    fn take_worker_state(&mut self, config: &LinkConfig) -> Option<WorkerState> {
        if let Some(mut state) = self.idle.take() {
            let skipped = state.assembler.resynchronize();
            if skipped > 0 {
                info!(skipped, "Skipped unaligned bytes left by the previous run");
            }
            return Some(state);
        }
        let transport = self.transport.take()?;
        let decoder = FrameDecoder::new(config.layout, config.timing);
        Some(WorkerState::new(transport, StreamAssembler::new(decoder)))
    }
}

impl LinkHandler for StreamLink {
    fn set_sink(&mut self, sink: Arc<dyn Sink>) {
        if let Some(existing) = &self.sink {
            debug!(existing = existing.name(), ignored = sink.name(), "Sink already set");
            return;
        }
        debug!(sink = sink.name(), "Sink set");
        self.sink = Some(sink);
    }

    fn configure(&mut self, config: LinkConfig) -> Result<()> {
        if self.state != LinkState::Stopped {
            debug!(state = ?self.state, "Link already configured");
            return Ok(());
        }
        config.validate()?;

        // A new configuration may change the layout; rebuild the assembler.
        if let Some(state) = self.idle.as_mut() {
            let buffered = state.assembler.buffered();
            if buffered > 0 {
                debug!(buffered, "Discarding buffered bytes on reconfigure");
            }
            state.assembler = StreamAssembler::new(FrameDecoder::new(config.layout, config.timing));
        }

        info!(
            card_id = config.card_id,
            link_tag = config.link_tag,
            source_link = %config.source_link,
            mode = config.mode.as_str(),
            layout = config.layout.as_str(),
            "Link configured"
        );
        self.config = Some(config);
        self.state = LinkState::Configured;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if self.state == LinkState::Running {
            debug!("Link already running");
            return Ok(());
        }
        let config = self
            .config
            .clone()
            .ok_or_else(|| ReadoutError::lifecycle("start requested before configure"))?;
        let sink = self
            .sink
            .clone()
            .ok_or_else(|| ReadoutError::lifecycle("start requested without a sink"))?;
        let state = self
            .take_worker_state(&config)
            .ok_or_else(|| ReadoutError::lifecycle("transport was lost by a failed worker"))?;

        let cancel = CancellationToken::new();
        let driver = Driver::new(config.clone(), sink, Arc::clone(&self.counters));
        let worker_cancel = cancel.clone();
        let run_marker = Arc::clone(&self.run_marker);
        run_marker.store(true, Ordering::Release);

        let spawned = std::thread::Builder::new()
            .name(format!("toadlink-{}", config.link_tag))
            .spawn(move || {
                let state = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime.block_on(driver.run(state, worker_cancel)),
                    Err(e) => {
                        error!("Failed to build worker runtime: {}", e);
                        state
                    }
                };
                run_marker.store(false, Ordering::Release);
                state
            });

        match spawned {
            Ok(handle) => {
                self.worker = Some(Worker { handle, cancel });
                self.state = LinkState::Running;
                info!(link_tag = config.link_tag, "Link started");
                Ok(())
            }
            Err(e) => {
                // The closure and the state it owned are gone with the failed spawn.
                self.run_marker.store(false, Ordering::Release);
                Err(ReadoutError::lifecycle(format!("failed to spawn worker thread: {e}")))
            }
        }
    }

    fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            debug!("Link not running");
            return Ok(());
        };

        self.run_marker.store(false, Ordering::Release);
        worker.cancel.cancel();
        while !worker.handle.is_finished() {
            std::thread::sleep(STOP_POLL_INTERVAL);
        }

        self.state = LinkState::Stopped;
        match worker.handle.join() {
            Ok(state) => {
                self.idle = Some(state);
                info!("Link stopped");
                Ok(())
            }
            Err(_) => {
                error!("Worker thread panicked");
                Err(ReadoutError::lifecycle("worker thread panicked"))
            }
        }
    }

    fn counters(&self) -> Arc<LinkCounters> {
        Arc::clone(&self.counters)
    }

    fn info(&self) -> LinkInfo {
        let status = LinkStatus {
            card_id: self.config.as_ref().map_or(0, |c| c.card_id),
            link_tag: self.config.as_ref().map_or(0, |c| c.link_tag),
            source_link: self
                .config
                .as_ref()
                .map_or_else(|| self.transport_description.clone(), |c| c.source_link.clone()),
            mode: self.config.as_ref().map(|c| c.mode.as_str()).unwrap_or_default().to_string(),
            layout: self.config.as_ref().map(|c| c.layout.as_str()).unwrap_or_default().to_string(),
            sink_name: self.sink.as_ref().map(|s| s.name().to_string()),
            running: self.is_running(),
        };
        self.counters.collect(status, self.sink.is_some())
    }

    fn state(&self) -> LinkState {
        self.state
    }
}

impl Drop for StreamLink {
    fn drop(&mut self) {
        if self.worker.is_some() {
            debug!("Stopping link on drop");
            let _ = self.stop();
        }
    }
}
