//! Background acquisition of complete revolutions.

use crate::base::{Error, Result, SharedChannel, POLL_INTERVAL};
use crate::parsers::ScanDecoder;
use crate::types::MeasurementNode;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Lifecycle of the acquisition loop.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ScanState {
    #[default]
    Idle,
    /// Start command sent, waiting for the stream header.
    Starting,
    Running,
    Stopping,
}

/// Accumulates the nodes of the revolution currently being measured.
#[derive(Debug, Clone)]
pub struct RevolutionBuffer {
    nodes: Vec<MeasurementNode>,
    capacity: usize,
}

impl RevolutionBuffer {
    pub fn with_capacity(capacity: usize) -> RevolutionBuffer {
        let capacity = capacity.max(1);
        RevolutionBuffer {
            nodes: Vec::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Appends `node`, returning the previous revolution when `node` starts a new one.
    ///
    /// A revolution is only complete if it began on a sync node; the partial one
    /// collected before the first sync is dropped. Once full, the last slot is
    /// overwritten until the next sync node.
    pub fn push(&mut self, node: MeasurementNode) -> Option<Vec<MeasurementNode>> {
        let mut completed = None;
        if node.is_sync() {
            if self.nodes.first().map(|n| n.is_sync()).unwrap_or(false) {
                completed = Some(std::mem::replace(
                    &mut self.nodes,
                    Vec::with_capacity(self.capacity),
                ));
            } else {
                self.nodes.clear();
            }
        }

        if self.nodes.len() < self.capacity {
            self.nodes.push(node);
        } else if let Some(last) = self.nodes.last_mut() {
            *last = node;
        }
        completed
    }
}

/// Single-slot hand-off of the latest complete revolution.
///
/// Publishing overwrites a revolution nobody has picked up yet.
#[derive(Debug, Clone)]
pub struct RevolutionMailbox {
    tx: Sender<Vec<MeasurementNode>>,
    rx: Receiver<Vec<MeasurementNode>>,
}

impl Default for RevolutionMailbox {
    fn default() -> RevolutionMailbox {
        RevolutionMailbox::new()
    }
}

impl RevolutionMailbox {
    pub fn new() -> RevolutionMailbox {
        let (tx, rx) = bounded(1);
        RevolutionMailbox { tx, rx }
    }

    pub fn publish(&self, revolution: Vec<MeasurementNode>) {
        if let Ok(stale) = self.rx.try_recv() {
            trace!("Dropping unconsumed revolution of {} nodes", stale.len());
        }
        match self.tx.try_send(revolution) {
            Ok(()) => {}
            Err(TrySendError::Full(revolution)) => {
                warn!("Revolution slot still full, dropping {} nodes", revolution.len());
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Waits up to `timeout` for a revolution and takes it out of the slot.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Vec<MeasurementNode>> {
        match self.rx.recv_timeout(timeout) {
            Ok(revolution) => Ok(revolution),
            Err(RecvTimeoutError::Timeout) => Err(Error::OperationTimeout),
            Err(RecvTimeoutError::Disconnected) => {
                Err(Error::operation_fail("revolution mailbox disconnected"))
            }
        }
    }

    pub fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
    }
}

/// Owns the acquisition thread: reads frames through the selected decoder and
/// publishes each completed revolution to the mailbox.
#[derive(Debug)]
pub struct ScanLoop {
    running: Arc<AtomicBool>,
    state: Arc<Mutex<ScanState>>,
    handle: Option<JoinHandle<()>>,
    mailbox: RevolutionMailbox,
}

impl Default for ScanLoop {
    fn default() -> ScanLoop {
        ScanLoop::new()
    }
}

impl ScanLoop {
    pub fn new() -> ScanLoop {
        ScanLoop {
            running: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(ScanState::Idle)),
            handle: None,
            mailbox: RevolutionMailbox::new(),
        }
    }

    pub fn state(&self) -> ScanState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: ScanState) {
        debug!("Scan state -> {:?}", state);
        *self.state.lock() = state;
    }

    /// Returns `true` while the acquisition thread is alive and has not been told to stop.
    pub fn is_running(&self) -> bool {
        self.handle.is_some() && self.running.load(Ordering::Acquire)
    }

    pub fn mailbox(&self) -> &RevolutionMailbox {
        &self.mailbox
    }

    /// Starts the acquisition thread. Any revolution left from a previous run is dropped.
    pub fn spawn(
        &mut self,
        channel: SharedChannel,
        decoder: ScanDecoder,
        read_timeout: Duration,
        capacity: usize,
    ) -> Result<()> {
        if self.handle.is_some() {
            self.stop();
        }
        self.mailbox.clear();
        self.running.store(true, Ordering::Release);
        self.set_state(ScanState::Running);

        let running = self.running.clone();
        let state = self.state.clone();
        let mailbox = self.mailbox.clone();
        let spawned = thread::Builder::new()
            .name("rplidar-scan".to_string())
            .spawn(move || {
                run_scan_loop(channel, decoder, &running, &mailbox, read_timeout, capacity);
                running.store(false, Ordering::Release);
                *state.lock() = ScanState::Idle;
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                error!("Failed to spawn scan thread: {}", e);
                self.running.store(false, Ordering::Release);
                self.set_state(ScanState::Idle);
                Err(e.into())
            }
        }
    }

    /// Signals the thread to stop and waits for it to exit.
    ///
    /// The thread notices the signal between frames, so this can take up to one
    /// frame read timeout.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if self.state() != ScanState::Idle {
                self.set_state(ScanState::Stopping);
            }
            self.running.store(false, Ordering::Release);
            if handle.join().is_err() {
                error!("Scan thread panicked");
            }
            info!("Scan thread stopped");
        }
        self.set_state(ScanState::Idle);
    }
}

impl Drop for ScanLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_scan_loop(
    channel: SharedChannel,
    mut decoder: ScanDecoder,
    running: &AtomicBool,
    mailbox: &RevolutionMailbox,
    read_timeout: Duration,
    capacity: usize,
) {
    info!(
        "Scan thread started (frame size {}, revolution capacity {})",
        decoder.frame_size(),
        capacity
    );
    let mut revolution = RevolutionBuffer::with_capacity(capacity);
    let mut nodes = Vec::with_capacity(128);

    while running.load(Ordering::Acquire) {
        nodes.clear();
        let result = match wait_for_stream(&channel, running, read_timeout) {
            Ok(false) => break,
            Ok(true) => {
                let mut channel = channel.lock();
                decoder.wait_nodes(&mut **channel, read_timeout, &mut nodes)
            }
            Err(e) => {
                decoder.invalidate();
                Err(e)
            }
        };

        match result {
            Ok(()) => {
                for node in nodes.drain(..) {
                    if let Some(completed) = revolution.push(node) {
                        trace!("Publishing revolution of {} nodes", completed.len());
                        mailbox.publish(completed);
                    }
                }
            }
            Err(Error::OperationTimeout) => {
                debug!("No measurement frame within {:?}", read_timeout);
            }
            Err(e) if e.is_recoverable() => {
                warn!("Dropping measurement frame: {}", e);
            }
            Err(e) => {
                error!("Scan loop stopped: {}", e);
                break;
            }
        }
    }
    info!("Scan thread exiting");
}

/// Polls until the channel has bytes pending, taking the lock only for each poll.
///
/// Returns `Ok(false)` as soon as the loop is told to stop.
fn wait_for_stream(
    channel: &SharedChannel,
    running: &AtomicBool,
    timeout: Duration,
) -> Result<bool> {
    let start = Instant::now();
    loop {
        if !running.load(Ordering::Acquire) {
            return Ok(false);
        }
        if channel.lock().bytes_available()? > 0 {
            return Ok(true);
        }
        if start.elapsed() >= timeout {
            return Err(Error::OperationTimeout);
        }
        thread::sleep(POLL_INTERVAL);
    }
}
