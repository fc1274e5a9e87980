//! Mock CAN controller for testing and hardware-less runs.
//!
//! Supports scripted inbound frames, frame recording, lifecycle failure
//! injection and an optional responder that answers transmitted frames
//! (used to plug in a simulated ECU). All tests use this instead of real CAN
//! hardware so the suite runs in CI on any platform.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

use crate::error::{TransportError, TransportResult};
use crate::interface::CanController;
use crate::types::{BusConfig, CanFrame};

/// Callback answering a transmitted frame with an optional reply frame.
pub type Responder = Box<dyn Fn(&CanFrame) -> Option<CanFrame> + Send + Sync>;

/// Mock CAN controller with scripted frames and frame recording.
pub struct MockCanController {
    /// Frames returned by `receive` (FIFO order).
    inbound: Mutex<VecDeque<CanFrame>>,
    /// Wakes a pending `receive` when a frame is queued.
    arrived: Notify,
    /// All frames passed to `transmit` (for test assertions).
    sent_frames: Mutex<Vec<CanFrame>>,
    /// Lifecycle calls in order ("install", "start", "stop", "uninstall").
    lifecycle: Mutex<Vec<&'static str>>,
    responder: Option<Responder>,
    fail_install: bool,
    fail_start: bool,
    fail_transmit: AtomicBool,
    installed: AtomicBool,
    started: AtomicBool,
}

impl MockCanController {
    /// Create a new mock with no queued frames.
    pub fn new() -> Self {
        Self {
            inbound: Mutex::new(VecDeque::new()),
            arrived: Notify::new(),
            sent_frames: Mutex::new(Vec::new()),
            lifecycle: Mutex::new(Vec::new()),
            responder: None,
            fail_install: false,
            fail_start: false,
            fail_transmit: AtomicBool::new(false),
            installed: AtomicBool::new(false),
            started: AtomicBool::new(false),
        }
    }

    /// Create a mock pre-loaded with inbound frames.
    pub fn with_frames(frames: Vec<CanFrame>) -> Self {
        let mock = Self::new();
        mock.inbound.lock().unwrap().extend(frames);
        mock
    }

    /// Answer every transmitted frame through `responder`.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&CanFrame) -> Option<CanFrame> + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Make `install` fail.
    pub fn failing_install(mut self) -> Self {
        self.fail_install = true;
        self
    }

    /// Make `start` fail.
    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Make `transmit` time out until reset.
    pub fn set_transmit_failure(&self, fail: bool) {
        self.fail_transmit.store(fail, Ordering::Release);
    }

    /// Queue an additional inbound frame.
    pub fn queue_frame(&self, frame: CanFrame) {
        self.inbound.lock().unwrap().push_back(frame);
        self.arrived.notify_one();
    }

    /// Number of inbound frames not yet received.
    pub fn pending_frames(&self) -> usize {
        self.inbound.lock().unwrap().len()
    }

    /// Get copies of all frames that were transmitted.
    pub fn sent_frames(&self) -> Vec<CanFrame> {
        self.sent_frames.lock().unwrap().clone()
    }

    /// Get the last transmitted frame, if any.
    pub fn last_sent(&self) -> Option<CanFrame> {
        self.sent_frames.lock().unwrap().last().cloned()
    }

    /// Lifecycle calls observed so far.
    pub fn lifecycle(&self) -> Vec<&'static str> {
        self.lifecycle.lock().unwrap().clone()
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    fn record(&self, call: &'static str) {
        self.lifecycle.lock().unwrap().push(call);
    }
}

impl Default for MockCanController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CanController for MockCanController {
    async fn install(&self, _config: &BusConfig) -> TransportResult<()> {
        self.record("install");
        if self.fail_install {
            return Err(TransportError::Controller("mock install failure".into()));
        }
        self.installed.store(true, Ordering::Release);
        Ok(())
    }

    async fn start(&self) -> TransportResult<()> {
        self.record("start");
        if self.fail_start {
            return Err(TransportError::Controller("mock start failure".into()));
        }
        if !self.is_installed() {
            return Err(TransportError::NotReady);
        }
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    async fn stop(&self) -> TransportResult<()> {
        self.record("stop");
        self.started.store(false, Ordering::Release);
        Ok(())
    }

    async fn uninstall(&self) -> TransportResult<()> {
        self.record("uninstall");
        self.started.store(false, Ordering::Release);
        self.installed.store(false, Ordering::Release);
        Ok(())
    }

    async fn transmit(&self, frame: &CanFrame, timeout: Duration) -> TransportResult<()> {
        if !self.is_started() {
            return Err(TransportError::NotReady);
        }
        if self.fail_transmit.load(Ordering::Acquire) {
            return Err(TransportError::timeout(timeout));
        }

        self.sent_frames.lock().unwrap().push(frame.clone());

        if let Some(reply) = self.responder.as_ref().and_then(|respond| respond(frame)) {
            self.queue_frame(reply);
        }
        Ok(())
    }

    async fn receive(&self, timeout: Duration) -> TransportResult<CanFrame> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if !self.is_started() {
                return Err(TransportError::NotReady);
            }
            // Register interest before checking so a concurrent queue_frame
            // leaves a permit behind.
            let notified = self.arrived.notified();
            if let Some(frame) = self.inbound.lock().unwrap().pop_front() {
                return Ok(frame);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(TransportError::timeout(timeout));
            }
        }
    }
}
