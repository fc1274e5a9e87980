//! Bus transport: controller lifecycle, background receive loop and the
//! bounded inbound queue.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::error::{TransportError, TransportResult};
use crate::interface::CanController;
use crate::queue::{self, FrameReceiver, FrameSender, TransportStats, TransportStatsSnapshot};
use crate::types::{BusConfig, CanFrame, MAX_DLC};

/// An initialized CAN transport.
///
/// Created by [`BusTransport::initialize`], released by
/// [`BusTransport::shutdown`]. Share it behind an `Arc`; `receive` is meant
/// for a single consumer.
pub struct BusTransport {
    controller: Arc<dyn CanController>,
    config: BusConfig,
    active: Arc<AtomicBool>,
    inbound: AsyncMutex<FrameReceiver>,
    rx_task: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<TransportStats>,
}

impl BusTransport {
    /// Install and start the controller, then spawn the receive loop.
    ///
    /// Any failure is reported as `InitFailed` with everything acquired so
    /// far released again.
    pub async fn initialize(
        controller: Arc<dyn CanController>,
        config: BusConfig,
    ) -> TransportResult<Self> {
        if config.queue_depth == 0 {
            return Err(TransportError::InitFailed(
                "inbound queue depth must be at least 1".into(),
            ));
        }

        controller
            .install(&config)
            .await
            .map_err(|e| TransportError::InitFailed(format!("controller install: {e}")))?;

        if let Err(e) = controller.start().await {
            if let Err(ue) = controller.uninstall().await {
                tracing::warn!(error = %ue, "controller uninstall failed while unwinding");
            }
            return Err(TransportError::InitFailed(format!("controller start: {e}")));
        }

        let stats = Arc::new(TransportStats::default());
        let (sender, receiver) = queue::bounded(config.queue_depth, stats.clone());
        let active = Arc::new(AtomicBool::new(true));

        let rx_task = tokio::spawn(receive_loop(
            controller.clone(),
            sender,
            active.clone(),
            config.rx_poll_timeout(),
        ));

        tracing::info!(
            bitrate = config.bitrate,
            tx_pin = config.tx_pin,
            rx_pin = config.rx_pin,
            queue_depth = config.queue_depth,
            "CAN transport initialized"
        );

        Ok(Self {
            controller,
            config,
            active,
            inbound: AsyncMutex::new(receiver),
            rx_task: Mutex::new(Some(rx_task)),
            stats,
        })
    }

    /// Transmit a frame, waiting at most the configured TX timeout.
    pub async fn send(&self, frame: &CanFrame) -> TransportResult<()> {
        if !self.is_active() {
            return Err(TransportError::NotReady);
        }
        if frame.dlc() > MAX_DLC {
            return Err(TransportError::InvalidFrame { dlc: frame.dlc() });
        }

        match self.controller.transmit(frame, self.config.tx_timeout()).await {
            Ok(()) => {
                self.stats.record_sent();
                Ok(())
            }
            Err(e) => {
                self.stats.record_send_failure();
                tracing::warn!(can_id = frame.id, error = %e, "failed to send CAN frame");
                Err(e)
            }
        }
    }

    /// Pop the next inbound frame, waiting up to `timeout`.
    pub async fn receive(&self, timeout: Duration) -> TransportResult<CanFrame> {
        if !self.is_active() {
            return Err(TransportError::NotReady);
        }
        let mut inbound = self.inbound.lock().await;
        inbound.pop(timeout).await
    }

    /// Stop the receive loop, drain the queue and release the controller.
    ///
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }

        let handle = self.rx_task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "CAN receive loop ended abnormally");
        }

        let discarded = self.inbound.lock().await.drain();

        if let Err(e) = self.controller.stop().await {
            tracing::warn!(error = %e, "controller stop failed");
        }
        if let Err(e) = self.controller.uninstall().await {
            tracing::warn!(error = %e, "controller uninstall failed");
        }

        tracing::info!(discarded, "CAN transport shut down");
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn stats(&self) -> TransportStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for BusTransport {
    fn drop(&mut self) {
        // Dropped without shutdown: at least stop the loop from outliving us.
        if self.active.swap(false, Ordering::AcqRel)
            && let Ok(mut slot) = self.rx_task.lock()
            && let Some(handle) = slot.take()
        {
            handle.abort();
        }
    }
}

/// Poll the controller and feed the inbound queue until `active` clears.
async fn receive_loop(
    controller: Arc<dyn CanController>,
    sender: FrameSender,
    active: Arc<AtomicBool>,
    poll_timeout: Duration,
) {
    tracing::debug!("CAN receive loop started");

    while active.load(Ordering::Acquire) {
        match controller.receive(poll_timeout).await {
            Ok(frame) => {
                sender.stats().record_received();
                let can_id = frame.id;
                match sender.push(frame) {
                    Ok(()) => {}
                    Err(TransportError::QueueFull) => {
                        tracing::warn!(
                            can_id,
                            dropped = sender.stats().dropped(),
                            "CAN RX queue full, dropping frame"
                        );
                    }
                    Err(_) => break,
                }
            }
            Err(TransportError::Timeout { .. }) => continue,
            Err(e) => {
                if !active.load(Ordering::Acquire) {
                    break;
                }
                tracing::warn!(error = %e, "CAN receive failed");
                // Back off so a faulted controller does not spin the loop.
                tokio::time::sleep(poll_timeout).await;
            }
        }
    }

    tracing::debug!("CAN receive loop stopped");
}
