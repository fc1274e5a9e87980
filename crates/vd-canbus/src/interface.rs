//! CAN controller abstraction.
//!
//! `CanController` is the hardware driver seam with an
//! install/start/stop/uninstall lifecycle plus timed transmit and receive.
//! Two impls:
//! - `SocketCanController`: Linux-only, wraps `socketcan::CanSocket`
//! - `MockCanController`: all platforms, scripted frames (in `mock.rs`)

use async_trait::async_trait;
use std::time::Duration;

use crate::error::TransportResult;
use crate::types::{BusConfig, CanFrame};

/// Trait for CAN controller drivers.
///
/// Calls are assumed reliable at the single-frame level; driver faults are
/// reported as `TransportError`s.
#[async_trait]
pub trait CanController: Send + Sync {
    /// Configure bit rate, line assignment and an accept-all filter.
    async fn install(&self, config: &BusConfig) -> TransportResult<()>;

    /// Bring the controller onto the bus.
    async fn start(&self) -> TransportResult<()>;

    /// Take the controller off the bus.
    async fn stop(&self) -> TransportResult<()>;

    /// Release the driver.
    async fn uninstall(&self) -> TransportResult<()>;

    /// Queue a frame for transmission, waiting at most `timeout`.
    async fn transmit(&self, frame: &CanFrame, timeout: Duration) -> TransportResult<()>;

    /// Receive the next frame from the bus, blocking up to `timeout`.
    async fn receive(&self, timeout: Duration) -> TransportResult<CanFrame>;
}

// ── SocketCAN (Linux-only) ──────────────────────────────────────

#[cfg(target_os = "linux")]
pub use self::socket::SocketCanController;

#[cfg(target_os = "linux")]
mod socket {
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use socketcan::{EmbeddedFrame, Id, Socket, StandardId};

    use super::CanController;
    use crate::error::{TransportError, TransportResult};
    use crate::types::{BusConfig, CanFrame};

    /// SocketCAN controller for Linux hosts.
    ///
    /// The kernel owns bit timing: the link is expected to be configured and
    /// brought up by the host (`ip link set can0 up type can bitrate 500000`).
    /// A raw socket receives every frame on the interface, so no filter is
    /// installed.
    pub struct SocketCanController {
        interface_name: String,
        socket: Mutex<Option<Arc<socketcan::CanSocket>>>,
        started: AtomicBool,
    }

    impl SocketCanController {
        pub fn new(interface_name: &str) -> Self {
            Self {
                interface_name: interface_name.to_string(),
                socket: Mutex::new(None),
                started: AtomicBool::new(false),
            }
        }

        fn socket(&self) -> TransportResult<Arc<socketcan::CanSocket>> {
            if !self.started.load(Ordering::Acquire) {
                return Err(TransportError::NotReady);
            }
            self.socket
                .lock()
                .map_err(|_| TransportError::Controller("socket lock poisoned".into()))?
                .clone()
                .ok_or(TransportError::NotReady)
        }
    }

    fn is_timeout(e: &io::Error) -> bool {
        matches!(
            e.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
        )
    }

    #[async_trait]
    impl CanController for SocketCanController {
        async fn install(&self, config: &BusConfig) -> TransportResult<()> {
            let socket = socketcan::CanSocket::open(&self.interface_name).map_err(|e| {
                TransportError::Controller(format!("open {}: {e}", self.interface_name))
            })?;
            tracing::info!(
                interface = %self.interface_name,
                bitrate = config.bitrate,
                "SocketCAN interface opened"
            );
            let mut slot = self
                .socket
                .lock()
                .map_err(|_| TransportError::Controller("socket lock poisoned".into()))?;
            *slot = Some(Arc::new(socket));
            Ok(())
        }

        async fn start(&self) -> TransportResult<()> {
            let installed = self
                .socket
                .lock()
                .map(|s| s.is_some())
                .unwrap_or(false);
            if !installed {
                return Err(TransportError::NotReady);
            }
            self.started.store(true, Ordering::Release);
            Ok(())
        }

        async fn stop(&self) -> TransportResult<()> {
            self.started.store(false, Ordering::Release);
            Ok(())
        }

        async fn uninstall(&self) -> TransportResult<()> {
            self.started.store(false, Ordering::Release);
            if let Ok(mut slot) = self.socket.lock() {
                slot.take();
            }
            Ok(())
        }

        async fn transmit(&self, frame: &CanFrame, timeout: Duration) -> TransportResult<()> {
            let socket = self.socket()?;
            let id = u16::try_from(frame.id)
                .ok()
                .and_then(StandardId::new)
                .ok_or_else(|| {
                    TransportError::Controller(format!(
                        "CAN ID 0x{:X} is not an 11-bit identifier",
                        frame.id
                    ))
                })?;
            let out = <socketcan::CanFrame as EmbeddedFrame>::new(id, &frame.data)
                .ok_or(TransportError::InvalidFrame { dlc: frame.dlc() })?;

            let result = tokio::task::spawn_blocking(move || {
                socket.set_write_timeout(timeout)?;
                socket.write_frame(&out)
            })
            .await
            .map_err(|e| TransportError::Controller(e.to_string()))?;

            match result {
                Ok(()) => Ok(()),
                Err(e) if is_timeout(&e) => Err(TransportError::timeout(timeout)),
                Err(e) => Err(TransportError::Controller(e.to_string())),
            }
        }

        async fn receive(&self, timeout: Duration) -> TransportResult<CanFrame> {
            let socket = self.socket()?;
            let result = tokio::task::spawn_blocking(move || socket.read_frame_timeout(timeout))
                .await
                .map_err(|e| TransportError::Controller(e.to_string()))?;

            let frame = match result {
                Ok(f) => f,
                Err(e) if is_timeout(&e) => return Err(TransportError::timeout(timeout)),
                Err(e) => return Err(TransportError::Controller(e.to_string())),
            };

            let id = match EmbeddedFrame::id(&frame) {
                Id::Standard(id) => u32::from(id.as_raw()),
                Id::Extended(id) => id.as_raw(),
            };
            CanFrame::try_new(id, EmbeddedFrame::data(&frame))
        }
    }
}
