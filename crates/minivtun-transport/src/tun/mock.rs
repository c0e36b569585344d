// ============================================
// File: crates/minivtun-transport/src/tun/mock.rs
// ============================================
//! # Mock TUN Device
//!
//! ## Creation Reason
//! Lets the relay loops run end to end in tests without a kernel
//! interface or root privileges.
//!
//! ## Main Functionality
//! - `inject`: queue an IP packet for the next `read()`
//! - `next_written`: await the next packet the tunnel wrote
//! - `fail_reads`: make `read()` fail, to drive the fatal-device path
//!
//! ## ⚠️ Important Note for Next Developer
//! - Test-only; enabled by `cfg(test)` or the `mock` feature
//! - Queues are bounded; overflow is reported as a write error
//!
//! ## Last Modified
//! v0.1.0 - Initial mock implementation

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{DeviceOp, Result, TransportError};
use crate::traits::{TunConfig, TunDevice};

const MAX_QUEUE_SIZE: usize = 1024;

// ============================================
// MockTun
// ============================================

/// In-memory TUN device.
///
/// # Example
/// ```
/// use minivtun_transport::tun::MockTun;
/// use minivtun_transport::traits::{TunConfig, TunDevice};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let tun = MockTun::new(TunConfig::new("mock0"));
///
/// tun.inject(vec![0x45; 20]);
/// let mut buf = [0u8; 64];
/// assert_eq!(tun.read(&mut buf).await?, 20);
///
/// tun.write(&[0x60; 40]).await?;
/// assert_eq!(tun.take_written().len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct MockTun {
    config: TunConfig,
    inbound: Mutex<VecDeque<Vec<u8>>>,
    outbound: Mutex<VecDeque<Vec<u8>>>,
    inbound_ready: Notify,
    outbound_ready: Notify,
    read_failure: AtomicBool,
    is_up: AtomicBool,
}

impl MockTun {
    /// Creates a new mock device.
    #[must_use]
    pub fn new(config: TunConfig) -> Self {
        Self {
            config,
            inbound: Mutex::new(VecDeque::new()),
            outbound: Mutex::new(VecDeque::new()),
            inbound_ready: Notify::new(),
            outbound_ready: Notify::new(),
            read_failure: AtomicBool::new(false),
            is_up: AtomicBool::new(false),
        }
    }

    /// Queues a packet as if the kernel had routed it into the tunnel.
    pub fn inject(&self, packet: impl Into<Vec<u8>>) {
        let mut queue = self.inbound.lock();
        if queue.len() < MAX_QUEUE_SIZE {
            queue.push_back(packet.into());
        }
        drop(queue);
        self.inbound_ready.notify_one();
    }

    /// Makes every subsequent `read()` fail.
    pub fn fail_reads(&self) {
        self.read_failure.store(true, Ordering::Release);
        self.inbound_ready.notify_one();
    }

    /// Drains every packet written so far.
    #[must_use]
    pub fn take_written(&self) -> Vec<Vec<u8>> {
        self.outbound.lock().drain(..).collect()
    }

    /// Waits up to `timeout` for the next written packet.
    pub async fn next_written(&self, timeout: Duration) -> Option<Vec<u8>> {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.outbound_ready.notified();
                if let Some(packet) = self.outbound.lock().pop_front() {
                    return packet;
                }
                notified.await;
            }
        })
        .await
        .ok()
    }

    /// Returns the number of packets not yet read.
    #[must_use]
    pub fn pending_reads(&self) -> usize {
        self.inbound.lock().len()
    }
}

#[async_trait]
impl TunDevice for MockTun {
    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let notified = self.inbound_ready.notified();

            if self.read_failure.load(Ordering::Acquire) {
                return Err(TransportError::device_io(
                    DeviceOp::Read,
                    io::Error::other("injected failure"),
                ));
            }

            if let Some(packet) = self.inbound.lock().pop_front() {
                let len = packet.len().min(buf.len());
                buf[..len].copy_from_slice(&packet[..len]);
                return Ok(len);
            }

            notified.await;
        }
    }

    async fn write(&self, buf: &[u8]) -> Result<usize> {
        {
            let mut queue = self.outbound.lock();
            if queue.len() >= MAX_QUEUE_SIZE {
                return Err(TransportError::device_io(
                    DeviceOp::Write,
                    io::Error::from(io::ErrorKind::WouldBlock),
                ));
            }
            queue.push_back(buf.to_vec());
        }
        self.outbound_ready.notify_one();
        Ok(buf.len())
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn mtu(&self) -> u16 {
        self.config.mtu
    }

    async fn up(&self) -> Result<()> {
        self.is_up.store(true, Ordering::Release);
        Ok(())
    }

    async fn down(&self) -> Result<()> {
        self.is_up.store(false, Ordering::Release);
        Ok(())
    }

    fn is_up(&self) -> bool {
        self.is_up.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for MockTun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTun")
            .field("name", &self.config.name)
            .field("is_up", &self.is_up())
            .field("pending_reads", &self.pending_reads())
            .finish_non_exhaustive()
    }
}

impl Default for MockTun {
    fn default() -> Self {
        Self::new(TunConfig::new("mock0"))
    }
}

// ============================================
// Tests
// ============================================
