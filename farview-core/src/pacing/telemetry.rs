//! Client telemetry messages.
//!
//! ```text
//! refresh_interval:    u16 LE  (bytes 0..2)  ms between client frames
//! processing_duration: u16 LE  (bytes 2..4)  avg client frame cost, ms
//! ```
//!
//! Trailing bytes are ignored.

use std::time::Duration;

use crate::error::FarviewError;

/// One telemetry report from a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Telemetry {
    pub refresh_interval_ms: u16,
    pub processing_duration_ms: u16,
}

impl Telemetry {
    /// Minimum encoded size.
    pub const SIZE: usize = 4;

    pub fn decode(data: &[u8]) -> Result<Self, FarviewError> {
        if data.len() < Self::SIZE {
            return Err(FarviewError::MalformedTelemetry { len: data.len() });
        }
        Ok(Self {
            refresh_interval_ms: u16::from_le_bytes([data[0], data[1]]),
            processing_duration_ms: u16::from_le_bytes([data[2], data[3]]),
        })
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..2].copy_from_slice(&self.refresh_interval_ms.to_le_bytes());
        buf[2..4].copy_from_slice(&self.processing_duration_ms.to_le_bytes());
        buf
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.refresh_interval_ms))
    }

    pub fn processing_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.processing_duration_ms))
    }
}
