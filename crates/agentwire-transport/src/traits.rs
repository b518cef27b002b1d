//! Transport trait
//!
//! Defines the frame-level interface the session engine drives. The engine
//! owns one reader task calling [`Transport::read_frame`]; everything else
//! writes through [`Transport::write_frame`] concurrently.

use crate::error::Result;
use agentwire_protocol::{ClientControl, RequestId};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

static INTERRUPT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Bidirectional frame channel to an agent process
#[async_trait]
pub trait Transport: Send + Sync {
    /// Launch the process and open its pipes
    async fn start(&self) -> Result<()>;

    /// Write one frame as a single line
    async fn write_frame(&self, frame: &Value) -> Result<()>;

    /// Read the next non-empty line, or `None` at end of stream
    async fn read_frame(&self) -> Result<Option<String>>;

    /// Ask the agent to abandon the current turn
    ///
    /// Returns the id of the control request that was sent.
    async fn interrupt(&self) -> Result<RequestId> {
        let request_id = RequestId::new(INTERRUPT_SEQ.fetch_add(1, Ordering::Relaxed));
        self.write_frame(&ClientControl::Interrupt.to_frame(&request_id))
            .await?;
        Ok(request_id)
    }

    /// Shut the process down and release its pipes
    async fn close(&self) -> Result<()>;

    /// Whether the transport is started and not yet closed
    fn is_ready(&self) -> bool;
}
