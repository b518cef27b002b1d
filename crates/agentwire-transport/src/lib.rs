//! Process transport for the agentwire session engine
//!
//! Launches the agent CLI and exchanges newline-delimited JSON frames with
//! it over stdin/stdout.
//!
//! # Architecture
//!
//! - **Transport trait**: frame-level interface the engine drives
//! - **Subprocess transport**: CLI process with split read/write pipes
//! - **Error handling**: launch, disconnect and I/O failures
//!
//! # Usage
//!
//! ```no_run
//! use agentwire_transport::{CliTransport, ProcessConfig, Transport};
//!
//! # async fn run() -> agentwire_transport::Result<()> {
//! let config = ProcessConfig::new("claude")
//!     .with_args(["--output-format", "stream-json", "--input-format", "stream-json"]);
//! let transport = CliTransport::spawn(config).await?;
//! while let Some(line) = transport.read_frame().await? {
//!     println!("{line}");
//! }
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod subprocess;
pub mod traits;

// Re-export commonly used types
pub use error::{Result, TransportError};
pub use subprocess::{CliTransport, ProcessConfig};
pub use traits::Transport;
