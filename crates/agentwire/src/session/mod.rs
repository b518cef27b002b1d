//! The session engine
//!
//! Both clients are thin presentations of [`AgentSession`]. The engine is a
//! state machine:
//!
//! ```text
//! Unconnected --connect--> Connected(idle) --query--> Connected(in flight)
//!                               ^                           |
//!                               +---------- result ---------+
//! any state --close / fatal transport failure--> Closed
//! ```
//!
//! - [`state`] - Session record, lifecycle and the state shared with the reader task
//! - [`core`] - Process ownership: connect, relaunch on session switch, close
//! - [`query`] - Turn submission and per-turn message streams
//! - [`control`] - Interrupts, runtime settings and observers

pub mod control;
pub mod core;
pub mod query;
pub mod state;

pub use self::core::{AgentSession, CliTransportFactory, TransportFactory};
pub use self::query::TurnReceiver;
pub use self::state::{ClientSpend, Lifecycle, MessageObserver, ResultObserver, SessionInfo};
