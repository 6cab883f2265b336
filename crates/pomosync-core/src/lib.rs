//! # pomosync-core
//!
//! Building blocks shared by the session hub:
//!
//! - [`ids`]: session and client identifiers
//! - [`protocol`]: the JSON wire message exchanged with browser clients
//! - [`timer`]: the shared play/pause timer state machine
//! - [`errors`]: failure taxonomy used across the hub
//! - [`logging`]: `tracing` subscriber bootstrap
//!
//! Nothing in this crate performs network I/O.

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod protocol;
pub mod timer;

pub use errors::{HubError, IdentityError, Result};
pub use ids::{ClientId, SessionId};
pub use protocol::{Action, WireMessage};
pub use timer::TimerState;
