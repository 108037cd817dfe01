//! Prelude module for Wavelink Core
//!
//! This module re-exports commonly used types and traits to make them
//! easily accessible for users of the library.

pub use crate::connection::{CloseListener, CloseReason, Connection, ReadHandler, Writer};
pub use crate::engine::{ClientEngine, TimeoutHandler, UpgradeOutcome};
pub use crate::error::{CloseCode, Error, ProtocolError, Result};
pub use crate::task::{Condition, Task, TaskProcessor};
pub use crate::upgrade::{Headers, UpgradeRequest, UpgradeResponse};

// Re-export commonly used external dependencies
pub use bytes::{Bytes, BytesMut};
pub use http::Uri;
