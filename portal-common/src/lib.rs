//! # Portal Common Library
//!
//! Shared code for the club portal data engines including:
//! - Error type shared by the engines and store adapters
//! - TOML configuration and root folder resolution
//! - Injectable clock
//! - Post-commit hooks and the broadcast event bus
//! - SQLite database initialization

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::{EventBus, HookList, PortalEvent, PostCommitHook};
pub use time::{Clock, FixedClock, SystemClock};
