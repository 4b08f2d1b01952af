//! bainian-core library
//!
//! Batch automation engine for a desktop chat client: harvests the contact
//! directory into a contact table and replays templated greetings to the
//! recipients listed in that table. Every interaction with the chat client
//! goes through the [`surface::AutomationSurface`] trait.
//!
//! CHANGELOG:
//! - 10/12/2026 - Chat history reader and group members (history module)
//! - 10/05/2026 - Task runner with bounded event channel
//! - 10/02/2026 - Initial library structure

pub mod cancel;
pub mod config;
pub mod contacts;
pub mod dispatch;
pub mod error;
pub mod filename;
pub mod harvest;
pub mod history;
pub mod runner;
pub mod session;
pub mod surface;

// Re-export commonly used types
pub use cancel::StopFlag;
pub use config::Config;
pub use error::{AutomationError, BatchError, TableError};
pub use runner::{Command, RunEvent, RunHandle, RunReport, StatusSink, TaskRunner};
pub use session::Session;
pub use surface::{scripted::ScriptedSurface, AutomationSurface};
