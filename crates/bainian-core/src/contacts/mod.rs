//! Contact records, recipient plans, and the CSV tables that carry them.
//!
//! CHANGELOG:
//! - 10/02/2026 - Initial module structure

pub mod record;
pub mod table;

pub use record::{ContactRecord, DeliveryStatus, OutcomeLogEntry, RecipientTask};
pub use table::{ContactTable, Plan};
