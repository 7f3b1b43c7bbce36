//! Append-only audit log (spec §3).

mod models;
mod repository;

pub use models::{AuditEntry, AuditEventType};
pub use repository::AuditRepository;
