//! Requests: the durable record wrapping an intent with its lifecycle
//! state (spec §3, §4.1, §4.3).

mod models;
mod repository;
mod state_machine;

pub use models::{CreateEventIntent, DeleteEventIntent, Intent, Request, Suggestion, UpdateEventIntent};
pub use repository::RequestRepository;
pub use state_machine::{RequestStatus, DECIDABLE_STATUSES};
