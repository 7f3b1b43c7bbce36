//! Decision tokens: single-use capabilities authorizing one of
//! {approve, deny, suggest} on a request via an unauthenticated URL
//! (spec §4.4).

mod models;
mod repository;

pub use models::{DecisionAction, DecisionToken};
pub use repository::{ConsumeOutcome, TokenRepository};
