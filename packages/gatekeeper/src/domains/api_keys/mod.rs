//! Api keys: bearer credentials minted by operators, carrying a tier and
//! optional constraints object (spec §3/§4.1).

mod models;
mod repository;

pub use models::{ActionOverride, ApiKey, KeyConstraints, OperationOverrides, Tier};
pub use repository::ApiKeyRepository;
