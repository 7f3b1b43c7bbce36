//! Runtime settings store (spec §3).

mod repository;

pub use repository::SettingsRepository;
