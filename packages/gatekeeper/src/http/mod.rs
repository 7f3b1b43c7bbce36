//! The HTTP surface (spec §6): router assembly, shared state, middleware,
//! and route handlers.

pub mod app;
pub mod middleware;
pub mod routes;
pub mod state;

pub use app::build_router;
pub use state::AppState;
