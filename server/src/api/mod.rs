pub mod auth_handlers;
pub mod dolibarr_handlers;
pub mod error;
pub mod extract;
pub mod pages;
pub mod proxy_handler;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use server::{build_router, run_api, run_session_janitor};
pub use state::AppState;
