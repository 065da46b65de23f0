//! Valhalla web gateway
//!
//! Discord sign-in, an authenticated reverse proxy to the v1 API and event
//! management backed by Dolibarr.

pub mod api;
pub mod auth;
pub mod config;
pub mod dolibarr;
pub mod proxy;
pub mod supervisor;

pub mod test_helpers;
