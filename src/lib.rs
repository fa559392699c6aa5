//! REST backends for a bike marketplace ("hunter") and a matrimony platform, both backed by
//! MongoDB collections.
//!
//! Each binary builds its context once at startup, registers it as shared app data and serves
//! the routes in [`controllers`]. The listing endpoints share the filter/sort/pagination logic
//! in [`query`].

pub mod auth;
pub mod config;
pub mod context;
pub mod controllers;
pub mod error;
pub mod models;
pub mod payment;
pub mod query;
pub mod server;
pub mod store;

#[cfg(test)]
mod test_helpers;
