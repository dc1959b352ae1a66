//! Core library for art-explorer
pub mod config;
pub mod fetch;
pub mod miauth;
pub mod oauth;
pub mod server;
pub mod session;
pub mod util;
