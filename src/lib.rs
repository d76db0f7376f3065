//! tempmail library entrypoint.
//!
//! Modules:
//! - `app`: startup and shared state
//! - `config`: environment configuration
//! - `http`: Axum router and handlers
//! - `smtp`: SMTP listener and mail transaction state
//! - `mime`: body selection and RFC 2047 subject decoding
//! - `service`: mailbox lifecycle, message store gate, stats, sweeper
//! - `db`: migrations and SQLite repositories
//! - `models`: typed records used across layers
//! - `util`: tracing setup, duration strings, address extraction

pub mod app;
pub mod config;
pub mod db;
pub mod http;
pub mod mime;
pub mod models;
pub mod service;
pub mod smtp;
pub mod util;
