#![warn(missing_docs)]

//! Configuration, wiring and command-line tooling for warden.
//!
//! A [`Config`] is loaded from TOML, overridden from the environment and
//! validated as a whole. [`Services`] turns it into a ready issuer, gate and
//! registry sharing one ledger connection, refusing to start in production
//! mode when no ledger is available.

mod config;
pub use config::*;

mod service;
pub use service::*;

pub mod cli;
