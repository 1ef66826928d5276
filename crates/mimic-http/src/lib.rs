//! Mimic: an HTTP stub server driven by request/response dumps.
//!
//! Dumps are parsed into an ordered `RuleSet`; each request is matched against
//! it (first match wins), a response is synthesized from the matching rule and
//! optional Rhai hooks observe the exchange after it is sent.

pub mod config;
pub mod dump;
pub mod hooks;
pub mod matcher;
pub mod reload;
pub mod request;
pub mod response;
pub mod rule;
pub mod server;

pub use config::{Cli, ServerConfig};
pub use server::Server;
