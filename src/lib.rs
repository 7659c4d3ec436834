#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![warn(missing_docs)]
/// Process configuration read once at startup
pub mod config;
/// Error handling and custom [`Error`](std::error::Error) types
pub mod errors;
/// Functions for decoding ledger files into records
pub mod io;
/// Year-month keys and free-text month resolution
pub mod month;
/// Delivery of summaries to a chat webhook
pub mod notify;
/// Business logic for aggregating ledger records
pub mod ops;
/// Safe lookup of ledger files under the ledger directory
pub mod paths;
/// HTTP endpoints
pub mod server;
/// Verification of inbound slash commands
pub mod signature;
/// Data types used throughout Kakeibo
pub mod types;

/// Name reported by the health endpoint and used in report headers
pub const APP_NAME: &str = "kakeibo";
