//! Bisq API Bots Library
//!
//! Calls and polling bots for the Bisq API daemon's gRPC interface:
//!
//! 1. **RPC calls**: one subcommand per remote procedure, printing the reply.
//!
//! 2. **Bots**: a SEPA market maker, a BSQ swap market maker, a price sync bot
//!    that keeps offers at the best available price, and take best priced offer
//!    bots for the BTC, XMR and BSQ markets.

pub mod api;
pub mod bots;
pub mod client;
pub mod config;
pub mod error;
pub mod pricing;
pub mod proto;
pub mod rpccalls;
pub mod table;
pub mod types;

pub use api::BisqApi;
pub use client::BisqClient;
pub use config::ConnectionConfig;
pub use error::{ApiError, ApiResult};
pub use types::{Direction, TakerMarket};
