//! # invite-gate
//!
//! Sells time-limited, single-use access to a private Telegram channel, paid through
//! [Crypto Pay](https://help.crypt.bot/crypto-pay-api) invoices or Telegram Stars.
//!
//! ## Payment flow
//!
//! 1. **Buyer picks an asset**: the [`issuer`] prices the product in that asset using the
//!    gateway's live rate table and creates an invoice.
//! 2. **A watcher is spawned**: the [`watcher`] polls the invoice on a fixed cadence, detached
//!    from the handler that started it, up to a fixed number of attempts.
//! 3. **Settlement observed**: on the first "paid" status the [`granter`] mints a one-member,
//!    expiring invite, sends it to the buyer and copies the operator. Polling stops.
//! 4. **Timeout**: if the cap is reached nothing is granted; the buyer is told so unless the
//!    notice is disabled.
//!
//! Stars payments settle synchronously: the host reports a successful payment and the
//! granter runs once, directly.
//!
//! ## Example
//!
//! ```rust,no_run
//! use invite_gate::bot::{run_polling, BotContext};
//! use invite_gate::config::BotConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BotConfig::from_env()?;
//! let (ctx, telegram) = BotContext::connect(config)?;
//! run_polling(Arc::new(ctx), telegram, async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Guarantees
//!
//! - At most one grant per invoice: a watcher returns right after its first "paid".
//! - The attempt cap is a count, not a wall-clock deadline.
//! - Watchers share no mutable state; any number can poll at once.
//! - Nothing is persisted. A restart abandons in-flight watchers.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bot;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod granter;
pub mod host;
pub mod issuer;
pub mod types;
pub mod watcher;

#[cfg(test)]
mod testing;

// Re-export commonly used items
pub use errors::{GateError, Result};
pub use gateway::{CryptoPayClient, PaymentGateway};
pub use granter::AccessGranter;
pub use host::{ResourceHost, TelegramHost};
pub use issuer::InvoiceIssuer;
pub use types::{
    AccessGrant, Invoice, InvoiceStatus, PaymentRequest, PollPolicy, WatchOutcome,
};
pub use watcher::SettlementWatcher;
