//! Core type definitions for invite-gate.
//!
//! This module contains the data model shared by the issuer, watcher and granter,
//! together with the Crypto Pay wire structures they exchange with the gateway.

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Asset symbol every exchange rate is quoted against.
pub const USD: &str = "USD";

/// Default number of status fetches per watcher.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 30;

/// Default delay between two status fetches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default lifetime of an issued invite link.
pub const DEFAULT_INVITE_TTL: Duration = Duration::from_secs(10 * 60);

/// Default upper bound on one HTTP call to the gateway or the messaging host.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// A buyer's request to pay for access in a given asset.
///
/// Created when the buyer picks a payment method and dropped once an invoice
/// has been obtained (or the attempt failed).
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    /// Chat identity of the buyer
    pub requester_id: i64,

    /// Gateway asset code (e.g. "TON", "USDT")
    pub asset: String,

    /// Target price in US dollars
    pub usd_amount: f64,
}

impl PaymentRequest {
    /// Creates a new payment request.
    pub fn new(requester_id: i64, asset: impl Into<String>, usd_amount: f64) -> Self {
        Self {
            requester_id,
            asset: asset.into(),
            usd_amount,
        }
    }

    /// Human-readable invoice description sent to the gateway.
    pub fn description(&self) -> String {
        format!(
            "Private channel access ({}$ in {})",
            self.usd_amount, self.asset
        )
    }
}

/// Settlement state of an invoice as reported by the gateway.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceStatus {
    /// Waiting for funds (Crypto Pay reports this as "active")
    #[serde(rename = "active", alias = "pending")]
    Pending,

    /// Funds received
    #[serde(rename = "paid")]
    Paid,

    /// The invoice can no longer be paid
    #[serde(rename = "expired")]
    Expired,
}

/// A payable invoice issued by the gateway.
///
/// `status` is only ever a snapshot; the watcher re-fetches it on every poll.
#[derive(Debug, Clone, PartialEq)]
pub struct Invoice {
    /// Gateway invoice identifier
    pub invoice_id: i64,

    /// URL the buyer opens to pay
    pub pay_url: String,

    /// Asset code the invoice is denominated in
    pub asset: String,

    /// Amount in `asset` units
    pub asset_amount: f64,

    /// Status at the time the invoice was fetched
    pub status: InvoiceStatus,
}

/// One entry of the gateway's exchange-rate table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExchangeRate {
    /// Asset being priced
    pub source: String,

    /// Asset the price is expressed in
    pub target: String,

    /// Units of `target` per one unit of `source`
    #[serde(deserialize_with = "number_or_string")]
    pub rate: f64,
}

impl ExchangeRate {
    /// Creates a new rate entry.
    pub fn new(source: impl Into<String>, target: impl Into<String>, rate: f64) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            rate,
        }
    }
}

/// Body of a `createInvoice` call.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateInvoiceRequest {
    /// Asset code
    pub asset: String,

    /// Amount in asset units, as a decimal string
    pub amount: String,

    /// Description shown to the payer
    pub description: String,
}

/// Invoice object as returned by Crypto Pay.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InvoiceRecord {
    /// Gateway invoice identifier
    pub invoice_id: i64,

    /// Current status
    pub status: InvoiceStatus,

    /// Asset code
    #[serde(default)]
    pub asset: String,

    /// Amount in asset units
    #[serde(deserialize_with = "number_or_string")]
    pub amount: f64,

    /// Legacy payment URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pay_url: Option<String>,

    /// Payment URL inside the Crypto Bot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_invoice_url: Option<String>,
}

impl InvoiceRecord {
    /// Converts the wire record into an [`Invoice`].
    pub fn into_invoice(self) -> Invoice {
        Invoice {
            invoice_id: self.invoice_id,
            pay_url: self.bot_invoice_url.or(self.pay_url).unwrap_or_default(),
            asset: self.asset,
            asset_amount: self.amount,
            status: self.status,
        }
    }
}

/// Result payload of `getInvoices`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InvoiceList {
    /// Matching invoices
    pub items: Vec<InvoiceRecord>,
}

/// Envelope wrapping every Crypto Pay response.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GatewayResponse<T> {
    /// Whether the call succeeded
    #[serde(default)]
    pub ok: bool,

    /// Payload on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,

    /// Error object or message on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl<T> GatewayResponse<T> {
    /// Renders the gateway's error field as a message.
    pub fn error_message(&self) -> String {
        match &self.error {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Object(obj)) => obj
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(obj.clone()).to_string()),
            Some(other) => other.to_string(),
            None => "Unknown error".to_string(),
        }
    }
}

/// The party an access grant is delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buyer {
    /// Chat identity
    pub id: i64,

    /// Public username, when the host shares it
    pub username: Option<String>,
}

impl Buyer {
    /// Creates a buyer known only by id.
    pub fn new(id: i64) -> Self {
        Self { id, username: None }
    }

    /// Attaches a username.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Label used in operator notifications.
    pub fn display(&self) -> String {
        match &self.username {
            Some(name) => format!("@{} (ID: {})", name, self.id),
            None => format!("ID: {}", self.id),
        }
    }
}

/// A single-use, expiring invitation to the restricted channel.
///
/// Expiry and the one-member limit are enforced by the host; they are only
/// requested at creation time.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessGrant {
    /// Channel the invite opens
    pub resource_id: i64,

    /// Invite URL
    pub invite_link: String,

    /// Moment the host stops accepting the link
    pub expires_at: DateTime<Utc>,

    /// Always true: the link admits one member
    pub single_use: bool,

    /// Buyer the link was delivered to
    pub recipient_id: i64,
}

/// Parameters of a single-use invite request.
#[derive(Debug, Clone, PartialEq)]
pub struct InviteRequest {
    /// Channel identifier
    pub resource_id: i64,

    /// Unix timestamp after which the link stops working
    pub expire_at: i64,

    /// Maximum number of members that may join through the link
    pub member_limit: u32,

    /// Label visible to channel admins
    pub label: String,
}

/// Polling cadence and cap for a settlement watcher.
///
/// The cap is an attempt count, not a wall-clock deadline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    /// Number of status fetches before giving up
    pub max_attempts: u32,

    /// Sleep before each fetch
    pub interval: Duration,

    /// Tell the buyer when the cap is reached without settlement
    pub notify_on_timeout: bool,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_POLL_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
            notify_on_timeout: true,
        }
    }
}

impl PollPolicy {
    /// Creates a policy with the given cap and interval.
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            ..Self::default()
        }
    }

    /// Sets whether the buyer hears about a timeout.
    pub fn with_timeout_notice(mut self, notify: bool) -> Self {
        self.notify_on_timeout = notify;
        self
    }
}

/// How a settlement watcher ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchOutcome {
    /// Settlement observed and the invite delivered
    Granted {
        /// 1-based fetch on which "paid" was seen
        attempt: u32,
        /// The grant that was issued
        grant: AccessGrant,
    },

    /// Settlement observed but the grant could not be completed
    GrantFailed {
        /// 1-based fetch on which "paid" was seen
        attempt: u32,
    },

    /// The attempt cap was reached without settlement
    TimedOut {
        /// Fetches performed
        attempts: u32,
        /// How many of those fetches failed outright
        failed_fetches: u32,
    },
}

fn number_or_string<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| de::Error::custom("number out of range")),
        Value::String(s) => s.trim().parse().map_err(de::Error::custom),
        other => Err(de::Error::custom(format!("expected number, got {}", other))),
    }
}
