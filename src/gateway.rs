//! Payment gateway access.
//!
//! This module defines the [`PaymentGateway`] trait the issuer and watcher depend on,
//! and [`CryptoPayClient`], its implementation over the Crypto Pay HTTP API.

use crate::errors::{GateError, Result};
use crate::types::{
    CreateInvoiceRequest, ExchangeRate, GatewayResponse, Invoice, InvoiceList, InvoiceRecord,
    InvoiceStatus, DEFAULT_HTTP_TIMEOUT,
};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Default Crypto Pay API root.
pub const CRYPTO_PAY_API_URL: &str = "https://pay.crypt.bot/api/";

/// Header carrying the Crypto Pay application token.
pub const TOKEN_HEADER: &str = "Crypto-Pay-API-Token";

/// Operations consumed from the payment gateway.
///
/// Implementations must be usable from many watcher tasks at once.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Fetches the current exchange-rate table.
    async fn exchange_rates(&self) -> Result<Vec<ExchangeRate>>;

    /// Creates a payable invoice.
    ///
    /// Fails with [`GateError::GatewayError`] carrying the gateway's message when
    /// the response has no result payload.
    async fn create_invoice(&self, request: &CreateInvoiceRequest) -> Result<Invoice>;

    /// Fetches the current status of one invoice. Never cached.
    async fn invoice_status(&self, invoice_id: i64) -> Result<InvoiceStatus>;
}

/// Crypto Pay HTTP client.
#[derive(Clone, Debug)]
pub struct CryptoPayClient {
    token: String,
    base_url: Url,
    http_client: Client,
}

impl CryptoPayClient {
    /// Creates a client against the public Crypto Pay API.
    ///
    /// # Examples
    ///
    /// ```
    /// use invite_gate::gateway::CryptoPayClient;
    ///
    /// let client = CryptoPayClient::new("12345:AAabc").unwrap();
    /// assert_eq!(client.base_url().as_str(), "https://pay.crypt.bot/api/");
    /// ```
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(token, CRYPTO_PAY_API_URL)
    }

    /// Creates a client against a custom API root (testnet, mock servers).
    pub fn with_base_url(token: impl Into<String>, base_url: &str) -> Result<Self> {
        let mut root = base_url.to_string();
        if !root.ends_with('/') {
            root.push('/');
        }

        Ok(Self {
            token: token.into(),
            base_url: Url::parse(&root)?,
            http_client: http_client(DEFAULT_HTTP_TIMEOUT)?,
        })
    }

    /// Bounds every request to `timeout`.
    ///
    /// A gateway that accepts the connection but never answers then fails the
    /// call instead of holding a watcher forever.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http_client = http_client(timeout)?;
        Ok(self)
    }

    /// API root this client talks to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, method: &str) -> Result<Url> {
        Ok(self.base_url.join(method)?)
    }
}

/// Builds an HTTP client whose requests fail after `timeout`.
pub fn http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

#[async_trait]
impl PaymentGateway for CryptoPayClient {
    async fn exchange_rates(&self) -> Result<Vec<ExchangeRate>> {
        let response: GatewayResponse<Vec<ExchangeRate>> = self
            .http_client
            .get(self.endpoint("getExchangeRates")?)
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await?
            .json()
            .await?;

        let message = response.error_message();
        response.result.ok_or(GateError::GatewayError(message))
    }

    async fn create_invoice(&self, request: &CreateInvoiceRequest) -> Result<Invoice> {
        let response: GatewayResponse<InvoiceRecord> = self
            .http_client
            .post(self.endpoint("createInvoice")?)
            .header(TOKEN_HEADER, &self.token)
            .json(request)
            .send()
            .await?
            .json()
            .await?;

        match response.result {
            Some(record) => Ok(record.into_invoice()),
            None => Err(GateError::GatewayError(response.error_message())),
        }
    }

    async fn invoice_status(&self, invoice_id: i64) -> Result<InvoiceStatus> {
        let response: GatewayResponse<InvoiceList> = self
            .http_client
            .get(self.endpoint("getInvoices")?)
            .header(TOKEN_HEADER, &self.token)
            .query(&[("invoice_ids", invoice_id.to_string())])
            .send()
            .await?
            .json()
            .await?;

        let message = response.error_message();
        let list = response.result.ok_or(GateError::GatewayError(message))?;

        list.items
            .into_iter()
            .find(|item| item.invoice_id == invoice_id)
            .map(|item| item.status)
            .ok_or_else(|| GateError::GatewayError(format!("Invoice {} not found", invoice_id)))
    }
}
