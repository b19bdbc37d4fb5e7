//! Invoice issuing.
//!
//! Converts a dollar price into a gateway-native amount using the live rate table
//! and asks the gateway for a payable invoice.

use crate::errors::{GateError, Result};
use crate::gateway::PaymentGateway;
use crate::types::{CreateInvoiceRequest, ExchangeRate, Invoice, PaymentRequest, USD};
use std::sync::Arc;
use tracing::info;

/// Decimal places kept in invoice amounts.
pub const AMOUNT_DECIMALS: i32 = 4;

/// Picks the USD→`asset` rate from a rate table.
///
/// A direct `USD→asset` entry wins; otherwise the inverse of an `asset→USD`
/// entry is used. Entries with a rate of zero or below are ignored.
///
/// # Examples
///
/// ```
/// use invite_gate::issuer::select_rate;
/// use invite_gate::types::ExchangeRate;
///
/// let rates = vec![ExchangeRate::new("TON", "USD", 4.0)];
/// assert_eq!(select_rate(&rates, "TON").unwrap(), 0.25);
/// assert!(select_rate(&rates, "BTC").is_err());
/// ```
pub fn select_rate(rates: &[ExchangeRate], asset: &str) -> Result<f64> {
    if let Some(direct) = rates
        .iter()
        .find(|r| r.source == USD && r.target == asset && r.rate > 0.0)
    {
        return Ok(direct.rate);
    }

    rates
        .iter()
        .find(|r| r.source == asset && r.target == USD && r.rate > 0.0)
        .map(|inverse| 1.0 / inverse.rate)
        .ok_or_else(|| GateError::RateUnavailable(asset.to_string()))
}

/// Converts a dollar amount into asset units, rounded to [`AMOUNT_DECIMALS`].
///
/// # Examples
///
/// ```
/// use invite_gate::issuer::asset_amount;
///
/// assert_eq!(asset_amount(1.0, 0.18), 0.18);
/// assert_eq!(asset_amount(1.0, 1.0 / 0.18), 5.5556);
/// ```
pub fn asset_amount(usd_amount: f64, rate: f64) -> f64 {
    let scale = 10f64.powi(AMOUNT_DECIMALS);
    (usd_amount * rate * scale).round() / scale
}

/// Issues invoices through a [`PaymentGateway`].
#[derive(Clone)]
pub struct InvoiceIssuer {
    gateway: Arc<dyn PaymentGateway>,
}

impl InvoiceIssuer {
    /// Creates an issuer over the given gateway.
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }

    /// Prices the request in its asset and creates the invoice.
    ///
    /// Performs one rate lookup and one invoice creation call; nothing is kept
    /// locally afterwards.
    pub async fn issue_invoice(&self, request: &PaymentRequest) -> Result<Invoice> {
        let rates = self.gateway.exchange_rates().await?;
        let rate = select_rate(&rates, &request.asset)?;
        let amount = asset_amount(request.usd_amount, rate);

        let invoice = self
            .gateway
            .create_invoice(&CreateInvoiceRequest {
                asset: request.asset.clone(),
                amount: amount.to_string(),
                description: request.description(),
            })
            .await?;

        info!(
            requester = request.requester_id,
            invoice_id = invoice.invoice_id,
            asset = %request.asset,
            amount,
            "invoice issued"
        );

        Ok(invoice)
    }
}
