//! Settlement watching.
//!
//! A watcher polls one invoice at a fixed cadence until the gateway reports it paid
//! or the attempt cap is reached. On the first "paid" observation it grants access
//! once and stops. Watchers share nothing mutable, so any number may run at once.

use crate::errors::GateError;
use crate::gateway::PaymentGateway;
use crate::granter::AccessGranter;
use crate::host::ResourceHost;
use crate::types::{Buyer, InvoiceStatus, PollPolicy, WatchOutcome};
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

/// Sent to the buyer when the attempt cap is reached (if enabled).
pub const TIMEOUT_TEXT: &str =
    "⌛ We did not see your payment in time. If you have already paid, \
     please contact support with your invoice.";

/// Polls invoices and triggers the granter on settlement.
#[derive(Clone)]
pub struct SettlementWatcher {
    gateway: Arc<dyn PaymentGateway>,
    granter: AccessGranter,
    host: Arc<dyn ResourceHost>,
    policy: PollPolicy,
}

impl SettlementWatcher {
    /// Creates a watcher with the default policy (30 polls, 10 s apart).
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        granter: AccessGranter,
        host: Arc<dyn ResourceHost>,
    ) -> Self {
        Self {
            gateway,
            granter,
            host,
            policy: PollPolicy::default(),
        }
    }

    /// Sets the polling policy.
    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Polls `invoice_id` until it is paid or the cap is reached.
    ///
    /// Each attempt sleeps for the interval, then fetches the status. A failed
    /// fetch counts as "not yet paid" for that attempt only. After the first
    /// "paid" the granter runs once and polling stops.
    pub async fn watch(&self, requester_id: i64, invoice_id: i64, asset: &str) -> WatchOutcome {
        let attribution = format!("payment via {}", asset);
        let mut failed_fetches = 0;

        for attempt in 1..=self.policy.max_attempts {
            tokio::time::sleep(self.policy.interval).await;

            match self.gateway.invoice_status(invoice_id).await {
                Ok(InvoiceStatus::Paid) => {
                    info!(requester_id, invoice_id, attempt, "invoice paid");
                    let buyer = Buyer::new(requester_id);
                    return match self.granter.grant(&buyer, &attribution).await {
                        Ok(grant) => WatchOutcome::Granted { attempt, grant },
                        Err(e) => {
                            error!(
                                requester_id,
                                invoice_id,
                                error = %e,
                                "grant failed after payment"
                            );
                            WatchOutcome::GrantFailed { attempt }
                        }
                    };
                }
                Ok(status) => debug!(invoice_id, attempt, ?status, "invoice not settled yet"),
                Err(e) => {
                    failed_fetches += 1;
                    let e = GateError::TransientFetch(e.to_string());
                    warn!(invoice_id, attempt, error = %e, "invoice status fetch failed");
                }
            }
        }

        let timeout = GateError::SettlementTimeout {
            invoice_id,
            attempts: self.policy.max_attempts,
        };
        warn!(requester_id, failed_fetches, "{}", timeout);

        if self.policy.notify_on_timeout {
            if let Err(e) = self.host.send_message(requester_id, TIMEOUT_TEXT, None).await {
                warn!(requester_id, error = %e, "could not send timeout notice");
            }
        }

        WatchOutcome::TimedOut {
            attempts: self.policy.max_attempts,
            failed_fetches,
        }
    }

    /// Starts [`watch`](Self::watch) as a detached task.
    ///
    /// The caller gets nothing back; every outcome is reported through messages.
    pub fn spawn(&self, requester_id: i64, invoice_id: i64, asset: impl Into<String>) {
        let watcher = self.clone();
        let asset = asset.into();
        let span = tracing::info_span!("watcher", requester_id, invoice_id, asset = %asset);

        tokio::spawn(
            async move {
                watcher.watch(requester_id, invoice_id, &asset).await;
            }
            .instrument(span),
        );
    }
}
