//! Access granting.
//!
//! Once a payment is confirmed, the granter mints a single-use invite to the private
//! channel, hands it to the buyer and copies the operator.

use crate::errors::{GateError, Result};
use crate::host::ResourceHost;
use crate::types::{AccessGrant, Buyer, InviteRequest, DEFAULT_INVITE_TTL};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Sent to the buyer when the invite cannot be created.
pub const GRANT_FAILED_TEXT: &str =
    "❌ Your payment was received but the invite link could not be created. \
     Please contact support with this message.";

/// Issues channel invites and delivers them.
#[derive(Clone)]
pub struct AccessGranter {
    host: Arc<dyn ResourceHost>,
    resource_id: i64,
    operator_id: i64,
    ttl: Duration,
}

impl AccessGranter {
    /// Creates a granter for one channel, reporting to one operator.
    pub fn new(host: Arc<dyn ResourceHost>, resource_id: i64, operator_id: i64) -> Self {
        Self {
            host,
            resource_id,
            operator_id,
            ttl: DEFAULT_INVITE_TTL,
        }
    }

    /// Sets the invite lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Creates a one-member, expiring invite and sends it to `buyer` and the operator.
    ///
    /// When the host refuses the invite the buyer is told to contact support and
    /// [`GateError::HostGrantError`] is returned. Nothing is retried.
    pub async fn grant(&self, buyer: &Buyer, attribution: &str) -> Result<AccessGrant> {
        let expires_at = Utc::now() + chrono::Duration::seconds(self.ttl.as_secs() as i64);
        let request = InviteRequest {
            resource_id: self.resource_id,
            expire_at: expires_at.timestamp(),
            member_limit: 1,
            label: attribution.to_string(),
        };

        let invite_link = match self.host.create_single_use_invite(&request).await {
            Ok(link) => link,
            Err(e) => {
                error!(buyer = buyer.id, error = %e, "invite creation failed");
                let notified = self.host.send_message(buyer.id, GRANT_FAILED_TEXT, None).await;
                if let Err(notify_err) = notified {
                    warn!(buyer = buyer.id, error = %notify_err, "could not report failed grant");
                }
                return Err(GateError::HostGrantError(e.to_string()));
            }
        };

        let delivered = self
            .host
            .send_message(buyer.id, &self.buyer_text(&invite_link), None)
            .await;
        let audited = self
            .host
            .send_message(
                self.operator_id,
                &operator_text(buyer, attribution, &invite_link),
                None,
            )
            .await;

        if let Err(e) = &audited {
            warn!(operator = self.operator_id, error = %e, "operator notification failed");
        }
        if let Err(e) = delivered {
            error!(buyer = buyer.id, link = %invite_link, error = %e, "invite delivery failed");
            return Err(e);
        }

        info!(buyer = buyer.id, attribution, "access granted");

        Ok(AccessGrant {
            resource_id: self.resource_id,
            invite_link,
            expires_at,
            single_use: true,
            recipient_id: buyer.id,
        })
    }

    fn buyer_text(&self, link: &str) -> String {
        format!(
            "✅ Payment confirmed!\n\n🔗 Your channel link:\n{}\n\n⏳ The link is valid for {} minutes and admits one person.",
            link,
            self.ttl.as_secs() / 60
        )
    }
}

fn operator_text(buyer: &Buyer, attribution: &str, link: &str) -> String {
    format!(
        "💳 New payment ({})\n👤 Buyer: {}\n🔗 Link: {}",
        attribution,
        buyer.display(),
        link
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingHost;

    #[tokio::test]
    async fn test_grant_sends_two_notifications() {
        let host = Arc::new(RecordingHost::new());
        let granter = AccessGranter::new(host.clone(), -100123, 999);

        let before = Utc::now();
        let grant = granter
            .grant(&Buyer::new(42), "payment via TON")
            .await
            .unwrap();

        assert_eq!(grant.recipient_id, 42);
        assert_eq!(grant.resource_id, -100123);
        assert!(grant.single_use);
        let ttl = (grant.expires_at - before).num_seconds();
        assert!((599..=601).contains(&ttl));

        let messages = host.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].0, 42);
        assert!(messages[0].1.contains(&grant.invite_link));
        assert_eq!(messages[1].0, 999);
        assert!(messages[1].1.contains("ID: 42"));
        assert!(messages[1].1.contains(&grant.invite_link));
    }

    #[tokio::test]
    async fn test_invite_request_parameters() {
        let host = Arc::new(RecordingHost::new());
        let granter =
            AccessGranter::new(host.clone(), -100123, 999).with_ttl(Duration::from_secs(120));

        let grant = granter
            .grant(&Buyer::new(42).with_username("bob"), "payment via stars")
            .await
            .unwrap();

        let invites = host.invites();
        assert_eq!(invites.len(), 1);
        assert_eq!(invites[0].resource_id, -100123);
        assert_eq!(invites[0].member_limit, 1);
        assert_eq!(invites[0].label, "payment via stars");
        assert_eq!(invites[0].expire_at, grant.expires_at.timestamp());
        assert!(host.messages()[1].1.contains("@bob"));
        assert!(host.messages()[0].1.contains("2 minutes"));
    }

    #[tokio::test]
    async fn test_host_failure_reported_to_buyer() {
        let host = Arc::new(RecordingHost::new().failing_invites());
        let granter = AccessGranter::new(host.clone(), -100123, 999);

        let err = granter
            .grant(&Buyer::new(42), "payment via BTC")
            .await
            .unwrap_err();

        assert!(matches!(err, GateError::HostGrantError(_)));
        let messages = host.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0], (42, GRANT_FAILED_TEXT.to_string()));
    }
}
