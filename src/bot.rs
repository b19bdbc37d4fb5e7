//! Update handling.
//!
//! [`BotContext`] bundles the clients and configuration every handler needs and is
//! passed explicitly to each of them. [`handle_update`] routes one incoming event;
//! [`run_polling`] feeds it from the Bot API long-poll loop.

use crate::config::BotConfig;
use crate::errors::Result;
use crate::gateway::{CryptoPayClient, PaymentGateway};
use crate::granter::AccessGranter;
use crate::host::{
    CallbackQuery, InlineButton, InlineKeyboard, LabeledPrice, Message, PreCheckoutQuery,
    ResourceHost, StarsOffer, TelegramHost, Update,
};
use crate::issuer::InvoiceIssuer;
use crate::types::{Buyer, PaymentRequest};
use crate::watcher::SettlementWatcher;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Callback payload opening the payment-method menu.
pub const PAY_OPTIONS: &str = "pay_options";

/// Callback payload opening the asset menu.
pub const CRYPTO_CHOOSE: &str = "crypto_choose";

/// Prefix of per-asset callback payloads (`crypto_TON`).
pub const CRYPTO_PREFIX: &str = "crypto_";

/// Callback payload requesting a Stars invoice.
pub const PAY_STARS: &str = "pay_stars";

/// Payload attached to Stars invoices.
pub const STARS_PAYLOAD: &str = "stars_payment";

/// Currency code of Telegram Stars.
pub const STARS_CURRENCY: &str = "XTR";

const WELCOME_TEXT: &str = "Welcome!\n\n\
    Pay once to get a personal one-time link to the private channel.";
const METHODS_TEXT: &str = "Choose a payment method:";
const ASSETS_TEXT: &str = "Choose a currency:";
const STARS_PENDING_TEXT: &str = "✅ Payment received! Creating your link...";

/// Pause after a failed `getUpdates` call.
const RETRY_DELAY: Duration = Duration::from_secs(3);

/// Clients and settings shared by all handlers.
pub struct BotContext {
    /// Runtime configuration
    pub config: BotConfig,
    /// Messaging host
    pub host: Arc<dyn ResourceHost>,
    /// Invoice issuer
    pub issuer: InvoiceIssuer,
    /// Access granter used by both payment paths
    pub granter: AccessGranter,
    /// Settlement watcher template; one task is spawned per invoice
    pub watcher: SettlementWatcher,
}

impl BotContext {
    /// Wires the components together over the given collaborators.
    pub fn new(
        config: BotConfig,
        host: Arc<dyn ResourceHost>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let granter = AccessGranter::new(host.clone(), config.channel_id, config.admin_id)
            .with_ttl(config.invite_ttl);
        let watcher = SettlementWatcher::new(gateway.clone(), granter.clone(), host.clone())
            .with_policy(config.poll_policy());

        Self {
            issuer: InvoiceIssuer::new(gateway),
            granter,
            watcher,
            host,
            config,
        }
    }

    /// Builds the Telegram and Crypto Pay clients from `config`.
    ///
    /// The Telegram client is also returned for the update loop.
    pub fn connect(config: BotConfig) -> Result<(Self, Arc<TelegramHost>)> {
        let telegram = Arc::new(
            TelegramHost::with_base_url(&config.api_token, &config.telegram_api_url)?
                .with_timeout(config.http_timeout)?,
        );
        let gateway = Arc::new(
            CryptoPayClient::with_base_url(&config.cryptopay_token, &config.cryptopay_api_url)?
                .with_timeout(config.http_timeout)?,
        );

        Ok((Self::new(config, telegram.clone(), gateway), telegram))
    }

    fn methods_keyboard(&self) -> InlineKeyboard {
        InlineKeyboard::new()
            .row(InlineButton::callback("💰 Crypto (Crypto Bot)", CRYPTO_CHOOSE))
            .row(InlineButton::callback("✨ Telegram Stars", PAY_STARS))
    }

    fn assets_keyboard(&self) -> InlineKeyboard {
        self.config
            .assets
            .iter()
            .fold(InlineKeyboard::new(), |kb, asset| {
                kb.row(InlineButton::callback(
                    asset.as_str(),
                    format!("{}{}", CRYPTO_PREFIX, asset),
                ))
            })
            .row(InlineButton::callback("🔙 Back", PAY_OPTIONS))
    }
}

/// What a button press asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Show payment methods
    PaymentOptions,
    /// Show crypto assets
    ChooseAsset,
    /// Pay in the given asset
    PayCrypto(String),
    /// Pay with Stars
    PayStars,
    /// Anything else
    Unknown,
}

impl Action {
    /// Parses a callback payload; only configured assets are accepted.
    ///
    /// # Examples
    ///
    /// ```
    /// use invite_gate::bot::Action;
    ///
    /// let assets = vec!["TON".to_string()];
    /// assert_eq!(Action::parse("crypto_TON", &assets), Action::PayCrypto("TON".into()));
    /// assert_eq!(Action::parse("crypto_DOGE", &assets), Action::Unknown);
    /// assert_eq!(Action::parse("crypto_choose", &assets), Action::ChooseAsset);
    /// ```
    pub fn parse(data: &str, assets: &[String]) -> Self {
        match data {
            PAY_OPTIONS => Action::PaymentOptions,
            CRYPTO_CHOOSE => Action::ChooseAsset,
            PAY_STARS => Action::PayStars,
            _ => match data.strip_prefix(CRYPTO_PREFIX) {
                Some(asset) if assets.iter().any(|a| a == asset) => {
                    Action::PayCrypto(asset.to_string())
                }
                _ => Action::Unknown,
            },
        }
    }
}

/// Routes one update to its handler.
pub async fn handle_update(ctx: &BotContext, update: Update) -> Result<()> {
    if let Some(query) = update.pre_checkout_query {
        return handle_pre_checkout(ctx, &query).await;
    }
    if let Some(query) = update.callback_query {
        return handle_callback(ctx, &query).await;
    }
    if let Some(message) = update.message {
        if message.successful_payment.is_some() {
            return handle_successful_payment(ctx, &message).await;
        }
        if message.text.as_deref().map(str::trim) == Some("/start") {
            let keyboard = InlineKeyboard::new()
                .row(InlineButton::callback("💸 Buy access", PAY_OPTIONS));
            return ctx
                .host
                .send_message(message.chat.id, WELCOME_TEXT, Some(&keyboard))
                .await;
        }
    }
    debug!(update_id = update.update_id, "update ignored");
    Ok(())
}

/// Handles a button press.
pub async fn handle_callback(ctx: &BotContext, query: &CallbackQuery) -> Result<()> {
    if let Err(e) = ctx.host.answer_callback(&query.id).await {
        warn!(callback = %query.id, error = %e, "could not acknowledge button");
    }

    let chat_id = query
        .message
        .as_ref()
        .map(|m| m.chat.id)
        .unwrap_or(query.from.id);
    let action = Action::parse(query.data.as_deref().unwrap_or_default(), &ctx.config.assets);

    match action {
        Action::PaymentOptions => {
            show_menu(ctx, query, chat_id, METHODS_TEXT, &ctx.methods_keyboard()).await
        }
        Action::ChooseAsset => {
            show_menu(ctx, query, chat_id, ASSETS_TEXT, &ctx.assets_keyboard()).await
        }
        Action::PayCrypto(asset) => pay_crypto(ctx, query.from.id, chat_id, asset).await,
        Action::PayStars => {
            let offer = StarsOffer {
                title: "Private channel access".to_string(),
                description: "One-time access to the private channel".to_string(),
                payload: STARS_PAYLOAD.to_string(),
                provider_token: ctx.config.provider_token.clone(),
                currency: STARS_CURRENCY.to_string(),
                prices: vec![LabeledPrice {
                    label: "Access".to_string(),
                    amount: ctx.config.stars_price,
                }],
            };
            ctx.host.send_invoice(chat_id, &offer).await
        }
        Action::Unknown => {
            debug!(data = ?query.data, "unknown button");
            Ok(())
        }
    }
}

async fn show_menu(
    ctx: &BotContext,
    query: &CallbackQuery,
    chat_id: i64,
    text: &str,
    keyboard: &InlineKeyboard,
) -> Result<()> {
    match &query.message {
        Some(message) => {
            ctx.host
                .edit_message(chat_id, message.message_id, text, Some(keyboard))
                .await
        }
        None => ctx.host.send_message(chat_id, text, Some(keyboard)).await,
    }
}

async fn pay_crypto(ctx: &BotContext, buyer_id: i64, chat_id: i64, asset: String) -> Result<()> {
    let request = PaymentRequest::new(buyer_id, asset, ctx.config.price_usd);

    match ctx.issuer.issue_invoice(&request).await {
        Ok(invoice) => {
            let text = format!(
                "💰 {}\n\n👉 Pay here:\n{}\n\nYou will get your link here once the payment arrives ✅",
                request.description(),
                invoice.pay_url
            );
            // Without the pay link the buyer cannot pay, so the invoice goes unwatched.
            if let Err(e) = ctx.host.send_message(chat_id, &text, None).await {
                warn!(
                    buyer = buyer_id,
                    invoice_id = invoice.invoice_id,
                    error = %e,
                    "pay link not delivered, invoice left unwatched"
                );
                return Err(e);
            }
            ctx.watcher
                .spawn(buyer_id, invoice.invoice_id, request.asset);
            Ok(())
        }
        Err(e) => {
            warn!(buyer = buyer_id, asset = %request.asset, error = %e, "invoice not issued");
            ctx.host
                .send_message(chat_id, &format!("❌ Could not create invoice: {}", e), None)
                .await
        }
    }
}

/// Accepts every payment pre-check.
pub async fn handle_pre_checkout(ctx: &BotContext, query: &PreCheckoutQuery) -> Result<()> {
    ctx.host.answer_pre_checkout(&query.id, true).await
}

/// Grants access for a settled platform-native payment, once, before returning.
pub async fn handle_successful_payment(ctx: &BotContext, message: &Message) -> Result<()> {
    let buyer = match &message.from {
        Some(user) => Buyer {
            id: user.id,
            username: user.username.clone(),
        },
        None => Buyer::new(message.chat.id),
    };

    if let Err(e) = ctx
        .host
        .send_message(message.chat.id, STARS_PENDING_TEXT, None)
        .await
    {
        warn!(buyer = buyer.id, error = %e, "could not acknowledge payment");
    }

    // Failures were already reported to the buyer by the granter.
    if let Err(e) = ctx.granter.grant(&buyer, "payment via stars").await {
        error!(buyer = buyer.id, error = %e, "stars payment not granted");
    }
    Ok(())
}

/// Runs the long-poll loop until `shutdown` resolves.
///
/// Each update is handled on its own task so a slow gateway call never blocks
/// the loop.
pub async fn run_polling<F>(
    ctx: Arc<BotContext>,
    telegram: Arc<TelegramHost>,
    shutdown: F,
) -> Result<()>
where
    F: std::future::Future<Output = ()>,
{
    telegram.delete_webhook(true).await?;
    info!("polling for updates");

    tokio::pin!(shutdown);
    let mut offset = 0;

    loop {
        let updates = tokio::select! {
            _ = &mut shutdown => break,
            updates = telegram.get_updates(offset, 30) => updates,
        };

        match updates {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    let ctx = ctx.clone();
                    tokio::spawn(async move {
                        let id = update.update_id;
                        if let Err(e) = handle_update(&ctx, update).await {
                            warn!(update_id = id, error = %e, "update handler failed");
                        }
                    });
                }
            }
            Err(e) => {
                warn!(error = %e, "getUpdates failed");
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(RETRY_DELAY) => {}
                }
            }
        }
    }

    info!("polling stopped");
    Ok(())
}
