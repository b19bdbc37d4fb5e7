//! Messaging and resource host access.
//!
//! The host delivers messages to buyers and the operator, mints invite links to the
//! private channel and answers payment pre-checks. [`TelegramHost`] implements it over
//! the Telegram Bot API; the update types it receives live here as well.

use crate::errors::{GateError, Result};
use crate::gateway::http_client;
use crate::types::{InviteRequest, DEFAULT_HTTP_TIMEOUT};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use url::Url;

/// Default Bot API root.
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Longest invite name the host accepts.
pub const INVITE_LABEL_MAX: usize = 32;

/// Operations consumed from the messaging host.
#[async_trait]
pub trait ResourceHost: Send + Sync {
    /// Sends a text message, optionally with inline buttons.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()>;

    /// Replaces the text (and buttons) of an earlier message.
    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()>;

    /// Acknowledges a button press.
    async fn answer_callback(&self, callback_id: &str) -> Result<()>;

    /// Creates a single-use, expiring invite and returns its link.
    async fn create_single_use_invite(&self, request: &InviteRequest) -> Result<String>;

    /// Answers a payment pre-authorization check.
    async fn answer_pre_checkout(&self, query_id: &str, accept: bool) -> Result<()>;

    /// Sends a platform-native invoice.
    async fn send_invoice(&self, chat_id: i64, offer: &StarsOffer) -> Result<()>;
}

/// A button under a message.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InlineButton {
    /// Button caption
    pub text: String,

    /// Data echoed back in the callback query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,

    /// External link opened by the button
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl InlineButton {
    /// A button that produces a callback query.
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: Some(data.into()),
            url: None,
        }
    }

    /// A button that opens a link.
    pub fn link(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: None,
            url: Some(url.into()),
        }
    }
}

/// Inline keyboard markup, one button per row.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct InlineKeyboard {
    /// Rows of buttons
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    /// Creates an empty keyboard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a row holding a single button.
    pub fn row(mut self, button: InlineButton) -> Self {
        self.inline_keyboard.push(vec![button]);
        self
    }

    /// Every callback payload on the keyboard, in order.
    pub fn callbacks(&self) -> Vec<&str> {
        self.inline_keyboard
            .iter()
            .flatten()
            .filter_map(|b| b.callback_data.as_deref())
            .collect()
    }
}

/// One line of a platform-native invoice.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LabeledPrice {
    /// Line label
    pub label: String,

    /// Amount in the smallest currency unit (whole stars for XTR)
    pub amount: u32,
}

/// A platform-native (Telegram Stars) invoice.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StarsOffer {
    /// Product title
    pub title: String,

    /// Product description
    pub description: String,

    /// Bot-defined payload echoed in payment events
    pub payload: String,

    /// Payment provider token; empty for Stars
    pub provider_token: String,

    /// Currency code, "XTR" for Stars
    pub currency: String,

    /// Price breakdown
    pub prices: Vec<LabeledPrice>,
}

/// A chat user.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    /// User id
    pub id: i64,

    /// Public username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// A chat.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Chat {
    /// Chat id
    pub id: i64,
}

/// Settlement event of a platform-native payment.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SuccessfulPayment {
    /// Currency code
    pub currency: String,

    /// Amount paid
    pub total_amount: u32,

    /// Payload from the invoice
    pub invoice_payload: String,
}

/// A chat message.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    /// Message id within the chat
    pub message_id: i64,

    /// Sender
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,

    /// Chat the message belongs to
    pub chat: Chat,

    /// Text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Present when the message reports a completed payment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successful_payment: Option<SuccessfulPayment>,
}

/// A button press.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CallbackQuery {
    /// Query id to acknowledge
    pub id: String,

    /// Who pressed the button
    pub from: User,

    /// Message the button was attached to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,

    /// Button payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// A payment pre-authorization check.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PreCheckoutQuery {
    /// Query id to answer
    pub id: String,

    /// Payer
    pub from: User,

    /// Currency code
    pub currency: String,

    /// Amount to be charged
    pub total_amount: u32,

    /// Payload from the invoice
    pub invoice_payload: String,
}

/// One incoming event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Update {
    /// Monotonic update id
    pub update_id: i64,

    /// New message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,

    /// Button press
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_query: Option<CallbackQuery>,

    /// Payment pre-check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_checkout_query: Option<PreCheckoutQuery>,
}

/// Envelope wrapping every Bot API response.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BotResponse<T> {
    /// Whether the call succeeded
    pub ok: bool,

    /// Payload on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,

    /// Error description on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Deserialize)]
struct ChatInviteLink {
    invite_link: String,
}

/// Telegram Bot API client.
#[derive(Clone, Debug)]
pub struct TelegramHost {
    token: String,
    base_url: Url,
    http_client: Client,
    timeout: Duration,
}

impl TelegramHost {
    /// Creates a client against the public Bot API.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(token, TELEGRAM_API_URL)
    }

    /// Creates a client against a custom API root.
    pub fn with_base_url(token: impl Into<String>, base_url: &str) -> Result<Self> {
        let mut root = base_url.to_string();
        if !root.ends_with('/') {
            root.push('/');
        }

        Ok(Self {
            token: token.into(),
            base_url: Url::parse(&root)?,
            http_client: http_client(DEFAULT_HTTP_TIMEOUT)?,
            timeout: DEFAULT_HTTP_TIMEOUT,
        })
    }

    /// Bounds every request to `timeout`.
    ///
    /// Long polls get their own poll window on top of this bound.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http_client = http_client(timeout)?;
        self.timeout = timeout;
        Ok(self)
    }

    fn endpoint(&self, method: &str) -> Result<Url> {
        // The "./" keeps the token's colon from being read as a URL scheme.
        Ok(self
            .base_url
            .join(&format!("./bot{}/{}", self.token, method))?)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> Result<T> {
        self.call_within(method, body, self.timeout).await
    }

    async fn call_within<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<T> {
        let response: BotResponse<T> = self
            .http_client
            .post(self.endpoint(method)?)
            .timeout(timeout)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        match response.result {
            Some(result) if response.ok => Ok(result),
            _ => Err(GateError::HostError(format!(
                "{}: {}",
                method,
                response
                    .description
                    .unwrap_or_else(|| "no description".to_string())
            ))),
        }
    }

    /// Long-polls for updates newer than `offset`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        self.call_within(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message", "callback_query", "pre_checkout_query"],
            }),
            self.timeout + Duration::from_secs(timeout_secs),
        )
        .await
    }

    /// Removes any webhook so long polling can be used.
    pub async fn delete_webhook(&self, drop_pending_updates: bool) -> Result<()> {
        let _: bool = self
            .call(
                "deleteWebhook",
                json!({ "drop_pending_updates": drop_pending_updates }),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ResourceHost for TelegramHost {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = serde_json::to_value(keyboard)?;
        }
        let _: serde_json::Value = self.call("sendMessage", body).await?;
        Ok(())
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()> {
        let mut body = json!({ "chat_id": chat_id, "message_id": message_id, "text": text });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = serde_json::to_value(keyboard)?;
        }
        let _: serde_json::Value = self.call("editMessageText", body).await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                json!({ "callback_query_id": callback_id }),
            )
            .await?;
        Ok(())
    }

    async fn create_single_use_invite(&self, request: &InviteRequest) -> Result<String> {
        let link: ChatInviteLink = self
            .call(
                "createChatInviteLink",
                json!({
                    "chat_id": request.resource_id,
                    "expire_date": request.expire_at,
                    "member_limit": request.member_limit,
                    "name": truncate_label(&request.label),
                }),
            )
            .await?;
        Ok(link.invite_link)
    }

    async fn answer_pre_checkout(&self, query_id: &str, accept: bool) -> Result<()> {
        let _: bool = self
            .call(
                "answerPreCheckoutQuery",
                json!({ "pre_checkout_query_id": query_id, "ok": accept }),
            )
            .await?;
        Ok(())
    }

    async fn send_invoice(&self, chat_id: i64, offer: &StarsOffer) -> Result<()> {
        let mut body = serde_json::to_value(offer)?;
        body["chat_id"] = json!(chat_id);
        let _: serde_json::Value = self.call("sendInvoice", body).await?;
        Ok(())
    }
}

/// Cuts an invite label to [`INVITE_LABEL_MAX`] characters.
pub fn truncate_label(label: &str) -> String {
    label.chars().take(INVITE_LABEL_MAX).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_keeps_token_in_path() {
        let host = TelegramHost::new("123456:ABC-def").unwrap();
        assert_eq!(
            host.endpoint("sendMessage").unwrap().as_str(),
            "https://api.telegram.org/bot123456:ABC-def/sendMessage"
        );
    }

    #[test]
    fn test_error_envelope_without_result() {
        let response: BotResponse<ChatInviteLink> =
            serde_json::from_str(r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#)
                .unwrap();
        assert!(!response.ok);
        assert!(response.result.is_none());
        assert_eq!(response.description.as_deref(), Some("Unauthorized"));

        let response: BotResponse<ChatInviteLink> =
            serde_json::from_str(r#"{"ok":true,"result":{"invite_link":"https://t.me/+x"}}"#)
                .unwrap();
        assert_eq!(response.result.unwrap().invite_link, "https://t.me/+x");
    }

    #[test]
    fn test_keyboard_serialization() {
        let keyboard = InlineKeyboard::new()
            .row(InlineButton::callback("TON", "crypto_TON"))
            .row(InlineButton::link("Reviews", "https://t.me/reviews"));

        let value = serde_json::to_value(&keyboard).unwrap();
        assert_eq!(value["inline_keyboard"][0][0]["callback_data"], "crypto_TON");
        assert!(value["inline_keyboard"][0][0].get("url").is_none());
        assert_eq!(value["inline_keyboard"][1][0]["url"], "https://t.me/reviews");
        assert_eq!(keyboard.callbacks(), vec!["crypto_TON"]);
    }

    #[test]
    fn test_update_parsing() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 9,
            "callback_query": {
                "id": "cb1",
                "from": {"id": 77, "is_bot": false, "first_name": "A"},
                "data": "crypto_TON",
                "message": {"message_id": 3, "chat": {"id": 77, "type": "private"}, "date": 0}
            }
        }))
        .unwrap();

        let query = update.callback_query.unwrap();
        assert_eq!(query.from.id, 77);
        assert_eq!(query.data.as_deref(), Some("crypto_TON"));
        assert_eq!(query.message.unwrap().chat.id, 77);
        assert!(update.message.is_none());
    }

    #[test]
    fn test_truncate_label() {
        assert_eq!(truncate_label("payment via TON"), "payment via TON");
        let long = "x".repeat(40);
        assert_eq!(truncate_label(&long).len(), INVITE_LABEL_MAX);
    }
}
