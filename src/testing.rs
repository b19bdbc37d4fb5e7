//! In-memory collaborators for unit tests.

use crate::errors::{GateError, Result};
use crate::gateway::PaymentGateway;
use crate::host::{InlineKeyboard, ResourceHost, StarsOffer};
use crate::types::{
    CreateInvoiceRequest, ExchangeRate, Invoice, InviteRequest, InvoiceStatus,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Host that records every call.
#[derive(Default)]
pub struct RecordingHost {
    messages: Mutex<Vec<(i64, String)>>,
    keyboards: Mutex<Vec<Option<InlineKeyboard>>>,
    edits: Mutex<Vec<(i64, i64, String)>>,
    callbacks: Mutex<Vec<String>>,
    invites: Mutex<Vec<InviteRequest>>,
    pre_checkouts: Mutex<Vec<(String, bool)>>,
    offers: Mutex<Vec<(i64, StarsOffer)>>,
    fail_invites: bool,
    fail_messages: bool,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_invites(mut self) -> Self {
        self.fail_invites = true;
        self
    }

    pub fn failing_messages(mut self) -> Self {
        self.fail_messages = true;
        self
    }

    pub fn messages(&self) -> Vec<(i64, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn keyboards(&self) -> Vec<Option<InlineKeyboard>> {
        self.keyboards.lock().unwrap().clone()
    }

    pub fn edits(&self) -> Vec<(i64, i64, String)> {
        self.edits.lock().unwrap().clone()
    }

    pub fn callbacks(&self) -> Vec<String> {
        self.callbacks.lock().unwrap().clone()
    }

    pub fn invites(&self) -> Vec<InviteRequest> {
        self.invites.lock().unwrap().clone()
    }

    pub fn pre_checkouts(&self) -> Vec<(String, bool)> {
        self.pre_checkouts.lock().unwrap().clone()
    }

    pub fn offers(&self) -> Vec<(i64, StarsOffer)> {
        self.offers.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResourceHost for RecordingHost {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()> {
        if self.fail_messages {
            return Err(GateError::HostError("bot was blocked by the user".to_string()));
        }
        self.messages.lock().unwrap().push((chat_id, text.to_string()));
        self.keyboards.lock().unwrap().push(keyboard.cloned());
        Ok(())
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()> {
        self.edits
            .lock()
            .unwrap()
            .push((chat_id, message_id, text.to_string()));
        self.keyboards.lock().unwrap().push(keyboard.cloned());
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        self.callbacks.lock().unwrap().push(callback_id.to_string());
        Ok(())
    }

    async fn create_single_use_invite(&self, request: &InviteRequest) -> Result<String> {
        if self.fail_invites {
            return Err(GateError::HostError("chat not found".to_string()));
        }
        let mut invites = self.invites.lock().unwrap();
        invites.push(request.clone());
        Ok(format!("https://t.me/+invite{}", invites.len()))
    }

    async fn answer_pre_checkout(&self, query_id: &str, accept: bool) -> Result<()> {
        self.pre_checkouts
            .lock()
            .unwrap()
            .push((query_id.to_string(), accept));
        Ok(())
    }

    async fn send_invoice(&self, chat_id: i64, offer: &StarsOffer) -> Result<()> {
        self.offers.lock().unwrap().push((chat_id, offer.clone()));
        Ok(())
    }
}

/// One scripted answer to a status fetch.
#[derive(Debug, Clone, Copy)]
pub enum Poll {
    Status(InvoiceStatus),
    Fail,
}

/// Gateway replaying a fixed status script; pending once the script runs out.
pub struct ScriptedGateway {
    rates: Vec<ExchangeRate>,
    script: Mutex<VecDeque<Poll>>,
    fetches: AtomicU32,
    created: Mutex<Vec<CreateInvoiceRequest>>,
    reject_with: Option<String>,
}

impl ScriptedGateway {
    pub fn new(script: impl IntoIterator<Item = Poll>) -> Self {
        Self {
            rates: vec![ExchangeRate::new("USD", "TON", 0.18)],
            script: Mutex::new(script.into_iter().collect()),
            fetches: AtomicU32::new(0),
            created: Mutex::new(Vec::new()),
            reject_with: None,
        }
    }

    /// `pending` times pending, then paid.
    pub fn paid_after(pending: usize) -> Self {
        let mut script = vec![Poll::Status(InvoiceStatus::Pending); pending];
        script.push(Poll::Status(InvoiceStatus::Paid));
        Self::new(script)
    }

    pub fn with_rates(mut self, rates: Vec<ExchangeRate>) -> Self {
        self.rates = rates;
        self
    }

    /// Refuses every invoice creation with `message`, after recording it.
    pub fn rejecting(mut self, message: &str) -> Self {
        self.reject_with = Some(message.to_string());
        self
    }

    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> Vec<CreateInvoiceRequest> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn exchange_rates(&self) -> Result<Vec<ExchangeRate>> {
        Ok(self.rates.clone())
    }

    async fn create_invoice(&self, request: &CreateInvoiceRequest) -> Result<Invoice> {
        let mut created = self.created.lock().unwrap();
        created.push(request.clone());
        if let Some(message) = &self.reject_with {
            return Err(GateError::GatewayError(message.clone()));
        }
        Ok(Invoice {
            invoice_id: created.len() as i64,
            pay_url: format!("https://t.me/CryptoBot?start=IV{}", created.len()),
            asset: request.asset.clone(),
            asset_amount: request.amount.parse().unwrap_or_default(),
            status: InvoiceStatus::Pending,
        })
    }

    async fn invoice_status(&self, _invoice_id: i64) -> Result<InvoiceStatus> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(Poll::Status(status)) => Ok(status),
            Some(Poll::Fail) => Err(GateError::GatewayError("connection reset".to_string())),
            None => Ok(InvoiceStatus::Pending),
        }
    }
}
