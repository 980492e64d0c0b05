//! Saved payment methods for authenticated accounts
//!
//! Only display data (brand, last four digits, expiry) and the processor
//! token are kept; card numbers never reach this crate. A token is stored
//! once per account, and at most one method per account is the default.

use crate::processor::CardDetails;
use crate::types::{AccountId, PaymentMethod};
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Thread-safe store of saved payment methods, keyed by account
#[derive(Debug, Default)]
pub struct PaymentMethodVault {
    methods: DashMap<AccountId, Vec<PaymentMethod>>,
}

impl PaymentMethodVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save a card for an account, or update it if the token is already saved
    ///
    /// Making a method the default clears the flag on the account's other
    /// methods.
    pub fn save(
        &self,
        account_id: AccountId,
        card: CardDetails,
        make_default: bool,
        now: DateTime<Utc>,
    ) -> PaymentMethod {
        let mut methods = self.methods.entry(account_id).or_default();

        if make_default {
            for method in methods.iter_mut() {
                method.is_default = false;
            }
        }

        let saved = match methods
            .iter_mut()
            .find(|method| method.processor_token == card.token)
        {
            Some(existing) => {
                existing.brand = card.brand.or(existing.brand.take());
                existing.last4 = card.last4.or(existing.last4.take());
                existing.exp_month = card.exp_month.or(existing.exp_month);
                existing.exp_year = card.exp_year.or(existing.exp_year);
                existing.is_default = make_default || existing.is_default;
                existing.clone()
            }
            None => {
                let method = PaymentMethod {
                    account_id,
                    processor_token: card.token,
                    brand: card.brand,
                    last4: card.last4,
                    exp_month: card.exp_month,
                    exp_year: card.exp_year,
                    is_default: make_default,
                    created_at: now,
                };
                methods.push(method.clone());
                method
            }
        };

        tracing::debug!(
            account_id,
            default = saved.is_default,
            saved = methods.len(),
            "payment method saved"
        );
        saved
    }

    /// Remove a token from whichever account holds it
    pub fn remove(&self, token: &str) -> Option<PaymentMethod> {
        for mut entry in self.methods.iter_mut() {
            if let Some(position) = entry
                .iter()
                .position(|method| method.processor_token == token)
            {
                return Some(entry.remove(position));
            }
        }
        None
    }

    /// Make one of the account's saved methods its default
    ///
    /// Returns `None`, changing nothing, when the account has not saved the token.
    pub fn set_default(&self, account_id: AccountId, token: &str) -> Option<PaymentMethod> {
        let mut methods = self.methods.get_mut(&account_id)?;
        if !methods.iter().any(|method| method.processor_token == token) {
            return None;
        }
        let mut chosen = None;
        for method in methods.iter_mut() {
            method.is_default = method.processor_token == token;
            if method.is_default {
                chosen = Some(method.clone());
            }
        }
        chosen
    }

    /// Remove a token only if this account saved it
    pub fn remove_for(&self, account_id: AccountId, token: &str) -> Option<PaymentMethod> {
        let mut methods = self.methods.get_mut(&account_id)?;
        let position = methods
            .iter()
            .position(|method| method.processor_token == token)?;
        Some(methods.remove(position))
    }

    /// Whether the account saved this token
    pub fn owns(&self, account_id: AccountId, token: &str) -> bool {
        self.methods
            .get(&account_id)
            .map(|methods| methods.iter().any(|method| method.processor_token == token))
            .unwrap_or(false)
    }

    /// Saved methods of an account, default first, then oldest first
    pub fn list(&self, account_id: AccountId) -> Vec<PaymentMethod> {
        let mut methods = self
            .methods
            .get(&account_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        methods.sort_by(|a, b| {
            b.is_default
                .cmp(&a.is_default)
                .then(a.created_at.cmp(&b.created_at))
        });
        methods
    }
}
