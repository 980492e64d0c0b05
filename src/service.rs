//! Booking service facade
//!
//! `BookingService` is the surface the (out-of-scope) HTTP layer calls. It
//! wires the workflow components together and owns the confirm and webhook
//! flows, which are the only places where processor I/O, reconciliation and
//! payment-method saving meet. Payment history and card management for
//! signed-in accounts are served from here as well.
//!
//! Rate limiting, authentication and request parsing stay with the caller:
//! authenticated operations receive an already verified account id.

use crate::config::EngineConfig;
use crate::core::{
    BookingManager, Clock, ConfirmationReconciler, IdentityResolver, Ledger, Payer,
    PaymentMethodVault, PaymentOrchestrator, PropertyCatalog,
};
use crate::processor::{PaymentProcessor, ProcessorEvent, WebhookEvent, WebhookVerifier};
use crate::strategy::BookingCreationRequest;
use crate::types::{
    AccountId, Booking, BookingDetails, BookingError, BookingForm, BookingId, CallerKind,
    ConfirmRequest, ConfirmationReport, ErrorKind, GuestBookingForm, IntentDetails, IntentStatus,
    Payment, PaymentId, PaymentMethod, PaymentMethodSave, PublicKey, QuickIntent, ReconcileOutcome, WebhookAck,
    WebhookAction,
};
use std::sync::Arc;

/// Entry point for every booking and payment operation
pub struct BookingService {
    config: EngineConfig,
    identity: Arc<IdentityResolver>,
    ledger: Arc<Ledger>,
    bookings: BookingManager,
    orchestrator: PaymentOrchestrator,
    reconciler: ConfirmationReconciler,
    vault: PaymentMethodVault,
    processor: Arc<dyn PaymentProcessor>,
    verifier: WebhookVerifier,
    clock: Arc<dyn Clock>,
}

impl BookingService {
    pub fn new(
        config: EngineConfig,
        catalog: Arc<dyn PropertyCatalog>,
        processor: Arc<dyn PaymentProcessor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let identity = Arc::new(IdentityResolver::new(
            Arc::clone(&clock),
            config.minimum_guest_age,
        ));
        let ledger = Arc::new(Ledger::new());
        let bookings = BookingManager::new(
            Arc::clone(&catalog),
            Arc::clone(&identity),
            Arc::clone(&ledger),
            Arc::clone(&processor),
            Arc::clone(&clock),
        );
        let orchestrator = PaymentOrchestrator::new(
            catalog,
            Arc::clone(&identity),
            Arc::clone(&ledger),
            Arc::clone(&processor),
            Arc::clone(&clock),
        );
        let reconciler = ConfirmationReconciler::new(
            Arc::clone(&ledger),
            Arc::clone(&identity),
            Arc::clone(&clock),
        );
        let verifier = WebhookVerifier::new(
            config.webhook_secret.clone(),
            config.webhook_tolerance_secs,
        );

        Self {
            config,
            identity,
            ledger,
            bookings,
            orchestrator,
            reconciler,
            vault: PaymentMethodVault::new(),
            processor,
            verifier,
            clock,
        }
    }

    /// Account registry, for the authentication layer
    pub fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            publishable_key: self.config.publishable_key.clone(),
        }
    }

    pub fn create_booking_authenticated(
        &self,
        account: AccountId,
        form: BookingForm,
    ) -> Result<Booking, BookingError> {
        self.bookings
            .create_booking(BookingCreationRequest::Authenticated { account }, form)
    }

    pub fn create_booking_guest(&self, form: GuestBookingForm) -> Result<Booking, BookingError> {
        self.bookings.create_booking(
            BookingCreationRequest::Guest {
                contact: form.user_info,
            },
            form.booking,
        )
    }

    pub async fn open_intent_authenticated(
        &self,
        account: AccountId,
        booking_id: BookingId,
        setup_future_usage: Option<String>,
    ) -> Result<IntentDetails, BookingError> {
        self.orchestrator
            .open_intent(booking_id, Payer::Authenticated(account), setup_future_usage)
            .await
    }

    pub async fn open_intent_guest_full(
        &self,
        booking_id: BookingId,
        setup_future_usage: Option<String>,
    ) -> Result<IntentDetails, BookingError> {
        self.orchestrator
            .open_intent(booking_id, Payer::Guest, setup_future_usage)
            .await
    }

    pub async fn open_intent_guest_quick(
        &self,
        booking_id: BookingId,
    ) -> Result<QuickIntent, BookingError> {
        self.orchestrator.open_quick_intent(booking_id).await
    }

    /// Confirm a payment for a signed-in payer, optionally saving the card
    pub async fn confirm_authenticated(
        &self,
        account: AccountId,
        request: ConfirmRequest,
    ) -> Result<ConfirmationReport, BookingError> {
        self.confirm(Payer::Authenticated(account), request).await
    }

    /// Confirm a guest payment; the save flag is ignored
    pub async fn confirm_guest(
        &self,
        request: ConfirmRequest,
    ) -> Result<ConfirmationReport, BookingError> {
        self.confirm(Payer::Guest, request).await
    }

    /// Verify, parse and apply a processor notification
    ///
    /// Notifications for intents this engine does not know are acknowledged
    /// and ignored. A success that can no longer be applied is returned as
    /// a `State` error after being logged for manual follow-up.
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<WebhookAck, BookingError> {
        if let Err(e) = self
            .verifier
            .verify(payload, signature_header, self.clock.now())
        {
            tracing::warn!("webhook signature rejected");
            return Err(e);
        }

        let event = WebhookEvent::parse(payload)?;
        let action = match event.classify()? {
            ProcessorEvent::IntentSucceeded {
                intent_id,
                payment_method,
            } => self.reconcile_webhook(
                &intent_id,
                IntentStatus::Succeeded,
                payment_method.as_deref(),
            )?,
            ProcessorEvent::IntentFailed { intent_id } => {
                self.reconcile_webhook(&intent_id, IntentStatus::Failed, None)?
            }
            ProcessorEvent::IntentCanceled { intent_id } => {
                self.reconcile_webhook(&intent_id, IntentStatus::Canceled, None)?
            }
            ProcessorEvent::MethodAttached { card } => {
                // Thin events only carry the token
                let card = if card.last4.is_none() {
                    let mut fetched = self.processor.retrieve_payment_method(&card.token).await?;
                    fetched.customer = fetched.customer.or(card.customer);
                    fetched
                } else {
                    card
                };
                let owner = card
                    .customer
                    .as_deref()
                    .and_then(|customer| self.identity.account_for_customer(customer));
                match owner {
                    Some(account) if account.active => WebhookAction::PaymentMethodSaved {
                        method: self.vault.save(account.id, card, false, self.clock.now()),
                    },
                    _ => WebhookAction::Ignored {
                        reason: "payment method does not belong to an active account".to_string(),
                    },
                }
            }
            ProcessorEvent::MethodDetached { token } => match self.vault.remove(&token) {
                Some(_) => WebhookAction::PaymentMethodRemoved { token },
                None => WebhookAction::Ignored {
                    reason: "payment method is not saved".to_string(),
                },
            },
            ProcessorEvent::Other { event_type } => WebhookAction::Ignored {
                reason: format!("unhandled event type {}", event_type),
            },
        };

        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            "webhook processed"
        );
        Ok(WebhookAck {
            event_id: event.id,
            event_type: event.event_type,
            action,
        })
    }

    /// Booking details for a guest; unknown booking and wrong email look the same
    pub fn guest_access(
        &self,
        booking_id: BookingId,
        guest_email: &str,
    ) -> Result<BookingDetails, BookingError> {
        let details = self.bookings.guest_access(booking_id, guest_email);
        if let Err(e) = &details {
            if e.kind() != ErrorKind::NotFound {
                tracing::error!(booking_id, error = %e, "guest access failed");
            }
        }
        details
    }

    /// Cancel an unpaid booking, voiding its open payment intent first
    pub async fn cancel_booking(
        &self,
        account: AccountId,
        booking_id: BookingId,
    ) -> Result<Booking, BookingError> {
        self.bookings.cancel_booking(booking_id, account).await
    }

    /// One payment receipt, visible to the paying account and administrators
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown account, an unknown payment or a payment of
    /// another account; the last two look the same.
    pub fn get_payment(
        &self,
        account: AccountId,
        payment_id: PaymentId,
    ) -> Result<Payment, BookingError> {
        let viewer = self
            .identity
            .get(account)
            .ok_or_else(|| BookingError::not_found("account", account))?;
        self.ledger
            .payment(payment_id)
            .filter(|payment| payment.account_id == viewer.id || viewer.is_admin())
            .ok_or_else(|| BookingError::not_found("payment", payment_id))
    }

    /// Receipts of every booking the account owns, oldest first
    ///
    /// Guest payments made before the account was activated are included,
    /// since the guest path books under the same account.
    pub fn user_payments(&self, account: AccountId) -> Result<Vec<Payment>, BookingError> {
        self.identity
            .get(account)
            .ok_or_else(|| BookingError::not_found("account", account))?;
        Ok(self.ledger.payments_for_account(account))
    }

    /// Receipts recorded against one booking
    ///
    /// # Errors
    ///
    /// - `NotFound` if the account or the booking is unknown
    /// - `Authorization` if the account neither owns the booking nor is an admin
    pub fn booking_payments(
        &self,
        account: AccountId,
        booking_id: BookingId,
    ) -> Result<Vec<Payment>, BookingError> {
        let viewer = self
            .identity
            .get(account)
            .ok_or_else(|| BookingError::not_found("account", account))?;
        let record = self
            .ledger
            .get(booking_id)
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;
        if record.booking.account_id != viewer.id && !viewer.is_admin() {
            return Err(BookingError::authorization(
                "You can only view payments for your own bookings",
            ));
        }
        Ok(record.payments)
    }

    /// Saved payment methods of an account, default first
    pub fn payment_methods(&self, account: AccountId) -> Result<Vec<PaymentMethod>, BookingError> {
        self.identity
            .get(account)
            .ok_or_else(|| BookingError::not_found("account", account))?;
        Ok(self.vault.list(account))
    }

    /// Attach a tokenized card to the account's processor customer and save it
    ///
    /// # Arguments
    ///
    /// * `account` - Signed-in account that owns the card
    /// * `token` - Processor payment method token (`pm_...`) from the client SDK
    /// * `set_default` - Make this card the account's default
    ///
    /// # Returns
    ///
    /// The saved method with display-only card details.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown account
    /// - `Authorization` for an account that is not active
    /// - `Processor` if creating the customer or attaching the card fails;
    ///   nothing is saved
    pub async fn create_payment_method(
        &self,
        account: AccountId,
        token: &str,
        set_default: bool,
    ) -> Result<PaymentMethod, BookingError> {
        let owner = self
            .identity
            .get(account)
            .ok_or_else(|| BookingError::not_found("account", account))?;
        if !owner.active {
            return Err(BookingError::authorization("Account is not active"));
        }

        let customer = self
            .identity
            .ensure_customer(account, self.processor.as_ref())
            .await?;
        let card = match self.processor.attach_payment_method(token, &customer).await {
            Ok(card) => card,
            Err(e) => {
                tracing::warn!(account_id = account, error = %e, "attaching payment method failed");
                return Err(e.into());
            }
        };
        let method = self.vault.save(account, card, set_default, self.clock.now());
        tracing::info!(account_id = account, default = method.is_default, "payment method added");
        Ok(method)
    }

    /// Make a saved card the account's default
    pub fn update_payment_method(
        &self,
        account: AccountId,
        token: &str,
    ) -> Result<PaymentMethod, BookingError> {
        self.identity
            .get(account)
            .ok_or_else(|| BookingError::not_found("account", account))?;
        self.vault
            .set_default(account, token)
            .ok_or_else(|| BookingError::not_found("payment method", token))
    }

    /// Detach a saved card at the processor, then forget it
    ///
    /// The card stays saved when the processor refuses the detach.
    pub async fn delete_payment_method(
        &self,
        account: AccountId,
        token: &str,
    ) -> Result<(), BookingError> {
        if !self.vault.owns(account, token) {
            return Err(BookingError::not_found("payment method", token));
        }
        if let Err(e) = self.processor.detach_payment_method(token).await {
            tracing::error!(account_id = account, error = %e, "detaching payment method failed");
            return Err(e.into());
        }
        self.vault.remove_for(account, token);
        tracing::info!(account_id = account, "payment method removed");
        Ok(())
    }

    fn reconcile_webhook(
        &self,
        intent_id: &str,
        status: IntentStatus,
        payment_method: Option<&str>,
    ) -> Result<WebhookAction, BookingError> {
        match self
            .reconciler
            .reconcile_with(intent_id, status, CallerKind::Webhook, payment_method)
        {
            Ok(outcome) => Ok(WebhookAction::Reconciled { outcome }),
            Err(BookingError::NotFound { .. }) => {
                tracing::warn!(intent_id, "webhook for unknown payment intent");
                Ok(WebhookAction::Ignored {
                    reason: format!("unknown payment intent {}", intent_id),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn confirm(
        &self,
        payer: Payer,
        request: ConfirmRequest,
    ) -> Result<ConfirmationReport, BookingError> {
        let intent_id = request.payment_intent_id.as_str();
        let caller = match payer {
            Payer::Guest => CallerKind::GuestExplicit,
            Payer::Authenticated(_) => CallerKind::AuthenticatedExplicit,
        };

        let booking_id = self
            .ledger
            .booking_for_intent(intent_id)
            .ok_or_else(|| BookingError::not_found("payment intent", intent_id))?;
        let record = self
            .ledger
            .get(booking_id)
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;
        let local = record
            .intent(intent_id)
            .ok_or_else(|| BookingError::not_found("payment intent", intent_id))?;

        // Reject before touching the processor
        match payer {
            Payer::Guest if !local.is_guest => {
                tracing::warn!(intent_id, "guest confirmation for non-guest intent");
                return Err(BookingError::authorization(
                    "This endpoint is only for guest payments",
                ));
            }
            Payer::Guest => {}
            Payer::Authenticated(account_id) => {
                let account = self
                    .identity
                    .get(account_id)
                    .ok_or_else(|| BookingError::not_found("account", account_id))?;
                if record.booking.account_id != account.id && !account.is_admin() {
                    return Err(BookingError::authorization(
                        "You can only confirm payments for your own bookings",
                    ));
                }
            }
        }

        let mut remote = self.processor.retrieve_intent(intent_id).await?;
        if remote.status.awaits_confirmation() && !local.status.is_terminal() {
            remote = self
                .processor
                .confirm_intent(intent_id, request.payment_method_id.as_deref())
                .await
                .map_err(|e| {
                    tracing::warn!(intent_id, error = %e, "processor confirmation failed");
                    BookingError::from(e)
                })?;
        }

        let outcome = self.reconciler.reconcile_with(
            intent_id,
            remote.status,
            caller,
            remote.payment_method.as_deref(),
        )?;

        let payment_method = match payer {
            Payer::Guest if request.save_payment_method => PaymentMethodSave::Skipped {
                reason: "payment methods are not saved for guest payments".to_string(),
            },
            Payer::Guest => PaymentMethodSave::NotRequested,
            Payer::Authenticated(account_id) => {
                self.save_payment_method(account_id, &request, &outcome)
                    .await
            }
        };

        let record = self
            .ledger
            .get(booking_id)
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;
        let intent = record
            .intent(intent_id)
            .ok_or_else(|| BookingError::not_found("payment intent", intent_id))?;

        tracing::info!(
            booking_id,
            intent_id,
            caller = ?caller,
            intent_status = %outcome.intent_status,
            transitioned = outcome.transitioned,
            "payment confirmation handled"
        );
        Ok(ConfirmationReport {
            intent: self.orchestrator.details(&record.booking, intent),
            requires_action: remote.status == IntentStatus::RequiresAction,
            outcome,
            payment_method,
        })
    }

    /// Best-effort card save after a successful authenticated confirmation
    async fn save_payment_method(
        &self,
        account_id: AccountId,
        request: &ConfirmRequest,
        outcome: &ReconcileOutcome,
    ) -> PaymentMethodSave {
        if !request.save_payment_method {
            return PaymentMethodSave::NotRequested;
        }
        let token = match request.payment_method_id.as_deref() {
            Some(token) => token,
            None => {
                return PaymentMethodSave::Skipped {
                    reason: "no payment method supplied".to_string(),
                }
            }
        };
        if outcome.intent_status != IntentStatus::Succeeded {
            return PaymentMethodSave::Skipped {
                reason: "payment did not succeed".to_string(),
            };
        }

        let saved = async {
            let customer = self
                .identity
                .ensure_customer(account_id, self.processor.as_ref())
                .await?;
            let card = self
                .processor
                .attach_payment_method(token, &customer)
                .await?;
            Ok::<_, BookingError>(self.vault.save(account_id, card, true, self.clock.now()))
        }
        .await;

        match saved {
            Ok(method) => PaymentMethodSave::Saved { method },
            Err(e) => {
                tracing::warn!(account_id, error = %e, "saving payment method failed");
                PaymentMethodSave::Failed {
                    message: e.to_string(),
                }
            }
        }
    }
}
