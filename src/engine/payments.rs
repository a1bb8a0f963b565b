//! Payment reconciliation. The authorization decision is injected through
//! `PaymentAuthorizer` so the engine never talks to a real gateway; the
//! decision and its timestamps are fixed before the event is logged, which
//! keeps replay deterministic.

use async_trait::async_trait;
use ulid::Ulid;

use crate::limits::MAX_INSTRUMENT_LEN;
use crate::model::*;
use crate::observability;

use super::{Engine, EngineError};

pub struct AuthorizationRequest {
    pub booking_id: Ulid,
    pub amount: f64,
    pub method: PaymentMethod,
    /// Card number, UPI handle, or whatever the method carries. Opaque to
    /// the engine and never persisted.
    pub instrument: Option<String>,
}

pub enum AuthorizationDecision {
    Approved,
    Declined(String),
}

#[async_trait]
pub trait PaymentAuthorizer: Send + Sync {
    async fn authorize(&self, request: &AuthorizationRequest) -> AuthorizationDecision;
}

/// Coin-flip gateway: approves a configurable fraction of requests and
/// declines the rest with a fixed reason.
pub struct SimulatedGateway {
    approval_rate: f64,
}

impl SimulatedGateway {
    pub fn new(approval_rate: f64) -> Self {
        Self {
            approval_rate: approval_rate.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl PaymentAuthorizer for SimulatedGateway {
    async fn authorize(&self, _request: &AuthorizationRequest) -> AuthorizationDecision {
        if rand::random::<f64>() < self.approval_rate {
            AuthorizationDecision::Approved
        } else {
            AuthorizationDecision::Declined("Payment gateway declined the transaction".into())
        }
    }
}

impl Engine {
    /// Take a payment for a booking that is awaiting one.
    ///
    /// Approval completes the payment with a transaction id and flips the
    /// booking to CONFIRMED. Decline records a FAILED payment with the
    /// gateway's reason and leaves the booking in PENDING_PAYMENT. Either
    /// way the booking now has its one payment; there are no retries.
    pub async fn process_payment(
        &self,
        id: Ulid,
        booking_id: Ulid,
        method: PaymentMethod,
        instrument: Option<String>,
    ) -> Result<Payment, EngineError> {
        if let Some(ref i) = instrument
            && i.len() > MAX_INSTRUMENT_LEN
        {
            return Err(EngineError::LimitExceeded("payment instrument too long"));
        }
        if self.store.contains_payment(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let (room_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .ok_or(Self::not_found(super::EntityKind::Booking, booking_id))?;
        if booking.status != BookingStatus::PendingPayment {
            return Err(EngineError::NotAwaitingPayment {
                booking_id,
                status: booking.status,
            });
        }
        if booking.payment.is_some() {
            return Err(EngineError::PaymentAlreadyProcessed(booking_id));
        }
        let amount = booking.total_price;

        // The gateway is consulted while the room lock is held, so the
        // booking cannot change state under a decision in flight.
        let request = AuthorizationRequest {
            booking_id,
            amount,
            method,
            instrument,
        };
        let decision = self.authorizer.authorize(&request).await;
        let now = self.clock.now();

        let event = match decision {
            AuthorizationDecision::Approved => Event::PaymentRecorded {
                id,
                booking_id,
                room_id,
                amount,
                method,
                status: PaymentStatus::Completed,
                transaction_id: Some(format!("TXN-{}", Ulid::new())),
                paid_at: Some(now),
                created_at: now,
                failure_reason: None,
                booking_status: BookingStatus::Confirmed,
            },
            AuthorizationDecision::Declined(reason) => Event::PaymentRecorded {
                id,
                booking_id,
                room_id,
                amount,
                method,
                status: PaymentStatus::Failed,
                transaction_id: None,
                paid_at: None,
                created_at: now,
                failure_reason: Some(reason),
                booking_status: BookingStatus::PendingPayment,
            },
        };
        self.persist_and_apply(room_id, &mut guard, &event).await?;

        let payment = guard
            .booking(booking_id)
            .and_then(|b| b.payment.clone())
            .ok_or_else(|| EngineError::WalError("payment vanished after apply".into()))?;
        let outcome = match payment.status {
            PaymentStatus::Completed => "approved",
            _ => "declined",
        };
        metrics::counter!(observability::PAYMENTS_TOTAL, "outcome" => outcome).increment(1);
        Ok(payment)
    }

    /// Flip a COMPLETED payment to REFUNDED. The booking and the room's
    /// inventory are deliberately left alone; releasing the stay is the
    /// cancellation flow's job.
    pub async fn refund_payment(&self, payment_id: Ulid) -> Result<(), EngineError> {
        let (room_id, booking_id, mut guard) = self.resolve_payment_write(&payment_id).await?;
        let payment = guard
            .booking(booking_id)
            .and_then(|b| b.payment.as_ref())
            .ok_or(Self::not_found(super::EntityKind::Payment, payment_id))?;
        if payment.status != PaymentStatus::Completed {
            return Err(EngineError::NotRefundable {
                payment_id,
                status: payment.status,
            });
        }

        let event = Event::PaymentRefunded {
            id: payment_id,
            booking_id,
            room_id,
        };
        self.persist_and_apply(room_id, &mut guard, &event).await
    }
}
