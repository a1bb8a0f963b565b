//! Booking state machine: creation with its fixed validation order,
//! cancellation, raw status overwrite.

use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::{overlap, pricing, Engine, EngineError, EntityKind};

impl Engine {
    /// Create a booking and reserve its beds in one atomic unit.
    ///
    /// Validation order is part of the contract: directory resolution
    /// (user, hostel, room), then dates, then approval, then capacity,
    /// then overlap. Callers relying on which error wins when several
    /// apply get that order, always.
    pub async fn create_booking(
        &self,
        id: Ulid,
        user_id: Ulid,
        hostel_id: Ulid,
        room_id: Ulid,
        stay: StayRange,
        beds: u32,
        status: BookingStatus,
    ) -> Result<Booking, EngineError> {
        if beds == 0 {
            return Err(EngineError::ZeroBeds);
        }
        // Only the two entry states are creatable; CANCELLED and COMPLETED
        // are reachable through their own operations.
        if !matches!(
            status,
            BookingStatus::Confirmed | BookingStatus::PendingPayment
        ) {
            return Err(EngineError::InvalidInitialStatus(status));
        }

        if !self.store.contains_user(&user_id) {
            return Err(Self::not_found(EntityKind::User, user_id));
        }
        let hostel = self
            .store
            .get_hostel(&hostel_id)
            .ok_or(Self::not_found(EntityKind::Hostel, hostel_id))?;
        let mut guard = self.resolve_room_write(&room_id).await?;

        if self.store.contains_booking(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings on room"));
        }

        overlap::validate_stay(&stay, self.clock.today())?;
        if !hostel.approved {
            return Err(EngineError::HostelNotApproved(hostel_id));
        }
        if beds > guard.available_beds {
            return Err(EngineError::InsufficientBeds {
                requested: beds,
                available: guard.available_beds,
            });
        }
        if overlap::has_overlap(&guard, &stay) {
            return Err(EngineError::DatesUnavailable { room_id });
        }

        let total_price = pricing::quote(&stay, beds, guard.price_per_night)?;
        let booked_at = self.clock.now();

        let event = Event::BookingCreated {
            id,
            user_id,
            hostel_id,
            room_id,
            stay,
            beds,
            total_price,
            status,
            booked_at,
        };
        // Reservation happens inside apply; a WAL failure here leaves both
        // the booking and the bed count untouched.
        self.persist_and_apply(room_id, &mut guard, &event).await?;
        metrics::counter!(observability::BOOKINGS_CREATED_TOTAL).increment(1);

        let booking = guard
            .booking(id)
            .cloned()
            .ok_or_else(|| EngineError::WalError("booking vanished after apply".into()))?;
        Ok(booking)
    }

    /// Cancel a booking and restore its beds. `reason` is logged for the
    /// audit trail but never stored.
    pub async fn cancel_booking(
        &self,
        id: Ulid,
        reason: Option<&str>,
    ) -> Result<(), EngineError> {
        let (room_id, mut guard) = self.resolve_booking_write(&id).await?;
        let booking = guard
            .booking(id)
            .ok_or(Self::not_found(EntityKind::Booking, id))?;
        match booking.status {
            BookingStatus::Completed => return Err(EngineError::AlreadyCompleted(id)),
            BookingStatus::Cancelled => return Err(EngineError::AlreadyCancelled(id)),
            BookingStatus::Confirmed | BookingStatus::PendingPayment => {}
        }

        let event = Event::BookingCancelled { id, room_id };
        self.persist_and_apply(room_id, &mut guard, &event).await?;
        metrics::counter!(observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
        if let Some(reason) = reason {
            info!(booking = %id, reason, "booking cancelled");
        }
        Ok(())
    }

    /// Overwrite a booking's status with no transition checks and no
    /// inventory effect. Cancellation and payment flows have their own
    /// operations; this is the raw administrative switch.
    pub async fn update_status(
        &self,
        id: Ulid,
        status: BookingStatus,
    ) -> Result<(), EngineError> {
        let (room_id, mut guard) = self.resolve_booking_write(&id).await?;
        if guard.booking(id).is_none() {
            return Err(Self::not_found(EntityKind::Booking, id));
        }
        let event = Event::BookingStatusSet { id, room_id, status };
        self.persist_and_apply(room_id, &mut guard, &event).await
    }
}
