//! Directory mutations: users, hostels, rooms. These manage the entities
//! bookings reference; the booking lifecycle itself lives in `bookings.rs`.

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError, EntityKind};

impl Engine {
    pub async fn register_user(
        &self,
        id: Ulid,
        name: String,
        email: String,
        role: UserRole,
    ) -> Result<(), EngineError> {
        if self.store.user_count() >= MAX_USERS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many users"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("user name too long"));
        }
        if email.len() > MAX_EMAIL_LEN {
            return Err(EngineError::LimitExceeded("email too long"));
        }
        if self.store.contains_user(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::UserRegistered { id, name, email, role };
        self.persist_directory(&event).await
    }

    pub async fn add_hostel(
        &self,
        id: Ulid,
        owner_id: Ulid,
        name: String,
        city: String,
        address: String,
    ) -> Result<(), EngineError> {
        if self.store.hostel_count() >= MAX_HOSTELS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many hostels"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("hostel name too long"));
        }
        if city.len() > MAX_CITY_LEN {
            return Err(EngineError::LimitExceeded("city too long"));
        }
        if address.len() > MAX_ADDRESS_LEN {
            return Err(EngineError::LimitExceeded("address too long"));
        }
        if self.store.contains_hostel(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if !self.store.contains_user(&owner_id) {
            return Err(Self::not_found(EntityKind::User, owner_id));
        }

        // New hostels always start unapproved; an admin flips the switch.
        let event = Event::HostelAdded {
            id,
            owner_id,
            name,
            city,
            address,
            approved: false,
        };
        self.persist_directory(&event).await
    }

    pub async fn set_hostel_approval(&self, id: Ulid, approved: bool) -> Result<(), EngineError> {
        if !self.store.contains_hostel(&id) {
            return Err(Self::not_found(EntityKind::Hostel, id));
        }
        let event = Event::HostelApprovalSet { id, approved };
        self.persist_directory(&event).await
    }

    pub async fn add_room(
        &self,
        id: Ulid,
        hostel_id: Ulid,
        room_type: RoomType,
        total_beds: u32,
        price_per_night: f64,
    ) -> Result<(), EngineError> {
        if self.store.room_count() >= MAX_ROOMS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        if total_beds == 0 {
            return Err(EngineError::InvalidRoomShape("room must have at least one bed"));
        }
        if total_beds > MAX_BEDS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many beds for one room"));
        }
        if !(price_per_night >= 0.0) {
            return Err(EngineError::InvalidRoomShape("price per night cannot be negative"));
        }
        if self.store.contains_room(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let hostel = self
            .store
            .get_hostel(&hostel_id)
            .ok_or(Self::not_found(EntityKind::Hostel, hostel_id))?;
        if !hostel.approved {
            return Err(EngineError::HostelNotApproved(hostel_id));
        }

        let event = Event::RoomAdded {
            id,
            hostel_id,
            room_type,
            total_beds,
            available_beds: total_beds,
            price_per_night,
        };
        self.persist_directory(&event).await
    }

    /// Apply a partial update to a room. The patched row is validated as a
    /// whole, so shrinking `total_beds` below the current availability is
    /// rejected rather than silently clamped.
    pub async fn update_room(&self, id: Ulid, patch: RoomPatch) -> Result<(), EngineError> {
        let mut guard = self.resolve_room_write(&id).await?;

        let room_type = patch.room_type.unwrap_or(guard.room_type);
        let total_beds = patch.total_beds.unwrap_or(guard.total_beds);
        let available_beds = patch.available_beds.unwrap_or(guard.available_beds);
        let price_per_night = patch.price_per_night.unwrap_or(guard.price_per_night);

        if total_beds == 0 {
            return Err(EngineError::InvalidRoomShape("room must have at least one bed"));
        }
        if total_beds > MAX_BEDS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many beds for one room"));
        }
        if !(price_per_night >= 0.0) {
            return Err(EngineError::InvalidRoomShape("price per night cannot be negative"));
        }
        if available_beds > total_beds {
            return Err(EngineError::InvalidBedCount {
                requested: available_beds,
                total: total_beds,
            });
        }

        let event = Event::RoomUpdated {
            id,
            room_type,
            total_beds,
            available_beds,
            price_per_night,
        };
        self.persist_and_apply(id, &mut guard, &event).await
    }

    pub async fn set_room_availability(&self, id: Ulid, value: u32) -> Result<(), EngineError> {
        let mut guard = self.resolve_room_write(&id).await?;
        // Reject before logging; the event itself is applied through the ledger.
        if value > guard.total_beds {
            return Err(EngineError::InvalidBedCount {
                requested: value,
                total: guard.total_beds,
            });
        }
        let event = Event::RoomAvailabilitySet { id, available_beds: value };
        self.persist_and_apply(id, &mut guard, &event).await
    }

    /// Delete a room. Refused while any booking on it is still CONFIRMED or
    /// PENDING_PAYMENT; cancelled and completed history goes with the room.
    pub async fn delete_room(&self, id: Ulid) -> Result<(), EngineError> {
        let guard = self.resolve_room_write(&id).await?;
        let active = guard.bookings.iter().any(|b| {
            matches!(
                b.status,
                BookingStatus::Confirmed | BookingStatus::PendingPayment
            )
        });
        if active {
            return Err(EngineError::HasActiveBookings(id));
        }

        // Hold the write lock across the append so no booking can slip in
        // between the check and the removal.
        let event = Event::RoomDeleted { id };
        self.wal_append(&event).await?;
        self.store.forget_room(&guard);
        self.notify.send(id, &event);
        self.notify.remove(&id);
        Ok(())
    }
}
