use dashmap::DashMap;
use tracing::warn;
use ulid::Ulid;

use crate::model::*;

use super::ledger;
use super::SharedRoomState;

/// All tenant state: directory maps, rooms, and the reverse indexes that
/// route booking/payment ids to their room. The only writer is event
/// application — request handlers validate and log events, never mutate
/// state directly, so a replayed WAL rebuilds exactly what live traffic
/// built.
pub struct InMemoryStore {
    users: DashMap<Ulid, User>,
    hostels: DashMap<Ulid, Hostel>,
    rooms: DashMap<Ulid, SharedRoomState>,
    /// Hostel → rooms index for O(1) per-hostel lookups.
    hostel_rooms: DashMap<Ulid, Vec<Ulid>>,
    /// Reverse lookup: booking id → room id.
    booking_to_room: DashMap<Ulid, Ulid>,
    /// Reverse lookup: payment id → booking id.
    payment_to_booking: DashMap<Ulid, Ulid>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            hostels: DashMap::new(),
            rooms: DashMap::new(),
            hostel_rooms: DashMap::new(),
            booking_to_room: DashMap::new(),
            payment_to_booking: DashMap::new(),
        }
    }

    // ── Directory lookups ────────────────────────────────────

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn hostel_count(&self) -> usize {
        self.hostels.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn contains_user(&self, id: &Ulid) -> bool {
        self.users.contains_key(id)
    }

    pub fn contains_hostel(&self, id: &Ulid) -> bool {
        self.hostels.contains_key(id)
    }

    pub fn contains_room(&self, id: &Ulid) -> bool {
        self.rooms.contains_key(id)
    }

    pub fn get_user(&self, id: &Ulid) -> Option<User> {
        self.users.get(id).map(|e| e.value().clone())
    }

    pub fn get_hostel(&self, id: &Ulid) -> Option<Hostel> {
        self.hostels.get(id).map(|e| e.value().clone())
    }

    pub fn get_room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn users(&self) -> Vec<User> {
        self.users.iter().map(|e| e.value().clone()).collect()
    }

    pub fn hostels(&self) -> Vec<Hostel> {
        self.hostels.iter().map(|e| e.value().clone()).collect()
    }

    pub fn rooms(&self) -> Vec<SharedRoomState> {
        self.rooms.iter().map(|e| e.value().clone()).collect()
    }

    pub fn rooms_of_hostel(&self, hostel_id: &Ulid) -> Vec<Ulid> {
        self.hostel_rooms
            .get(hostel_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub fn hostels_owned_by(&self, owner_id: &Ulid) -> Vec<Ulid> {
        self.hostels
            .iter()
            .filter(|e| e.value().owner_id == *owner_id)
            .map(|e| *e.key())
            .collect()
    }

    // ── Reverse indexes ──────────────────────────────────────

    pub fn room_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_room.get(booking_id).map(|e| *e.value())
    }

    pub fn booking_for_payment(&self, payment_id: &Ulid) -> Option<Ulid> {
        self.payment_to_booking.get(payment_id).map(|e| *e.value())
    }

    pub fn contains_booking(&self, id: &Ulid) -> bool {
        self.booking_to_room.contains_key(id)
    }

    pub fn contains_payment(&self, id: &Ulid) -> bool {
        self.payment_to_booking.contains_key(id)
    }

    // ── Event application ────────────────────────────────────

    /// Apply a map-level event: users, hostels, and room creation.
    /// Room-scoped events go through `apply_room_event` with the room's
    /// write lock held by the caller.
    pub fn apply_directory_event(&self, event: &Event) {
        match event {
            Event::UserRegistered { id, name, email, role } => {
                self.users.insert(
                    *id,
                    User {
                        id: *id,
                        name: name.clone(),
                        email: email.clone(),
                        role: *role,
                    },
                );
            }
            Event::HostelAdded { id, owner_id, name, city, address, approved } => {
                self.hostels.insert(
                    *id,
                    Hostel {
                        id: *id,
                        owner_id: *owner_id,
                        name: name.clone(),
                        city: city.clone(),
                        address: address.clone(),
                        approved: *approved,
                    },
                );
            }
            Event::HostelApprovalSet { id, approved } => {
                if let Some(mut hostel) = self.hostels.get_mut(id) {
                    hostel.approved = *approved;
                }
            }
            Event::RoomAdded {
                id,
                hostel_id,
                room_type,
                total_beds,
                available_beds,
                price_per_night,
            } => {
                let room = RoomState::new(
                    *id,
                    *hostel_id,
                    *room_type,
                    *total_beds,
                    *available_beds,
                    *price_per_night,
                );
                self.rooms
                    .insert(*id, std::sync::Arc::new(tokio::sync::RwLock::new(room)));
                self.hostel_rooms.entry(*hostel_id).or_default().push(*id);
            }
            other => {
                debug_assert!(false, "not a directory event: {other:?}");
            }
        }
    }

    /// Apply a room-scoped event. The caller holds the room's write lock;
    /// reservation and release run here and nowhere else, so replay and
    /// live traffic stay in lockstep.
    pub fn apply_room_event(&self, rs: &mut RoomState, event: &Event) {
        match event {
            Event::RoomUpdated { room_type, total_beds, available_beds, price_per_night, .. } => {
                rs.room_type = *room_type;
                rs.total_beds = *total_beds;
                rs.available_beds = *available_beds;
                rs.price_per_night = *price_per_night;
            }
            Event::RoomAvailabilitySet { available_beds, .. } => {
                // Bounds-checked at emission; compacted logs also use this
                // as the final availability pin per room.
                if let Err(err) = ledger::set_availability(rs, *available_beds) {
                    warn!(room = %rs.id, %err, "availability pin exceeded total during event apply");
                    rs.available_beds = rs.total_beds;
                }
            }
            Event::BookingCreated {
                id,
                user_id,
                hostel_id,
                room_id,
                stay,
                beds,
                total_price,
                status,
                booked_at,
            } => {
                // Compacted logs re-create cancelled bookings; those never
                // hold beds.
                if *status != BookingStatus::Cancelled {
                    if let Err(err) = ledger::reserve(rs, *beds) {
                        // Only reachable replaying a log that disagrees with
                        // the state it rebuilt; the availability pin at the
                        // end of a compacted log corrects the count.
                        warn!(room = %rs.id, %err, "reserve under-ran during event apply");
                        rs.available_beds = 0;
                    }
                }
                rs.insert_booking(Booking {
                    id: *id,
                    user_id: *user_id,
                    hostel_id: *hostel_id,
                    room_id: *room_id,
                    stay: *stay,
                    beds: *beds,
                    total_price: *total_price,
                    status: *status,
                    booked_at: *booked_at,
                    payment: None,
                });
                self.booking_to_room.insert(*id, *room_id);
            }
            Event::BookingCancelled { id, .. } => {
                let released = match rs.booking_mut(*id) {
                    Some(b) => {
                        b.status = BookingStatus::Cancelled;
                        Some(b.beds)
                    }
                    None => None,
                };
                if let Some(beds) = released {
                    ledger::release(rs, beds);
                }
            }
            Event::BookingStatusSet { id, status, .. } => {
                // Raw overwrite — deliberately no inventory effect.
                if let Some(b) = rs.booking_mut(*id) {
                    b.status = *status;
                }
            }
            Event::PaymentRecorded {
                id,
                booking_id,
                amount,
                method,
                status,
                transaction_id,
                paid_at,
                created_at,
                failure_reason,
                booking_status,
                ..
            } => {
                if let Some(b) = rs.booking_mut(*booking_id) {
                    b.payment = Some(Payment {
                        id: *id,
                        booking_id: *booking_id,
                        amount: *amount,
                        status: *status,
                        method: *method,
                        transaction_id: transaction_id.clone(),
                        paid_at: *paid_at,
                        created_at: *created_at,
                        failure_reason: failure_reason.clone(),
                    });
                    b.status = *booking_status;
                }
                self.payment_to_booking.insert(*id, *booking_id);
            }
            Event::PaymentRefunded { booking_id, .. } => {
                if let Some(b) = rs.booking_mut(*booking_id)
                    && let Some(p) = b.payment.as_mut()
                {
                    p.status = PaymentStatus::Refunded;
                }
            }
            other => {
                debug_assert!(false, "not a room-scoped event: {other:?}");
            }
        }
    }

    /// Drop a room and every index entry pointing into it. The caller
    /// holds (or exclusively owns) the room's state.
    pub fn forget_room(&self, rs: &RoomState) {
        for booking in &rs.bookings {
            self.booking_to_room.remove(&booking.id);
            if let Some(payment) = &booking.payment {
                self.payment_to_booking.remove(&payment.id);
            }
        }
        if let Some(mut siblings) = self.hostel_rooms.get_mut(&rs.hostel_id) {
            siblings.retain(|r| r != &rs.id);
        }
        self.rooms.remove(&rs.id);
    }

    /// Minimal event sequence that rebuilds current state: directory
    /// first, then each room's bookings and payments, then an
    /// availability pin per room (raw status overwrites can leave the
    /// bed count out of sync with what replaying the bookings would
    /// produce — the pin makes the rebuilt count exact).
    pub async fn snapshot_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        for user in self.users.iter() {
            let u = user.value();
            events.push(Event::UserRegistered {
                id: u.id,
                name: u.name.clone(),
                email: u.email.clone(),
                role: u.role,
            });
        }
        for hostel in self.hostels.iter() {
            let h = hostel.value();
            events.push(Event::HostelAdded {
                id: h.id,
                owner_id: h.owner_id,
                name: h.name.clone(),
                city: h.city.clone(),
                address: h.address.clone(),
                approved: h.approved,
            });
        }
        let rooms: Vec<SharedRoomState> = self.rooms();
        for room in rooms {
            let rs = room.read().await;
            events.push(Event::RoomAdded {
                id: rs.id,
                hostel_id: rs.hostel_id,
                room_type: rs.room_type,
                total_beds: rs.total_beds,
                available_beds: rs.total_beds,
                price_per_night: rs.price_per_night,
            });
            for b in &rs.bookings {
                events.push(Event::BookingCreated {
                    id: b.id,
                    user_id: b.user_id,
                    hostel_id: b.hostel_id,
                    room_id: b.room_id,
                    stay: b.stay,
                    beds: b.beds,
                    total_price: b.total_price,
                    status: b.status,
                    booked_at: b.booked_at,
                });
                if let Some(p) = &b.payment {
                    events.push(Event::PaymentRecorded {
                        id: p.id,
                        booking_id: p.booking_id,
                        room_id: rs.id,
                        amount: p.amount,
                        method: p.method,
                        status: p.status,
                        transaction_id: p.transaction_id.clone(),
                        paid_at: p.paid_at,
                        created_at: p.created_at,
                        failure_reason: p.failure_reason.clone(),
                        booking_status: b.status,
                    });
                }
            }
            events.push(Event::RoomAvailabilitySet {
                id: rs.id,
                available_beds: rs.available_beds,
            });
        }
        events
    }
}
