use ulid::Ulid;

use crate::model::*;

use super::Engine;

impl Engine {
    pub fn list_users(&self) -> Vec<User> {
        let mut users = self.store.users();
        users.sort_by_key(|u| u.id);
        users
    }

    /// All hostels, or — with a city — only approved hostels in that city,
    /// matched exactly. Unapproved hostels are visible in the unfiltered
    /// listing but never in a city search.
    pub fn list_hostels(&self, city: Option<&str>) -> Vec<Hostel> {
        let mut hostels = self.store.hostels();
        if let Some(city) = city {
            hostels.retain(|h| h.approved && h.city == city);
        }
        hostels.sort_by_key(|h| h.id);
        hostels
    }

    pub async fn list_rooms(&self, hostel_id: Option<Ulid>) -> Vec<RoomInfo> {
        // Arc clones first so no map shard lock is held across an await.
        let rooms = self.store.rooms();
        let mut out = Vec::new();
        for room in rooms {
            let guard = room.read().await;
            if let Some(hid) = hostel_id
                && guard.hostel_id != hid
            {
                continue;
            }
            out.push(RoomInfo {
                id: guard.id,
                hostel_id: guard.hostel_id,
                room_type: guard.room_type,
                total_beds: guard.total_beds,
                available_beds: guard.available_beds,
                price_per_night: guard.price_per_night,
            });
        }
        out.sort_by_key(|r| r.id);
        out
    }

    /// Bookings matching one filter. Unknown ids yield an empty result,
    /// never an error; a SELECT that matches nothing is zero rows.
    pub async fn list_bookings(&self, filter: BookingFilter) -> Vec<Booking> {
        let mut out = match filter {
            BookingFilter::Id(id) => {
                let Some(room_id) = self.store.room_for_booking(&id) else {
                    return Vec::new();
                };
                let Some(room) = self.store.get_room(&room_id) else {
                    return Vec::new();
                };
                let guard = room.read().await;
                guard.booking(id).cloned().into_iter().collect()
            }
            BookingFilter::Room(room_id) => {
                let Some(room) = self.store.get_room(&room_id) else {
                    return Vec::new();
                };
                let guard = room.read().await;
                guard.bookings.clone()
            }
            BookingFilter::Hostel(hostel_id) => {
                self.bookings_of_rooms(&self.store.rooms_of_hostel(&hostel_id))
                    .await
            }
            BookingFilter::Owner(owner_id) => {
                let mut room_ids = Vec::new();
                for hostel_id in self.store.hostels_owned_by(&owner_id) {
                    room_ids.extend(self.store.rooms_of_hostel(&hostel_id));
                }
                self.bookings_of_rooms(&room_ids).await
            }
            BookingFilter::All => self.all_bookings().await,
            BookingFilter::User(user_id) => {
                let mut all = self.all_bookings().await;
                all.retain(|b| b.user_id == user_id);
                all
            }
            BookingFilter::Status(status) => {
                let mut all = self.all_bookings().await;
                all.retain(|b| b.status == status);
                all
            }
        };
        out.sort_by_key(|b| b.id);
        out
    }

    pub async fn list_payments(&self, filter: PaymentFilter) -> Vec<Payment> {
        let mut out = match filter {
            PaymentFilter::Id(id) => {
                let Some(booking_id) = self.store.booking_for_payment(&id) else {
                    return Vec::new();
                };
                self.payments_of_booking(booking_id).await
            }
            PaymentFilter::Booking(booking_id) => self.payments_of_booking(booking_id).await,
            PaymentFilter::User(user_id) => self
                .list_bookings(BookingFilter::User(user_id))
                .await
                .into_iter()
                .filter_map(|b| b.payment)
                .collect(),
            PaymentFilter::All => self
                .all_bookings()
                .await
                .into_iter()
                .filter_map(|b| b.payment)
                .collect(),
        };
        out.sort_by_key(|p| p.id);
        out
    }

    /// Booking counts by status. `total` counts every booking ever made,
    /// cancelled ones included.
    pub async fn statistics(&self) -> BookingStatistics {
        let mut stats = BookingStatistics::default();
        for room in self.store.rooms() {
            let guard = room.read().await;
            for b in &guard.bookings {
                stats.total += 1;
                match b.status {
                    BookingStatus::Confirmed => stats.confirmed += 1,
                    BookingStatus::Cancelled => stats.cancelled += 1,
                    BookingStatus::Completed => stats.completed += 1,
                    BookingStatus::PendingPayment => {}
                }
            }
        }
        stats
    }

    async fn all_bookings(&self) -> Vec<Booking> {
        let mut out = Vec::new();
        for room in self.store.rooms() {
            let guard = room.read().await;
            out.extend(guard.bookings.iter().cloned());
        }
        out
    }

    async fn bookings_of_rooms(&self, room_ids: &[Ulid]) -> Vec<Booking> {
        let mut out = Vec::new();
        for room_id in room_ids {
            if let Some(room) = self.store.get_room(room_id) {
                let guard = room.read().await;
                out.extend(guard.bookings.iter().cloned());
            }
        }
        out
    }

    async fn payments_of_booking(&self, booking_id: Ulid) -> Vec<Payment> {
        self.list_bookings(BookingFilter::Id(booking_id))
            .await
            .into_iter()
            .filter_map(|b| b.payment)
            .collect()
    }
}
