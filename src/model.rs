use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Half-open stay `[check_in, check_out)` — checkout day is not occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StayRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl StayRange {
    /// No shape check here: inverted ranges arrive straight off the wire
    /// and are rejected by the engine with a proper error, not a panic.
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        Self { check_in, check_out }
    }

    /// Whole nights between check-in and check-out. Negative for inverted ranges.
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    pub fn overlaps(&self, other: &StayRange) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }
}

impl fmt::Display for StayRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.check_in, self.check_out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    User,
    Owner,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "USER",
            UserRole::Owner => "OWNER",
            UserRole::Admin => "ADMIN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "USER" => Some(UserRole::User),
            "OWNER" => Some(UserRole::Owner),
            "ADMIN" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomType {
    Dorm,
    Private,
}

impl RoomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomType::Dorm => "DORM",
            RoomType::Private => "PRIVATE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DORM" => Some(RoomType::Dorm),
            "PRIVATE" => Some(RoomType::Private),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Confirmed,
    PendingPayment,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::PendingPayment => "PENDING_PAYMENT",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CONFIRMED" => Some(BookingStatus::Confirmed),
            "PENDING_PAYMENT" => Some(BookingStatus::PendingPayment),
            "CANCELLED" => Some(BookingStatus::Cancelled),
            "COMPLETED" => Some(BookingStatus::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Some(PaymentStatus::Pending),
            "COMPLETED" => Some(PaymentStatus::Completed),
            "FAILED" => Some(PaymentStatus::Failed),
            "REFUNDED" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    Upi,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "CREDIT_CARD",
            PaymentMethod::DebitCard => "DEBIT_CARD",
            PaymentMethod::Upi => "UPI",
            PaymentMethod::Cash => "CASH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CREDIT_CARD" => Some(PaymentMethod::CreditCard),
            "DEBIT_CARD" => Some(PaymentMethod::DebitCard),
            "UPI" => Some(PaymentMethod::Upi),
            "CASH" => Some(PaymentMethod::Cash),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Ulid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hostel {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub name: String,
    pub city: String,
    pub address: String,
    pub approved: bool,
}

/// One simulated payment, linked 1:1 to its booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Ulid,
    pub booking_id: Ulid,
    /// Equals the booking's total price at the time the payment was taken.
    pub amount: f64,
    pub status: PaymentStatus,
    pub method: PaymentMethod,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub user_id: Ulid,
    pub hostel_id: Ulid,
    pub room_id: Ulid,
    pub stay: StayRange,
    pub beds: u32,
    pub total_price: f64,
    pub status: BookingStatus,
    pub booked_at: DateTime<Utc>,
    pub payment: Option<Payment>,
}

/// A room and everything booked on it. Bookings stay in the vec after
/// cancellation — status, not removal, is what takes them out of play.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    pub hostel_id: Ulid,
    pub room_type: RoomType,
    pub total_beds: u32,
    pub available_beds: u32,
    pub price_per_night: f64,
    /// All bookings, sorted by `stay.check_in`.
    pub bookings: Vec<Booking>,
}

impl RoomState {
    pub fn new(
        id: Ulid,
        hostel_id: Ulid,
        room_type: RoomType,
        total_beds: u32,
        available_beds: u32,
        price_per_night: f64,
    ) -> Self {
        Self {
            id,
            hostel_id,
            room_type,
            total_beds,
            available_beds,
            price_per_night,
            bookings: Vec::new(),
        }
    }

    /// Insert booking maintaining sort order by stay.check_in.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.stay.check_in, |b| b.stay.check_in)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Return only bookings whose stay overlaps the query range.
    /// Uses binary search to skip bookings starting at or after `query.check_out`.
    pub fn overlapping(&self, query: &StayRange) -> impl Iterator<Item = &Booking> {
        // Everything at index >= right_bound checks in at or after query.check_out → can't overlap.
        let right_bound = self
            .bookings
            .partition_point(|b| b.stay.check_in < query.check_out);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.stay.check_out > query.check_in)
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
/// Gateway outcomes and timestamps are decided before an event is logged,
/// so replaying a log is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    UserRegistered {
        id: Ulid,
        name: String,
        email: String,
        role: UserRole,
    },
    HostelAdded {
        id: Ulid,
        owner_id: Ulid,
        name: String,
        city: String,
        address: String,
        approved: bool,
    },
    HostelApprovalSet {
        id: Ulid,
        approved: bool,
    },
    RoomAdded {
        id: Ulid,
        hostel_id: Ulid,
        room_type: RoomType,
        total_beds: u32,
        available_beds: u32,
        price_per_night: f64,
    },
    RoomUpdated {
        id: Ulid,
        room_type: RoomType,
        total_beds: u32,
        available_beds: u32,
        price_per_night: f64,
    },
    RoomAvailabilitySet {
        id: Ulid,
        available_beds: u32,
    },
    RoomDeleted {
        id: Ulid,
    },
    BookingCreated {
        id: Ulid,
        user_id: Ulid,
        hostel_id: Ulid,
        room_id: Ulid,
        stay: StayRange,
        beds: u32,
        total_price: f64,
        status: BookingStatus,
        booked_at: DateTime<Utc>,
    },
    BookingCancelled {
        id: Ulid,
        room_id: Ulid,
    },
    BookingStatusSet {
        id: Ulid,
        room_id: Ulid,
        status: BookingStatus,
    },
    PaymentRecorded {
        id: Ulid,
        booking_id: Ulid,
        room_id: Ulid,
        amount: f64,
        method: PaymentMethod,
        status: PaymentStatus,
        transaction_id: Option<String>,
        paid_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
        failure_reason: Option<String>,
        /// Booking status after reconciliation (CONFIRMED on approval,
        /// unchanged on decline).
        booking_status: BookingStatus,
    },
    PaymentRefunded {
        id: Ulid,
        booking_id: Ulid,
        room_id: Ulid,
    },
}

// ── Query shapes ─────────────────────────────────────────────────

/// One filter at a time — the serving surface mirrors the original
/// endpoint-per-filter API rather than general predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingFilter {
    All,
    Id(Ulid),
    User(Ulid),
    Hostel(Ulid),
    Room(Ulid),
    /// Bookings across every hostel the given user owns.
    Owner(Ulid),
    Status(BookingStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentFilter {
    All,
    Id(Ulid),
    Booking(Ulid),
    User(Ulid),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomInfo {
    pub id: Ulid,
    pub hostel_id: Ulid,
    pub room_type: RoomType,
    pub total_beds: u32,
    pub available_beds: u32,
    pub price_per_night: f64,
}

/// Partial room update. `None` keeps the current value; the resulting
/// row is validated as a whole before anything is applied.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RoomPatch {
    pub room_type: Option<RoomType>,
    pub total_beds: Option<u32>,
    pub available_beds: Option<u32>,
    pub price_per_night: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BookingStatistics {
    pub total: u64,
    pub confirmed: u64,
    pub cancelled: u64,
    pub completed: u64,
}
