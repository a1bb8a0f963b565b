use ulid::Ulid;

use crate::model::{BookingStatus, PaymentStatus};

/// What kind of entity a lookup missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Hostel,
    Room,
    Booking,
    Payment,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Hostel => "hostel",
            EntityKind::Room => "room",
            EntityKind::Booking => "booking",
            EntityKind::Payment => "payment",
        }
    }
}

/// How an error surfaces at the boundary. Missing entities, rejected
/// business rules, and infrastructure failures each map to their own
/// response category; the wire layer translates the class, never the
/// individual variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    InvalidRequest,
    Internal,
}

#[derive(Debug)]
pub enum EngineError {
    NotFound { entity: EntityKind, id: Ulid },
    AlreadyExists(Ulid),
    CheckInInPast,
    CheckOutNotAfterCheckIn,
    HostelNotApproved(Ulid),
    InsufficientBeds { requested: u32, available: u32 },
    DatesUnavailable { room_id: Ulid },
    AlreadyCompleted(Ulid),
    AlreadyCancelled(Ulid),
    NotAwaitingPayment { booking_id: Ulid, status: BookingStatus },
    PaymentAlreadyProcessed(Ulid),
    NotRefundable { payment_id: Ulid, status: PaymentStatus },
    InvalidBedCount { requested: u32, total: u32 },
    ZeroBeds,
    InvalidRoomShape(&'static str),
    HasActiveBookings(Ulid),
    InvalidInitialStatus(BookingStatus),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::NotFound { .. } => ErrorClass::NotFound,
            EngineError::WalError(_) => ErrorClass::Internal,
            _ => ErrorClass::InvalidRequest,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound { entity, id } => {
                write!(f, "{} not found: {id}", entity.as_str())
            }
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::CheckInInPast => write!(f, "check-in date cannot be in the past"),
            EngineError::CheckOutNotAfterCheckIn => {
                write!(f, "check-out date must be after check-in date")
            }
            EngineError::HostelNotApproved(id) => {
                write!(f, "hostel {id} is not approved for bookings")
            }
            EngineError::InsufficientBeds { requested, available } => {
                write!(
                    f,
                    "not enough beds available: requested {requested}, only {available} available"
                )
            }
            EngineError::DatesUnavailable { room_id } => {
                write!(f, "room {room_id} is already booked for selected dates")
            }
            EngineError::AlreadyCompleted(id) => {
                write!(f, "cannot cancel completed booking {id}")
            }
            EngineError::AlreadyCancelled(id) => write!(f, "booking {id} is already cancelled"),
            EngineError::NotAwaitingPayment { booking_id, status } => {
                write!(f, "booking {booking_id} is not awaiting payment (status {status})")
            }
            EngineError::PaymentAlreadyProcessed(id) => {
                write!(f, "payment already processed for booking {id}")
            }
            EngineError::NotRefundable { payment_id, status } => {
                write!(
                    f,
                    "cannot refund payment {payment_id} that was not completed (status {status})"
                )
            }
            EngineError::InvalidBedCount { requested, total } => {
                write!(f, "invalid available beds count: {requested} (room has {total})")
            }
            EngineError::ZeroBeds => write!(f, "booking must reserve at least one bed"),
            EngineError::InvalidRoomShape(msg) => write!(f, "invalid room: {msg}"),
            EngineError::HasActiveBookings(id) => {
                write!(f, "cannot delete room {id}: has active bookings")
            }
            EngineError::InvalidInitialStatus(status) => {
                write!(f, "booking cannot be created in status {status}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
