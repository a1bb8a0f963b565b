//! Date-range conflict detection. A room is blocked for a range when any
//! non-cancelled booking intersects it — bed counts are deliberately not
//! consulted (any overlap blocks, however many beds remain free).

use chrono::{Datelike, NaiveDate};

use crate::engine::error::EngineError;
use crate::limits;
use crate::model::{BookingStatus, RoomState, StayRange};

/// True iff any booking with status ≠ CANCELLED overlaps `range`.
/// Half-open semantics: a stay checking out on `range.check_in` is clear.
pub fn has_overlap(room: &RoomState, range: &StayRange) -> bool {
    room.overlapping(range)
        .any(|b| b.status != BookingStatus::Cancelled)
}

/// Stay sanity checks, in the order callers report them: past check-in
/// first, then inverted range, then the structural limits.
pub fn validate_stay(stay: &StayRange, today: NaiveDate) -> Result<(), EngineError> {
    if stay.check_in < today {
        return Err(EngineError::CheckInInPast);
    }
    if stay.check_out <= stay.check_in {
        return Err(EngineError::CheckOutNotAfterCheckIn);
    }
    if stay.check_in.year() < limits::MIN_VALID_YEAR
        || stay.check_out.year() > limits::MAX_VALID_YEAR
    {
        return Err(EngineError::LimitExceeded("date outside valid range"));
    }
    if stay.nights() > limits::MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(())
}
