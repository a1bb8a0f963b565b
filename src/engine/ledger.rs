//! Bed inventory. Pure state transitions over a single room — the only
//! code allowed to touch `available_beds`.
//!
//! Invariant: `0 <= available_beds <= total_beds` after every call.

use crate::engine::error::EngineError;
use crate::model::RoomState;

/// Take `beds` out of the room's availability. Fails without mutating
/// when the room cannot cover the request.
pub fn reserve(room: &mut RoomState, beds: u32) -> Result<(), EngineError> {
    if beds > room.available_beds {
        return Err(EngineError::InsufficientBeds {
            requested: beds,
            available: room.available_beds,
        });
    }
    room.available_beds -= beds;
    Ok(())
}

/// Give `beds` back. Clamped at `total_beds`; the ledger never reports
/// more free beds than the room physically has, even if asked to release
/// the same booking twice.
pub fn release(room: &mut RoomState, beds: u32) {
    room.available_beds = room.total_beds.min(room.available_beds.saturating_add(beds));
}

/// Overwrite availability directly (owner correction path). Bounded by
/// the room's total; negatives never reach here, the wire layer rejects
/// them at parse time.
pub fn set_availability(room: &mut RoomState, value: u32) -> Result<(), EngineError> {
    if value > room.total_beds {
        return Err(EngineError::InvalidBedCount {
            requested: value,
            total: room.total_beds,
        });
    }
    room.available_beds = value;
    Ok(())
}
