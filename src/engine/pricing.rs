//! Stay pricing: whole nights × nightly rate × beds. f64 all the way
//! through, no rounding — totals carry whatever precision the inputs had.

use crate::engine::error::EngineError;
use crate::model::StayRange;

/// Price a stay. Fails on empty or inverted ranges; callers have normally
/// validated the range already, so the guard here is the last line.
pub fn quote(stay: &StayRange, beds: u32, price_per_night: f64) -> Result<f64, EngineError> {
    let nights = stay.nights();
    if nights <= 0 {
        return Err(EngineError::CheckOutNotAfterCheckIn);
    }
    Ok(nights as f64 * price_per_night * beds as f64)
}
