use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
pub type Fixed64 = I32F32;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// Convert an f64 to Fixed64. Use only for initialization, never in sim loop.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Convert Fixed64 to f64. Use only for display, never in sim loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Move `current` one `1/divisor` step towards `target`.
///
/// Deterministic exponential smoothing; used for the satisfaction metric.
#[inline]
pub fn approach(current: Fixed64, target: Fixed64, divisor: u32) -> Fixed64 {
    let divisor = Fixed64::from_num(divisor.max(1));
    current + (target - current) / divisor
}
