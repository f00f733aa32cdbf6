//! Polyphase filter bank
//!
//! 2048 phases of an 8-tap Blackman-Harris windowed-sinc interpolator,
//! stored as one flat table indexed `phase * 8`. Each row is normalized to
//! unit DC gain; phase 0 degenerates to the identity row so an integral
//! read position reproduces the input sample exactly.

use std::f64::consts::PI;
use std::sync::OnceLock;

use pm_core::FRACTION_BITS;

/// Taps per phase.
pub const TAPS: usize = 8;

/// Number of precomputed phases (11 fractional bits).
pub const PHASE_COUNT: usize = 2048;

const PHASE_BITS: u32 = 11;

static FILTER_BANK: OnceLock<Vec<f32>> = OnceLock::new();

fn blackman_harris(u: f64) -> f64 {
    const A0: f64 = 0.35875;
    const A1: f64 = 0.48829;
    const A2: f64 = 0.14128;
    const A3: f64 = 0.01168;
    A0 - A1 * (2.0 * PI * u).cos() + A2 * (4.0 * PI * u).cos() - A3 * (6.0 * PI * u).cos()
}

fn build_filter_bank() -> Vec<f32> {
    let mut table = vec![0.0f32; PHASE_COUNT * TAPS];
    for phase in 0..PHASE_COUNT {
        let t = phase as f64 / PHASE_COUNT as f64;
        let mut row = [0.0f64; TAPS];
        let mut sum = 0.0f64;
        for (tap, coef) in row.iter_mut().enumerate() {
            // Tap offsets run -3..=4 around the read position
            let x = (tap as f64 - 3.0) - t;
            let sinc = if x.abs() < 1e-12 { 1.0 } else { (PI * x).sin() / (PI * x) };
            *coef = sinc * blackman_harris((x + 4.0) / 8.0);
            sum += *coef;
        }
        for (tap, coef) in row.iter().enumerate() {
            table[phase * TAPS + tap] = (coef / sum) as f32;
        }
    }
    table
}

/// The flat `PHASE_COUNT * TAPS` coefficient table, built on first use.
#[inline]
pub fn filter_bank() -> &'static [f32] {
    FILTER_BANK.get_or_init(build_filter_bank)
}

/// Phase row index for a Q1.31 fractional position.
#[inline]
pub fn phase_index(frac: u64) -> usize {
    (((frac >> (FRACTION_BITS - PHASE_BITS)) as usize) & (PHASE_COUNT - 1)) * TAPS
}
