//! Compile-time tuning constants for the torch-control core.
//!
//! Values describe the reference hardware: a 10-bit ADC reading a plasma
//! voltage divider through two taps, and a 16-bit phase-correct pulse timer
//! clocked at 250 kHz. Boards with different dividers or timer clocks override
//! the matching config structs instead of editing these constants.

/// Number of plus/minus phase pairs averaged into one filtered reading.
pub const OVERSAMPLE_WINDOW: u16 = 8;

/// Divider counts subtracted from every averaged reading.
pub const CALIBRATION_OFFSET_COUNTS: i32 = 35;

/// Divider counts per arc volt, scaled by 100 (4.85 counts/V).
pub const SLOPE_COUNTS_PER_VOLT_X100: u32 = 485;

/// Largest averaged reading treated as valid; anything above collapses to zero.
pub const ADC_FULL_SCALE_COUNTS: u16 = 1024;

/// Rate at which the height controller is updated.
pub const UPDATE_RATE_HZ: u32 = 1_000;

/// Pulse timer ticks per second; dividing by a step rate yields the half period.
pub const TIMER_CONVERSION_CONSTANT: u32 = 250_000;

/// Timer period used to park the pulse train (treated as zero speed).
pub const MAX_TIMER_PERIOD: u16 = u16::MAX;

/// Fastest Z step rate the height controller may command, in steps/s.
pub const MAX_THC_STEP_S: i32 = 10_000;

/// Default Z acceleration limit in steps/s².
pub const DEFAULT_MAX_ACCELERATION_STEP_S2: u32 = 200_000;

/// Lowest Z position (steps) the height controller may reach while enabled.
pub const DEFAULT_Z_BOTTOM_LIMIT: i32 = 0;

/// Highest Z position (steps) the height controller may reach while enabled.
pub const DEFAULT_Z_TOP_LIMIT: i32 = 4_000;

/// Magnitude of the bench oscillation target speed, in steps/s.
pub const BENCH_OSCILLATION_SPEED: i32 = 25_000;

/// Updates between sign flips of the bench oscillation.
pub const BENCH_OSCILLATION_HALF_PERIOD: u16 = 200;

/// Arc voltage requested when a cut does not specify one.
pub const DEFAULT_CUT_VOLTAGE: u16 = 125;
/// Lowest accepted arc voltage request.
pub const MIN_CUT_VOLTAGE: u16 = 50;
/// Highest accepted arc voltage request.
pub const MAX_CUT_VOLTAGE: u16 = 200;

/// Pierce delay used when a cut does not specify one.
pub const DEFAULT_PIERCE_DELAY_MS: u16 = 100;
/// Longest accepted pierce delay.
pub const MAX_PIERCE_DELAY_MS: u16 = 2_000;

/// Cut height (hundredths of a millimetre) used when none is requested.
pub const DEFAULT_CUT_HEIGHT_CMM: u16 = 150;
/// Initial pierce height (hundredths of a millimetre) used when none is requested.
pub const DEFAULT_INITIAL_HEIGHT_CMM: u16 = 380;
/// Lowest accepted torch height in hundredths of a millimetre.
pub const MIN_HEIGHT_CMM: u16 = 50;
/// Highest accepted torch height in hundredths of a millimetre.
pub const MAX_HEIGHT_CMM: u16 = 1_000;

/// Number of transfer polls the command layer performs before giving up.
pub const TRANSFER_WAIT_POLLS: u8 = 30;
/// Interval between transfer polls, in milliseconds.
pub const TRANSFER_POLL_INTERVAL_MS: u32 = 100;
