//! Physical and numerical constants used by the trajectory engine.
//!
//! The engine works in imperial units internally: feet, feet per second,
//! grains, inches. Atmosphere bases stay in °C and hPa.

/// Standard gravitational acceleration in ft/s² (negative: points down)
pub const G_ACCEL_FPS2: f64 = -32.17405;

/// Conversion factor: meters to feet
pub const METERS_TO_FEET: f64 = 3.28084;

/// Conversion factor: feet to meters
pub const FEET_TO_METERS: f64 = 0.3048;

/// Conversion factor: yards to feet
pub const YARDS_TO_FEET: f64 = 3.0;

/// Inches per foot
pub const INCHES_PER_FOOT: f64 = 12.0;

/// Drag retardation constant.
///
/// Converts a standard drag coefficient into a retardation factor for
/// velocities in fps: `a = Cd * DRAG_CONSTANT * v² / BC` (ft/s²).
/// Folds in standard air density (0.0764742 lb/ft³), π/8 and the
/// lb/in² sectional-density units of the ballistic coefficient.
pub const DRAG_CONSTANT: f64 = 2.08551e-4;

/// Earth's angular velocity (rad/s)
pub const EARTH_ANGULAR_VELOCITY: f64 = 7.2921159e-5;

// Atmosphere

/// Temperature lapse rate in K per foot
pub const LAPSE_RATE_K_PER_FOOT: f64 = -0.0019812;

/// Barometric pressure exponent `-g·M/(R·L)` for the troposphere
pub const PRESSURE_EXPONENT: f64 = 5.255876;

/// Speed of sound factor: `sqrt(γ·R/M)` in m/s per sqrt(K)
pub const SPEED_OF_SOUND_METRIC: f64 = 20.0467;

/// Offset between Celsius and Kelvin
pub const DEGREES_C_TO_K: f64 = 273.15;

/// Standard sea-level air density (kg/m³)
pub const STANDARD_DENSITY_METRIC: f64 = 1.2250;

/// Standard sea-level pressure (hPa)
pub const STANDARD_PRESSURE_HPA: f64 = 1013.25;

/// Standard sea-level temperature (°C)
pub const STANDARD_TEMPERATURE_C: f64 = 15.0;

/// Altitude band around the base altitude where the cached atmosphere is reused (ft)
pub const ATMOSPHERE_CACHE_BAND_FT: f64 = 30.0;

/// Upper limit of the troposphere lapse-rate model (ft)
pub const TROPOSPHERE_CEILING_FT: f64 = 36089.0;

/// Default floor for the computed temperature (°C)
pub const LOWEST_TEMPERATURE_C: f64 = -130.0;

// Output rows

/// Divisor for kinetic energy in ft·lb from grains and fps
pub const ENERGY_DIVISOR: f64 = 450400.0;

/// Coefficient of the optimal game weight formula (lb)
pub const OGW_COEFFICIENT: f64 = 1.5e-12;

// Numerical tolerances

/// Exact-match tolerance for keyed trajectory lookups
pub const NUMERICAL_TOLERANCE: f64 = 1e-9;

/// Rows closer than this in time are merged in the sparse output (s)
pub const SEPARATE_ROW_TIME_DELTA: f64 = 1e-5;

/// Acceptable range error when searching for a zero (ft)
pub const ALLOWED_ZERO_ERROR_FEET: f64 = 1e-2;

/// Look angles this close to vertical are treated as straight up (rad)
pub const APEX_IS_MAX_RANGE_RADIANS: f64 = 0.0003;

/// Sentinel error returned when a probe trajectory cannot reach the target
pub const UNREACHABLE_ERROR_FT: f64 = 9e9;

/// Effectively unbounded range limit for probe trajectories (ft)
pub const UNLIMITED_RANGE_FT: f64 = 9e9;

/// Highest elevation considered by the lofted zero search (degrees)
pub const MAX_LOFTED_ELEVATION_DEG: f64 = 89.9;
