//! Atmosphere model for trajectory integration.
//!
//! A base state (altitude, pressure, temperature, humidity) is resolved once
//! with the CIPM density formula or the ICAO standard atmosphere; the
//! integrators then query [`Atmosphere::update`] at every recorded altitude.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{
    ATMOSPHERE_CACHE_BAND_FT, DEGREES_C_TO_K, FEET_TO_METERS, LAPSE_RATE_K_PER_FOOT,
    LOWEST_TEMPERATURE_C, METERS_TO_FEET, PRESSURE_EXPONENT, SPEED_OF_SOUND_METRIC,
    STANDARD_DENSITY_METRIC, STANDARD_PRESSURE_HPA, STANDARD_TEMPERATURE_C, TROPOSPHERE_CEILING_FT,
};
use crate::error::{BallisticsError, Result};

/// ICAO Standard Atmosphere layer definitions
#[derive(Debug, Clone)]
struct AtmosphereLayer {
    /// Base altitude of this layer (m)
    base_altitude: f64,
    /// Base temperature at layer start (K)
    base_temperature: f64,
    /// Base pressure at layer start (Pa)
    base_pressure: f64,
    /// Temperature lapse rate (K/m)
    lapse_rate: f64,
}

const G_ACCEL_MPS2: f64 = 9.80665;
const R_AIR: f64 = 287.0531; // Specific gas constant for dry air (J/(kg·K))

/// CIPM constants
const R: f64 = 8.314472; // Universal gas constant
const M_A: f64 = 28.96546e-3; // Molar mass of dry air (kg/mol)
const M_V: f64 = 18.01528e-3; // Molar mass of water vapor (kg/mol)

/// ICAO layers up to the stratopause, which covers any ballistic apex
const ICAO_LAYERS: &[AtmosphereLayer] = &[
    // Troposphere (0 - 11 km)
    AtmosphereLayer {
        base_altitude: 0.0,
        base_temperature: 288.15,
        base_pressure: 101325.0,
        lapse_rate: -0.0065,
    },
    // Tropopause (11 - 20 km)
    AtmosphereLayer {
        base_altitude: 11000.0,
        base_temperature: 216.65,
        base_pressure: 22632.1,
        lapse_rate: 0.0,
    },
    // Stratosphere 1 (20 - 32 km)
    AtmosphereLayer {
        base_altitude: 20000.0,
        base_temperature: 216.65,
        base_pressure: 5474.89,
        lapse_rate: 0.001,
    },
    // Stratosphere 2 (32 - 47 km)
    AtmosphereLayer {
        base_altitude: 32000.0,
        base_temperature: 228.65,
        base_pressure: 868.02,
        lapse_rate: 0.0028,
    },
];

/// ICAO standard temperature (K) and pressure (Pa) at `altitude_m`
fn icao_standard_conditions(altitude_m: f64) -> (f64, f64) {
    let altitude = altitude_m.clamp(-1000.0, 47000.0);

    let layer = ICAO_LAYERS
        .iter()
        .rev()
        .find(|layer| altitude >= layer.base_altitude)
        .unwrap_or(&ICAO_LAYERS[0]);

    let height_diff = altitude - layer.base_altitude;
    let temperature = layer.base_temperature + layer.lapse_rate * height_diff;

    let pressure = if layer.lapse_rate.abs() < 1e-10 {
        layer.base_pressure * (-G_ACCEL_MPS2 * height_diff / (R_AIR * layer.base_temperature)).exp()
    } else {
        let temp_ratio = temperature / layer.base_temperature;
        layer.base_pressure * temp_ratio.powf(-G_ACCEL_MPS2 / (layer.lapse_rate * R_AIR))
    };

    (temperature, pressure)
}

/// Air density (kg/m³) from the CIPM-2007 equation
pub fn air_density_cipm(temp_c: f64, pressure_hpa: f64, humidity_percent: f64) -> f64 {
    let t_k = temp_c + DEGREES_C_TO_K;
    let p_sv = saturation_vapor_pressure(t_k);
    let f = enhancement_factor(pressure_hpa, temp_c);
    let p_v = humidity_percent.clamp(0.0, 100.0) / 100.0 * f * p_sv;
    let x_v = p_v / pressure_hpa;
    let z = compressibility_factor(pressure_hpa, t_k, x_v);

    // hPa -> Pa
    ((pressure_hpa * M_A) / (z * R * t_k)) * (1.0 - x_v * (1.0 - M_V / M_A)) * 100.0
}

/// Saturation vapor pressure (hPa), IAPWS-IF97 formulation
#[inline(always)]
fn saturation_vapor_pressure(t_k: f64) -> f64 {
    const A: [f64; 6] = [
        -7.85951783,
        1.84408259,
        -11.7866497,
        22.6807411,
        -15.9618719,
        1.80122502,
    ];

    let t_k_safe = t_k.max(173.15);
    let tau = 1.0 - t_k_safe / 647.096;
    let ln_p_ratio = (647.096 / t_k_safe)
        * (A[0] * tau
            + A[1] * tau.powf(1.5)
            + A[2] * tau.powf(3.0)
            + A[3] * tau.powf(3.5)
            + A[4] * tau.powf(4.0)
            + A[5] * tau.powf(7.5));

    220640.0 * ln_p_ratio.exp()
}

#[inline(always)]
fn enhancement_factor(p: f64, t: f64) -> f64 {
    const ALPHA: f64 = 1.00062;
    const BETA: f64 = 3.14e-8;
    const GAMMA: f64 = 5.6e-7;

    ALPHA + BETA * p + GAMMA * t * t
}

#[inline(always)]
fn compressibility_factor(p: f64, t_k: f64, x_v: f64) -> f64 {
    const A0: f64 = 1.58123e-6;
    const A1: f64 = -2.9331e-8;
    const A2: f64 = 1.1043e-10;
    const B0: f64 = 5.707e-6;
    const B1: f64 = -2.051e-8;
    const C0: f64 = 1.9898e-4;
    const C1: f64 = -2.376e-6;
    const D: f64 = 1.83e-11;
    const E: f64 = -0.765e-8;

    let t_k_safe = t_k.max(173.15);
    let t = t_k_safe - DEGREES_C_TO_K;
    let p_t = p / t_k_safe;

    1.0 - p_t * (A0 + A1 * t + A2 * t * t + (B0 + B1 * t) * x_v + (C0 + C1 * t) * x_v * x_v)
        + p_t * p_t * (D + E * x_v * x_v)
}

/// Speed of sound (fps) at a temperature in °C
#[inline]
fn mach_fps(temp_c: f64) -> f64 {
    (temp_c + DEGREES_C_TO_K).sqrt() * SPEED_OF_SOUND_METRIC * METERS_TO_FEET
}

/// Input description of the firing-site atmosphere
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AtmosphereInput {
    /// ICAO standard at the site altitude, shifted by a temperature offset
    Icao {
        altitude_ft: f64,
        #[serde(default)]
        temperature_offset_c: f64,
    },
    /// Measured station conditions
    Measured {
        altitude_ft: f64,
        pressure_hpa: f64,
        temperature_c: f64,
        #[serde(default)]
        humidity_pct: f64,
    },
}

impl Default for AtmosphereInput {
    fn default() -> Self {
        AtmosphereInput::Icao {
            altitude_ft: 0.0,
            temperature_offset_c: 0.0,
        }
    }
}

impl AtmosphereInput {
    pub fn build(&self) -> Result<Atmosphere> {
        match *self {
            AtmosphereInput::Icao {
                altitude_ft,
                temperature_offset_c,
            } => Atmosphere::icao(altitude_ft, temperature_offset_c),
            AtmosphereInput::Measured {
                altitude_ft,
                pressure_hpa,
                temperature_c,
                humidity_pct,
            } => Atmosphere::new(altitude_ft, pressure_hpa, temperature_c, humidity_pct),
        }
    }
}

/// Base atmospheric state with the lapse-rate model for other altitudes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Atmosphere {
    /// Base temperature (°C)
    pub t0: f64,
    /// Base altitude (ft)
    pub a0: f64,
    /// Base pressure (hPa)
    pub p0: f64,
    /// Base humidity (%)
    pub humidity: f64,
    /// Speed of sound at the base (fps)
    pub mach: f64,
    /// Base density relative to the standard 1.225 kg/m³
    pub density_ratio: f64,
    /// Floor for temperatures computed by the lapse-rate model (°C)
    pub lowest_temp_c: f64,
}

impl Atmosphere {
    /// Station conditions: altitude (ft), pressure (hPa), temperature (°C), humidity (%)
    pub fn new(altitude_ft: f64, pressure_hpa: f64, temperature_c: f64, humidity_pct: f64) -> Result<Self> {
        for (name, v) in [
            ("altitude", altitude_ft),
            ("pressure", pressure_hpa),
            ("temperature", temperature_c),
            ("humidity", humidity_pct),
        ] {
            if !v.is_finite() {
                return Err(BallisticsError::InvalidInput(format!("atmosphere {} must be finite", name)));
            }
        }
        if pressure_hpa <= 0.0 {
            return Err(BallisticsError::InvalidInput(format!(
                "atmosphere pressure must be positive, got {}",
                pressure_hpa
            )));
        }
        if temperature_c <= -DEGREES_C_TO_K {
            return Err(BallisticsError::InvalidInput(format!(
                "atmosphere temperature {} °C is below absolute zero",
                temperature_c
            )));
        }

        let density = air_density_cipm(temperature_c, pressure_hpa, humidity_pct);
        Ok(Atmosphere {
            t0: temperature_c,
            a0: altitude_ft,
            p0: pressure_hpa,
            humidity: humidity_pct.clamp(0.0, 100.0),
            mach: mach_fps(temperature_c),
            density_ratio: density / STANDARD_DENSITY_METRIC,
            lowest_temp_c: LOWEST_TEMPERATURE_C,
        })
    }

    /// ICAO standard conditions at `altitude_ft`, with the temperature shifted by `temperature_offset_c`
    pub fn icao(altitude_ft: f64, temperature_offset_c: f64) -> Result<Self> {
        if !altitude_ft.is_finite() || !temperature_offset_c.is_finite() {
            return Err(BallisticsError::InvalidInput(
                "ICAO atmosphere needs finite altitude and offset".to_string(),
            ));
        }
        let (temp_k, pressure_pa) = icao_standard_conditions(altitude_ft * FEET_TO_METERS);
        Self::new(
            altitude_ft,
            pressure_pa / 100.0,
            temp_k - DEGREES_C_TO_K + temperature_offset_c,
            0.0,
        )
    }

    /// Sea-level ICAO standard atmosphere
    pub fn standard() -> Self {
        let density = air_density_cipm(STANDARD_TEMPERATURE_C, STANDARD_PRESSURE_HPA, 0.0);
        Atmosphere {
            t0: STANDARD_TEMPERATURE_C,
            a0: 0.0,
            p0: STANDARD_PRESSURE_HPA,
            humidity: 0.0,
            mach: mach_fps(STANDARD_TEMPERATURE_C),
            density_ratio: density / STANDARD_DENSITY_METRIC,
            lowest_temp_c: LOWEST_TEMPERATURE_C,
        }
    }

    pub fn with_lowest_temperature(mut self, lowest_temp_c: f64) -> Self {
        self.lowest_temp_c = lowest_temp_c;
        self
    }

    /// Temperature (°C) at `altitude_ft` after clamping to the physical and configured floors.
    ///
    /// Called for every sample, so clamping is only logged at debug level;
    /// see [`Atmosphere::within_envelope`] for a per-run check.
    pub fn temperature_at(&self, altitude_ft: f64) -> f64 {
        let mut celsius = self.lapse_temperature(altitude_ft);
        if altitude_ft > TROPOSPHERE_CEILING_FT {
            debug!(altitude_ft, "density request above troposphere ceiling");
        }
        if celsius < -DEGREES_C_TO_K {
            debug!(celsius, "computed temperature below absolute zero, clamping");
            celsius = -DEGREES_C_TO_K;
        } else if celsius < self.lowest_temp_c {
            debug!(celsius, floor = self.lowest_temp_c, "computed temperature below configured minimum, clamping");
            celsius = self.lowest_temp_c;
        }
        celsius
    }

    /// Whether the lapse-rate model holds at `altitude_ft` without clamping
    pub fn within_envelope(&self, altitude_ft: f64) -> bool {
        altitude_ft <= TROPOSPHERE_CEILING_FT
            && self.lapse_temperature(altitude_ft) >= self.lowest_temp_c.max(-DEGREES_C_TO_K)
    }

    fn lapse_temperature(&self, altitude_ft: f64) -> f64 {
        (altitude_ft - self.a0) * LAPSE_RATE_K_PER_FOOT + self.t0
    }

    /// Density ratio and speed of sound (fps) at `altitude_ft`.
    ///
    /// Within 30 ft of the base altitude the base values are returned unchanged.
    pub fn update(&self, altitude_ft: f64) -> (f64, f64) {
        if (self.a0 - altitude_ft).abs() < ATMOSPHERE_CACHE_BAND_FT {
            return (self.density_ratio, self.mach);
        }

        let celsius = self.temperature_at(altitude_ft);
        let kelvin = celsius + DEGREES_C_TO_K;
        let base_kelvin = self.t0 + DEGREES_C_TO_K;
        let pressure = self.p0
            * (1.0 + LAPSE_RATE_K_PER_FOOT * (altitude_ft - self.a0) / base_kelvin)
                .max(0.0)
                .powf(PRESSURE_EXPONENT);
        let density_ratio = self.density_ratio * (base_kelvin * pressure) / (self.p0 * kelvin);
        (density_ratio, kelvin.sqrt() * SPEED_OF_SOUND_METRIC * METERS_TO_FEET)
    }
}

impl Default for Atmosphere {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_icao_standard_conditions() {
        let (temp, press) = icao_standard_conditions(0.0);
        assert!((temp - 288.15).abs() < 0.01);
        assert!((press - 101325.0).abs() < 1.0);

        let (temp_11km, press_11km) = icao_standard_conditions(11000.0);
        assert!((temp_11km - 216.65).abs() < 0.01);
        assert!(press_11km < 101325.0);

        let (temp_25km, _) = icao_standard_conditions(25000.0);
        assert!(temp_25km > 216.65);
    }

    #[test]
    fn test_cipm_density() {
        let density = air_density_cipm(15.0, 1013.25, 0.0);
        assert!((density - 1.225).abs() < 0.01);

        let density_humid = air_density_cipm(15.0, 1013.25, 50.0);
        assert!(density_humid < density);
    }

    #[test]
    fn test_standard_base() {
        let atmo = Atmosphere::standard();
        assert!((atmo.density_ratio - 1.0).abs() < 0.01);
        // ~1116 fps at 15 °C
        assert!((atmo.mach - 1116.4).abs() < 1.0);
    }

    #[test]
    fn test_update_within_cache_band() {
        let atmo = Atmosphere::standard();
        let (ratio, mach) = atmo.update(29.0);
        assert_eq!(ratio, atmo.density_ratio);
        assert_eq!(mach, atmo.mach);
    }

    #[test]
    fn test_update_thins_with_altitude() {
        let atmo = Atmosphere::standard();
        let (ratio_5k, mach_5k) = atmo.update(5000.0);
        assert!(ratio_5k < atmo.density_ratio);
        assert!(mach_5k < atmo.mach);
        // Standard density ratio at 5000 ft is about 0.862
        assert_relative_eq!(ratio_5k / atmo.density_ratio, 0.8617, epsilon = 0.005);
    }

    #[test]
    fn test_temperature_clamp() {
        let atmo = Atmosphere::standard().with_lowest_temperature(-20.0);
        let t = atmo.temperature_at(30000.0);
        assert_eq!(t, -20.0);
        let (ratio, mach) = atmo.update(30000.0);
        assert!(ratio.is_finite() && ratio > 0.0);
        assert_relative_eq!(mach, mach_fps(-20.0), epsilon = 1e-9);
    }

    #[test]
    fn test_envelope() {
        let atmo = Atmosphere::standard().with_lowest_temperature(-20.0);
        assert!(atmo.within_envelope(0.0));
        assert!(atmo.within_envelope(15000.0));
        // -20 °C is reached near 17,700 ft
        assert!(!atmo.within_envelope(20000.0));
        assert!(!Atmosphere::standard().within_envelope(TROPOSPHERE_CEILING_FT + 1.0));
    }

    #[test]
    fn test_icao_at_altitude() {
        let atmo = Atmosphere::icao(5000.0, 0.0).unwrap();
        assert!((atmo.t0 - 5.1).abs() < 0.1);
        assert!(atmo.density_ratio < 0.9);

        let warm = Atmosphere::icao(5000.0, 20.0).unwrap();
        assert!(warm.density_ratio < atmo.density_ratio);
    }

    #[test]
    fn test_invalid_station() {
        assert!(Atmosphere::new(0.0, 0.0, 15.0, 0.0).is_err());
        assert!(Atmosphere::new(0.0, 1013.0, -300.0, 0.0).is_err());
        assert!(Atmosphere::new(f64::NAN, 1013.0, 15.0, 0.0).is_err());
    }

    #[test]
    fn test_input_deserialize() {
        let input: AtmosphereInput = serde_json::from_str(
            r#"{ "kind": "measured", "altitude_ft": 1200.0, "pressure_hpa": 980.0, "temperature_c": 22.0 }"#,
        )
        .unwrap();
        let atmo = input.build().unwrap();
        assert_eq!(atmo.a0, 1200.0);
        assert_eq!(atmo.humidity, 0.0);
    }
}
