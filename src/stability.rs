use crate::error::{BallisticsError, Result};

/// hPa per inch of mercury
const HPA_PER_INHG: f64 = 33.8639;

/// Miller gyroscopic stability factor.
///
/// Dimensions in inches, weight in grains, velocity in fps; the atmospheric
/// correction takes the site temperature (°C) and pressure (hPa).
///
/// Fails with `ZeroDivision` when twist, length, diameter or pressure is zero
/// (or any denominator term vanishes). Callers that must not fail treat that
/// as a stability of exactly 0.
pub fn miller_stability(
    weight_grains: f64,
    diameter_in: f64,
    length_in: f64,
    twist_in: f64,
    muzzle_velocity_fps: f64,
    temperature_c: f64,
    pressure_hpa: f64,
) -> Result<f64> {
    if twist_in == 0.0 || length_in == 0.0 || diameter_in == 0.0 || pressure_hpa == 0.0 {
        return Err(BallisticsError::ZeroDivision(
            "stability needs non-zero twist, length, diameter and pressure".to_string(),
        ));
    }

    let twist_rate = twist_in.abs() / diameter_in;
    let length = length_in / diameter_in;
    let denominator = twist_rate.powi(2) * diameter_in.powi(3) * length * (1.0 + length.powi(2));
    if denominator == 0.0 {
        return Err(BallisticsError::ZeroDivision(
            "stability geometry term vanished".to_string(),
        ));
    }

    let sd = 30.0 * weight_grains / denominator;
    let fv = (muzzle_velocity_fps / 2800.0).powf(1.0 / 3.0);

    let temperature_f = temperature_c * 9.0 / 5.0 + 32.0;
    let pressure_inhg = pressure_hpa / HPA_PER_INHG;
    let ftp = ((temperature_f + 460.0) / (59.0 + 460.0)) * (29.92 / pressure_inhg);

    Ok(sd * fv * ftp)
}

/// Litz spin drift approximation in inches.
///
/// Drift follows the twist direction: right-hand (positive) twist drifts right.
pub fn litz_spin_drift(time_s: f64, stability: f64, twist_in: f64) -> f64 {
    if stability == 0.0 || twist_in == 0.0 || time_s <= 0.0 {
        return 0.0;
    }
    twist_in.signum() * 1.25 * (stability + 1.2) * time_s.powf(1.83)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_308_match_bullet() {
        // 168 gr, .308", 1.215" long, 1:12 twist, 2600 fps, standard atmosphere
        let sg = miller_stability(168.0, 0.308, 1.215, 12.0, 2600.0, 15.0, 1013.25).unwrap();
        assert!(sg > 1.3 && sg < 2.2, "sg = {}", sg);
    }

    #[test]
    fn test_faster_twist_is_more_stable() {
        let slow = miller_stability(175.0, 0.308, 1.24, 12.0, 2650.0, 15.0, 1013.25).unwrap();
        let fast = miller_stability(175.0, 0.308, 1.24, 10.0, 2650.0, 15.0, 1013.25).unwrap();
        assert!(fast > slow);
    }

    #[test]
    fn test_thin_air_raises_stability() {
        let sea = miller_stability(175.0, 0.308, 1.24, 11.0, 2650.0, 15.0, 1013.25).unwrap();
        let high = miller_stability(175.0, 0.308, 1.24, 11.0, 2650.0, 15.0, 800.0).unwrap();
        assert!(high > sea);
    }

    #[test]
    fn test_zero_terms_are_zero_division() {
        for (twist, length, diameter, pressure) in [
            (0.0, 1.2, 0.308, 1013.0),
            (10.0, 0.0, 0.308, 1013.0),
            (10.0, 1.2, 0.0, 1013.0),
            (10.0, 1.2, 0.308, 0.0),
        ] {
            let r = miller_stability(175.0, diameter, length, twist, 2650.0, 15.0, pressure);
            assert!(matches!(r, Err(BallisticsError::ZeroDivision(_))));
        }
    }

    #[test]
    fn test_spin_drift_follows_twist() {
        let right = litz_spin_drift(1.5, 1.8, 10.0);
        let left = litz_spin_drift(1.5, 1.8, -10.0);
        assert!(right > 0.0);
        assert_eq!(left, -right);
        // 1.25 * 3.0 * 1.5^1.83
        assert!((right - 1.25 * 3.0 * 1.5f64.powf(1.83)).abs() < 1e-12);
    }

    #[test]
    fn test_spin_drift_zero_cases() {
        assert_eq!(litz_spin_drift(0.0, 1.8, 10.0), 0.0);
        assert_eq!(litz_spin_drift(1.0, 0.0, 10.0), 0.0);
        assert_eq!(litz_spin_drift(1.0, 1.8, 0.0), 0.0);
    }
}
