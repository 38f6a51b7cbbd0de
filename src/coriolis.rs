//! Earth-rotation effects.
//!
//! Full 3D mode rotates the local shot frame (x down-range, y up, z right)
//! into East-North-Up, applies `-2 ω × v` and rotates back. Without a firing
//! azimuth only the horizontal flat-fire deflection is known, so integration
//! runs without Coriolis and output rows are corrected afterwards.

use nalgebra::Vector3;

use crate::constants::EARTH_ANGULAR_VELOCITY;
use crate::error::{BallisticsError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coriolis {
    pub sin_lat: f64,
    pub cos_lat: f64,
    /// East/North components of the down-range unit vector
    pub range_east: f64,
    pub range_north: f64,
    /// East/North components of the cross-range (right) unit vector
    pub cross_east: f64,
    pub cross_north: f64,
    pub flat_fire_only: bool,
}

impl Coriolis {
    /// Build from latitude and optional azimuth (degrees clockwise from north).
    ///
    /// Returns `None` when no latitude is known.
    pub fn new(latitude_deg: Option<f64>, azimuth_deg: Option<f64>) -> Result<Option<Self>> {
        let Some(lat) = latitude_deg else {
            return Ok(None);
        };
        if !lat.is_finite() || lat.abs() > 90.0 {
            return Err(BallisticsError::InvalidInput(format!(
                "latitude must be within ±90°, got {}",
                lat
            )));
        }
        let lat = lat.to_radians();
        let (sin_lat, cos_lat) = lat.sin_cos();

        let (sin_az, cos_az, flat_fire_only) = match azimuth_deg {
            Some(az) if az.is_finite() => {
                let (s, c) = az.to_radians().sin_cos();
                (s, c, false)
            }
            Some(az) => {
                return Err(BallisticsError::InvalidInput(format!(
                    "azimuth must be finite, got {}",
                    az
                )))
            }
            None => (0.0, 1.0, true),
        };

        Ok(Some(Coriolis {
            sin_lat,
            cos_lat,
            range_east: sin_az,
            range_north: cos_az,
            cross_east: cos_az,
            cross_north: -sin_az,
            flat_fire_only,
        }))
    }

    /// Coriolis acceleration (ft/s²) in the local shot frame
    pub fn acceleration_local(&self, velocity: &Vector3<f64>) -> Vector3<f64> {
        if self.flat_fire_only {
            return Vector3::zeros();
        }

        let vel_east = velocity.x * self.range_east + velocity.z * self.cross_east;
        let vel_north = velocity.x * self.range_north + velocity.z * self.cross_north;
        let vel_up = velocity.y;

        let factor = -2.0 * EARTH_ANGULAR_VELOCITY;
        let accel_east = factor * (self.cos_lat * vel_up - self.sin_lat * vel_north);
        let accel_north = factor * self.sin_lat * vel_east;
        let accel_up = factor * (-self.cos_lat * vel_east);

        Vector3::new(
            accel_east * self.range_east + accel_north * self.range_north,
            accel_up,
            accel_east * self.cross_east + accel_north * self.cross_north,
        )
    }

    /// Apply the flat-fire horizontal deflection `ω·x·sin(lat)·t` to a position.
    ///
    /// Positions are returned unchanged in full 3D mode, where integration
    /// already accounts for the rotation.
    pub fn adjust_range(&self, time: f64, position: &Vector3<f64>) -> Vector3<f64> {
        if !self.flat_fire_only {
            return *position;
        }
        let horizontal = EARTH_ANGULAR_VELOCITY * position.x * self.sin_lat * time;
        Vector3::new(position.x, position.y, position.z + horizontal)
    }
}
