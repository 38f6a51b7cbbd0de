//! Projectile and environment bundle owned by one in-flight computation.

use nalgebra::Vector3;
use tracing::debug;

use crate::atmosphere::Atmosphere;
use crate::constants::{DRAG_CONSTANT, INCHES_PER_FOOT};
use crate::coriolis::Coriolis;
use crate::drag::DragCurve;
use crate::error::{BallisticsError, Result};
use crate::stability::{litz_spin_drift, miller_stability};
use crate::wind::WindSock;

/// Everything the integrators need about one shot.
///
/// Only `barrel_elevation_rad` (and `calc_step`) change once a solve starts.
#[derive(Debug, Clone)]
pub struct ShotProps {
    pub bc: f64,
    pub drag_curve: DragCurve,
    /// Bullet length (in)
    pub length_in: f64,
    /// Bullet diameter (in)
    pub diameter_in: f64,
    /// Bullet weight (grains)
    pub weight_grains: f64,
    pub muzzle_velocity_fps: f64,
    /// Inches per turn; negative for left-hand twist
    pub twist_in: f64,
    pub stability_coefficient: f64,
    pub barrel_elevation_rad: f64,
    pub barrel_azimuth_rad: f64,
    pub sight_height_ft: f64,
    pub cant_cosine: f64,
    pub cant_sine: f64,
    /// Site altitude (ft)
    pub alt0_ft: f64,
    /// Integrator step, in the integrator's own unit
    pub calc_step: f64,
    pub look_angle_rad: f64,
    pub atmo: Atmosphere,
    pub coriolis: Option<Coriolis>,
    pub wind_sock: WindSock,
    /// Set once a run has reported leaving the atmosphere envelope
    pub(crate) envelope_warned: bool,
}

impl ShotProps {
    /// Minimal shot: level, calm, no spin, no sight offset
    pub fn new(bc: f64, drag_curve: DragCurve, muzzle_velocity_fps: f64, atmo: Atmosphere) -> Result<Self> {
        if !(bc.is_finite() && bc > 0.0) {
            return Err(BallisticsError::InvalidInput(format!(
                "ballistic coefficient must be positive, got {}",
                bc
            )));
        }
        if !(muzzle_velocity_fps.is_finite() && muzzle_velocity_fps > 0.0) {
            return Err(BallisticsError::InvalidInput(format!(
                "muzzle velocity must be positive, got {}",
                muzzle_velocity_fps
            )));
        }
        let alt0_ft = atmo.a0;
        Ok(ShotProps {
            bc,
            drag_curve,
            length_in: 0.0,
            diameter_in: 0.0,
            weight_grains: 0.0,
            muzzle_velocity_fps,
            twist_in: 0.0,
            stability_coefficient: 0.0,
            barrel_elevation_rad: 0.0,
            barrel_azimuth_rad: 0.0,
            sight_height_ft: 0.0,
            cant_cosine: 1.0,
            cant_sine: 0.0,
            alt0_ft,
            calc_step: 0.0,
            look_angle_rad: 0.0,
            atmo,
            coriolis: None,
            wind_sock: WindSock::calm(),
            envelope_warned: false,
        })
    }

    pub fn set_cant(&mut self, cant_rad: f64) {
        let (sin, cos) = cant_rad.sin_cos();
        self.cant_sine = sin;
        self.cant_cosine = cos;
    }

    /// Recompute the Miller stability coefficient.
    ///
    /// On a zero denominator the coefficient is set to exactly 0 and the
    /// `ZeroDivision` error is returned for callers that care.
    pub fn update_stability_coefficient(&mut self) -> Result<()> {
        match miller_stability(
            self.weight_grains,
            self.diameter_in,
            self.length_in,
            self.twist_in,
            self.muzzle_velocity_fps,
            self.atmo.t0,
            self.atmo.p0,
        ) {
            Ok(sg) => {
                self.stability_coefficient = sg;
                Ok(())
            }
            Err(e) => {
                debug!(error = %e, "stability coefficient undefined, using 0");
                self.stability_coefficient = 0.0;
                Err(e)
            }
        }
    }

    /// Drag retardation factor at `mach`; multiply by density ratio and speed
    #[inline]
    pub fn drag_by_mach(&self, mach: f64) -> f64 {
        self.drag_curve.cd(mach) * DRAG_CONSTANT / self.bc
    }

    /// Spin drift (ft) after `time` seconds of flight
    pub fn spin_drift(&self, time: f64) -> f64 {
        litz_spin_drift(time, self.stability_coefficient, self.twist_in) / INCHES_PER_FOOT
    }

    /// Muzzle position relative to the sight
    pub fn initial_position(&self) -> Vector3<f64> {
        Vector3::new(
            0.0,
            -self.cant_cosine * self.sight_height_ft,
            -self.cant_sine * self.sight_height_ft,
        )
    }

    pub fn initial_velocity(&self) -> Vector3<f64> {
        let (sin_el, cos_el) = self.barrel_elevation_rad.sin_cos();
        let (sin_az, cos_az) = self.barrel_azimuth_rad.sin_cos();
        self.muzzle_velocity_fps * Vector3::new(cos_el * cos_az, sin_el, cos_el * sin_az)
    }

    /// Slant height (ft) of a point relative to the sight line
    #[inline]
    pub fn slant_height(&self, position: &Vector3<f64>) -> f64 {
        position.y * self.look_angle_rad.cos() - position.x * self.look_angle_rad.sin()
    }

    /// Distance (ft) of a point along the sight line
    #[inline]
    pub fn slant_distance(&self, position: &Vector3<f64>) -> f64 {
        position.x * self.look_angle_rad.cos() + position.y * self.look_angle_rad.sin()
    }
}
