//! Engine configuration and scoped overrides.

use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::path::Path;

use crate::constants::G_ACCEL_FPS2;
use crate::error::{BallisticsError, Result};

/// Tunables shared by the integrators and solvers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scales the integrator's default step
    pub step_multiplier: f64,
    /// Height tolerance for zeroing (ft), also the bracket tolerance (rad)
    pub zero_finding_accuracy: f64,
    /// Integration stops below this speed (fps). Zero disables the check.
    pub minimum_velocity: f64,
    /// Integration stops once descending below this height (ft)
    pub maximum_drop: f64,
    /// Iteration cap for the zero solvers
    pub max_iterations: usize,
    /// Gravitational acceleration (ft/s²)
    pub gravity_constant: f64,
    /// Integration stops once descending below this altitude above sea level (ft)
    pub minimum_altitude: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            step_multiplier: 1.0,
            zero_finding_accuracy: 5e-6,
            minimum_velocity: 50.0,
            maximum_drop: -15000.0,
            max_iterations: 40,
            gravity_constant: G_ACCEL_FPS2,
            minimum_altitude: -1500.0,
        }
    }
}

impl EngineConfig {
    /// Reject settings that would make integration or solving meaningless
    pub fn validate(&self) -> Result<()> {
        let finite = [
            ("step_multiplier", self.step_multiplier),
            ("zero_finding_accuracy", self.zero_finding_accuracy),
            ("minimum_velocity", self.minimum_velocity),
            ("maximum_drop", self.maximum_drop),
            ("gravity_constant", self.gravity_constant),
            ("minimum_altitude", self.minimum_altitude),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(BallisticsError::InvalidInput(format!("{} must be finite", name)));
            }
        }
        if self.step_multiplier <= 0.0 {
            return Err(BallisticsError::InvalidInput(
                "step_multiplier must be positive".to_string(),
            ));
        }
        if self.zero_finding_accuracy <= 0.0 {
            return Err(BallisticsError::InvalidInput(
                "zero_finding_accuracy must be positive".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(BallisticsError::InvalidInput(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.minimum_velocity < 0.0 {
            return Err(BallisticsError::InvalidInput(
                "minimum_velocity cannot be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse a (possibly partial) JSON document; missing keys keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| BallisticsError::InvalidInput(format!("config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            BallisticsError::InvalidInput(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    /// Patch the config for the lifetime of the returned guard
    pub fn scoped(&mut self) -> ConfigOverride<'_> {
        ConfigOverride::new(self)
    }
}

/// Restores the wrapped configuration when dropped.
///
/// Solver entry points patch limits through this guard so the caller's values
/// come back on success, on `?` returns and on unwinding.
pub struct ConfigOverride<'a> {
    target: &'a mut EngineConfig,
    saved: EngineConfig,
}

impl<'a> ConfigOverride<'a> {
    pub fn new(target: &'a mut EngineConfig) -> Self {
        let saved = *target;
        ConfigOverride { target, saved }
    }

    /// Values in effect before the guard was taken
    pub fn saved(&self) -> &EngineConfig {
        &self.saved
    }
}

impl Deref for ConfigOverride<'_> {
    type Target = EngineConfig;

    fn deref(&self) -> &EngineConfig {
        self.target
    }
}

impl DerefMut for ConfigOverride<'_> {
    fn deref_mut(&mut self) -> &mut EngineConfig {
        self.target
    }
}

impl Drop for ConfigOverride<'_> {
    fn drop(&mut self) {
        *self.target = self.saved;
    }
}
