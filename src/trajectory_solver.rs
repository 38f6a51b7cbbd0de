//! Solver engine: apex, zeroing and maximum range on top of the integrators.
//!
//! Every solve patches the engine limits for its probe trajectories through
//! a [`ConfigOverride`](crate::config::ConfigOverride) and puts the barrel
//! elevation back before returning, whether it succeeds or not.

use serde::Serialize;
use std::f64::consts::FRAC_PI_2;
use tracing::{debug, warn};

use crate::angle_calculations::{golden_section_max, ridder_root_find, Bracket};
use crate::config::EngineConfig;
use crate::constants::{
    ALLOWED_ZERO_ERROR_FEET, APEX_IS_MAX_RANGE_RADIANS, MAX_LOFTED_ELEVATION_DEG, UNLIMITED_RANGE_FT,
    UNREACHABLE_ERROR_FT,
};
use crate::error::{BallisticsError, Result};
use crate::handler::{CompositeHandler, SampleHandler, SinglePointHandler, TerminationReason, ZeroCrossingHandler};
use crate::integrators::{integrate, Integrate, Integrator};
use crate::shot_props::ShotProps;
use crate::trajectory_data::{HitResult, TrajFlags, TrajectoryData};
use crate::trajectory_sampling::TrajectoryDataFilter;
use crate::trajectory_seq::{BaseTrajData, BaseTrajSeq, InterpKey};

const DAMPING_RATE: f64 = 0.7;
const MIN_DAMPING: f64 = 0.3;
const DEGENERATE_ELEVATION_RAD: f64 = 0.01;
const MAX_RANGE_ITERATIONS: usize = 100;
const MAX_RANGE_TOLERANCE_RAD: f64 = 1e-5;

/// Outcome of the zero setup step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZeroInit {
    /// The answer is known without iterating
    Done(f64),
    /// Iterate towards this target point
    Continue { target_x_ft: f64, target_y_ft: f64 },
}

/// Longest sight-line range and the elevation that reaches it
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MaxRange {
    pub range_ft: f64,
    pub angle_rad: f64,
}

/// Integrator plus configuration; one instance per concurrent solve
#[derive(Debug, Clone, Default)]
pub struct TrajectorySolver {
    pub config: EngineConfig,
    pub integrator: Integrator,
}

fn target_point(props: &ShotProps, distance_ft: f64) -> (f64, f64) {
    let look = props.look_angle_rad;
    (distance_ft * look.cos(), distance_ft * look.sin())
}

/// Loosen the termination limits so probe trajectories reach the target
fn relax_limits(config: &mut EngineConfig, props: &ShotProps, target_x_ft: f64, target_y_ft: f64) {
    let required_drop = target_x_ft / 2.0 - target_y_ft;
    config.minimum_velocity = 0.0;
    config.maximum_drop = config.maximum_drop.min(-required_drop);
    config.minimum_altitude = config.minimum_altitude.min(props.alt0_ft - required_drop);
}

/// Run one integration with the step scaled for this integrator
fn run(
    integrator: &Integrator,
    config: &EngineConfig,
    props: &mut ShotProps,
    range_limit_ft: f64,
    handler: &mut dyn SampleHandler,
) -> Result<TerminationReason> {
    props.calc_step = integrator.default_step() * config.step_multiplier;
    integrate(integrator, props, config, range_limit_ft, handler)
}

/// Evaluate `f` with the barrel elevation restored afterwards
fn preserving_elevation<T>(props: &mut ShotProps, f: impl FnOnce(&mut ShotProps) -> Result<T>) -> Result<T> {
    let saved = props.barrel_elevation_rad;
    let result = f(props);
    props.barrel_elevation_rad = saved;
    result
}

fn apex(integrator: &Integrator, config: &EngineConfig, props: &mut ShotProps) -> Result<BaseTrajData> {
    if props.barrel_elevation_rad <= 0.0 {
        return Err(BallisticsError::Value(format!(
            "barrel elevation must be positive to find apex, got {}",
            props.barrel_elevation_rad
        )));
    }
    let mut handler = SinglePointHandler::new(InterpKey::VelY, 0.0);
    run(integrator, config, props, UNLIMITED_RANGE_FT, &mut handler)?;
    handler
        .result()
        .copied()
        .ok_or_else(|| BallisticsError::Runtime("no apex found in trajectory".to_string()))
}

/// Sample at `target_x_ft`, or the last sample when the trajectory fell short
fn probe(
    integrator: &Integrator,
    config: &EngineConfig,
    props: &mut ShotProps,
    angle_rad: f64,
    target_x_ft: f64,
) -> Result<Option<BaseTrajData>> {
    props.barrel_elevation_rad = angle_rad;
    let mut handler = SinglePointHandler::new(InterpKey::PosX, target_x_ft);
    run(integrator, config, props, UNLIMITED_RANGE_FT, &mut handler)?;
    Ok(handler.result().or(handler.last()).copied())
}

fn error_at_distance(
    integrator: &Integrator,
    config: &EngineConfig,
    props: &mut ShotProps,
    angle_rad: f64,
    target_x_ft: f64,
    target_y_ft: f64,
) -> Result<f64> {
    match probe(integrator, config, props, angle_rad, target_x_ft)? {
        Some(point) if point.time > 0.0 => {
            Ok((point.position.y - target_y_ft) - (point.position.x - target_x_ft).abs())
        }
        _ => Ok(UNREACHABLE_ERROR_FT),
    }
}

fn range_for_angle(integrator: &Integrator, config: &EngineConfig, props: &mut ShotProps, angle_rad: f64) -> Result<f64> {
    props.barrel_elevation_rad = angle_rad;
    let mut handler = ZeroCrossingHandler::new(props.look_angle_rad);
    run(integrator, config, props, UNLIMITED_RANGE_FT, &mut handler)?;
    Ok(handler
        .crossing()
        .map(|c| props.slant_distance(&c.position))
        .unwrap_or(0.0))
}

fn max_range(
    integrator: &Integrator,
    config: &EngineConfig,
    props: &mut ShotProps,
    low_rad: f64,
    high_rad: f64,
) -> Result<MaxRange> {
    let look = props.look_angle_rad;
    preserving_elevation(props, |props| {
        if (look - FRAC_PI_2).abs() < APEX_IS_MAX_RANGE_RADIANS {
            props.barrel_elevation_rad = look;
            let top = apex(integrator, config, props)?;
            return Ok(MaxRange {
                range_ft: props.slant_distance(&top.position),
                angle_rad: look,
            });
        }
        let best = golden_section_max(
            |angle| range_for_angle(integrator, config, props, angle),
            low_rad,
            high_rad,
            MAX_RANGE_TOLERANCE_RAD,
            MAX_RANGE_ITERATIONS,
        )?;
        debug!(range_ft = best.value, angle_rad = best.x, iterations = best.iterations_used, "max range found");
        Ok(MaxRange {
            range_ft: best.value,
            angle_rad: best.x,
        })
    })
}

fn init_zero(integrator: &Integrator, config: &EngineConfig, props: &mut ShotProps, distance_ft: f64) -> Result<ZeroInit> {
    let look = props.look_angle_rad;
    let (target_x_ft, target_y_ft) = target_point(props, distance_ft);

    if distance_ft.abs() < ALLOWED_ZERO_ERROR_FEET {
        return Ok(ZeroInit::Done(look));
    }
    if (look - FRAC_PI_2).abs() < APEX_IS_MAX_RANGE_RADIANS {
        // Straight up: reachable only if the apex is far enough along the sight line
        let top = preserving_elevation(props, |props| {
            props.barrel_elevation_rad = look;
            apex(integrator, config, props)
        })?;
        let reach = props.slant_distance(&top.position);
        if reach < distance_ft {
            return Err(BallisticsError::OutOfRange {
                requested_ft: distance_ft,
                max_range_ft: reach,
                look_angle_rad: look,
            });
        }
        return Ok(ZeroInit::Done(look));
    }
    Ok(ZeroInit::Continue {
        target_x_ft,
        target_y_ft,
    })
}

fn damped_zero(
    integrator: &Integrator,
    config: &EngineConfig,
    props: &mut ShotProps,
    target_x_ft: f64,
) -> Result<f64> {
    let look = props.look_angle_rad;
    let accuracy = config.zero_finding_accuracy;
    let mut elevation = props.barrel_elevation_rad;

    let mut range_error = UNREACHABLE_ERROR_FT;
    let mut height_error = UNREACHABLE_ERROR_FT;
    let mut prev_range_error = UNREACHABLE_ERROR_FT;
    let mut prev_height_error = UNREACHABLE_ERROR_FT;
    let mut damping = 1.0;
    let mut last_correction = 0.0;
    let mut iterations = 0;

    let non_convergent = |height_error: f64, iterations: usize, elevation: f64, reason: &str| BallisticsError::ZeroFinding {
        error_ft: height_error,
        iterations,
        last_elevation_rad: elevation,
        reason: reason.to_string(),
    };

    while iterations < config.max_iterations {
        let Some(point) = probe(integrator, config, props, elevation, target_x_ft)? else {
            break;
        };
        if point.time == 0.0 {
            break;
        }
        let x = point.position.x;
        if 2.0 * x < target_x_ft && elevation == 0.0 && look < 1.5 {
            elevation = DEGENERATE_ELEVATION_RAD;
            iterations += 1;
            continue;
        }

        let height_diff = point.slant_height(look);
        height_error = height_diff.abs();
        range_error = (x - target_x_ft).abs();
        let trajectory_angle = point.velocity.y.atan2(point.velocity.x);
        let sensitivity = (elevation - look).tan() * (trajectory_angle - look).tan();
        let look_distance = x / look.cos();
        let denominator = if sensitivity < -0.5 {
            look_distance
        } else {
            look_distance * (1.0 + sensitivity)
        };
        if denominator.abs() <= 1e-9 {
            return Err(non_convergent(height_error, iterations, elevation, "correction denominator is zero"));
        }
        let mut correction = -height_diff / denominator;

        if range_error > ALLOWED_ZERO_ERROR_FEET {
            if range_error > prev_range_error - 1e-6 {
                return Err(non_convergent(height_error, iterations, elevation, "Distance non-convergent"));
            }
        } else if height_error > prev_height_error.abs() {
            damping *= DAMPING_RATE;
            if damping < MIN_DAMPING {
                return Err(non_convergent(height_error, iterations, elevation, "Error non-convergent"));
            }
            elevation -= last_correction;
            correction = last_correction;
        } else if damping < 1.0 {
            damping = 1.0;
        }
        prev_range_error = range_error;
        prev_height_error = height_error;

        debug!(iterations, elevation, height_error, range_error, damping, "zero iteration");

        if height_error > accuracy || range_error > ALLOWED_ZERO_ERROR_FEET {
            let applied = correction * damping;
            elevation += applied;
            last_correction = applied;
        } else {
            break;
        }
        iterations += 1;
    }

    if height_error > accuracy || range_error > ALLOWED_ZERO_ERROR_FEET {
        return Err(non_convergent(
            height_error,
            iterations,
            elevation,
            "zero iteration did not reach the required accuracy",
        ));
    }
    Ok(elevation)
}

fn bracketed_zero(
    integrator: &Integrator,
    config: &EngineConfig,
    props: &mut ShotProps,
    distance_ft: f64,
    target_x_ft: f64,
    target_y_ft: f64,
    lofted: bool,
) -> Result<f64> {
    let look = props.look_angle_rad;
    let accuracy = config.zero_finding_accuracy;

    let reach = max_range(integrator, config, props, 0.0, FRAC_PI_2)?;
    if distance_ft > reach.range_ft {
        return Err(BallisticsError::OutOfRange {
            requested_ft: distance_ft,
            max_range_ft: reach.range_ft,
            look_angle_rad: look,
        });
    }

    let (low, high) = if lofted {
        (reach.angle_rad, MAX_LOFTED_ELEVATION_DEG.to_radians())
    } else {
        // A muzzle above the sight line can need a barrel below it
        let sight_adjust = ((-props.sight_height_ft).max(0.0) / target_x_ft).atan();
        (look - sight_adjust, reach.angle_rad)
    };

    let mut objective = |angle: f64| error_at_distance(integrator, config, props, angle, target_x_ft, target_y_ft);
    let f_low = objective(low)?;
    let f_high = objective(high)?;
    let bracket = Bracket {
        low,
        high,
        f_low,
        f_high,
    };
    if !bracket.is_sign_changing() {
        return Err(BallisticsError::ZeroFinding {
            error_ft: f_low.abs().min(f_high.abs()),
            iterations: 0,
            last_elevation_rad: low,
            reason: format!(
                "zero angle is not bracketed: error {:.6} at {:.6} rad, {:.6} at {:.6} rad",
                f_low, low, f_high, high
            ),
        });
    }

    let result = ridder_root_find(&mut objective, bracket, accuracy, config.max_iterations)?;
    if result.success {
        return Ok(result.angle_rad);
    }

    let last = result.bracket;
    if last.width() < 10.0 * accuracy {
        Ok(0.5 * (last.low + last.high))
    } else if last.f_low.abs() < 10.0 * accuracy {
        Ok(last.low)
    } else if last.f_high.abs() < 10.0 * accuracy {
        Ok(last.high)
    } else {
        Err(BallisticsError::ZeroFinding {
            error_ft: result.final_error,
            iterations: result.iterations_used,
            last_elevation_rad: result.angle_rad,
            reason: "Ridder's method did not converge".to_string(),
        })
    }
}

impl TrajectorySolver {
    pub fn new(config: EngineConfig, integrator: Integrator) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, integrator })
    }

    /// Integrate with a caller-supplied handler
    pub fn integrate_with(
        &self,
        props: &mut ShotProps,
        range_limit_ft: f64,
        handler: &mut dyn SampleHandler,
    ) -> Result<TerminationReason> {
        run(&self.integrator, &self.config, props, range_limit_ft, handler)
    }

    /// Every raw sample up to the range limit
    pub fn integrate_dense(&self, props: &mut ShotProps, range_limit_ft: f64) -> Result<(BaseTrajSeq, TerminationReason)> {
        let mut seq = BaseTrajSeq::new();
        let reason = self.integrate_with(props, range_limit_ft, &mut seq)?;
        Ok((seq, reason))
    }

    /// Sparse rows on the range/time grids plus the events in `filter`
    pub fn integrate(
        &self,
        props: &mut ShotProps,
        range_limit_ft: f64,
        range_step_ft: f64,
        time_step_s: f64,
        filter: TrajFlags,
    ) -> Result<HitResult> {
        let mut recorder = TrajectoryDataFilter::new(props, filter, range_step_ft, time_step_s, range_limit_ft);
        let termination = self.integrate_with(props, range_limit_ft, &mut recorder)?;
        Ok(Self::hit_result(props, recorder, termination))
    }

    /// Dense samples and sparse rows from a single pass
    pub fn integrate_recorded(
        &self,
        props: &mut ShotProps,
        range_limit_ft: f64,
        range_step_ft: f64,
        time_step_s: f64,
        filter: TrajFlags,
    ) -> Result<(BaseTrajSeq, HitResult)> {
        let mut seq = BaseTrajSeq::new();
        let mut recorder = TrajectoryDataFilter::new(props, filter, range_step_ft, time_step_s, range_limit_ft);
        let termination = {
            let mut composite = CompositeHandler::new(vec![&mut seq as &mut dyn SampleHandler, &mut recorder]);
            self.integrate_with(props, range_limit_ft, &mut composite)?
        };
        Ok((seq, Self::hit_result(props, recorder, termination)))
    }

    fn hit_result(props: &ShotProps, recorder: TrajectoryDataFilter, termination: TerminationReason) -> HitResult {
        let rows = recorder
            .into_records()
            .iter()
            .map(|flagged| TrajectoryData::from_flagged(props, flagged))
            .collect();
        HitResult { rows, termination }
    }

    /// Highest point of the trajectory at the current barrel elevation
    pub fn find_apex(&mut self, props: &mut ShotProps) -> Result<BaseTrajData> {
        let integrator = &self.integrator;
        let mut config = self.config.scoped();
        config.minimum_velocity = 0.0;
        apex(integrator, &config, props)
    }

    /// Signed miss at the target for barrel elevation `angle_rad`
    ///
    /// Returns `(height - target_y) - |x - target_x|`, or a large sentinel
    /// when the trajectory ends before producing a usable sample.
    pub fn error_at_distance(
        &mut self,
        props: &mut ShotProps,
        angle_rad: f64,
        target_x_ft: f64,
        target_y_ft: f64,
    ) -> Result<f64> {
        let integrator = &self.integrator;
        let mut config = self.config.scoped();
        relax_limits(&mut config, props, target_x_ft, target_y_ft);
        preserving_elevation(props, |props| {
            error_at_distance(integrator, &config, props, angle_rad, target_x_ft, target_y_ft)
        })
    }

    /// Resolve trivial zeroing cases or return the target to iterate towards
    pub fn init_zero_calculation(&mut self, props: &mut ShotProps, distance_ft: f64) -> Result<ZeroInit> {
        let integrator = &self.integrator;
        let (target_x_ft, target_y_ft) = target_point(props, distance_ft);
        let mut config = self.config.scoped();
        relax_limits(&mut config, props, target_x_ft, target_y_ft);
        init_zero(integrator, &config, props, distance_ft)
    }

    /// Barrel elevation zeroing the sight line at `distance_ft`, by damped
    /// fixed-point iteration starting from the current elevation
    pub fn zero_angle(&mut self, props: &mut ShotProps, distance_ft: f64) -> Result<f64> {
        let integrator = &self.integrator;
        let (target_x_ft, target_y_ft) = target_point(props, distance_ft);
        let mut config = self.config.scoped();
        relax_limits(&mut config, props, target_x_ft, target_y_ft);
        preserving_elevation(props, |props| match init_zero(integrator, &config, props, distance_ft)? {
            ZeroInit::Done(angle) => Ok(angle),
            ZeroInit::Continue { target_x_ft, .. } => damped_zero(integrator, &config, props, target_x_ft),
        })
    }

    /// Elevation between `low_deg` and `high_deg` giving the longest
    /// sight-line range
    pub fn find_max_range(&mut self, props: &mut ShotProps, low_deg: f64, high_deg: f64) -> Result<MaxRange> {
        let integrator = &self.integrator;
        let mut config = self.config.scoped();
        config.minimum_velocity = 0.0;
        max_range(integrator, &config, props, low_deg.to_radians(), high_deg.to_radians())
    }

    /// Barrel elevation zeroing at `distance_ft` by Ridder's method on a
    /// guaranteed bracket; `lofted` selects the solution above the
    /// max-range angle
    pub fn find_zero_angle(&mut self, props: &mut ShotProps, distance_ft: f64, lofted: bool) -> Result<f64> {
        let integrator = &self.integrator;
        let (target_x_ft, target_y_ft) = target_point(props, distance_ft);
        let mut config = self.config.scoped();
        relax_limits(&mut config, props, target_x_ft, target_y_ft);
        preserving_elevation(props, |props| match init_zero(integrator, &config, props, distance_ft)? {
            ZeroInit::Done(angle) => Ok(angle),
            ZeroInit::Continue {
                target_x_ft,
                target_y_ft,
            } => bracketed_zero(integrator, &config, props, distance_ft, target_x_ft, target_y_ft, lofted),
        })
    }

    /// Damped iteration first, then Ridder's method if it fails for any reason
    pub fn zero_angle_with_fallback(&mut self, props: &mut ShotProps, distance_ft: f64) -> Result<f64> {
        match self.zero_angle(props, distance_ft) {
            Ok(angle) => Ok(angle),
            Err(e) => {
                warn!(error = %e, distance_ft, "zero iteration failed, falling back to Ridder's method");
                self.find_zero_angle(props, distance_ft, false)
            }
        }
    }
}
