//! Trajectory integrators and the shared integration loop.
//!
//! Every integrator advances the same flight state. The loop in
//! [`integrate`] resolves atmosphere and wind at each recorded point, hands
//! the sample to the handler, checks the termination predicates and then asks
//! the integrator for the next accepted step.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{BallisticsError, Result};
use crate::handler::{HandlerControl, SampleHandler, TerminationReason};
use crate::shot_props::ShotProps;
use crate::trajectory_seq::BaseTrajData;

/// Position, velocity and clock of the projectile between steps
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlightState {
    pub time: f64,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    /// Step to attempt next (s); only the adaptive integrator changes it
    pub dt: f64,
}

/// Environment resolved at the start of a step
#[derive(Debug, Clone, Copy)]
pub struct StepEnv {
    pub density_ratio: f64,
    /// Local speed of sound (fps)
    pub mach_fps: f64,
    pub wind: Vector3<f64>,
}

/// Total acceleration on the projectile (ft/s²)
#[inline]
pub fn acceleration(
    props: &ShotProps,
    gravity: f64,
    velocity: &Vector3<f64>,
    wind: &Vector3<f64>,
    density_ratio: f64,
    mach_fps: f64,
) -> Vector3<f64> {
    let relative = velocity - wind;
    let relative_speed = relative.norm();
    let km = density_ratio * props.drag_by_mach(relative_speed / mach_fps);
    let mut accel = -km * relative_speed * relative;
    accel.y += gravity;
    if let Some(coriolis) = &props.coriolis {
        accel += coriolis.acceleration_local(velocity);
    }
    accel
}

/// One stepping strategy
pub trait Integrate {
    /// Default `calc_step` before the configured multiplier
    fn default_step(&self) -> f64;

    /// Advance `state` by one accepted step
    fn step(&self, props: &ShotProps, config: &EngineConfig, env: &StepEnv, state: &mut FlightState) -> Result<()>;
}

/// Explicit Euler; the step shrinks with speed so each step covers about `calc_step` feet
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EulerIntegrator;

impl Integrate for EulerIntegrator {
    fn default_step(&self) -> f64 {
        0.5
    }

    fn step(&self, props: &ShotProps, config: &EngineConfig, env: &StepEnv, state: &mut FlightState) -> Result<()> {
        let relative_speed = (state.velocity - env.wind).norm();
        let dt = props.calc_step / relative_speed.max(1.0);
        let accel = acceleration(
            props,
            config.gravity_constant,
            &state.velocity,
            &env.wind,
            env.density_ratio,
            env.mach_fps,
        );
        state.velocity += accel * dt;
        state.position += state.velocity * dt;
        state.time += dt;
        state.dt = dt;
        Ok(())
    }
}

/// Classical fourth-order Runge-Kutta with a fixed time step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rk4Integrator;

impl Integrate for Rk4Integrator {
    fn default_step(&self) -> f64 {
        0.0025
    }

    fn step(&self, props: &ShotProps, config: &EngineConfig, env: &StepEnv, state: &mut FlightState) -> Result<()> {
        let dt = props.calc_step;
        let f = |v: &Vector3<f64>| {
            acceleration(props, config.gravity_constant, v, &env.wind, env.density_ratio, env.mach_fps)
        };

        let v1 = state.velocity;
        let k1 = f(&v1);
        let v2 = v1 + 0.5 * dt * k1;
        let k2 = f(&v2);
        let v3 = v1 + 0.5 * dt * k2;
        let k3 = f(&v3);
        let v4 = v1 + dt * k3;
        let k4 = f(&v4);

        state.position += (dt / 6.0) * (v1 + 2.0 * v2 + 2.0 * v3 + v4);
        state.velocity += (dt / 6.0) * (k1 + 2.0 * k2 + 2.0 * k3 + k4);
        state.time += dt;
        state.dt = dt;
        Ok(())
    }
}

// Fehlberg 4(5) tableau
const A: [[f64; 5]; 6] = [
    [0.0, 0.0, 0.0, 0.0, 0.0],
    [0.25, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 32.0, 9.0 / 32.0, 0.0, 0.0, 0.0],
    [1932.0 / 2197.0, -7200.0 / 2197.0, 7296.0 / 2197.0, 0.0, 0.0],
    [439.0 / 216.0, -8.0, 3680.0 / 513.0, -845.0 / 4104.0, 0.0],
    [-8.0 / 27.0, 2.0, -3544.0 / 2565.0, 1859.0 / 4104.0, -11.0 / 40.0],
];
const B4: [f64; 6] = [25.0 / 216.0, 0.0, 1408.0 / 2565.0, 2197.0 / 4104.0, -0.2, 0.0];
const B5: [f64; 6] = [16.0 / 135.0, 0.0, 6656.0 / 12825.0, 28561.0 / 56430.0, -9.0 / 50.0, 2.0 / 55.0];

/// Runge-Kutta-Fehlberg 4(5) with local error control.
///
/// Every stage re-resolves atmosphere, drag and wind at its own trial
/// position. Wind is read without moving the sock cursor since a trial step
/// may be rejected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rk45Integrator {
    pub tolerance: f64,
    pub min_step: f64,
    pub max_step: f64,
    pub initial_step: f64,
}

impl Default for Rk45Integrator {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            min_step: 1e-6,
            max_step: 0.01,
            initial_step: 0.0025,
        }
    }
}

impl Rk45Integrator {
    /// Derivative of (position, velocity) at a trial state
    fn derivative(
        &self,
        props: &ShotProps,
        config: &EngineConfig,
        position: &Vector3<f64>,
        velocity: &Vector3<f64>,
    ) -> (Vector3<f64>, Vector3<f64>) {
        let (density_ratio, mach_fps) = props.atmo.update(props.alt0_ft + position.y);
        let wind = props.wind_sock.vector_at(position.x);
        let accel = acceleration(props, config.gravity_constant, velocity, &wind, density_ratio, mach_fps);
        (*velocity, accel)
    }

    fn growth_factor(&self, error: f64) -> f64 {
        if error == 0.0 {
            return 5.0;
        }
        (self.tolerance / error).powf(0.2).clamp(0.2, 5.0)
    }

    fn shrink_factor(&self, error: f64) -> f64 {
        (self.tolerance / error).powf(0.25).max(0.1)
    }
}

impl Integrate for Rk45Integrator {
    fn default_step(&self) -> f64 {
        self.initial_step
    }

    fn step(&self, props: &ShotProps, config: &EngineConfig, _env: &StepEnv, state: &mut FlightState) -> Result<()> {
        let mut h = if state.dt > 0.0 { state.dt } else { props.calc_step };
        h = h.min(self.max_step);

        loop {
            if h < self.min_step {
                return Err(BallisticsError::StepSizeTooSmall {
                    time: state.time,
                    step: h,
                });
            }

            let mut kp = [Vector3::zeros(); 6];
            let mut kv = [Vector3::zeros(); 6];
            for s in 0..6 {
                let mut p = state.position;
                let mut v = state.velocity;
                for j in 0..s {
                    p += h * A[s][j] * kp[j];
                    v += h * A[s][j] * kv[j];
                }
                let (dp, dv) = self.derivative(props, config, &p, &v);
                kp[s] = dp;
                kv[s] = dv;
            }

            let mut p4 = state.position;
            let mut v4 = state.velocity;
            let mut p5 = state.position;
            let mut v5 = state.velocity;
            for s in 0..6 {
                p4 += h * B4[s] * kp[s];
                v4 += h * B4[s] * kv[s];
                p5 += h * B5[s] * kp[s];
                v5 += h * B5[s] * kv[s];
            }

            let error = ((p4 - p5).norm_squared() + (v4 - v5).norm_squared()).sqrt();
            if !error.is_finite() {
                return Err(BallisticsError::Runtime(format!(
                    "non-finite error estimate at t = {}",
                    state.time
                )));
            }

            if error <= self.tolerance {
                state.position = p5;
                state.velocity = v5;
                state.time += h;
                state.dt = (h * self.growth_factor(error)).min(self.max_step);
                return Ok(());
            }
            h *= self.shrink_factor(error);
        }
    }
}

/// Integrator selection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Integrator {
    Euler(EulerIntegrator),
    Rk4(Rk4Integrator),
    Rk45(Rk45Integrator),
}

impl Default for Integrator {
    fn default() -> Self {
        Integrator::Rk4(Rk4Integrator)
    }
}

impl Integrator {
    pub fn from_kind(kind: IntegratorKind) -> Self {
        match kind {
            IntegratorKind::Euler => Integrator::Euler(EulerIntegrator),
            IntegratorKind::Rk4 => Integrator::Rk4(Rk4Integrator),
            IntegratorKind::Rk45 => Integrator::Rk45(Rk45Integrator::default()),
        }
    }

    pub fn kind(&self) -> IntegratorKind {
        match self {
            Integrator::Euler(_) => IntegratorKind::Euler,
            Integrator::Rk4(_) => IntegratorKind::Rk4,
            Integrator::Rk45(_) => IntegratorKind::Rk45,
        }
    }
}

impl Integrate for Integrator {
    fn default_step(&self) -> f64 {
        match self {
            Integrator::Euler(i) => i.default_step(),
            Integrator::Rk4(i) => i.default_step(),
            Integrator::Rk45(i) => i.default_step(),
        }
    }

    fn step(&self, props: &ShotProps, config: &EngineConfig, env: &StepEnv, state: &mut FlightState) -> Result<()> {
        match self {
            Integrator::Euler(i) => i.step(props, config, env, state),
            Integrator::Rk4(i) => i.step(props, config, env, state),
            Integrator::Rk45(i) => i.step(props, config, env, state),
        }
    }
}

/// Serializable integrator name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegratorKind {
    Euler,
    Rk4,
    Rk45,
}

impl std::str::FromStr for IntegratorKind {
    type Err = BallisticsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "euler" => Ok(IntegratorKind::Euler),
            "rk4" => Ok(IntegratorKind::Rk4),
            "rk45" | "rkf45" => Ok(IntegratorKind::Rk45),
            other => Err(BallisticsError::InvalidInput(format!("unknown integrator '{}'", other))),
        }
    }
}

fn termination(
    config: &EngineConfig,
    props: &ShotProps,
    range_limit_ft: f64,
    state: &FlightState,
    speed: f64,
) -> Option<TerminationReason> {
    if state.position.x > range_limit_ft {
        Some(TerminationReason::RangeReached)
    } else if config.minimum_velocity > 0.0 && speed < config.minimum_velocity {
        Some(TerminationReason::MinimumVelocity)
    } else if state.velocity.y <= 0.0 && state.position.y < config.maximum_drop {
        Some(TerminationReason::MaximumDrop)
    } else if state.velocity.y <= 0.0 && props.alt0_ft + state.position.y < config.minimum_altitude {
        Some(TerminationReason::MinimumAltitude)
    } else {
        None
    }
}

/// Run `integrator` from the muzzle until a termination predicate fires or
/// the handler asks to stop.
///
/// `props.calc_step` must already hold the step to use. The wind sock is
/// rewound before the first sample.
pub fn integrate<I: Integrate + ?Sized>(
    integrator: &I,
    props: &mut ShotProps,
    config: &EngineConfig,
    range_limit_ft: f64,
    handler: &mut dyn SampleHandler,
) -> Result<TerminationReason> {
    if !(props.calc_step > 0.0) {
        return Err(BallisticsError::InvalidInput(format!(
            "calc_step must be positive, got {}",
            props.calc_step
        )));
    }
    props.wind_sock.reset();

    let mut state = FlightState {
        time: 0.0,
        position: props.initial_position(),
        velocity: props.initial_velocity(),
        dt: 0.0,
    };

    loop {
        let altitude_ft = props.alt0_ft + state.position.y;
        let (density_ratio, mach_fps) = props.atmo.update(altitude_ft);
        if !props.envelope_warned && !props.atmo.within_envelope(altitude_ft) {
            props.envelope_warned = true;
            warn!(altitude_ft, time = state.time, "trajectory left the atmosphere model envelope, clamping temperature");
        }
        let wind = props.wind_sock.vector_for_range(state.position.x);
        let speed = state.velocity.norm();

        let sample = BaseTrajData::new(state.time, state.position, state.velocity, speed / mach_fps);
        if handler.handle(&sample)? == HandlerControl::Stop {
            handler.finish(TerminationReason::HandlerRequested)?;
            debug!(time = state.time, "integration stopped by handler");
            return Ok(TerminationReason::HandlerRequested);
        }

        if let Some(reason) = termination(config, props, range_limit_ft, &state, speed) {
            handler.finish(reason)?;
            debug!(time = state.time, x = state.position.x, %reason, "integration finished");
            return Ok(reason);
        }

        let env = StepEnv {
            density_ratio,
            mach_fps,
            wind,
        };
        integrator.step(props, config, &env, &mut state)?;

        if !(state.position.iter().all(|v| v.is_finite()) && state.velocity.iter().all(|v| v.is_finite())) {
            return Err(BallisticsError::Runtime(format!(
                "flight state became non-finite at t = {}",
                state.time
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atmosphere::Atmosphere;
    use crate::drag::DragCurve;
    use crate::drag::DragPoint;
    use crate::drag_model::DragModel;
    use crate::trajectory_seq::BaseTrajSeq;
    use approx::assert_abs_diff_eq;

    fn vacuum_props(elevation: f64) -> ShotProps {
        let curve = DragCurve::from_points(&[DragPoint::new(0.0, 0.0), DragPoint::new(5.0, 0.0)]).unwrap();
        let mut props = ShotProps::new(0.5, curve, 1000.0, Atmosphere::standard()).unwrap();
        props.barrel_elevation_rad = elevation;
        props
    }

    fn run(integrator: Integrator, props: &mut ShotProps, config: &EngineConfig, limit: f64) -> BaseTrajSeq {
        props.calc_step = integrator.default_step() * config.step_multiplier;
        let mut seq = BaseTrajSeq::new();
        integrate(&integrator, props, config, limit, &mut seq).unwrap();
        seq
    }

    fn no_limits() -> EngineConfig {
        EngineConfig {
            minimum_velocity: 0.0,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_vacuum_matches_parabola() {
        let config = no_limits();
        let g = config.gravity_constant;
        for integrator in [
            Integrator::Rk4(Rk4Integrator),
            Integrator::Rk45(Rk45Integrator::default()),
        ] {
            let mut props = vacuum_props(0.2);
            let seq = run(integrator, &mut props, &config, 3000.0);
            let vx = 1000.0 * 0.2f64.cos();
            let vy = 1000.0 * 0.2f64.sin();
            for d in seq.as_slice() {
                let t = d.time;
                assert_abs_diff_eq!(d.position.x, vx * t, epsilon = 1e-6);
                assert_abs_diff_eq!(d.position.y, vy * t + 0.5 * g * t * t, epsilon = 1e-6);
                assert_abs_diff_eq!(d.velocity.y, vy + g * t, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_leaving_envelope_is_reported_once_per_shot() {
        let config = no_limits();
        let mut low = vacuum_props(0.01);
        low.atmo = low.atmo.with_lowest_temperature(0.0);
        run(Integrator::default(), &mut low, &config, 3000.0);
        assert!(!low.envelope_warned);

        // Climbs past 7,500 ft, where the lapse rate crosses 0 °C
        let mut high = vacuum_props(1.4);
        high.atmo = high.atmo.with_lowest_temperature(0.0);
        run(Integrator::default(), &mut high, &config, 3000.0);
        assert!(high.envelope_warned);
        let again = run(Integrator::default(), &mut high, &config, 3000.0);
        assert!(high.envelope_warned);
        assert!(again.last().unwrap().position.y > 7500.0);
    }

    #[test]
    fn test_euler_close_to_parabola() {
        let config = no_limits();
        let mut props = vacuum_props(0.2);
        let seq = run(Integrator::Euler(EulerIntegrator), &mut props, &config, 3000.0);
        let last = seq.last().unwrap();
        let t = last.time;
        let vy = 1000.0 * 0.2f64.sin();
        let exact = vy * t + 0.5 * config.gravity_constant * t * t;
        assert!((last.position.y - exact).abs() < 0.5);
    }

    #[test]
    fn test_range_termination_appends_final_sample() {
        let config = EngineConfig::default();
        let mut props = ShotProps::new(0.5, DragModel::G1.curve().clone(), 2800.0, Atmosphere::standard()).unwrap();
        props.calc_step = Rk4Integrator.default_step();
        let mut seq = BaseTrajSeq::new();
        let reason = integrate(&Rk4Integrator, &mut props, &config, 300.0, &mut seq).unwrap();
        assert_eq!(reason, TerminationReason::RangeReached);
        assert!(seq.last().unwrap().position.x > 300.0);
        let n = seq.len();
        assert!(seq.get(n as isize - 2).unwrap().position.x <= 300.0);
    }

    #[test]
    fn test_minimum_velocity_termination() {
        let config = EngineConfig {
            minimum_velocity: 2000.0,
            ..EngineConfig::default()
        };
        let mut props = ShotProps::new(0.3, DragModel::G1.curve().clone(), 2800.0, Atmosphere::standard()).unwrap();
        props.calc_step = Rk4Integrator.default_step();
        let mut seq = BaseTrajSeq::new();
        let reason = integrate(&Rk4Integrator, &mut props, &config, 1e9, &mut seq).unwrap();
        assert_eq!(reason, TerminationReason::MinimumVelocity);
        assert!(seq.last().unwrap().velocity.norm() < 2000.0);
    }

    #[test]
    fn test_maximum_drop_termination() {
        let config = EngineConfig {
            maximum_drop: -10.0,
            minimum_velocity: 0.0,
            ..EngineConfig::default()
        };
        let mut props = vacuum_props(0.0);
        props.calc_step = 0.01;
        let mut seq = BaseTrajSeq::new();
        let reason = integrate(&Rk4Integrator, &mut props, &config, 1e9, &mut seq).unwrap();
        assert_eq!(reason, TerminationReason::MaximumDrop);
        assert!(seq.last().unwrap().position.y < -10.0);
    }

    #[test]
    fn test_minimum_altitude_termination() {
        let config = EngineConfig {
            minimum_altitude: 990.0,
            minimum_velocity: 0.0,
            ..EngineConfig::default()
        };
        let atmo = Atmosphere::icao(1000.0, 0.0).unwrap();
        let curve = DragCurve::from_points(&[DragPoint::new(0.0, 0.0), DragPoint::new(5.0, 0.0)]).unwrap();
        let mut props = ShotProps::new(0.5, curve, 1000.0, atmo).unwrap();
        props.calc_step = 0.01;
        let mut seq = BaseTrajSeq::new();
        let reason = integrate(&Rk4Integrator, &mut props, &config, 1e9, &mut seq).unwrap();
        assert_eq!(reason, TerminationReason::MinimumAltitude);
    }

    #[test]
    fn test_rk45_step_floor_is_an_error() {
        // A zero tolerance can never be met once drag makes the error estimate nonzero
        let integrator = Rk45Integrator {
            tolerance: 0.0,
            ..Rk45Integrator::default()
        };
        let mut props = ShotProps::new(0.5, DragModel::G7.curve().clone(), 2800.0, Atmosphere::standard()).unwrap();
        props.calc_step = integrator.default_step();
        let mut seq = BaseTrajSeq::new();
        let result = integrate(&integrator, &mut props, &no_limits(), 1e9, &mut seq);
        assert!(matches!(result, Err(BallisticsError::StepSizeTooSmall { .. })));
        assert_eq!(seq.len(), 1);
    }

    #[test]
    fn test_drag_slows_projectile() {
        let config = EngineConfig::default();
        let mut props = ShotProps::new(0.5, DragModel::G1.curve().clone(), 2800.0, Atmosphere::standard()).unwrap();
        let seq = run(Integrator::Rk45(Rk45Integrator::default()), &mut props, &config, 3000.0);
        let last = seq.last().unwrap();
        assert!(last.velocity.norm() < 2800.0);
        assert!(last.mach < seq.get(0).unwrap().mach);
        // Strictly increasing time
        assert!(seq.as_slice().windows(2).all(|w| w[1].time > w[0].time));
    }

    #[test]
    fn test_crosswind_pushes_right() {
        use crate::wind::{WindSegment, WindSock};
        let config = EngineConfig::default();
        let mut props = ShotProps::new(0.5, DragModel::G1.curve().clone(), 2800.0, Atmosphere::standard()).unwrap();
        props.wind_sock = WindSock::new(vec![WindSegment::new(14.67, std::f64::consts::FRAC_PI_2, 1e9)]).unwrap();
        let seq = run(Integrator::Rk4(Rk4Integrator), &mut props, &config, 1500.0);
        assert!(seq.last().unwrap().position.z > 0.5);
    }

    #[test]
    fn test_integrator_kind_parse() {
        assert_eq!("RK45".parse::<IntegratorKind>().unwrap(), IntegratorKind::Rk45);
        assert_eq!(Integrator::from_kind(IntegratorKind::Euler).kind(), IntegratorKind::Euler);
        assert!("leapfrog".parse::<IntegratorKind>().is_err());
    }
}
