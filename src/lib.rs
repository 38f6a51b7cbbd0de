//! # Ballistics Trajectory
//!
//! Point-mass trajectory integration for small-arms projectiles, with the
//! solvers built on it: apex, zero angle and maximum range.
//!
//! A shot is described by [`ShotProps`] (or the serializable
//! [`ShotDefinition`]), integrated by one of the [`Integrator`]s and consumed
//! by a [`SampleHandler`]: a dense [`BaseTrajSeq`], the event recorder
//! [`TrajectoryDataFilter`], or a single-point search. [`TrajectorySolver`]
//! ties them together.

// Re-export the main types and functions
pub use atmosphere::{Atmosphere, AtmosphereInput};
pub use cli_api::{solve_batch, solve_shot, ShotDefinition, ShotRequest, ShotSolution, WindInput};
pub use config::{ConfigOverride, EngineConfig};
pub use coriolis::Coriolis;
pub use drag::{DragCurve, DragPoint, DragTable};
pub use drag_model::DragModel;
pub use error::{BallisticsError, Result};
pub use handler::{
    CompositeHandler, HandlerControl, SampleHandler, SinglePointHandler, TerminationReason, ZeroCrossingHandler,
};
pub use integrators::{
    integrate, EulerIntegrator, Integrate, Integrator, IntegratorKind, Rk45Integrator, Rk4Integrator,
};
pub use shot_props::ShotProps;
pub use trajectory_data::{FlaggedData, HitResult, TrajEvent, TrajFlags, TrajectoryData};
pub use trajectory_sampling::TrajectoryDataFilter;
pub use trajectory_seq::{BaseTrajData, BaseTrajSeq, InterpKey};
pub use trajectory_solver::{MaxRange, TrajectorySolver, ZeroInit};
pub use wind::{WindSegment, WindSock};

// Module declarations
pub mod angle_calculations;
pub mod atmosphere;
pub mod cli_api;
pub mod config;
pub mod constants;
pub mod coriolis;
pub mod drag;
mod drag_model;
pub mod error;
pub mod handler;
pub mod integrators;
pub mod interpolation;
pub mod logging;
mod shot_props;
pub mod stability;
pub mod trajectory_data;
mod trajectory_sampling;
pub mod trajectory_seq;
pub mod trajectory_solver;
pub mod wind;
