//! Enriched output rows, event flags and the sparse hit result.

use serde::{Deserialize, Serialize, Serializer};

use crate::constants::{ENERGY_DIVISOR, OGW_COEFFICIENT};
use crate::handler::TerminationReason;
use crate::shot_props::ShotProps;
use crate::trajectory_seq::BaseTrajData;

/// Notable trajectory events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrajEvent {
    /// Range or time grid point
    Range,
    Apex,
    /// Transition from supersonic to subsonic
    Mach,
    /// Crossing the sight line going up
    ZeroUp,
    /// Crossing the sight line going down
    ZeroDown,
    /// Mid-range trajectory: highest point above the sight line
    Mrt,
}

impl TrajEvent {
    pub const ALL: [TrajEvent; 6] = [
        TrajEvent::Range,
        TrajEvent::Apex,
        TrajEvent::Mach,
        TrajEvent::ZeroUp,
        TrajEvent::ZeroDown,
        TrajEvent::Mrt,
    ];

    fn bit(self) -> u8 {
        match self {
            TrajEvent::Range => 1 << 0,
            TrajEvent::ZeroUp => 1 << 1,
            TrajEvent::ZeroDown => 1 << 2,
            TrajEvent::Mach => 1 << 3,
            TrajEvent::Apex => 1 << 4,
            TrajEvent::Mrt => 1 << 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TrajEvent::Range => "RANGE",
            TrajEvent::Apex => "APEX",
            TrajEvent::Mach => "MACH",
            TrajEvent::ZeroUp => "ZERO_UP",
            TrajEvent::ZeroDown => "ZERO_DOWN",
            TrajEvent::Mrt => "MRT",
        }
    }
}

/// Set of events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct TrajFlags {
    bits: u8,
}

impl TrajFlags {
    pub const NONE: TrajFlags = TrajFlags { bits: 0 };

    pub fn all() -> Self {
        TrajEvent::ALL.iter().copied().collect()
    }

    /// Both sight-line crossings
    pub fn zero() -> Self {
        [TrajEvent::ZeroUp, TrajEvent::ZeroDown].into_iter().collect()
    }

    pub fn only(event: TrajEvent) -> Self {
        Self { bits: event.bit() }
    }

    pub fn contains(&self, event: TrajEvent) -> bool {
        self.bits & event.bit() != 0
    }

    pub fn insert(&mut self, event: TrajEvent) {
        self.bits |= event.bit();
    }

    pub fn remove(&mut self, event: TrajEvent) {
        self.bits &= !event.bit();
    }

    pub fn union(self, other: TrajFlags) -> TrajFlags {
        TrajFlags {
            bits: self.bits | other.bits,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = TrajEvent> + '_ {
        TrajEvent::ALL.into_iter().filter(move |e| self.contains(*e))
    }
}

impl FromIterator<TrajEvent> for TrajFlags {
    fn from_iter<T: IntoIterator<Item = TrajEvent>>(iter: T) -> Self {
        let mut flags = TrajFlags::NONE;
        for e in iter {
            flags.insert(e);
        }
        flags
    }
}

impl std::fmt::Display for TrajFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.iter().map(TrajEvent::name).collect();
        f.write_str(&names.join("|"))
    }
}

impl Serialize for TrajFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter().map(TrajEvent::name))
    }
}

/// A raw sample tagged with the events that produced it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlaggedData {
    pub data: BaseTrajData,
    pub flags: TrajFlags,
}

/// One output row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrajectoryData {
    /// Time of flight (s)
    pub time: f64,
    /// Down-range distance (ft)
    pub distance: f64,
    /// Speed (fps)
    pub velocity: f64,
    pub mach: f64,
    /// Height above the bore-axis origin (ft)
    pub height: f64,
    /// Height above the sight line (ft)
    pub slant_height: f64,
    /// Angular drop correction relative to the sight line (rad)
    pub drop_angle: f64,
    /// Cross-range offset including spin drift (ft)
    pub windage: f64,
    pub windage_angle: f64,
    /// Distance along the sight line (ft)
    pub slant_distance: f64,
    /// Trajectory angle to horizontal (rad)
    pub angle: f64,
    pub density_ratio: f64,
    /// Drag retardation factor at this Mach
    pub drag: f64,
    /// Kinetic energy (ft·lb)
    pub energy: f64,
    /// Optimal game weight (lb)
    pub ogw: f64,
    pub flags: TrajFlags,
}

/// Angular correction for an offset at a distance
#[inline]
fn correction(distance: f64, offset: f64) -> f64 {
    if distance != 0.0 {
        (offset / distance).atan()
    } else {
        0.0
    }
}

impl TrajectoryData {
    pub fn from_flagged(props: &ShotProps, flagged: &FlaggedData) -> Self {
        Self::from_base(props, &flagged.data, flagged.flags)
    }

    pub fn from_base(props: &ShotProps, data: &BaseTrajData, flags: TrajFlags) -> Self {
        let position = match &props.coriolis {
            Some(coriolis) => coriolis.adjust_range(data.time, &data.position),
            None => data.position,
        };
        let velocity = data.velocity.norm();
        let windage = position.z + props.spin_drift(data.time);
        let look = props.look_angle_rad;
        let drop_from_sight = position.y - position.x * look.tan();
        let (density_ratio, _) = props.atmo.update(props.alt0_ft + position.y);
        let w = props.weight_grains;

        TrajectoryData {
            time: data.time,
            distance: position.x,
            velocity,
            mach: data.mach,
            height: position.y,
            slant_height: props.slant_height(&position),
            drop_angle: correction(position.x, drop_from_sight),
            windage,
            windage_angle: correction(position.x, windage),
            slant_distance: props.slant_distance(&position),
            angle: data.velocity.y.atan2(data.velocity.x),
            density_ratio,
            drag: props.drag_by_mach(data.mach),
            energy: w * velocity * velocity / ENERGY_DIVISOR,
            ogw: w * w * velocity.powi(3) * OGW_COEFFICIENT,
            flags,
        }
    }
}

/// Sparse trajectory with the reason integration ended
#[derive(Debug, Clone, Serialize)]
pub struct HitResult {
    pub rows: Vec<TrajectoryData>,
    pub termination: TerminationReason,
}

impl HitResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows carrying `event`
    pub fn flagged(&self, event: TrajEvent) -> Vec<&TrajectoryData> {
        self.rows.iter().filter(|r| r.flags.contains(event)).collect()
    }

    /// Sight-line crossings, in time order
    pub fn zeros(&self) -> Vec<&TrajectoryData> {
        self.rows
            .iter()
            .filter(|r| r.flags.contains(TrajEvent::ZeroUp) || r.flags.contains(TrajEvent::ZeroDown))
            .collect()
    }

    /// First row at or beyond `distance_ft`
    pub fn get_at_distance(&self, distance_ft: f64) -> Option<&TrajectoryData> {
        self.rows.iter().find(|r| r.distance >= distance_ft - 1e-9)
    }

    pub fn apex(&self) -> Option<&TrajectoryData> {
        self.rows.iter().find(|r| r.flags.contains(TrajEvent::Apex))
    }

    pub fn last(&self) -> Option<&TrajectoryData> {
        self.rows.last()
    }
}
