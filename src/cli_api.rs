// CLI API module - shot definitions, batch solving and output rendering
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::atmosphere::AtmosphereInput;
use crate::config::EngineConfig;
use crate::constants::{INCHES_PER_FOOT, YARDS_TO_FEET};
use crate::coriolis::Coriolis;
use crate::drag::{DragPoint, DragTable};
use crate::drag_model::DragModel;
use crate::error::{BallisticsError, Result};
use crate::integrators::Integrator;
use crate::shot_props::ShotProps;
use crate::trajectory_data::{HitResult, TrajFlags, TrajectoryData};
use crate::trajectory_solver::TrajectorySolver;
use crate::wind::{WindSegment, WindSock};

/// Wind layer as it appears in shot files
pub type WindInput = WindSegment;

// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl FromStr for OutputFormat {
    type Err = BallisticsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(BallisticsError::InvalidInput(format!("unknown output format '{}'", other))),
        }
    }
}

/// Everything needed to build one shot.
///
/// A non-empty `drag_table` takes precedence over `drag_model`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShotDefinition {
    pub bc: f64,
    pub drag_table: Vec<DragPoint>,
    pub drag_model: Option<DragModel>,
    pub muzzle_velocity_fps: f64,
    pub weight_grains: f64,
    pub diameter_in: f64,
    pub length_in: f64,
    /// Inches per turn; negative for left-hand twist
    pub twist_in: f64,
    pub sight_height_in: f64,
    pub look_angle_rad: f64,
    pub barrel_elevation_rad: f64,
    pub barrel_azimuth_rad: f64,
    pub cant_angle_rad: f64,
    pub atmosphere: AtmosphereInput,
    pub winds: Vec<WindInput>,
    pub latitude_deg: Option<f64>,
    pub azimuth_deg: Option<f64>,
}

impl Default for ShotDefinition {
    fn default() -> Self {
        Self {
            bc: 0.5,
            drag_table: Vec::new(),
            drag_model: Some(DragModel::G1),
            muzzle_velocity_fps: 2800.0,
            weight_grains: 168.0,
            diameter_in: 0.308,
            length_in: 1.215,
            twist_in: 12.0,
            sight_height_in: 2.0,
            look_angle_rad: 0.0,
            barrel_elevation_rad: 0.0,
            barrel_azimuth_rad: 0.0,
            cant_angle_rad: 0.0,
            atmosphere: AtmosphereInput::default(),
            winds: Vec::new(),
            latitude_deg: None,
            azimuth_deg: None,
        }
    }
}

impl ShotDefinition {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| BallisticsError::InvalidInput(format!("shot definition: {}", e)))
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| BallisticsError::InvalidInput(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    fn check_finite(&self) -> Result<()> {
        let fields = [
            ("bc", self.bc),
            ("muzzle_velocity_fps", self.muzzle_velocity_fps),
            ("weight_grains", self.weight_grains),
            ("diameter_in", self.diameter_in),
            ("length_in", self.length_in),
            ("twist_in", self.twist_in),
            ("sight_height_in", self.sight_height_in),
            ("look_angle_rad", self.look_angle_rad),
            ("barrel_elevation_rad", self.barrel_elevation_rad),
            ("barrel_azimuth_rad", self.barrel_azimuth_rad),
            ("cant_angle_rad", self.cant_angle_rad),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(BallisticsError::InvalidInput(format!("{} must be finite, got {}", name, value)));
            }
        }
        for (name, value) in [("weight_grains", self.weight_grains), ("diameter_in", self.diameter_in), ("length_in", self.length_in)] {
            if value < 0.0 {
                return Err(BallisticsError::InvalidInput(format!("{} must not be negative, got {}", name, value)));
            }
        }
        Ok(())
    }

    /// Validate and build the per-solve shot state
    pub fn to_props(&self) -> Result<ShotProps> {
        self.check_finite()?;

        let curve = if self.drag_table.is_empty() {
            self.drag_model.unwrap_or(DragModel::G1).curve().clone()
        } else {
            DragTable::new(&self.drag_table)?.curve()?
        };
        let atmo = self.atmosphere.build()?;

        let mut props = ShotProps::new(self.bc, curve, self.muzzle_velocity_fps, atmo)?;
        props.weight_grains = self.weight_grains;
        props.diameter_in = self.diameter_in;
        props.length_in = self.length_in;
        props.twist_in = self.twist_in;
        props.sight_height_ft = self.sight_height_in / INCHES_PER_FOOT;
        props.look_angle_rad = self.look_angle_rad;
        props.barrel_elevation_rad = self.barrel_elevation_rad;
        props.barrel_azimuth_rad = self.barrel_azimuth_rad;
        props.set_cant(self.cant_angle_rad);
        props.wind_sock = WindSock::new(self.winds.clone())?;
        props.coriolis = Coriolis::new(self.latitude_deg, self.azimuth_deg)?;

        // Without bullet geometry the coefficient stays 0 and spin drift is off
        let _ = props.update_stability_coefficient();
        Ok(props)
    }
}

fn default_range_ft() -> f64 {
    1000.0 * YARDS_TO_FEET
}

fn default_range_step_ft() -> f64 {
    100.0 * YARDS_TO_FEET
}

/// One entry of a batch: a shot, an optional zero and the sampling grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotRequest {
    #[serde(flatten)]
    pub shot: ShotDefinition,
    /// Re-zero the barrel at this sight-line distance before integrating
    #[serde(default)]
    pub zero_distance_ft: Option<f64>,
    #[serde(default = "default_range_ft")]
    pub range_ft: f64,
    #[serde(default = "default_range_step_ft")]
    pub range_step_ft: f64,
    #[serde(default)]
    pub time_step_s: f64,
}

impl Default for ShotRequest {
    fn default() -> Self {
        Self {
            shot: ShotDefinition::default(),
            zero_distance_ft: None,
            range_ft: default_range_ft(),
            range_step_ft: default_range_step_ft(),
            time_step_s: 0.0,
        }
    }
}

/// Result of one request
#[derive(Debug, Clone, Serialize)]
pub struct ShotSolution {
    pub barrel_elevation_rad: f64,
    pub hit: HitResult,
}

/// Zero (if asked) and integrate a single request
pub fn solve_shot(request: &ShotRequest, config: &EngineConfig, integrator: Integrator) -> Result<ShotSolution> {
    let mut props = request.shot.to_props()?;
    let mut solver = TrajectorySolver::new(*config, integrator)?;

    if let Some(distance_ft) = request.zero_distance_ft {
        props.barrel_elevation_rad = solver.zero_angle_with_fallback(&mut props, distance_ft)?;
    }
    let hit = solver.integrate(
        &mut props,
        request.range_ft,
        request.range_step_ft,
        request.time_step_s,
        TrajFlags::all(),
    )?;
    Ok(ShotSolution {
        barrel_elevation_rad: props.barrel_elevation_rad,
        hit,
    })
}

/// Solve independent requests in parallel; each gets its own shot state and
/// configuration copy
pub fn solve_batch(requests: &[ShotRequest], config: &EngineConfig, integrator: Integrator) -> Vec<Result<ShotSolution>> {
    requests
        .par_iter()
        .map(|request| solve_shot(request, config, integrator))
        .collect()
}

/// Flat row for CSV output
#[derive(Debug, Serialize)]
struct CsvRow {
    time_s: f64,
    distance_ft: f64,
    velocity_fps: f64,
    mach: f64,
    height_ft: f64,
    slant_height_ft: f64,
    drop_angle_rad: f64,
    windage_ft: f64,
    windage_angle_rad: f64,
    slant_distance_ft: f64,
    angle_rad: f64,
    density_ratio: f64,
    drag: f64,
    energy_ftlb: f64,
    ogw_lb: f64,
    flags: String,
}

impl From<&TrajectoryData> for CsvRow {
    fn from(row: &TrajectoryData) -> Self {
        CsvRow {
            time_s: row.time,
            distance_ft: row.distance,
            velocity_fps: row.velocity,
            mach: row.mach,
            height_ft: row.height,
            slant_height_ft: row.slant_height,
            drop_angle_rad: row.drop_angle,
            windage_ft: row.windage,
            windage_angle_rad: row.windage_angle,
            slant_distance_ft: row.slant_distance,
            angle_rad: row.angle,
            density_ratio: row.density_ratio,
            drag: row.drag,
            energy_ftlb: row.energy,
            ogw_lb: row.ogw,
            flags: row.flags.to_string(),
        }
    }
}

fn csv_error(e: impl std::fmt::Display) -> BallisticsError {
    BallisticsError::Runtime(format!("csv output: {}", e))
}

/// Render trajectory rows in the requested format
pub fn render_rows(rows: &[TrajectoryData], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(rows).map_err(|e| BallisticsError::Runtime(e.to_string())),
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            for row in rows {
                writer.serialize(CsvRow::from(row)).map_err(csv_error)?;
            }
            let bytes = writer.into_inner().map_err(csv_error)?;
            String::from_utf8(bytes).map_err(csv_error)
        }
        OutputFormat::Table => {
            let mut out = String::new();
            out.push_str(&format!(
                "{:>8} {:>10} {:>9} {:>6} {:>10} {:>10} {:>10} {:>10} {:>10}  {}\n",
                "Time(s)", "Range(yd)", "Vel(fps)", "Mach", "Height(in)", "Slant(in)", "Drop(mil)", "Wind(in)", "Energy", "Flags"
            ));
            out.push_str(&"-".repeat(104));
            out.push('\n');
            for row in rows {
                out.push_str(&format!(
                    "{:>8.3} {:>10.1} {:>9.1} {:>6.3} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10.0}  {}\n",
                    row.time,
                    row.distance / YARDS_TO_FEET,
                    row.velocity,
                    row.mach,
                    row.height * INCHES_PER_FOOT,
                    row.slant_height * INCHES_PER_FOOT,
                    row.drop_angle * 1000.0,
                    row.windage * INCHES_PER_FOOT,
                    row.energy,
                    row.flags
                ));
            }
            Ok(out)
        }
    }
}
