use clap::error::ErrorKind;
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::error::Error;
use std::path::PathBuf;

use ballistics_trajectory::cli_api::{render_rows, OutputFormat, ShotDefinition};
use ballistics_trajectory::constants::YARDS_TO_FEET;
use ballistics_trajectory::{
    logging, AtmosphereInput, DragModel, EngineConfig, Integrator, IntegratorKind, TrajFlags, TrajectorySolver,
    WindSegment,
};

#[derive(Parser)]
#[command(name = "ballistics-cli")]
#[command(version)]
#[command(about = "Ballistic trajectory integration and zero/max-range solving", long_about = None)]
struct Cli {
    /// Engine configuration (JSON); missing keys use defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Integration method
    #[arg(long, global = true, value_enum, default_value = "rk4")]
    integrator: IntegratorArg,

    /// Output format
    #[arg(short = 'o', long, global = true, value_enum, default_value = "table")]
    output: FormatArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Integrate a trajectory and print one row per range step and event
    Trajectory {
        #[command(flatten)]
        shot: ShotArgs,

        /// Maximum range (yards)
        #[arg(long, default_value = "1000")]
        range: f64,

        /// Row spacing (yards); 0 disables the range grid
        #[arg(long, default_value = "100")]
        step: f64,

        /// Row spacing in time (seconds); 0 disables the time grid
        #[arg(long, default_value = "0")]
        time_step: f64,

        /// Zero the barrel at this sight-line distance (yards) first
        #[arg(long)]
        zero: Option<f64>,
    },

    /// Find the barrel elevation that zeroes at a distance
    Zero {
        #[command(flatten)]
        shot: ShotArgs,

        /// Sight-line distance (yards)
        #[arg(long)]
        distance: f64,

        /// Return the high-angle solution (bracketed search only)
        #[arg(long)]
        lofted: bool,

        /// Zeroing method
        #[arg(long, value_enum, default_value = "auto")]
        method: ZeroMethod,
    },

    /// Find the elevation giving the longest sight-line range
    MaxRange {
        #[command(flatten)]
        shot: ShotArgs,

        /// Lowest elevation searched (degrees)
        #[arg(long, default_value = "0")]
        low: f64,

        /// Highest elevation searched (degrees)
        #[arg(long, default_value = "90")]
        high: f64,
    },

    /// Locate the highest point of the trajectory
    Apex {
        #[command(flatten)]
        shot: ShotArgs,
    },

    /// Display engine information
    Info,
}

#[derive(Args, Debug, Clone)]
struct ShotArgs {
    /// Shot definition (JSON); replaces every other shot option
    #[arg(long)]
    shot: Option<PathBuf>,

    /// Muzzle velocity (fps)
    #[arg(short = 'v', long, default_value = "2800")]
    velocity: f64,

    /// Ballistic coefficient
    #[arg(short = 'b', long, default_value = "0.5")]
    bc: f64,

    /// Drag model (g1, g7)
    #[arg(long, default_value = "g1")]
    drag_model: String,

    /// Drag table CSV (mach,cd); overrides --drag-model
    #[arg(long)]
    drag_table: Option<PathBuf>,

    /// Bullet weight (grains)
    #[arg(short = 'm', long, default_value = "168")]
    weight: f64,

    /// Bullet diameter (inches)
    #[arg(short = 'd', long, default_value = "0.308")]
    diameter: f64,

    /// Bullet length (inches)
    #[arg(short = 'l', long, default_value = "1.215")]
    length: f64,

    /// Barrel twist (inches per turn, negative for left hand)
    #[arg(long, default_value = "12")]
    twist: f64,

    /// Sight height above bore (inches)
    #[arg(long, default_value = "2")]
    sight_height: f64,

    /// Barrel elevation (degrees)
    #[arg(short = 'a', long, default_value = "0")]
    elevation: f64,

    /// Look angle to the target (degrees, positive uphill)
    #[arg(long, default_value = "0")]
    look_angle: f64,

    /// Cant angle (degrees)
    #[arg(long, default_value = "0")]
    cant: f64,

    /// Wind speed (fps)
    #[arg(long, default_value = "0")]
    wind_speed: f64,

    /// Direction the wind blows from (degrees, 0 = tail, 90 = from the left)
    #[arg(long, default_value = "0")]
    wind_direction: f64,

    /// Site altitude (feet)
    #[arg(long, default_value = "0")]
    altitude: f64,

    /// Station pressure (hPa); switches from ICAO standard to measured conditions
    #[arg(long)]
    pressure: Option<f64>,

    /// Temperature (°C) with --pressure, otherwise offset from standard
    #[arg(long)]
    temperature: Option<f64>,

    /// Relative humidity (percent), with --pressure
    #[arg(long, default_value = "0")]
    humidity: f64,

    /// Latitude (degrees) for Coriolis
    #[arg(long)]
    latitude: Option<f64>,

    /// Azimuth of fire (degrees from north) for Coriolis
    #[arg(long)]
    azimuth: Option<f64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum IntegratorArg {
    Euler,
    Rk4,
    Rk45,
}

impl From<IntegratorArg> for IntegratorKind {
    fn from(arg: IntegratorArg) -> Self {
        match arg {
            IntegratorArg::Euler => IntegratorKind::Euler,
            IntegratorArg::Rk4 => IntegratorKind::Rk4,
            IntegratorArg::Rk45 => IntegratorKind::Rk45,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Table,
    Json,
    Csv,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Table => OutputFormat::Table,
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Csv => OutputFormat::Csv,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum ZeroMethod {
    /// Damped iteration, falling back to Ridder's method
    Auto,
    Damped,
    Ridder,
}

#[derive(Debug, Serialize)]
struct ZeroReport {
    distance_yd: f64,
    elevation_rad: f64,
    elevation_moa: f64,
}

#[derive(Debug, Serialize)]
struct MaxRangeReport {
    range_yd: f64,
    elevation_deg: f64,
}

#[derive(Debug, Serialize)]
struct ApexReport {
    time_s: f64,
    distance_yd: f64,
    height_ft: f64,
    velocity_fps: f64,
}

impl ShotArgs {
    fn definition(&self) -> Result<ShotDefinition, Box<dyn Error>> {
        if let Some(path) = &self.shot {
            return Ok(ShotDefinition::from_json_file(path)?);
        }

        let drag_table = match &self.drag_table {
            Some(path) => ballistics_trajectory::drag::load_drag_table_csv(path)?.points(),
            None => Vec::new(),
        };
        let atmosphere = match self.pressure {
            Some(pressure_hpa) => AtmosphereInput::Measured {
                altitude_ft: self.altitude,
                pressure_hpa,
                temperature_c: self.temperature.unwrap_or(15.0),
                humidity_pct: self.humidity,
            },
            None => AtmosphereInput::Icao {
                altitude_ft: self.altitude,
                temperature_offset_c: self.temperature.unwrap_or(0.0),
            },
        };
        let winds = if self.wind_speed != 0.0 {
            vec![WindSegment::new(self.wind_speed, self.wind_direction.to_radians(), f64::INFINITY)]
        } else {
            Vec::new()
        };

        Ok(ShotDefinition {
            bc: self.bc,
            drag_table,
            drag_model: Some(self.drag_model.parse::<DragModel>()?),
            muzzle_velocity_fps: self.velocity,
            weight_grains: self.weight,
            diameter_in: self.diameter,
            length_in: self.length,
            twist_in: self.twist,
            sight_height_in: self.sight_height,
            look_angle_rad: self.look_angle.to_radians(),
            barrel_elevation_rad: self.elevation.to_radians(),
            barrel_azimuth_rad: 0.0,
            cant_angle_rad: self.cant.to_radians(),
            atmosphere,
            winds,
            latitude_deg: self.latitude,
            azimuth_deg: self.azimuth,
        })
    }
}

fn print_report<T: Serialize>(report: &T, output: FormatArg, table: impl FnOnce() -> String) -> Result<(), Box<dyn Error>> {
    match output {
        FormatArg::Table => println!("{}", table()),
        FormatArg::Json => println!("{}", serde_json::to_string_pretty(report)?),
        FormatArg::Csv => {
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            writer.serialize(report)?;
            writer.flush()?;
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    logging::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    let integrator = Integrator::from_kind(cli.integrator.into());
    let mut solver = TrajectorySolver::new(config, integrator)?;

    match cli.command {
        Commands::Trajectory {
            shot,
            range,
            step,
            time_step,
            zero,
        } => {
            let mut props = shot.definition()?.to_props()?;
            if let Some(zero_yd) = zero {
                props.barrel_elevation_rad = solver.zero_angle_with_fallback(&mut props, zero_yd * YARDS_TO_FEET)?;
            }
            let hit = solver.integrate(
                &mut props,
                range * YARDS_TO_FEET,
                step * YARDS_TO_FEET,
                time_step,
                TrajFlags::all(),
            )?;
            print!("{}", render_rows(&hit.rows, cli.output.into())?);
            if matches!(cli.output, FormatArg::Table) {
                println!("Terminated: {}", hit.termination);
            }
        }

        Commands::Zero {
            shot,
            distance,
            lofted,
            method,
        } => {
            if lofted && method == ZeroMethod::Damped {
                Cli::command()
                    .error(
                        ErrorKind::ArgumentConflict,
                        "--lofted needs the bracketed search; use --method ridder or auto",
                    )
                    .exit();
            }
            let mut props = shot.definition()?.to_props()?;
            let distance_ft = distance * YARDS_TO_FEET;
            let elevation = match method {
                ZeroMethod::Auto if !lofted => solver.zero_angle_with_fallback(&mut props, distance_ft)?,
                ZeroMethod::Damped => solver.zero_angle(&mut props, distance_ft)?,
                _ => solver.find_zero_angle(&mut props, distance_ft, lofted)?,
            };
            let report = ZeroReport {
                distance_yd: distance,
                elevation_rad: elevation,
                elevation_moa: elevation.to_degrees() * 60.0,
            };
            print_report(&report, cli.output, || {
                format!(
                    "Zero at {:.1} yd: elevation {:.6} rad ({:.2} MOA)",
                    report.distance_yd, report.elevation_rad, report.elevation_moa
                )
            })?;
        }

        Commands::MaxRange { shot, low, high } => {
            let mut props = shot.definition()?.to_props()?;
            let best = solver.find_max_range(&mut props, low, high)?;
            let report = MaxRangeReport {
                range_yd: best.range_ft / YARDS_TO_FEET,
                elevation_deg: best.angle_rad.to_degrees(),
            };
            print_report(&report, cli.output, || {
                format!(
                    "Maximum range {:.1} yd at elevation {:.3}°",
                    report.range_yd, report.elevation_deg
                )
            })?;
        }

        Commands::Apex { shot } => {
            let mut props = shot.definition()?.to_props()?;
            let top = solver.find_apex(&mut props)?;
            let report = ApexReport {
                time_s: top.time,
                distance_yd: top.position.x / YARDS_TO_FEET,
                height_ft: top.position.y,
                velocity_fps: top.velocity.norm(),
            };
            print_report(&report, cli.output, || {
                format!(
                    "Apex at {:.3} s: {:.1} yd down range, {:.2} ft high, {:.1} fps",
                    report.time_s, report.distance_yd, report.height_ft, report.velocity_fps
                )
            })?;
        }

        Commands::Info => {
            println!("╔════════════════════════════════════════╗");
            println!("║   BALLISTICS TRAJECTORY v{:<14}║", env!("CARGO_PKG_VERSION"));
            println!("╠════════════════════════════════════════╣");
            println!("║ Integrators: euler, rk4, rk45          ║");
            println!("║ Drag models: G1, G7, custom CSV        ║");
            println!("║ Solvers: zero (damped / Ridder),       ║");
            println!("║          max range, apex               ║");
            println!("╠════════════════════════════════════════╣");
            println!("║ Log level: BALLISTICS_LOG_LEVEL        ║");
            println!("╚════════════════════════════════════════╝");
        }
    }

    Ok(())
}
