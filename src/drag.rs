//! Drag tables: validated (Mach, Cd) breakpoints and their PCHIP curve

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{BallisticsError, Result};
use crate::interpolation::PchipCurve;

/// One breakpoint of a drag table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DragPoint {
    pub mach: f64,
    pub cd: f64,
}

impl DragPoint {
    pub fn new(mach: f64, cd: f64) -> Self {
        Self { mach, cd }
    }
}

/// Drag table: Mach breakpoints strictly increasing, at least two of them
#[derive(Debug, Clone, PartialEq)]
pub struct DragTable {
    pub mach_values: Vec<f64>,
    pub cd_values: Vec<f64>,
}

impl DragTable {
    /// Validate and split a list of breakpoints
    pub fn new(points: &[DragPoint]) -> Result<Self> {
        if points.len() < 2 {
            return Err(BallisticsError::InvalidDragTable(format!(
                "need at least 2 points, got {}",
                points.len()
            )));
        }
        for (i, p) in points.iter().enumerate() {
            if !p.mach.is_finite() || !p.cd.is_finite() {
                return Err(BallisticsError::InvalidDragTable(format!(
                    "point {} is not finite",
                    i
                )));
            }
            if p.mach < 0.0 || p.cd < 0.0 {
                return Err(BallisticsError::InvalidDragTable(format!(
                    "point {} has a negative value",
                    i
                )));
            }
        }
        if let Some(i) = points.windows(2).position(|w| w[1].mach <= w[0].mach) {
            return Err(BallisticsError::InvalidDragTable(format!(
                "Mach values must be strictly increasing (index {})",
                i + 1
            )));
        }

        Ok(Self {
            mach_values: points.iter().map(|p| p.mach).collect(),
            cd_values: points.iter().map(|p| p.cd).collect(),
        })
    }

    pub fn from_pairs(pairs: &[(f64, f64)]) -> Result<Self> {
        let points: Vec<DragPoint> = pairs.iter().map(|&(m, cd)| DragPoint::new(m, cd)).collect();
        Self::new(&points)
    }

    pub fn len(&self) -> usize {
        self.mach_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mach_values.is_empty()
    }

    pub fn points(&self) -> Vec<DragPoint> {
        self.mach_values
            .iter()
            .zip(self.cd_values.iter())
            .map(|(&m, &cd)| DragPoint::new(m, cd))
            .collect()
    }

    /// Build the PCHIP drag curve
    pub fn curve(&self) -> Result<DragCurve> {
        let curve = PchipCurve::new(&self.mach_values, &self.cd_values)?;
        Ok(DragCurve { curve })
    }
}

/// Drag coefficient as a function of Mach, clamped at the table ends
#[derive(Debug, Clone, PartialEq)]
pub struct DragCurve {
    curve: PchipCurve,
}

impl DragCurve {
    pub fn from_points(points: &[DragPoint]) -> Result<Self> {
        DragTable::new(points)?.curve()
    }

    #[inline]
    pub fn cd(&self, mach: f64) -> f64 {
        self.curve.eval(mach)
    }

    pub fn segment_count(&self) -> usize {
        self.curve.segments().len()
    }

    pub fn mach_values(&self) -> &[f64] {
        self.curve.knots()
    }
}

/// Load a drag table from a `mach,cd` CSV file. A header row is optional.
pub fn load_drag_table_csv<P: AsRef<Path>>(path: P) -> Result<DragTable> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_path(path)
        .map_err(|e| BallisticsError::InvalidInput(format!("cannot open {}: {}", path.display(), e)))?;

    let mut points = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| BallisticsError::InvalidDragTable(format!("{} row {}: {}", path.display(), row + 1, e)))?;
        if record.len() < 2 {
            return Err(BallisticsError::InvalidDragTable(format!(
                "{} row {}: expected mach,cd",
                path.display(),
                row + 1
            )));
        }
        match (record[0].parse::<f64>(), record[1].parse::<f64>()) {
            (Ok(mach), Ok(cd)) => points.push(DragPoint::new(mach, cd)),
            // A non-numeric first row is the header
            _ if row == 0 => continue,
            _ => {
                return Err(BallisticsError::InvalidDragTable(format!(
                    "{} row {}: cannot parse '{}', '{}'",
                    path.display(),
                    row + 1,
                    &record[0],
                    &record[1]
                )))
            }
        }
    }

    DragTable::new(&points)
}
