use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::drag::{DragCurve, DragPoint, DragTable};
use crate::error::BallisticsError;

const G1_TABLE: &[(f64, f64)] = &[
    (0.0, 0.2629),
    (0.5, 0.2695),
    (0.6, 0.2752),
    (0.7, 0.2817),
    (0.8, 0.2902),
    (0.9, 0.3012),
    (1.0, 0.4805),
    (1.1, 0.5933),
    (1.2, 0.6318),
    (1.3, 0.6440),
    (1.4, 0.6444),
    (1.5, 0.6372),
    (1.6, 0.6252),
    (1.7, 0.6105),
    (1.8, 0.5956),
    (1.9, 0.5815),
    (2.0, 0.5934),
    (2.5, 0.5598),
    (3.0, 0.5133),
    (4.0, 0.4811),
    (5.0, 0.4988),
];

const G7_TABLE: &[(f64, f64)] = &[
    (0.0, 0.1198),
    (0.5, 0.1197),
    (0.6, 0.1202),
    (0.7, 0.1213),
    (0.8, 0.1240),
    (0.9, 0.1294),
    (1.0, 0.3803),
    (1.1, 0.4015),
    (1.2, 0.4043),
    (1.3, 0.3956),
    (1.4, 0.3814),
    (1.5, 0.3663),
    (1.6, 0.3520),
    (1.7, 0.3398),
    (1.8, 0.3297),
    (1.9, 0.3221),
    (2.0, 0.2980),
    (2.5, 0.2731),
    (3.0, 0.2424),
    (4.0, 0.2196),
    (5.0, 0.1618),
];

fn build_curve(pairs: &[(f64, f64)]) -> DragCurve {
    // Built-in tables are strictly increasing, so construction cannot fail
    match DragTable::from_pairs(pairs).and_then(|t| t.curve()) {
        Ok(curve) => curve,
        Err(e) => panic!("built-in drag table is invalid: {}", e),
    }
}

static G1_CURVE: Lazy<DragCurve> = Lazy::new(|| build_curve(G1_TABLE));
static G7_CURVE: Lazy<DragCurve> = Lazy::new(|| build_curve(G7_TABLE));

/// Standard reference projectiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DragModel {
    G1,
    G7,
}

impl DragModel {
    /// Breakpoints of the standard table
    pub fn table(&self) -> Vec<DragPoint> {
        let pairs = match self {
            DragModel::G1 => G1_TABLE,
            DragModel::G7 => G7_TABLE,
        };
        pairs.iter().map(|&(m, cd)| DragPoint::new(m, cd)).collect()
    }

    /// Shared PCHIP curve, built on first use
    pub fn curve(&self) -> &'static DragCurve {
        match self {
            DragModel::G1 => &G1_CURVE,
            DragModel::G7 => &G7_CURVE,
        }
    }
}

impl FromStr for DragModel {
    type Err = BallisticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "G1" => Ok(DragModel::G1),
            "G7" => Ok(DragModel::G7),
            other => Err(BallisticsError::InvalidInput(format!("unknown drag model '{}'", other))),
        }
    }
}

impl std::fmt::Display for DragModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
