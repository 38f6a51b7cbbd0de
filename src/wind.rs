use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{BallisticsError, Result};

/// One wind layer, valid from the previous segment's end up to `until_distance_ft`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindSegment {
    /// Wind speed (fps)
    pub velocity_fps: f64,
    /// Direction the wind blows from, 0 = from behind the shooter,
    /// π/2 = from the left (radians)
    pub direction_from_rad: f64,
    /// Down-range distance where this segment ends (ft)
    pub until_distance_ft: f64,
}

impl WindSegment {
    pub fn new(velocity_fps: f64, direction_from_rad: f64, until_distance_ft: f64) -> Self {
        WindSegment {
            velocity_fps,
            direction_from_rad,
            until_distance_ft,
        }
    }

    /// Wind velocity in the shot frame (x down-range, z right)
    pub fn vector(&self) -> Vector3<f64> {
        Vector3::new(
            self.velocity_fps * self.direction_from_rad.cos(),
            0.0,
            self.velocity_fps * self.direction_from_rad.sin(),
        )
    }
}

/// Range-indexed wind lookup with a forward-only cursor.
///
/// Integration queries arrive with increasing range, so the active segment is
/// cached and the cursor only moves forward. Past the last segment the sock
/// reports calm air for the rest of the flight.
#[derive(Debug, Clone)]
pub struct WindSock {
    winds: Vec<WindSegment>,
    current: usize,
    next_range: f64,
    current_vec: Vector3<f64>,
}

impl WindSock {
    /// Segments must be ordered by strictly increasing `until_distance_ft`
    pub fn new(segments: Vec<WindSegment>) -> Result<Self> {
        for (i, seg) in segments.iter().enumerate() {
            if !seg.velocity_fps.is_finite()
                || !seg.direction_from_rad.is_finite()
                || seg.until_distance_ft.is_nan()
            {
                return Err(BallisticsError::InvalidInput(format!(
                    "wind segment {} has a non-finite value",
                    i
                )));
            }
        }
        if segments
            .windows(2)
            .any(|w| w[1].until_distance_ft <= w[0].until_distance_ft)
        {
            return Err(BallisticsError::InvalidInput(
                "wind segments must be ordered by increasing distance".to_string(),
            ));
        }

        let mut sock = WindSock {
            winds: segments,
            current: 0,
            next_range: f64::INFINITY,
            current_vec: Vector3::zeros(),
        };
        sock.reset();
        Ok(sock)
    }

    /// Calm air everywhere
    pub fn calm() -> Self {
        WindSock {
            winds: Vec::new(),
            current: 0,
            next_range: f64::INFINITY,
            current_vec: Vector3::zeros(),
        }
    }

    pub fn segments(&self) -> &[WindSegment] {
        &self.winds
    }

    /// Index of the active segment (equals the segment count once exhausted)
    pub fn current(&self) -> usize {
        self.current
    }

    pub fn next_range(&self) -> f64 {
        self.next_range
    }

    /// Rewind the cursor to the first segment
    pub fn reset(&mut self) {
        self.current = 0;
        match self.winds.first() {
            Some(seg) => {
                self.current_vec = seg.vector();
                self.next_range = seg.until_distance_ft;
            }
            None => {
                self.current_vec = Vector3::zeros();
                self.next_range = f64::INFINITY;
            }
        }
    }

    /// Wind vector at `range_ft`, advancing the cursor past every segment that ends at or before it
    pub fn vector_for_range(&mut self, range_ft: f64) -> Vector3<f64> {
        if range_ft.is_nan() {
            return self.current_vec;
        }
        while range_ft >= self.next_range {
            self.current += 1;
            match self.winds.get(self.current) {
                Some(seg) => {
                    self.current_vec = seg.vector();
                    self.next_range = seg.until_distance_ft;
                }
                None => {
                    self.current = self.winds.len();
                    self.current_vec = Vector3::zeros();
                    self.next_range = f64::INFINITY;
                }
            }
        }
        self.current_vec
    }

    /// Wind vector at `range_ft` without touching the cursor.
    ///
    /// Used for trial stages of adaptive steps, which may be rejected.
    pub fn vector_at(&self, range_ft: f64) -> Vector3<f64> {
        if range_ft.is_nan() {
            return self.current_vec;
        }
        self.winds[self.current.min(self.winds.len())..]
            .iter()
            .find(|seg| range_ft < seg.until_distance_ft)
            .map(WindSegment::vector)
            .unwrap_or_else(Vector3::zeros)
    }
}

impl Default for WindSock {
    fn default() -> Self {
        Self::calm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn three_layer() -> WindSock {
        WindSock::new(vec![
            WindSegment::new(10.0, FRAC_PI_2, 150.0),
            WindSegment::new(15.0, 0.0, 300.0),
            WindSegment::new(5.0, std::f64::consts::PI, 600.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_calm() {
        let mut sock = WindSock::calm();
        assert_eq!(sock.vector_for_range(50.0), Vector3::zeros());
        assert_eq!(sock.next_range(), f64::INFINITY);
    }

    #[test]
    fn test_crosswind_from_left_pushes_right() {
        let sock = WindSock::new(vec![WindSegment::new(10.0, FRAC_PI_2, 300.0)]).unwrap();
        let v = sock.vector_at(10.0);
        assert!(v.x.abs() < 1e-12);
        assert_eq!(v.y, 0.0);
        assert!((v.z - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_monotonic_advance() {
        let mut sock = three_layer();
        let mut last_index = 0;
        let mut range = 0.0;
        while range < 700.0 {
            let v = sock.vector_for_range(range);
            assert!(sock.current() >= last_index, "cursor moved backwards");
            last_index = sock.current();
            if range >= 600.0 {
                assert_eq!(v, Vector3::zeros());
                assert_eq!(sock.next_range(), f64::INFINITY);
            }
            range += 7.5;
        }
        assert_eq!(sock.current(), 3);
    }

    #[test]
    fn test_skips_multiple_segments_in_one_query() {
        let mut sock = three_layer();
        let v = sock.vector_for_range(450.0);
        assert_eq!(sock.current(), 2);
        assert!((v.x + 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_boundary_belongs_to_next_segment() {
        let mut sock = three_layer();
        let v = sock.vector_for_range(150.0);
        assert_eq!(sock.current(), 1);
        assert!((v.x - 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_stateless_matches_cursor() {
        let mut sock = three_layer();
        let lookup = sock.clone();
        for r in [0.0, 149.0, 150.0, 299.0, 320.0, 601.0] {
            assert_eq!(lookup.vector_at(r), sock.vector_for_range(r));
        }
    }

    #[test]
    fn test_reset() {
        let mut sock = three_layer();
        sock.vector_for_range(1000.0);
        sock.reset();
        assert_eq!(sock.current(), 0);
        assert_eq!(sock.next_range(), 150.0);
    }

    #[test]
    fn test_unordered_rejected() {
        let result = WindSock::new(vec![
            WindSegment::new(10.0, 0.0, 300.0),
            WindSegment::new(10.0, 0.0, 100.0),
        ]);
        assert!(result.is_err());
    }
}
