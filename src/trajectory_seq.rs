//! Dense trajectory buffer with keyed PCHIP lookup.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::constants::NUMERICAL_TOLERANCE;
use crate::error::{BallisticsError, Result};
use crate::interpolation::{interpolate_2pt, interpolate_3pt};

/// Samples reserved on the first push
const INITIAL_CAPACITY: usize = 64;

/// One raw integrator sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaseTrajData {
    pub time: f64,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    /// Ground speed over local speed of sound
    pub mach: f64,
}

/// Field a lookup is keyed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpKey {
    Time,
    Mach,
    PosX,
    PosY,
    PosZ,
    VelX,
    VelY,
    VelZ,
}

impl BaseTrajData {
    pub fn new(time: f64, position: Vector3<f64>, velocity: Vector3<f64>, mach: f64) -> Self {
        Self {
            time,
            position,
            velocity,
            mach,
        }
    }

    #[inline]
    pub fn key(&self, key: InterpKey) -> f64 {
        match key {
            InterpKey::Time => self.time,
            InterpKey::Mach => self.mach,
            InterpKey::PosX => self.position.x,
            InterpKey::PosY => self.position.y,
            InterpKey::PosZ => self.position.z,
            InterpKey::VelX => self.velocity.x,
            InterpKey::VelY => self.velocity.y,
            InterpKey::VelZ => self.velocity.z,
        }
    }

    /// Height above the sight line inclined at `look_angle`
    #[inline]
    pub fn slant_height(&self, look_angle: f64) -> f64 {
        self.position.y * look_angle.cos() - self.position.x * look_angle.sin()
    }

    /// Velocity component perpendicular to the sight line
    #[inline]
    pub fn slant_velocity(&self, look_angle: f64) -> f64 {
        self.velocity.y * look_angle.cos() - self.velocity.x * look_angle.sin()
    }

    fn fields(&self) -> [f64; 8] {
        [
            self.time,
            self.position.x,
            self.position.y,
            self.position.z,
            self.velocity.x,
            self.velocity.y,
            self.velocity.z,
            self.mach,
        ]
    }

    fn from_fields(f: [f64; 8]) -> Self {
        Self {
            time: f[0],
            position: Vector3::new(f[1], f[2], f[3]),
            velocity: Vector3::new(f[4], f[5], f[6]),
            mach: f[7],
        }
    }

    /// PCHIP through three samples, keyed by `key_of`, evaluated where the key equals `value`
    pub fn interpolate_3<F>(key_of: F, value: f64, p0: &Self, p1: &Self, p2: &Self) -> Result<Self>
    where
        F: Fn(&Self) -> f64,
    {
        let (k0, k1, k2) = (key_of(p0), key_of(p1), key_of(p2));
        let (f0, f1, f2) = (p0.fields(), p1.fields(), p2.fields());
        let mut out = [0.0; 8];
        for i in 0..8 {
            out[i] = interpolate_3pt(value, k0, k1, k2, f0[i], f1[i], f2[i])?;
        }
        Ok(Self::from_fields(out))
    }

    /// Linear interpolation between two samples
    pub fn interpolate_2<F>(key_of: F, value: f64, p0: &Self, p1: &Self) -> Result<Self>
    where
        F: Fn(&Self) -> f64,
    {
        let (k0, k1) = (key_of(p0), key_of(p1));
        let (f0, f1) = (p0.fields(), p1.fields());
        let mut out = [0.0; 8];
        for i in 0..8 {
            out[i] = interpolate_2pt(value, k0, f0[i], k1, f1[i])?;
        }
        Ok(Self::from_fields(out))
    }
}

/// Append-only, time-ordered buffer of raw samples
#[derive(Debug, Clone, Default)]
pub struct BaseTrajSeq {
    buf: Vec<BaseTrajData>,
}

impl BaseTrajSeq {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub fn as_slice(&self) -> &[BaseTrajData] {
        &self.buf
    }

    pub fn last(&self) -> Option<&BaseTrajData> {
        self.buf.last()
    }

    /// Append a sample, doubling capacity when full.
    ///
    /// A failed reservation leaves the existing samples untouched.
    pub fn push(&mut self, sample: BaseTrajData) -> Result<()> {
        if self.buf.len() == self.buf.capacity() {
            let additional = self.buf.capacity().max(INITIAL_CAPACITY);
            self.buf.try_reserve_exact(additional).map_err(|_| BallisticsError::Allocation {
                requested: self.buf.len() + additional,
            })?;
        }
        self.buf.push(sample);
        Ok(())
    }

    /// Sample at `index`; negative indices count from the end
    pub fn get(&self, index: isize) -> Result<&BaseTrajData> {
        let len = self.buf.len();
        let resolved = if index < 0 {
            len.checked_sub(index.unsigned_abs())
        } else {
            Some(index as usize)
        };
        resolved
            .and_then(|i| self.buf.get(i))
            .ok_or(BallisticsError::IndexOutOfBounds {
                index: index.unsigned_abs(),
                len,
            })
    }

    /// Interpolated sample where `key` equals `value`.
    ///
    /// With `start_from_time` the bracket search starts at the first sample at
    /// or after that time and scans forward, then backward; otherwise (or if
    /// no bracket is found) a monotone binary search over the whole sequence
    /// picks the center. Fails with `Value` when no pair of adjacent samples
    /// brackets `value`.
    pub fn get_at(&self, key: InterpKey, value: f64, start_from_time: Option<f64>) -> Result<BaseTrajData> {
        self.get_at_by(|d| d.key(key), value, start_from_time)
    }

    /// Interpolated sample where the slant height above the `look_angle` sight line equals `value`
    pub fn get_at_slant_height(&self, look_angle: f64, value: f64) -> Result<BaseTrajData> {
        self.get_at_by(|d| d.slant_height(look_angle), value, None)
    }

    fn get_at_by<F>(&self, key_of: F, value: f64, start_from_time: Option<f64>) -> Result<BaseTrajData>
    where
        F: Fn(&BaseTrajData) -> f64,
    {
        let n = self.buf.len();
        if n < 3 {
            return Err(BallisticsError::Value(format!(
                "interpolation needs at least 3 samples, have {}",
                n
            )));
        }

        let bracket = start_from_time.and_then(|t| self.bracket_from_time(&key_of, value, t));
        let idx = match bracket {
            Some(i) => i,
            None => self.bisect(&key_of, value),
        };

        if (key_of(&self.buf[idx]) - value).abs() < NUMERICAL_TOLERANCE {
            return Ok(self.buf[idx]);
        }

        // The cubic only interpolates; a center with no neighbouring sign change would extrapolate
        let idx = if bracket.is_some() || self.brackets_at(&key_of, value, idx) {
            idx
        } else {
            self.bracket_from_time(&key_of, value, f64::NEG_INFINITY).ok_or_else(|| {
                BallisticsError::Value(format!("{} lies outside the sampled range", value))
            })?
        };
        if (key_of(&self.buf[idx]) - value).abs() < NUMERICAL_TOLERANCE {
            return Ok(self.buf[idx]);
        }

        let center = idx.clamp(1, n - 2);
        BaseTrajData::interpolate_3(
            &key_of,
            value,
            &self.buf[center - 1],
            &self.buf[center],
            &self.buf[center + 1],
        )
    }

    /// Index nearest to `value` inside the first bracketing pair found from `start_time`
    fn bracket_from_time<F>(&self, key_of: &F, value: f64, start_time: f64) -> Option<usize>
    where
        F: Fn(&BaseTrajData) -> f64,
    {
        let n = self.buf.len();
        let start = self.buf.partition_point(|d| d.time < start_time).min(n - 1);

        let pick = |i: usize| -> Option<usize> {
            let a = key_of(&self.buf[i]) - value;
            let b = key_of(&self.buf[i + 1]) - value;
            if a == 0.0 {
                Some(i)
            } else if a * b <= 0.0 {
                Some(if a.abs() <= b.abs() { i } else { i + 1 })
            } else {
                None
            }
        };

        (start..n - 1).find_map(pick).or_else(|| (0..start.min(n - 1)).rev().find_map(pick))
    }

    /// Whether `value` lies between the sample at `idx` and one of its neighbours
    fn brackets_at<F>(&self, key_of: &F, value: f64, idx: usize) -> bool
    where
        F: Fn(&BaseTrajData) -> f64,
    {
        let at = key_of(&self.buf[idx]) - value;
        let straddles = |j: usize| (key_of(&self.buf[j]) - value) * at <= 0.0;
        (idx > 0 && straddles(idx - 1)) || (idx + 1 < self.buf.len() && straddles(idx + 1))
    }

    /// First index at or past `value`, with direction inferred from the endpoints
    fn bisect<F>(&self, key_of: &F, value: f64) -> usize
    where
        F: Fn(&BaseTrajData) -> f64,
    {
        let n = self.buf.len();
        let ascending = key_of(&self.buf[n - 1]) >= key_of(&self.buf[0]);
        let (mut lo, mut hi) = (0usize, n - 1);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let v = key_of(&self.buf[mid]);
            let before = if ascending { v < value } else { v > value };
            if before {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        // Prefer whichever neighbour is closer
        if lo > 0 && (key_of(&self.buf[lo - 1]) - value).abs() < (key_of(&self.buf[lo]) - value).abs() {
            lo - 1
        } else {
            lo
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Parabolic flight: vx constant, vy falling under gravity
    fn parabola(n: usize) -> BaseTrajSeq {
        let mut seq = BaseTrajSeq::new();
        for i in 0..n {
            let t = i as f64 * 0.01;
            let pos = Vector3::new(2000.0 * t, 100.0 * t - 16.0 * t * t, 0.5 * t);
            let vel = Vector3::new(2000.0, 100.0 - 32.0 * t, 0.5);
            seq.push(BaseTrajData::new(t, pos, vel, 1.8 - 0.1 * t)).unwrap();
        }
        seq
    }

    #[test]
    fn test_push_grows_by_doubling() {
        let seq = parabola(200);
        assert_eq!(seq.len(), 200);
        assert!(seq.capacity() >= 200);
        assert!(seq.capacity() <= 256);
    }

    #[test]
    fn test_too_short_is_value_error() {
        let seq = parabola(2);
        assert!(matches!(
            seq.get_at(InterpKey::Time, 0.005, None),
            Err(BallisticsError::Value(_))
        ));
    }

    #[test]
    fn test_exact_match_returns_sample() {
        let seq = parabola(50);
        for (i, key) in [InterpKey::Time, InterpKey::PosX, InterpKey::VelY, InterpKey::Mach]
            .into_iter()
            .enumerate()
        {
            let sample = *seq.get(10 + i as isize).unwrap();
            let found = seq.get_at(key, sample.key(key), None).unwrap();
            assert_eq!(found, sample);
        }
    }

    #[test]
    fn test_interpolates_between_samples() {
        let seq = parabola(50);
        let d = seq.get_at(InterpKey::PosX, 205.0, None).unwrap();
        assert_relative_eq!(d.position.x, 205.0, epsilon = 1e-9);
        assert_relative_eq!(d.time, 0.1025, epsilon = 1e-9);
        let t = d.time;
        assert_relative_eq!(d.position.y, 100.0 * t - 16.0 * t * t, epsilon = 1e-6);
    }

    #[test]
    fn test_descending_key() {
        // vy decreases; apex is where vy crosses 0 at t = 3.125
        let seq = parabola(400);
        let apex = seq.get_at(InterpKey::VelY, 0.0, None).unwrap();
        assert_relative_eq!(apex.time, 3.125, epsilon = 1e-6);
        assert_relative_eq!(apex.position.y, 100.0 * 3.125 - 16.0 * 3.125 * 3.125, epsilon = 1e-3);
    }

    #[test]
    fn test_start_from_time_picks_later_crossing() {
        // Height crosses 50 ft on the way up and on the way down
        let seq = parabola(700);
        let up = seq.get_at(InterpKey::PosY, 50.0, Some(0.0)).unwrap();
        let down = seq.get_at(InterpKey::PosY, 50.0, Some(3.2)).unwrap();
        assert!(up.velocity.y > 0.0);
        assert!(down.velocity.y < 0.0);
        assert_relative_eq!(up.position.y, 50.0, epsilon = 1e-6);
        assert_relative_eq!(down.position.y, 50.0, epsilon = 1e-6);
    }

    #[test]
    fn test_start_from_time_scans_backward() {
        // x only crosses 500 ft at t = 0.25, well before the start time
        let seq = parabola(100);
        let d = seq.get_at(InterpKey::PosX, 500.0, Some(1e9)).unwrap();
        assert_relative_eq!(d.time, 0.25, epsilon = 1e-9);
        assert_relative_eq!(d.position.x, 500.0, epsilon = 1e-9);
    }

    #[test]
    fn test_out_of_domain_is_value_error() {
        // x spans 0..=1980 ft
        let seq = parabola(100);
        for value in [-50.0, 6000.0, 1e5] {
            assert!(matches!(
                seq.get_at(InterpKey::PosX, value, None),
                Err(BallisticsError::Value(_))
            ));
            assert!(matches!(
                seq.get_at(InterpKey::PosX, value, Some(0.5)),
                Err(BallisticsError::Value(_))
            ));
        }
        // Above the apex height
        assert!(matches!(
            seq.get_at(InterpKey::PosY, 500.0, None),
            Err(BallisticsError::Value(_))
        ));
        // Endpoints themselves stay reachable
        let last = *seq.last().unwrap();
        assert_eq!(seq.get_at(InterpKey::PosX, last.position.x, None).unwrap(), last);
    }

    #[test]
    fn test_slant_height_lookup() {
        let seq = parabola(400);
        let zero = seq.get_at_slant_height(0.0, 0.0).unwrap();
        assert!(zero.time.abs() < 1e-9);
        let look = 0.02;
        let hit = seq.get_at_slant_height(look, 10.0).unwrap();
        assert_relative_eq!(hit.slant_height(look), 10.0, epsilon = 1e-4);
    }

    #[test]
    fn test_negative_index() {
        let seq = parabola(10);
        assert_eq!(seq.get(-1).unwrap(), seq.last().unwrap());
        assert!(matches!(
            seq.get(10),
            Err(BallisticsError::IndexOutOfBounds { index: 10, len: 10 })
        ));
        assert!(seq.get(-11).is_err());
    }

    #[test]
    fn test_duplicate_keys_fail() {
        let mut seq = BaseTrajSeq::new();
        for i in 0..4 {
            let d = BaseTrajData::new(i as f64, Vector3::new(5.0, 0.0, 0.0), Vector3::zeros(), 1.0);
            seq.push(d).unwrap();
        }
        assert!(seq.get_at(InterpKey::PosX, 6.0, None).is_err());
    }
}
