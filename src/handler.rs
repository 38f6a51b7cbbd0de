//! Consumers of the raw sample stream produced by the integrators.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::trajectory_seq::{BaseTrajData, BaseTrajSeq, InterpKey};

/// Whether integration should keep going after a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerControl {
    Continue,
    Stop,
}

/// Condition that ended an integration run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    RangeReached,
    MinimumVelocity,
    MaximumDrop,
    MinimumAltitude,
    HandlerRequested,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TerminationReason::RangeReached => "range reached",
            TerminationReason::MinimumVelocity => "minimum velocity",
            TerminationReason::MaximumDrop => "maximum drop",
            TerminationReason::MinimumAltitude => "minimum altitude",
            TerminationReason::HandlerRequested => "handler requested stop",
        };
        f.write_str(s)
    }
}

/// Receives every recorded sample of an integration run
pub trait SampleHandler {
    fn handle(&mut self, data: &BaseTrajData) -> Result<HandlerControl>;

    /// Called once when the run ends, after the final sample was handled
    fn finish(&mut self, _reason: TerminationReason) -> Result<()> {
        Ok(())
    }
}

impl SampleHandler for BaseTrajSeq {
    fn handle(&mut self, data: &BaseTrajData) -> Result<HandlerControl> {
        self.push(*data)?;
        Ok(HandlerControl::Continue)
    }
}

/// Keeps the last three samples for local interpolation
#[derive(Debug, Clone, Default)]
pub(crate) struct History {
    samples: [Option<BaseTrajData>; 3],
}

impl History {
    pub(crate) fn push(&mut self, data: BaseTrajData) {
        self.samples.rotate_left(1);
        self.samples[2] = Some(data);
    }

    pub(crate) fn current(&self) -> Option<&BaseTrajData> {
        self.samples[2].as_ref()
    }

    pub(crate) fn previous(&self) -> Option<&BaseTrajData> {
        self.samples[1].as_ref()
    }

    /// Interpolate where `key_of` equals `value`, preferring PCHIP over all
    /// three samples and falling back to the last pair
    pub(crate) fn interpolate<F>(&self, key_of: F, value: f64) -> Result<Option<BaseTrajData>>
    where
        F: Fn(&BaseTrajData) -> f64,
    {
        match &self.samples {
            [Some(p0), Some(p1), Some(p2)] => {
                match BaseTrajData::interpolate_3(&key_of, value, p0, p1, p2) {
                    Ok(d) => Ok(Some(d)),
                    Err(_) => BaseTrajData::interpolate_2(&key_of, value, p1, p2).map(Some),
                }
            }
            [_, Some(p1), Some(p2)] => BaseTrajData::interpolate_2(&key_of, value, p1, p2).map(Some),
            _ => Ok(None),
        }
    }
}

/// Stops integration as soon as `key` crosses `value` and keeps the
/// interpolated point
#[derive(Debug, Clone)]
pub struct SinglePointHandler {
    key: InterpKey,
    value: f64,
    history: History,
    result: Option<BaseTrajData>,
    last: Option<BaseTrajData>,
}

impl SinglePointHandler {
    pub fn new(key: InterpKey, value: f64) -> Self {
        Self {
            key,
            value,
            history: History::default(),
            result: None,
            last: None,
        }
    }

    pub fn result(&self) -> Option<&BaseTrajData> {
        self.result.as_ref()
    }

    /// Last raw sample seen, whether or not the target was reached
    pub fn last(&self) -> Option<&BaseTrajData> {
        self.last.as_ref()
    }
}

impl SampleHandler for SinglePointHandler {
    fn handle(&mut self, data: &BaseTrajData) -> Result<HandlerControl> {
        self.last = Some(*data);
        if self.result.is_some() {
            return Ok(HandlerControl::Stop);
        }
        self.history.push(*data);

        let key = self.key;
        let current = data.key(key) - self.value;
        if current == 0.0 {
            self.result = Some(*data);
            return Ok(HandlerControl::Stop);
        }
        let crossed = self
            .history
            .previous()
            .map(|p| (p.key(key) - self.value) * current < 0.0)
            .unwrap_or(false);
        if crossed {
            self.result = self.history.interpolate(|d| d.key(key), self.value)?;
            return Ok(HandlerControl::Stop);
        }
        Ok(HandlerControl::Continue)
    }
}

/// Stops once the trajectory descends through the sight line and keeps the
/// crossing point
#[derive(Debug, Clone)]
pub struct ZeroCrossingHandler {
    look_angle: f64,
    history: History,
    crossing: Option<BaseTrajData>,
    last: Option<BaseTrajData>,
}

impl ZeroCrossingHandler {
    pub fn new(look_angle: f64) -> Self {
        Self {
            look_angle,
            history: History::default(),
            crossing: None,
            last: None,
        }
    }

    pub fn crossing(&self) -> Option<&BaseTrajData> {
        self.crossing.as_ref()
    }

    pub fn last(&self) -> Option<&BaseTrajData> {
        self.last.as_ref()
    }
}

impl SampleHandler for ZeroCrossingHandler {
    fn handle(&mut self, data: &BaseTrajData) -> Result<HandlerControl> {
        self.last = Some(*data);
        self.history.push(*data);

        let look = self.look_angle;
        let Some(prev) = self.history.previous() else {
            return Ok(HandlerControl::Continue);
        };
        if prev.slant_height(look) > 0.0 && data.slant_height(look) <= 0.0 {
            self.crossing = self.history.interpolate(|d| d.slant_height(look), 0.0)?;
            return Ok(HandlerControl::Stop);
        }
        Ok(HandlerControl::Continue)
    }
}

/// Fans each sample out to several handlers; stops when any of them stops
pub struct CompositeHandler<'a> {
    handlers: Vec<&'a mut dyn SampleHandler>,
}

impl<'a> CompositeHandler<'a> {
    pub fn new(handlers: Vec<&'a mut dyn SampleHandler>) -> Self {
        Self { handlers }
    }
}

impl SampleHandler for CompositeHandler<'_> {
    fn handle(&mut self, data: &BaseTrajData) -> Result<HandlerControl> {
        let mut control = HandlerControl::Continue;
        for handler in self.handlers.iter_mut() {
            if handler.handle(data)? == HandlerControl::Stop {
                control = HandlerControl::Stop;
            }
        }
        Ok(control)
    }

    fn finish(&mut self, reason: TerminationReason) -> Result<()> {
        for handler in self.handlers.iter_mut() {
            handler.finish(reason)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn sample(t: f64) -> BaseTrajData {
        BaseTrajData::new(
            t,
            Vector3::new(1000.0 * t, 50.0 * t - 16.0 * t * t - 0.1, 0.0),
            Vector3::new(1000.0, 50.0 - 32.0 * t, 0.0),
            1.0,
        )
    }

    #[test]
    fn test_single_point_stops_at_crossing() {
        let mut h = SinglePointHandler::new(InterpKey::PosX, 105.0);
        let mut stopped_at = None;
        for i in 0..100 {
            if h.handle(&sample(i as f64 * 0.01)).unwrap() == HandlerControl::Stop {
                stopped_at = Some(i);
                break;
            }
        }
        assert_eq!(stopped_at, Some(11));
        let p = h.result().unwrap();
        assert_relative_eq!(p.position.x, 105.0, epsilon = 1e-9);
        assert_relative_eq!(p.time, 0.105, epsilon = 1e-9);
    }

    #[test]
    fn test_single_point_exact_hit() {
        let mut h = SinglePointHandler::new(InterpKey::Time, 0.02);
        h.handle(&sample(0.0)).unwrap();
        h.handle(&sample(0.01)).unwrap();
        assert_eq!(h.handle(&sample(0.02)).unwrap(), HandlerControl::Stop);
        assert_eq!(h.result().unwrap().time, 0.02);
    }

    #[test]
    fn test_single_point_never_reached() {
        let mut h = SinglePointHandler::new(InterpKey::PosX, 1e6);
        for i in 0..10 {
            h.handle(&sample(i as f64 * 0.01)).unwrap();
        }
        assert!(h.result().is_none());
        assert_eq!(h.last().unwrap().time, 0.09);
    }

    #[test]
    fn test_zero_crossing_ignores_upward_pass() {
        let mut h = ZeroCrossingHandler::new(0.0);
        let mut i = 0;
        while h.handle(&sample(i as f64 * 0.01)).unwrap() == HandlerControl::Continue {
            i += 1;
            assert!(i < 1000);
        }
        let c = h.crossing().unwrap();
        assert!(c.velocity.y < 0.0);
        assert!(c.position.y.abs() < 1e-6);
    }

    #[test]
    fn test_composite_records_and_stops() {
        let mut seq = BaseTrajSeq::new();
        let mut point = SinglePointHandler::new(InterpKey::PosX, 55.0);
        {
            let mut composite = CompositeHandler::new(vec![&mut seq as &mut dyn SampleHandler, &mut point]);
            let mut i = 0;
            while composite.handle(&sample(i as f64 * 0.01)).unwrap() == HandlerControl::Continue {
                i += 1;
            }
            composite.finish(TerminationReason::HandlerRequested).unwrap();
        }
        assert_eq!(seq.len(), 7);
        assert!(point.result().is_some());
    }
}
