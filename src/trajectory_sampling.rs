//! Event filter turning the raw integrator stream into sparse, flagged rows.

use crate::constants::SEPARATE_ROW_TIME_DELTA;
use crate::error::Result;
use crate::handler::{HandlerControl, History, SampleHandler, TerminationReason};
use crate::shot_props::ShotProps;
use crate::trajectory_data::{FlaggedData, TrajEvent, TrajFlags};
use crate::trajectory_seq::{BaseTrajData, InterpKey};

/// Records grid rows and one-shot events from a sample stream.
///
/// Range rows are taken at every multiple of `range_step_ft` up to the range
/// limit, time rows at every multiple of `time_step_s`. A step of zero turns
/// that grid off. Events are searched only while their flag is live; each
/// flag is cleared once its event fires.
#[derive(Debug, Clone)]
pub struct TrajectoryDataFilter {
    filter: TrajFlags,
    range_step_ft: f64,
    time_step_s: f64,
    range_limit_ft: f64,
    look_angle: f64,
    barrel_elevation: f64,
    next_record_distance: f64,
    next_record_time: f64,
    history: History,
    records: Vec<FlaggedData>,
    started: bool,
}

impl TrajectoryDataFilter {
    pub fn new(props: &ShotProps, filter: TrajFlags, range_step_ft: f64, time_step_s: f64, range_limit_ft: f64) -> Self {
        Self {
            filter,
            range_step_ft: range_step_ft.max(0.0),
            time_step_s: time_step_s.max(0.0),
            range_limit_ft,
            look_angle: props.look_angle_rad,
            barrel_elevation: props.barrel_elevation_rad,
            next_record_distance: 0.0,
            next_record_time: 0.0,
            history: History::default(),
            records: Vec::new(),
            started: false,
        }
    }

    pub fn records(&self) -> &[FlaggedData] {
        &self.records
    }

    pub fn into_records(self) -> Vec<FlaggedData> {
        self.records
    }

    /// Events still being searched for
    pub fn live_flags(&self) -> TrajFlags {
        self.filter
    }

    /// Insert keeping time order; rows closer than the merge delta share one
    /// entry with their flags combined
    fn add_row(&mut self, data: BaseTrajData, flags: TrajFlags) {
        let idx = self.records.partition_point(|r| r.data.time < data.time);
        for neighbour in [idx.checked_sub(1), Some(idx)].into_iter().flatten() {
            if let Some(existing) = self.records.get_mut(neighbour) {
                if (existing.data.time - data.time).abs() < SEPARATE_ROW_TIME_DELTA {
                    existing.flags = existing.flags.union(flags);
                    return;
                }
            }
        }
        self.records.insert(idx, FlaggedData { data, flags });
    }

    fn start(&mut self, data: &BaseTrajData) {
        let look = self.look_angle;
        if data.mach < 1.0 {
            self.filter.remove(TrajEvent::Mach);
        }
        let slant = data.slant_height(look);
        if slant >= 0.0 {
            self.filter.remove(TrajEvent::ZeroUp);
        } else if self.barrel_elevation <= look {
            // Starts under the sight line and never rises to it
            self.filter.remove(TrajEvent::ZeroUp);
            self.filter.remove(TrajEvent::ZeroDown);
            self.filter.remove(TrajEvent::Mrt);
        }
        self.add_row(*data, TrajFlags::only(TrajEvent::Range));
        self.next_record_distance = self.range_step_ft;
        self.next_record_time = self.time_step_s;
        self.started = true;
    }

    /// Interpolated point where `key_of` reaches `value`, or the current
    /// sample when it already sits on the target
    fn locate<F>(&self, current: &BaseTrajData, key_of: F, value: f64) -> Result<Option<BaseTrajData>>
    where
        F: Fn(&BaseTrajData) -> f64,
    {
        if (key_of(current) - value).abs() < 1e-9 {
            return Ok(Some(*current));
        }
        self.history.interpolate(key_of, value)
    }

    fn record_grid(&mut self, data: &BaseTrajData) -> Result<()> {
        if self.range_step_ft > 0.0 {
            while self.next_record_distance <= data.position.x && self.next_record_distance <= self.range_limit_ft {
                let target = self.next_record_distance;
                if let Some(row) = self.locate(data, |d| d.position.x, target)? {
                    self.add_row(row, TrajFlags::only(TrajEvent::Range));
                }
                self.next_record_distance += self.range_step_ft;
            }
        }
        if self.time_step_s > 0.0 {
            while self.next_record_time <= data.time {
                let target = self.next_record_time;
                if let Some(row) = self.locate(data, |d| d.key(InterpKey::Time), target)? {
                    self.add_row(row, TrajFlags::only(TrajEvent::Range));
                }
                self.next_record_time += self.time_step_s;
            }
        }
        Ok(())
    }

    fn record_events(&mut self, prev: &BaseTrajData, data: &BaseTrajData) -> Result<()> {
        let look = self.look_angle;

        if self.filter.contains(TrajEvent::Apex) && prev.velocity.y > 0.0 && data.velocity.y <= 0.0 {
            if let Some(row) = self.locate(data, |d| d.velocity.y, 0.0)? {
                self.add_row(row, TrajFlags::only(TrajEvent::Apex));
            }
            self.filter.remove(TrajEvent::Apex);
        }

        if self.filter.contains(TrajEvent::Mach) && prev.mach >= 1.0 && data.mach < 1.0 {
            if let Some(row) = self.locate(data, |d| d.mach, 1.0)? {
                self.add_row(row, TrajFlags::only(TrajEvent::Mach));
            }
            self.filter.remove(TrajEvent::Mach);
        }

        let prev_slant = prev.slant_height(look);
        let slant = data.slant_height(look);
        if self.filter.contains(TrajEvent::ZeroUp) {
            if prev_slant < 0.0 && slant >= 0.0 {
                if let Some(row) = self.locate(data, |d| d.slant_height(look), 0.0)? {
                    self.add_row(row, TrajFlags::only(TrajEvent::ZeroUp));
                }
                self.filter.remove(TrajEvent::ZeroUp);
            }
        } else if self.filter.contains(TrajEvent::ZeroDown) && prev_slant >= 0.0 && slant < 0.0 {
            if let Some(row) = self.locate(data, |d| d.slant_height(look), 0.0)? {
                self.add_row(row, TrajFlags::only(TrajEvent::ZeroDown));
            }
            self.filter.remove(TrajEvent::ZeroDown);
        }

        if self.filter.contains(TrajEvent::Mrt) && prev.slant_velocity(look) > 0.0 && data.slant_velocity(look) <= 0.0 {
            if let Some(row) = self.locate(data, |d| d.slant_velocity(look), 0.0)? {
                self.add_row(row, TrajFlags::only(TrajEvent::Mrt));
            }
            self.filter.remove(TrajEvent::Mrt);
        }
        Ok(())
    }
}

impl SampleHandler for TrajectoryDataFilter {
    fn handle(&mut self, data: &BaseTrajData) -> Result<HandlerControl> {
        let prev = self.history.current().copied();
        self.history.push(*data);

        if !self.started {
            self.start(data);
            return Ok(HandlerControl::Continue);
        }

        self.record_grid(data)?;
        if let Some(prev) = prev {
            self.record_events(&prev, data)?;
        }
        Ok(HandlerControl::Continue)
    }

    fn finish(&mut self, _reason: TerminationReason) -> Result<()> {
        let Some(last) = self.history.current().copied() else {
            return Ok(());
        };
        let newer = self.records.last().map_or(true, |r| last.time > r.data.time);
        if newer {
            self.add_row(last, TrajFlags::NONE);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atmosphere::Atmosphere;
    use crate::drag_model::DragModel;
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector3;

    // Level-sight parabola: starts 0.2 ft under the sight line, climbs
    // through it, peaks near t = 1.5625 and falls back
    fn sample(t: f64, mach: f64) -> BaseTrajData {
        BaseTrajData::new(
            t,
            Vector3::new(1000.0 * t, 50.0 * t - 16.0 * t * t - 0.2, 0.0),
            Vector3::new(1000.0, 50.0 - 32.0 * t, 0.0),
            mach,
        )
    }

    fn filter(flags: TrajFlags, range_step: f64, time_step: f64) -> TrajectoryDataFilter {
        let mut props = ShotProps::new(0.5, DragModel::G1.curve().clone(), 1000.0, Atmosphere::standard()).unwrap();
        props.barrel_elevation_rad = 0.05;
        TrajectoryDataFilter::new(&props, flags, range_step, time_step, 3000.0)
    }

    fn run(f: &mut TrajectoryDataFilter, steps: usize, dt: f64) {
        for i in 0..=steps {
            let t = i as f64 * dt;
            let mach = 1.2 - 0.2 * t;
            f.handle(&sample(t, mach)).unwrap();
        }
        f.finish(TerminationReason::RangeReached).unwrap();
    }

    #[test]
    fn test_range_grid_rows() {
        let mut f = filter(TrajFlags::NONE, 100.0, 0.0);
        run(&mut f, 300, 0.01);
        let xs: Vec<f64> = f
            .records()
            .iter()
            .filter(|r| r.flags.contains(TrajEvent::Range))
            .map(|r| r.data.position.x)
            .collect();
        assert_eq!(xs.len(), 31);
        for (i, x) in xs.iter().enumerate() {
            assert_abs_diff_eq!(*x, 100.0 * i as f64, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_time_grid_rows() {
        let mut f = filter(TrajFlags::NONE, 0.0, 0.5);
        run(&mut f, 300, 0.01);
        let times: Vec<f64> = f.records().iter().map(|r| r.data.time).collect();
        assert_eq!(times.len(), 7);
        assert_abs_diff_eq!(times[3], 1.5, epsilon = 1e-9);
    }

    #[test]
    fn test_events_fire_once() {
        let mut f = filter(TrajFlags::all(), 0.0, 0.0);
        run(&mut f, 400, 0.01);
        let count = |e: TrajEvent| f.records().iter().filter(|r| r.flags.contains(e)).count();
        assert_eq!(count(TrajEvent::Apex), 1);
        assert_eq!(count(TrajEvent::Mach), 1);
        assert_eq!(count(TrajEvent::ZeroUp), 1);
        assert_eq!(count(TrajEvent::ZeroDown), 1);
        assert_eq!(count(TrajEvent::Mrt), 1);
        assert!(f.live_flags().iter().all(|e| e == TrajEvent::Range));

        let apex = f.records().iter().find(|r| r.flags.contains(TrajEvent::Apex)).unwrap();
        assert_abs_diff_eq!(apex.data.time, 50.0 / 32.0, epsilon = 1e-6);
        let mach = f.records().iter().find(|r| r.flags.contains(TrajEvent::Mach)).unwrap();
        assert_abs_diff_eq!(mach.data.time, 1.0, epsilon = 1e-6);
        let up = f.records().iter().find(|r| r.flags.contains(TrajEvent::ZeroUp)).unwrap();
        let down = f.records().iter().find(|r| r.flags.contains(TrajEvent::ZeroDown)).unwrap();
        assert!(up.data.time < down.data.time);
        assert_abs_diff_eq!(down.data.position.y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_rows_strictly_time_ordered() {
        let mut f = filter(TrajFlags::all(), 50.0, 0.1);
        run(&mut f, 400, 0.01);
        let rows = f.records();
        assert!(rows.windows(2).all(|w| w[1].data.time > w[0].data.time));
        assert_abs_diff_eq!(rows.last().unwrap().data.time, 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_subsonic_start_skips_mach() {
        let mut f = filter(TrajFlags::all(), 0.0, 0.0);
        f.handle(&sample(0.0, 0.8)).unwrap();
        assert!(!f.live_flags().contains(TrajEvent::Mach));
    }

    #[test]
    fn test_start_below_sight_line_aiming_low() {
        let mut props = ShotProps::new(0.5, DragModel::G1.curve().clone(), 1000.0, Atmosphere::standard()).unwrap();
        props.barrel_elevation_rad = -0.01;
        let mut f = TrajectoryDataFilter::new(&props, TrajFlags::all(), 0.0, 0.0, 1000.0);
        f.handle(&sample(0.0, 1.2)).unwrap();
        let live = f.live_flags();
        assert!(!live.contains(TrajEvent::ZeroUp));
        assert!(!live.contains(TrajEvent::ZeroDown));
        assert!(!live.contains(TrajEvent::Mrt));
        assert!(live.contains(TrajEvent::Apex));
    }

    #[test]
    fn test_coincident_rows_merge() {
        let mut f = filter(TrajFlags::all(), 0.0, 0.0);
        f.handle(&sample(0.0, 1.2)).unwrap();
        f.add_row(sample(0.0, 1.2), TrajFlags::only(TrajEvent::Mrt));
        assert_eq!(f.records().len(), 1);
        assert!(f.records()[0].flags.contains(TrajEvent::Mrt));
        assert!(f.records()[0].flags.contains(TrajEvent::Range));
    }
}
