//! # Telemetry Scheduler
//!
//! Drives one sampling cycle per read interval and owns every piece of
//! tick-mutated state: the enabled mask, the chart buffers, the cached data
//! settings and the active day.
//!
//! ## Tick
//!
//! Each tick runs synchronously from start to finish:
//!
//! 1. Read every enabled tube from the [`SensorSource`]
//! 2. Append each reading to its tube's CSV file
//! 3. On day rollover (including the first tick), let the retention policy
//!    evict at most one old day directory
//! 4. Push the readings into the chart buffers
//! 5. Classify every tube that produced a reading
//! 6. Hand unhealthy tubes to the [`AlertDispatcher`], which delivers on its
//!    own task
//! 7. Publish a [`BufferSnapshot`] for rendering
//!
//! A sensor or disk fault on one tube is logged and never stops the others.
//!
//! ## Running
//!
//! [`TelemetryScheduler::start`] moves the scheduler onto a tokio task and
//! returns a [`SchedulerHandle`]. Settings and tube status changes are sent as
//! commands and applied between ticks, never in the middle of one.

use chrono::{Local, NaiveDate, NaiveDateTime};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::alert::{AlertDispatcher, DispatchSummary};
use crate::config::RigConfig;
use crate::error::{Result, TelemetryError};
use crate::sensor::SensorSource;
use crate::settings::{DataSettings, LookupTables, ResolvedSettings};

use super::buffer::TubeSeriesBuffer;
use super::recorder::SampleRecorder;
use super::retention::RetentionPolicy;
use super::sample::{Reading, Sample, TubeId};
use super::threshold::ThresholdEvaluator;

/// Enabled flag of one tube, mirroring its actuator
///
/// The tube's samples live in the scheduler's shared [`TubeSeriesBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TubeState {
    pub tube_id: TubeId,
    pub enabled: bool,
}

/// One tube's chart data
#[derive(Debug, Clone, PartialEq)]
pub struct TubeSeries {
    pub tube_id: TubeId,
    pub enabled: bool,
    pub samples: Vec<Sample>,
}

impl TubeSeries {
    pub fn ph(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.ph).collect()
    }

    pub fn temperature(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.temperature).collect()
    }
}

/// Read-only copy of the chart buffers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferSnapshot {
    pub timeline: Vec<NaiveDateTime>,
    pub tubes: Vec<TubeSeries>,
}

impl BufferSnapshot {
    /// Series for `tube`, if it exists
    pub fn tube(&self, tube: TubeId) -> Option<&TubeSeries> {
        self.tubes.iter().find(|t| t.tube_id == tube)
    }
}

/// What happened during one tick
#[derive(Debug)]
pub struct TickReport {
    pub timestamp: NaiveDateTime,
    /// Tubes whose sample reached disk
    pub recorded: Vec<TubeId>,
    /// Tubes the sensor could not read
    pub sensor_failed: Vec<TubeId>,
    /// Tubes whose sample was read but could not be written
    pub write_failed: Vec<TubeId>,
    pub unhealthy: Vec<TubeId>,
    pub evicted: Option<PathBuf>,
    /// Alert delivery task, if a batch was handed off
    pub dispatch: Option<JoinHandle<DispatchSummary>>,
}

impl TickReport {
    fn new(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            recorded: Vec::new(),
            sensor_failed: Vec::new(),
            write_failed: Vec::new(),
            unhealthy: Vec::new(),
            evicted: None,
            dispatch: None,
        }
    }
}

/// Commands applied by the scheduler task between ticks
#[derive(Debug)]
pub enum SchedulerCommand {
    UpdateDataSettings(ResolvedSettings),
    UpdateTubeStatus { tube: TubeId, enabled: bool },
    Stop,
}

/// The sampling pipeline
pub struct TelemetryScheduler {
    tubes: Vec<TubeState>,
    settings: ResolvedSettings,
    lookups: Arc<LookupTables>,
    recorder: SampleRecorder,
    retention: RetentionPolicy,
    buffer: TubeSeriesBuffer,
    evaluator: ThresholdEvaluator,
    dispatcher: AlertDispatcher,
    sensor: Box<dyn SensorSource>,
    active_day: Option<NaiveDate>,
    alert_cooldown: Duration,
    /// Per tube, when it was last reported while continuously unhealthy
    last_alerted: Vec<Option<NaiveDateTime>>,
    publisher: watch::Sender<BufferSnapshot>,
}

impl std::fmt::Debug for TelemetryScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryScheduler")
            .field("tubes", &self.tubes)
            .field("settings", &self.settings)
            .field("data_root", &self.recorder.data_root())
            .field("active_day", &self.active_day)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl TelemetryScheduler {
    /// Build a scheduler for the rig described by `rig`
    ///
    /// # Arguments
    ///
    /// * `rig` - Tube count and tubes enabled at startup
    /// * `lookups` - Label tables used to resolve `settings` now and on every
    ///   later settings update
    /// * `settings` - Initial data settings
    /// * `recorder` - CSV writer; retention works on the same data root
    /// * `evaluator` - Thresholds, sized for `rig.tube_count`
    /// * `dispatcher` - Alert sender, possibly disabled
    /// * `sensor` - Reading source
    ///
    /// # Errors
    ///
    /// Returns error if a settings label is unknown, an enabled tube is out of
    /// range, or the evaluator is sized for a different rig.
    pub fn new(
        rig: &RigConfig,
        lookups: Arc<LookupTables>,
        settings: &DataSettings,
        recorder: SampleRecorder,
        evaluator: ThresholdEvaluator,
        dispatcher: AlertDispatcher,
        mut sensor: Box<dyn SensorSource>,
    ) -> Result<Self> {
        let tube_count = usize::from(rig.tube_count);
        if evaluator.tube_count() != tube_count {
            return Err(TelemetryError::InvalidSettings(format!(
                "threshold evaluator covers {} tubes, rig has {}",
                evaluator.tube_count(),
                tube_count
            )));
        }
        if let Some(&tube) = rig
            .enabled_tubes
            .iter()
            .find(|&&t| t == 0 || usize::from(t) > tube_count)
        {
            return Err(TelemetryError::InvalidTube(tube));
        }

        let settings = lookups.resolve(settings)?;
        let tubes: Vec<TubeState> = (1..=rig.tube_count)
            .map(|tube_id| TubeState {
                tube_id,
                enabled: rig.enabled_tubes.contains(&tube_id),
            })
            .collect();
        for state in &tubes {
            sensor.set_enabled(state.tube_id, state.enabled);
        }

        let buffer = TubeSeriesBuffer::new(tube_count, settings.data_points);
        let retention = RetentionPolicy::new(recorder.data_root());
        let (publisher, _) = watch::channel(BufferSnapshot::default());

        let scheduler = Self {
            tubes,
            settings,
            lookups,
            recorder,
            retention,
            buffer,
            evaluator,
            dispatcher,
            sensor,
            active_day: None,
            alert_cooldown: Duration::ZERO,
            last_alerted: vec![None; tube_count],
            publisher,
        };
        scheduler.publish();
        Ok(scheduler)
    }

    /// Minimum time before a tube that stays unhealthy is reported again
    ///
    /// A tube that newly turns unhealthy is always reported at once. Zero
    /// reports every unhealthy tube on every tick.
    #[must_use]
    pub fn with_alert_cooldown(mut self, cooldown: Duration) -> Self {
        self.alert_cooldown = cooldown;
        self
    }

    pub fn tubes(&self) -> &[TubeState] {
        &self.tubes
    }

    pub fn settings(&self) -> &ResolvedSettings {
        &self.settings
    }

    pub fn buffer(&self) -> &TubeSeriesBuffer {
        &self.buffer
    }

    pub fn is_enabled(&self, tube: TubeId) -> bool {
        self.state(tube).enabled
    }

    /// Run one tick stamped with the local wall-clock time
    pub fn tick(&mut self) -> TickReport {
        self.tick_at(Local::now().naive_local())
    }

    /// Run one tick stamped with `now`
    ///
    /// Must be called with non-decreasing timestamps.
    pub fn tick_at(&mut self, now: NaiveDateTime) -> TickReport {
        let today = now.date();
        let mut report = TickReport::new(now);

        // Read
        let mut readings: Vec<Option<Reading>> = vec![None; self.tubes.len()];
        for (slot, state) in readings.iter_mut().zip(&self.tubes) {
            if !state.enabled {
                continue;
            }
            match self.sensor.read(state.tube_id) {
                Ok(reading) => *slot = Some(reading),
                Err(e) => {
                    warn!("Skipping tube {} this tick: {}", state.tube_id, e);
                    report.sensor_failed.push(state.tube_id);
                }
            }
        }

        // Record
        for (state, reading) in self.tubes.iter().zip(&readings) {
            let Some(reading) = reading else { continue };
            match self.recorder.append(state.tube_id, &Sample::new(now, *reading)) {
                Ok(_) => report.recorded.push(state.tube_id),
                Err(e) => {
                    warn!("Dropped tube {} sample from disk: {}", state.tube_id, e);
                    report.write_failed.push(state.tube_id);
                }
            }
        }

        // Rollover
        if self.active_day != Some(today) {
            if let Some(previous) = self.active_day {
                info!("Day rollover from {} to {}", previous, today);
            }
            self.active_day = Some(today);
            match self
                .retention
                .maybe_evict(self.settings.lifespan_days, &self.recorder.day_dir(today))
            {
                Ok(evicted) => report.evicted = evicted,
                Err(e) => warn!("Retention check failed: {}", e),
            }
        }

        // Buffer
        self.buffer.push_timestamp(now);
        for (state, reading) in self.tubes.iter().zip(&readings) {
            if let Some(reading) = reading {
                self.buffer.push(state.tube_id, Sample::new(now, *reading));
            }
        }

        // Classify
        let phs: Vec<f64> = readings.iter().map(|r| r.map_or(f64::NAN, |r| r.ph)).collect();
        let temperatures: Vec<f64> = readings
            .iter()
            .map(|r| r.map_or(f64::NAN, |r| r.temperature))
            .collect();
        let unhealthy: Vec<bool> = self
            .evaluator
            .classify_many(&phs, &temperatures)
            .into_iter()
            .zip(&readings)
            .map(|(bad, reading)| bad && reading.is_some())
            .collect();
        report.unhealthy = self
            .tubes
            .iter()
            .zip(&unhealthy)
            .filter(|(_, bad)| **bad)
            .map(|(state, _)| state.tube_id)
            .collect();

        // Dispatch
        // A healthy reading ends the tube's window
        let healthy = unhealthy.iter().zip(&readings).map(|(bad, r)| !bad && r.is_some());
        for (last, healthy) in self.last_alerted.iter_mut().zip(healthy) {
            if healthy {
                *last = None;
            }
        }
        let due: Vec<bool> = unhealthy
            .iter()
            .zip(&self.last_alerted)
            .map(|(&bad, &last)| bad && self.alert_due(now, last))
            .collect();
        if due.iter().any(|&d| d) {
            let attachments: Vec<PathBuf> = self
                .tubes
                .iter()
                .map(|state| self.recorder.tube_file(today, state.tube_id))
                .collect();
            let reaches_anyone = self.dispatcher.has_recipients();
            report.dispatch = self.dispatcher.dispatch(now, &due, &readings, &attachments);
            if report.dispatch.is_some() && reaches_anyone {
                for (last, _) in self.last_alerted.iter_mut().zip(&due).filter(|(_, d)| **d) {
                    *last = Some(now);
                }
            }
        }
        let held: Vec<TubeId> = self
            .tubes
            .iter()
            .zip(unhealthy.iter().zip(&due))
            .filter(|(_, (bad, due))| **bad && !**due)
            .map(|(state, _)| state.tube_id)
            .collect();
        if !held.is_empty() {
            debug!("Alert for tubes {:?} suppressed by cooldown", held);
        }

        // Publish
        self.publish();

        debug!(
            "Tick {}: recorded {:?}, sensor faults {:?}, write faults {:?}, unhealthy {:?}",
            now.format("%H:%M:%S"),
            report.recorded,
            report.sensor_failed,
            report.write_failed,
            report.unhealthy
        );
        report
    }

    /// Swap in new data settings
    ///
    /// Resizes the chart buffers to the new point count. A new lifespan applies
    /// from the next rollover.
    ///
    /// # Returns
    ///
    /// `true` if the read interval changed, in which case the caller should
    /// reschedule from the next cycle.
    pub fn update_data_settings(&mut self, settings: ResolvedSettings) -> bool {
        let interval_changed = settings.read_interval != self.settings.read_interval;

        if settings.data_points != self.buffer.capacity() {
            self.buffer.resize(settings.data_points);
        }
        for state in &self.tubes {
            if !state.enabled {
                self.buffer.clear(state.tube_id);
            }
        }

        info!(
            "Data settings updated: {} points, read interval {:?}, keep {} days",
            settings.data_points, settings.read_interval, settings.lifespan_days
        );
        self.settings = settings;
        self.publish();
        interval_changed
    }

    /// Turn a tube on or off
    ///
    /// Turning a tube off empties its chart immediately. Turning it on gives it
    /// a zero-valued history as long as the shared timeline. Setting the
    /// current state again changes nothing.
    ///
    /// # Panics
    ///
    /// Panics if `tube` is not in `1..=tube_count`.
    pub fn update_tube_status(&mut self, tube: TubeId, enabled: bool) {
        let index = self.index(tube);
        if self.tubes[index].enabled == enabled {
            return;
        }
        self.tubes[index].enabled = enabled;

        if enabled {
            self.buffer.seed_zeroed(tube);
        } else {
            self.buffer.clear(tube);
        }
        self.sensor.set_enabled(tube, enabled);

        info!("Tube {} {}", tube, if enabled { "enabled" } else { "disabled" });
        self.publish();
    }

    /// Copy of the current chart data
    pub fn snapshot(&self) -> BufferSnapshot {
        BufferSnapshot {
            timeline: self.buffer.timeline().iter().copied().collect(),
            tubes: self
                .tubes
                .iter()
                .map(|state| TubeSeries {
                    tube_id: state.tube_id,
                    enabled: state.enabled,
                    samples: self.buffer.samples(state.tube_id).iter().copied().collect(),
                })
                .collect(),
        }
    }

    /// Receiver that sees a fresh snapshot after every tick and change
    pub fn subscribe(&self) -> watch::Receiver<BufferSnapshot> {
        self.publisher.subscribe()
    }

    /// Move the scheduler onto its own task, ticking every read interval
    ///
    /// The first tick happens one interval after start.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(self) -> SchedulerHandle {
        let (commands, receiver) = mpsc::unbounded_channel();
        let snapshots = self.subscribe();
        let lookups = Arc::clone(&self.lookups);
        let tube_count = self.tubes.len();
        let task = tokio::spawn(self.run(receiver));

        SchedulerHandle {
            commands,
            snapshots,
            lookups,
            tube_count,
            task,
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SchedulerCommand>) -> Self {
        let mut ticker = tick_interval(self.settings.read_interval);
        info!(
            "Telemetry scheduler started: {} tubes, read interval {:?}",
            self.tubes.len(),
            self.settings.read_interval
        );

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(SchedulerCommand::UpdateDataSettings(settings)) => {
                        if self.update_data_settings(settings) {
                            ticker = tick_interval(self.settings.read_interval);
                        }
                    }
                    Some(SchedulerCommand::UpdateTubeStatus { tube, enabled }) => {
                        self.update_tube_status(tube, enabled);
                    }
                    Some(SchedulerCommand::Stop) | None => break,
                },

                _ = ticker.tick() => {
                    // Dispatch handles are detached; delivery outlives the tick
                    let _report = self.tick();
                }
            }
        }

        info!("Telemetry scheduler stopped");
        self
    }

    fn alert_due(&self, now: NaiveDateTime, last_alerted: Option<NaiveDateTime>) -> bool {
        match last_alerted {
            None => true,
            // A clock that went backwards does not hold alerts back
            Some(last) => (now - last)
                .to_std()
                .map_or(true, |elapsed| elapsed >= self.alert_cooldown),
        }
    }

    fn publish(&self) {
        self.publisher.send_replace(self.snapshot());
    }

    fn state(&self, tube: TubeId) -> &TubeState {
        &self.tubes[self.index(tube)]
    }

    fn index(&self, tube: TubeId) -> usize {
        let count = self.tubes.len();
        assert!(
            tube >= 1 && usize::from(tube) <= count,
            "tube {} out of range 1..={}",
            tube,
            count
        );
        usize::from(tube) - 1
    }
}

/// Interval whose first tick is one period from now
fn tick_interval(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Control surface of a running scheduler
#[derive(Debug)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<SchedulerCommand>,
    snapshots: watch::Receiver<BufferSnapshot>,
    lookups: Arc<LookupTables>,
    tube_count: usize,
    task: JoinHandle<TelemetryScheduler>,
}

impl SchedulerHandle {
    /// Queue new data settings for the next tick boundary
    ///
    /// # Errors
    ///
    /// Returns error if a label is unknown or `data_points` is zero; the
    /// running scheduler is left untouched. Returns
    /// [`TelemetryError::SchedulerStopped`] if the task has exited.
    pub fn update_data_settings(&self, settings: &DataSettings) -> Result<()> {
        let resolved = self.lookups.resolve(settings)?;
        self.send(SchedulerCommand::UpdateDataSettings(resolved))
    }

    /// Queue a tube status change for the next tick boundary
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidTube`] for an unknown tube and
    /// [`TelemetryError::SchedulerStopped`] if the task has exited.
    pub fn update_tube_status(&self, tube: TubeId, enabled: bool) -> Result<()> {
        if tube == 0 || usize::from(tube) > self.tube_count {
            return Err(TelemetryError::InvalidTube(tube));
        }
        self.send(SchedulerCommand::UpdateTubeStatus { tube, enabled })
    }

    pub fn subscribe(&self) -> watch::Receiver<BufferSnapshot> {
        self.snapshots.clone()
    }

    /// Most recently published snapshot
    pub fn latest(&self) -> BufferSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Stop ticking once the current tick, if any, has finished
    ///
    /// Alert deliveries already handed off keep running.
    ///
    /// # Returns
    ///
    /// The scheduler task, which yields the scheduler back when joined.
    pub fn stop(self) -> JoinHandle<TelemetryScheduler> {
        if self.commands.send(SchedulerCommand::Stop).is_err() {
            debug!("Scheduler task already gone");
        }
        self.task
    }

    fn send(&self, command: SchedulerCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| TelemetryError::SchedulerStopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::transport::mocks::MockMailer;
    use crate::alert::{AlertTemplate, StakeholderList};
    use crate::sensor::MockSensorSource;
    use crate::settings::test_lookups;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn rig(tube_count: u8, enabled: &[u8]) -> RigConfig {
        RigConfig {
            tube_count,
            enabled_tubes: enabled.to_vec(),
        }
    }

    fn data_settings(points: usize, interval: &str, life: &str) -> DataSettings {
        DataSettings {
            data_points: points,
            read_interval_key: interval.to_string(),
            data_life_key: life.to_string(),
        }
    }

    fn at(day: u32, hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, day)
            .unwrap()
            .and_hms_opt(hour, minute, second)
            .unwrap()
    }

    /// Sensor reporting healthy values for every tube
    fn healthy_sensor() -> MockSensorSource {
        let mut sensor = MockSensorSource::new();
        sensor.expect_read().returning(|_| Ok(Reading::new(7.5, 25.0)));
        sensor.expect_set_enabled().return_const(());
        sensor
    }

    fn disabled_dispatcher() -> AlertDispatcher {
        AlertDispatcher::disabled(StakeholderList::in_memory(), AlertTemplate::default())
    }

    fn build(
        root: &Path,
        rig: RigConfig,
        settings: DataSettings,
        sensor: MockSensorSource,
        dispatcher: AlertDispatcher,
    ) -> TelemetryScheduler {
        let evaluator = ThresholdEvaluator::new(7.0, 8.0, 30.0, usize::from(rig.tube_count));
        TelemetryScheduler::new(
            &rig,
            Arc::new(test_lookups()),
            &settings,
            SampleRecorder::new(root),
            evaluator,
            dispatcher,
            Box::new(sensor),
        )
        .unwrap()
    }

    fn simple(root: &Path) -> TelemetryScheduler {
        build(
            root,
            rig(3, &[1, 2, 3]),
            data_settings(5, "1sec", "1 week"),
            healthy_sensor(),
            disabled_dispatcher(),
        )
    }

    #[test]
    fn test_tick_records_only_enabled_tubes() {
        let dir = tempdir().unwrap();
        let mut scheduler = build(
            dir.path(),
            rig(4, &[1, 3]),
            data_settings(5, "1sec", "1 week"),
            healthy_sensor(),
            disabled_dispatcher(),
        );

        let report = scheduler.tick_at(at(16, 9, 0, 0));
        assert_eq!(report.recorded, vec![1, 3]);
        assert!(report.unhealthy.is_empty());
        assert!(report.dispatch.is_none());

        let day = dir.path().join("16-10-2026");
        assert!(day.join("tube1.csv").exists());
        assert!(!day.join("tube2.csv").exists());
        assert!(day.join("tube3.csv").exists());

        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.timeline, vec![at(16, 9, 0, 0)]);
        assert_eq!(snapshot.tube(1).unwrap().samples.len(), 1);
        assert!(snapshot.tube(2).unwrap().samples.is_empty());
        assert!(!snapshot.tube(2).unwrap().enabled);
    }

    #[test]
    fn test_sensor_fault_skips_only_that_tube() {
        let dir = tempdir().unwrap();
        let mut sensor = MockSensorSource::new();
        sensor.expect_set_enabled().return_const(());
        sensor.expect_read().returning(|tube| {
            if tube == 2 {
                Err(TelemetryError::Sensor {
                    tube,
                    reason: "probe unplugged".to_string(),
                })
            } else {
                Ok(Reading::new(7.5, 25.0))
            }
        });
        let mut scheduler = build(
            dir.path(),
            rig(3, &[1, 2, 3]),
            data_settings(5, "1sec", "1 week"),
            sensor,
            disabled_dispatcher(),
        );

        let report = scheduler.tick_at(at(16, 9, 0, 0));
        assert_eq!(report.recorded, vec![1, 3]);
        assert_eq!(report.sensor_failed, vec![2]);
        assert!(report.unhealthy.is_empty());

        // No placeholder for the gap
        assert!(scheduler.buffer().samples(2).is_empty());
        assert_eq!(scheduler.buffer().samples(3).len(), 1);
        assert!(!dir.path().join("16-10-2026").join("tube2.csv").exists());
    }

    #[test]
    fn test_write_failure_still_buffers_and_classifies() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("data");
        fs::write(&blocker, "not a directory").unwrap();

        let mut sensor = MockSensorSource::new();
        sensor.expect_set_enabled().return_const(());
        sensor.expect_read().returning(|_| Ok(Reading::new(9.1, 25.0)));
        let mut scheduler = build(
            &blocker,
            rig(2, &[1, 2]),
            data_settings(5, "1sec", "1 week"),
            sensor,
            disabled_dispatcher(),
        );

        let report = scheduler.tick_at(at(16, 9, 0, 0));
        assert!(report.recorded.is_empty());
        assert_eq!(report.write_failed, vec![1, 2]);
        assert_eq!(report.unhealthy, vec![1, 2]);
        assert_eq!(scheduler.buffer().ph_series(1), vec![9.1]);
    }

    #[test]
    fn test_disable_clears_and_enable_seeds_zeroes() {
        let dir = tempdir().unwrap();
        let mut scheduler = simple(dir.path());

        for second in 0..3 {
            scheduler.tick_at(at(16, 9, 0, second));
        }
        assert_eq!(scheduler.buffer().samples(2).len(), 3);

        scheduler.update_tube_status(2, false);
        assert!(!scheduler.is_enabled(2));
        assert!(scheduler.subscribe().borrow().tube(2).unwrap().samples.is_empty());

        // Disabled tubes are not read while off
        scheduler.tick_at(at(16, 9, 0, 3));
        assert!(scheduler.buffer().samples(2).is_empty());

        scheduler.update_tube_status(2, true);
        let samples = scheduler.buffer().samples(2);
        assert_eq!(samples.len(), scheduler.buffer().timeline().len());
        assert_eq!(samples.len(), 4);
        assert!(samples.iter().all(|s| s.ph == 0.0 && s.temperature == 0.0));
    }

    #[test]
    fn test_enable_twice_keeps_history() {
        let dir = tempdir().unwrap();
        let mut scheduler = simple(dir.path());
        scheduler.tick_at(at(16, 9, 0, 0));

        scheduler.update_tube_status(1, true);
        assert_eq!(scheduler.buffer().ph_series(1), vec![7.5]);
    }

    #[test]
    #[should_panic(expected = "tube 7 out of range")]
    fn test_invalid_tube_status_panics() {
        let dir = tempdir().unwrap();
        simple(dir.path()).update_tube_status(7, false);
    }

    #[test]
    fn test_buffer_keeps_last_points() {
        let dir = tempdir().unwrap();
        let mut sensor = MockSensorSource::new();
        sensor.expect_set_enabled().return_const(());
        let mut value = 0.0;
        sensor.expect_read().returning(move |_| {
            value += 1.0;
            Ok(Reading::new(value, 25.0))
        });
        let mut scheduler = build(
            dir.path(),
            rig(1, &[1]),
            data_settings(5, "1sec", "1 week"),
            sensor,
            disabled_dispatcher(),
        );

        for second in 0..8 {
            scheduler.tick_at(at(16, 9, 0, second));
        }
        assert_eq!(scheduler.buffer().ph_series(1), vec![4.0, 5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_update_data_settings_resizes_and_reports_interval_change() {
        let dir = tempdir().unwrap();
        let mut scheduler = simple(dir.path());
        for second in 0..5 {
            scheduler.tick_at(at(16, 9, 0, second));
        }

        let lookups = test_lookups();
        let same_interval = lookups.resolve(&data_settings(3, "1sec", "1 week")).unwrap();
        assert!(!scheduler.update_data_settings(same_interval));
        assert_eq!(scheduler.buffer().capacity(), 3);
        assert_eq!(scheduler.buffer().samples(1).len(), 3);

        let slower = lookups.resolve(&data_settings(10, "5sec", "3 days")).unwrap();
        assert!(scheduler.update_data_settings(slower));
        assert_eq!(scheduler.settings().read_interval, Duration::from_millis(5000));
        assert_eq!(scheduler.settings().lifespan_days, 3);
        assert_eq!(scheduler.buffer().samples(1).len(), 3);
    }

    #[test]
    fn test_rollover_evicts_oldest_day() {
        let dir = tempdir().unwrap();
        for day in 1..=5 {
            let path = dir.path().join(format!("{:02}-10-2026", day));
            fs::create_dir_all(&path).unwrap();
        }
        let mut scheduler = build(
            dir.path(),
            rig(2, &[1, 2]),
            data_settings(5, "1sec", "3 days"),
            healthy_sensor(),
            disabled_dispatcher(),
        );

        // First tick counts as a rollover
        let report = scheduler.tick_at(at(16, 23, 59, 59));
        assert_eq!(report.evicted, Some(dir.path().join("01-10-2026")));

        let report = scheduler.tick_at(at(16, 23, 59, 59));
        assert_eq!(report.evicted, None);

        let report = scheduler.tick_at(at(17, 0, 0, 0));
        assert_eq!(report.evicted, Some(dir.path().join("02-10-2026")));
        assert!(dir.path().join("16-10-2026").exists());
        assert!(dir.path().join("17-10-2026").exists());
    }

    #[tokio::test]
    async fn test_unhealthy_tube_dispatches_with_cooldown() {
        let dir = tempdir().unwrap();
        let mailer = MockMailer::new();
        let stakeholders = StakeholderList::in_memory();
        stakeholders.add("Ada", "ada@example.com").unwrap();
        let dispatcher =
            AlertDispatcher::connect(Arc::new(mailer.clone()), stakeholders, AlertTemplate::default()).await;

        let mut sensor = MockSensorSource::new();
        sensor.expect_set_enabled().return_const(());
        sensor.expect_read().returning(|tube| {
            if tube == 2 {
                Ok(Reading::new(7.5, 31.5))
            } else {
                Ok(Reading::new(7.5, 25.0))
            }
        });
        let mut scheduler = build(
            dir.path(),
            rig(6, &[1, 2, 3, 4, 5, 6]),
            data_settings(5, "1sec", "1 week"),
            sensor,
            dispatcher,
        )
        .with_alert_cooldown(Duration::from_secs(300));

        let report = scheduler.tick_at(at(16, 9, 0, 0));
        assert_eq!(report.unhealthy, vec![2]);
        let summary = report.dispatch.unwrap().await.unwrap();
        assert_eq!(summary.sent, 1);

        let sent = mailer.get_sent();
        assert_eq!(sent[0].attachments.len(), 1);
        assert_eq!(sent[0].attachments[0].filename, "tube2.csv");

        let report = scheduler.tick_at(at(16, 9, 1, 0));
        assert_eq!(report.unhealthy, vec![2]);
        assert!(report.dispatch.is_none());

        let report = scheduler.tick_at(at(16, 9, 5, 0));
        report.dispatch.unwrap().await.unwrap();
        assert_eq!(mailer.get_sent().len(), 2);
    }

    /// Sensor reading 31.5 °C for the tubes in `hot` and healthy values elsewhere
    fn switchable_sensor(hot: Arc<std::sync::Mutex<Vec<TubeId>>>) -> MockSensorSource {
        let mut sensor = MockSensorSource::new();
        sensor.expect_set_enabled().return_const(());
        sensor.expect_read().returning(move |tube| {
            if hot.lock().unwrap().contains(&tube) {
                Ok(Reading::new(7.5, 31.5))
            } else {
                Ok(Reading::new(7.5, 25.0))
            }
        });
        sensor
    }

    async fn alerting_scheduler(
        root: &Path,
        mailer: &MockMailer,
        stakeholders: StakeholderList,
        hot: Arc<std::sync::Mutex<Vec<TubeId>>>,
        cooldown: Duration,
    ) -> TelemetryScheduler {
        let dispatcher =
            AlertDispatcher::connect(Arc::new(mailer.clone()), stakeholders, AlertTemplate::default()).await;
        build(
            root,
            rig(6, &[1, 2, 3, 4, 5, 6]),
            data_settings(5, "1sec", "1 week"),
            switchable_sensor(hot),
            dispatcher,
        )
        .with_alert_cooldown(cooldown)
    }

    fn ada() -> StakeholderList {
        let stakeholders = StakeholderList::in_memory();
        stakeholders.add("Ada", "ada@example.com").unwrap();
        stakeholders
    }

    #[tokio::test]
    async fn test_new_unhealthy_tube_bypasses_cooldown() {
        let dir = tempdir().unwrap();
        let mailer = MockMailer::new();
        let hot = Arc::new(std::sync::Mutex::new(vec![2]));
        let mut scheduler =
            alerting_scheduler(dir.path(), &mailer, ada(), hot.clone(), Duration::from_secs(300)).await;

        let report = scheduler.tick_at(at(16, 9, 0, 0));
        report.dispatch.unwrap().await.unwrap();

        hot.lock().unwrap().push(5);
        let report = scheduler.tick_at(at(16, 9, 0, 5));
        assert_eq!(report.unhealthy, vec![2, 5]);
        let summary = report.dispatch.unwrap().await.unwrap();
        assert_eq!(summary.sent, 1);

        let sent = mailer.get_sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].subject, "Bioreactor alert: tube 2");
        assert_eq!(sent[1].subject, "Bioreactor alert: tube 5");
        assert_eq!(sent[1].attachments.len(), 1);
        assert_eq!(sent[1].attachments[0].filename, "tube5.csv");

        // Both tubes are now inside their own window
        let report = scheduler.tick_at(at(16, 9, 1, 0));
        assert_eq!(report.unhealthy, vec![2, 5]);
        assert!(report.dispatch.is_none());

        // Tube 2's window ends first
        let report = scheduler.tick_at(at(16, 9, 5, 0));
        report.dispatch.unwrap().await.unwrap();
        assert_eq!(mailer.get_sent()[2].subject, "Bioreactor alert: tube 2");
    }

    #[tokio::test]
    async fn test_recovered_tube_alerts_again_inside_cooldown() {
        let dir = tempdir().unwrap();
        let mailer = MockMailer::new();
        let hot = Arc::new(std::sync::Mutex::new(vec![3]));
        let mut scheduler =
            alerting_scheduler(dir.path(), &mailer, ada(), hot.clone(), Duration::from_secs(300)).await;

        scheduler.tick_at(at(16, 9, 0, 0)).dispatch.unwrap().await.unwrap();

        hot.lock().unwrap().clear();
        let report = scheduler.tick_at(at(16, 9, 0, 5));
        assert!(report.unhealthy.is_empty());
        assert!(report.dispatch.is_none());

        hot.lock().unwrap().push(3);
        scheduler.tick_at(at(16, 9, 0, 10)).dispatch.unwrap().await.unwrap();
        assert_eq!(mailer.get_sent().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_cooldown_alerts_every_tick() {
        let dir = tempdir().unwrap();
        let mailer = MockMailer::new();
        let hot = Arc::new(std::sync::Mutex::new(vec![1, 6]));
        let mut scheduler = alerting_scheduler(dir.path(), &mailer, ada(), hot, Duration::ZERO).await;

        for second in 0..3 {
            let report = scheduler.tick_at(at(16, 9, 0, second));
            assert_eq!(report.unhealthy, vec![1, 6]);
            report.dispatch.unwrap().await.unwrap();
        }

        let sent = mailer.get_sent();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|mail| mail.subject == "Bioreactor alert: tubes 1, 6"));
    }

    #[tokio::test]
    async fn test_empty_stakeholder_list_does_not_start_cooldown() {
        let dir = tempdir().unwrap();
        let mailer = MockMailer::new();
        let stakeholders = StakeholderList::in_memory();
        let hot = Arc::new(std::sync::Mutex::new(vec![4]));
        let mut scheduler = alerting_scheduler(
            dir.path(),
            &mailer,
            stakeholders.clone(),
            hot,
            Duration::from_secs(300),
        )
        .await;

        let report = scheduler.tick_at(at(16, 9, 0, 0));
        if let Some(handle) = report.dispatch {
            assert_eq!(handle.await.unwrap().sent, 0);
        }

        stakeholders.add("Ada", "ada@example.com").unwrap();
        let report = scheduler.tick_at(at(16, 9, 0, 5));
        let summary = report.dispatch.unwrap().await.unwrap();
        assert_eq!(summary.sent, 1);
        assert_eq!(mailer.get_sent()[0].subject, "Bioreactor alert: tube 4");
    }

    #[test]
    fn test_new_rejects_unknown_label() {
        let dir = tempdir().unwrap();
        let result = TelemetryScheduler::new(
            &rig(2, &[1, 2]),
            Arc::new(test_lookups()),
            &data_settings(5, "2sec", "1 week"),
            SampleRecorder::new(dir.path()),
            ThresholdEvaluator::new(7.0, 8.0, 30.0, 2),
            disabled_dispatcher(),
            Box::new(healthy_sensor()),
        );
        assert!(matches!(result, Err(TelemetryError::UnknownKey { .. })));
    }

    #[test]
    fn test_new_rejects_mismatched_evaluator() {
        let dir = tempdir().unwrap();
        let result = TelemetryScheduler::new(
            &rig(3, &[1]),
            Arc::new(test_lookups()),
            &data_settings(5, "1sec", "1 week"),
            SampleRecorder::new(dir.path()),
            ThresholdEvaluator::new(7.0, 8.0, 30.0, 6),
            disabled_dispatcher(),
            Box::new(healthy_sensor()),
        );
        assert!(matches!(result, Err(TelemetryError::InvalidSettings(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_scheduler_ticks_and_stops() {
        let dir = tempdir().unwrap();
        let handle = simple(dir.path()).start();
        let mut snapshots = handle.subscribe();

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(snapshots.has_changed().unwrap());
        assert_eq!(snapshots.borrow_and_update().timeline.len(), 3);

        let scheduler = handle.stop().await.unwrap();
        assert_eq!(scheduler.buffer().timeline().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_change_applies_from_next_cycle() {
        let dir = tempdir().unwrap();
        let handle = simple(dir.path()).start();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        tokio_test::assert_ok!(handle.update_data_settings(&data_settings(10, "5sec", "1 week")));

        // Ticks at 1s, then 6.5s and 11.5s
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(handle.latest().timeline.len(), 3);

        let scheduler = handle.stop().await.unwrap();
        assert_eq!(scheduler.settings().data_points, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_rejects_bad_commands() {
        let dir = tempdir().unwrap();
        let handle = simple(dir.path()).start();

        assert!(matches!(
            handle.update_tube_status(0, true),
            Err(TelemetryError::InvalidTube(0))
        ));
        assert!(matches!(
            handle.update_tube_status(4, true),
            Err(TelemetryError::InvalidTube(4))
        ));
        assert!(matches!(
            handle.update_data_settings(&data_settings(5, "3sec", "1 week")),
            Err(TelemetryError::UnknownKey { .. })
        ));
        assert!(matches!(
            handle.update_data_settings(&data_settings(0, "1sec", "1 week")),
            Err(TelemetryError::InvalidSettings(_))
        ));

        tokio_test::assert_ok!(handle.update_tube_status(3, false));
        let scheduler = handle.stop().await.unwrap();
        assert!(!scheduler.is_enabled(3));
        assert_eq!(scheduler.settings().data_points, 5);
    }
}
