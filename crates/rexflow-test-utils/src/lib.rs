//! Testing utilities for the rexflow workspace
//!
//! Shared fixtures and a recording [`UnitRunner`].

#![allow(missing_docs)]

use parking_lot::Mutex;
use rexflow_config::Document;
use rexflow_kernel::scheduler::WorkUnit;
use rexflow_kernel::{StageKind, UnitRunner};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Three fitted regions, one validation region, three systematics
pub const TW_CONFIG: &str = r#"Job: "tW"
  Label: "tW"
  SummaryPlotRegions: reg1j1b,reg2j1b,reg2j2b
  ReadFrom: NTUP

Fit: "tW"
  FitType: SPLUSB
  FitBlind: TRUE

Region: "reg1j1b"
  Type: SIGNAL

Region: "reg2j1b"
  Type: CONTROL

Region: "reg2j2b"
  Type: CONTROL

Region: "VRpt"
  Type: VALIDATION

Systematic: "ttbar_PS"
  SubCategory: "Modeling"
  Regions: reg1j1b,reg2j1b

Systematic: "ttbar_PS"
  Samples: ttbar

Systematic: "JET_JER"
  SubCategory: "Jets"

Systematic: "tW_DRDS"
  SubCategory: "Modeling"
  Regions: reg2j2b
"#;

pub fn tw_document() -> Document {
    Document::parse(TW_CONFIG).unwrap()
}

/// Write [`TW_CONFIG`] as `tW.conf` under `dir`
pub fn write_tw_config(dir: &Path) -> PathBuf {
    let path = dir.join("tW.conf");
    std::fs::write(&path, TW_CONFIG).unwrap();
    path
}

type FailWhen = Box<dyn Fn(&WorkUnit) -> bool + Send + Sync>;

/// Records every dispatched unit; fails the ones matching a predicate
pub struct RecordingRunner {
    calls: Mutex<Vec<(StageKind, String)>>,
    workdirs: Mutex<Vec<PathBuf>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    fail_when: FailWhen,
    delay: Duration,
}

impl Default for RecordingRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingRunner {
    /// Runner where every unit succeeds
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            workdirs: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            fail_when: Box::new(|_| false),
            delay: Duration::ZERO,
        }
    }

    /// Fail units for which `predicate` holds with exit code 1
    pub fn failing(predicate: impl Fn(&WorkUnit) -> bool + Send + Sync + 'static) -> Self {
        Self {
            fail_when: Box::new(predicate),
            ..Self::new()
        }
    }

    /// Sleep this long inside every unit
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// `(stage, invocation string)` per dispatched unit, in dispatch order
    pub fn calls(&self) -> Vec<(StageKind, String)> {
        self.calls.lock().clone()
    }

    /// Stages dispatched, in dispatch order
    pub fn stages(&self) -> Vec<StageKind> {
        self.calls.lock().iter().map(|(s, _)| *s).collect()
    }

    /// Highest number of units running at the same time
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Working directories passed to the runner
    pub fn workdirs(&self) -> Vec<PathBuf> {
        self.workdirs.lock().clone()
    }
}

#[async_trait::async_trait]
impl UnitRunner for RecordingRunner {
    async fn run_unit(&self, unit: &WorkUnit, workdir: &Path) -> std::io::Result<Option<i32>> {
        self.calls
            .lock()
            .push((unit.stage, unit.invocation.to_string()));
        self.workdirs.lock().push(workdir.to_path_buf());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Some(i32::from((self.fail_when)(unit))))
    }
}
