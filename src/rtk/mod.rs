//! Periodic differential post-processing of the rover logs.
//!
//! Every cycle snapshots the rover raw log and the received corrections,
//! runs the engine on them and publishes the latest epoch when it is
//! good enough. Nothing in here stops the relay: failures are reported
//! and the next cycle starts from scratch.
pub mod engine;
pub mod run;
pub mod settings;
pub mod solution;

use std::path::{Path, PathBuf};

use hifitime::prelude::Epoch;
use log::{debug, error, info, warn};
use tokio::sync::watch;

use crate::{
    clock::Clock,
    error::{Error, Result},
    fix::{PositionFix, quality},
    publish::PublishSink,
    rtk::{
        engine::{RawFormat, SolverEngine},
        run::Run,
        settings::Settings,
    },
};

/// Why a cycle did not publish
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Skip {
    /// Not enough data collected yet
    InsufficientData { rover: u64, corrections: u64 },
    /// The engine did not resolve any epoch
    NoSolution,
    /// Solution quality under the configured minimum
    BelowQuality(u8),
    /// Published too recently
    Throttled,
}

/// Cycle outcome
#[derive(Debug)]
pub enum Outcome {
    /// Engine or its configuration is missing
    Unavailable(Error),
    Skipped(Skip),
    /// Engine, filesystem or publication failure
    Failed(Error),
    Published { fix: PositionFix, delivered: usize },
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

pub struct Worker<E: SolverEngine, S: PublishSink, C: Clock> {
    engine: E,
    sink: S,
    clock: C,
    settings: Settings,
    rover_log: PathBuf,
    correction_log: PathBuf,
    last_publish: Option<Epoch>,
}

impl<E: SolverEngine, S: PublishSink, C: Clock> Worker<E, S, C> {
    /// Builds a worker processing `rover_log` (receiver raw stream)
    /// against `correction_log` (received corrections).
    pub fn new(
        engine: E,
        sink: S,
        clock: C,
        settings: Settings,
        rover_log: &Path,
        correction_log: &Path,
    ) -> Self {
        Self {
            engine,
            sink,
            clock,
            settings,
            rover_log: rover_log.to_path_buf(),
            correction_log: correction_log.to_path_buf(),
            last_publish: None,
        }
    }

    #[cfg(test)]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[cfg(test)]
    pub fn last_publish(&self) -> Option<Epoch> {
        self.last_publish
    }

    /// Runs one complete cycle
    pub async fn cycle(&mut self) -> Outcome {
        if let Err(e) = self.engine.check() {
            return Outcome::Unavailable(e);
        }

        let rover = file_size(&self.rover_log);
        let corrections = file_size(&self.correction_log);

        if rover < self.settings.min_rover_log || corrections < self.settings.min_correction_log {
            return Outcome::Skipped(Skip::InsufficientData { rover, corrections });
        }

        let solution = match self.solve().await {
            Ok(Some(solution)) => solution,
            Ok(None) => return Outcome::Skipped(Skip::NoSolution),
            Err(e) => return Outcome::Failed(e),
        };

        debug!(
            "solution: {} (engine quality {})",
            solution.fix, solution.solver_quality
        );

        let fix = solution.fix;

        if !quality::meets(fix.quality, self.settings.min_quality) {
            return Outcome::Skipped(Skip::BelowQuality(fix.quality));
        }

        let now = self.clock.now();

        if let Some(last) = self.last_publish {
            if now - last < self.settings.min_publish_interval {
                return Outcome::Skipped(Skip::Throttled);
            }
        }

        match self.sink.publish(&fix).await {
            Ok(delivered) => {
                self.last_publish = Some(now);
                Outcome::Published { fix, delivered }
            },
            Err(e) => Outcome::Failed(e),
        }
    }

    async fn solve(&self) -> Result<Option<solution::Solution>> {
        let run = self.prepare().await?;

        self.engine
            .convert(&run.rover_raw, RawFormat::Ubx, &run.rover)
            .await?;

        self.engine
            .convert(&run.base_raw, RawFormat::Rtcm3, &run.base)
            .await?;

        self.engine.solve(&run.solve_job()).await?;

        solution::read(&run.solution)
    }

    /// Cleans the scratch directory and snapshots the live logs,
    /// on the blocking pool.
    async fn prepare(&self) -> Result<Run> {
        let scratch = self.settings.scratch_dir.clone();
        let rover_log = self.rover_log.clone();
        let correction_log = self.correction_log.clone();

        let prepared = tokio::task::spawn_blocking(move || -> Result<Run> {
            std::fs::create_dir_all(&scratch).map_err(|e| Error::file(&scratch, e))?;

            let run = Run::new(&scratch);

            run.clean();
            run.snapshot(&rover_log, &correction_log)?;

            Ok(run)
        })
        .await;

        match prepared {
            Ok(run) => run,
            Err(e) => Err(Error::file(
                &self.settings.scratch_dir,
                std::io::Error::other(e),
            )),
        }
    }

    fn report(&self, outcome: &Outcome) {
        match outcome {
            Outcome::Unavailable(e) => error!("rtk unavailable: {}", e),
            Outcome::Skipped(Skip::InsufficientData { rover, corrections }) => {
                debug!(
                    "rtk: waiting for data (rover={}B corrections={}B)",
                    rover, corrections
                );
            },
            Outcome::Skipped(Skip::NoSolution) => warn!("rtk: no solution"),
            Outcome::Skipped(Skip::BelowQuality(q)) => {
                debug!("rtk: fix quality {} below {}", q, self.settings.min_quality)
            },
            Outcome::Skipped(Skip::Throttled) => debug!("rtk: publication throttled"),
            Outcome::Failed(e) => error!("rtk: {}", e),
            Outcome::Published { fix, delivered } => {
                info!("published {} (delivered={})", fix, delivered)
            },
        }
    }

    /// Cycles until shutdown is requested. A pending cycle is abandoned
    /// (and its engine process killed) on shutdown.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let period = std::time::Duration::from_secs_f64(self.settings.interval.to_seconds().max(0.0));

        info!(
            "rtk worker deployed (every {}, scratch={})",
            self.settings.interval,
            self.settings.scratch_dir.display()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = tokio::select! {
                outcome = self.cycle() => outcome,
                _ = shutdown.changed() => break,
            };

            self.report(&outcome);

            tokio::select! {
                _ = tokio::time::sleep(period) => {},
                _ = shutdown.changed() => {
                    break;
                },
            }
        }

        info!("rtk worker stopped");
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use hifitime::prelude::Duration;

    use crate::{
        clock::test::ManualClock,
        rtk::engine::{Products, SolveJob},
    };

    const SOLUTION_FIXED: &str = "\
% program   : RNX2RTKP
%  GPST                  latitude(deg) longitude(deg)  height(m)   Q  ns
2025/03/01 12:00:00.000  -34.602345671  -58.402345672    25.1234   2   9
2025/03/01 12:00:01.000  -34.602345701  -58.402345702    25.1301   1  11
";

    /// Writes the given solution, counts invocations
    #[derive(Default)]
    struct FakeEngine {
        solution: Option<&'static str>,
        unavailable: bool,
        fail_convert: bool,
        fail_solve: bool,
        conversions: AtomicUsize,
    }

    fn exit_failure(program: &str) -> Error {
        Error::EngineExit {
            program: program.to_string(),
            status: "exit status: 1".to_string(),
        }
    }

    impl SolverEngine for FakeEngine {
        fn check(&self) -> Result<()> {
            if self.unavailable {
                Err(Error::EngineUnavailable(PathBuf::from("convbin")))
            } else {
                Ok(())
            }
        }

        async fn convert(&self, input: &Path, _: RawFormat, products: &Products) -> Result<()> {
            assert!(input.exists());
            if self.fail_convert {
                return Err(exit_failure("convbin"));
            }
            std::fs::write(&products.obs, b"obs").unwrap();
            std::fs::write(&products.nav, b"nav").unwrap();
            self.conversions.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn solve(&self, job: &SolveJob) -> Result<()> {
            assert!(job.rover_obs.exists());
            assert!(job.base_obs.exists());
            assert_eq!(job.navigation.len(), 2);
            if let Some(content) = self.solution {
                std::fs::write(&job.output, content).unwrap();
            }
            if self.fail_solve {
                return Err(exit_failure("rnx2rtkp"));
            }
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct FakeSink {
        published: Arc<std::sync::Mutex<Vec<PositionFix>>>,
        offline: bool,
    }

    impl PublishSink for FakeSink {
        async fn publish(&self, fix: &PositionFix) -> Result<usize> {
            if self.offline {
                return Err(Error::Transport(std::io::Error::other("offline")));
            }
            self.published.lock().unwrap().push(*fix);
            Ok(2)
        }
    }

    struct Setup {
        _dir: tempfile::TempDir,
        sink: FakeSink,
        clock: ManualClock,
        worker: Worker<FakeEngine, FakeSink, ManualClock>,
    }

    fn setup(engine: FakeEngine, sink: FakeSink, rover: usize, corrections: usize) -> Setup {
        let dir = tempfile::tempdir().unwrap();

        let rover_log = dir.path().join("rover_gps_1200.ubx");
        let correction_log = dir.path().join("rover_corr_1200.bin");
        std::fs::write(&rover_log, vec![0xb5; rover]).unwrap();
        std::fs::write(&correction_log, vec![0xd3; corrections]).unwrap();

        let settings = Settings {
            scratch_dir: dir.path().join("rtk_tmp"),
            ..Default::default()
        };

        let clock = ManualClock::new();

        let worker = Worker::new(
            engine,
            sink.clone(),
            clock.clone(),
            settings,
            &rover_log,
            &correction_log,
        );

        Setup {
            _dir: dir,
            sink,
            clock,
            worker,
        }
    }

    fn fixed_engine() -> FakeEngine {
        FakeEngine {
            solution: Some(SOLUTION_FIXED),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn publish_then_throttle() {
        let mut s = setup(fixed_engine(), FakeSink::default(), 4096, 1024);

        match s.worker.cycle().await {
            Outcome::Published { fix, delivered } => {
                assert_eq!(fix.quality, quality::RTK_FIXED);
                assert_eq!(fix.satellites, 11);
                assert_eq!(delivered, 2);
            },
            other => panic!("unexpected {:?}", other),
        }

        s.clock.advance(Duration::from_milliseconds(100.0));

        match s.worker.cycle().await {
            Outcome::Skipped(Skip::Throttled) => {},
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(s.sink.published.lock().unwrap().len(), 1);

        s.clock.advance(Duration::from_milliseconds(900.0));

        assert!(matches!(
            s.worker.cycle().await,
            Outcome::Published { .. }
        ));
        assert_eq!(s.sink.published.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn insufficient_data() {
        let mut s = setup(fixed_engine(), FakeSink::default(), 2047, 1024);

        match s.worker.cycle().await {
            Outcome::Skipped(Skip::InsufficientData { rover, corrections }) => {
                assert_eq!(rover, 2047);
                assert_eq!(corrections, 1024);
            },
            other => panic!("unexpected {:?}", other),
        }

        let mut s = setup(fixed_engine(), FakeSink::default(), 4096, 511);
        assert!(matches!(
            s.worker.cycle().await,
            Outcome::Skipped(Skip::InsufficientData { .. })
        ));
        assert_eq!(s.worker.engine.conversions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn below_minimal_quality() {
        let float = "2025/03/01 12:00:01.000  -34.6  -58.4  25.1  2  11\n";
        let single = "2025/03/01 12:00:01.000  -34.6  -58.4  25.1  5  11\n";

        let engine = |solution| FakeEngine {
            solution: Some(solution),
            ..Default::default()
        };

        let mut s = setup(engine(single), FakeSink::default(), 4096, 1024);

        assert!(matches!(
            s.worker.cycle().await,
            Outcome::Skipped(Skip::BelowQuality(quality::SINGLE))
        ));

        // fixed required: float is not good enough
        let mut s = setup(engine(float), FakeSink::default(), 4096, 1024);

        assert!(matches!(
            s.worker.cycle().await,
            Outcome::Skipped(Skip::BelowQuality(quality::RTK_FLOAT))
        ));
        assert!(s.sink.published.lock().unwrap().is_empty());

        // float required: float and fixed both pass
        let mut s = setup(engine(float), FakeSink::default(), 4096, 1024);
        s.worker.settings.min_quality = quality::RTK_FLOAT;

        assert!(matches!(
            s.worker.cycle().await,
            Outcome::Published { .. }
        ));
        assert_eq!(s.sink.published.lock().unwrap()[0].quality, quality::RTK_FLOAT);

        let mut s = setup(fixed_engine(), FakeSink::default(), 4096, 1024);
        s.worker.settings.min_quality = quality::RTK_FLOAT;

        assert!(matches!(
            s.worker.cycle().await,
            Outcome::Published { .. }
        ));
        assert_eq!(s.sink.published.lock().unwrap()[0].quality, quality::RTK_FIXED);
    }

    #[tokio::test]
    async fn engine_failure_publishes_nothing() {
        let mut s = setup(fixed_engine(), FakeSink::default(), 4096, 1024);

        assert!(matches!(
            s.worker.cycle().await,
            Outcome::Published { .. }
        ));

        let published = s.worker.last_publish();
        assert!(published.is_some());

        s.clock.advance(Duration::from_seconds(5.0));
        s.worker.engine.fail_convert = true;

        assert!(matches!(
            s.worker.cycle().await,
            Outcome::Failed(Error::EngineExit { .. })
        ));

        // a solution written by a failing solver is not trusted
        s.clock.advance(Duration::from_seconds(5.0));
        s.worker.engine.fail_convert = false;
        s.worker.engine.fail_solve = true;

        assert!(matches!(
            s.worker.cycle().await,
            Outcome::Failed(Error::EngineExit { .. })
        ));

        assert_eq!(s.sink.published.lock().unwrap().len(), 1);
        assert_eq!(s.worker.last_publish(), published);
    }

    #[tokio::test]
    async fn failed_first_run() {
        let engine = FakeEngine {
            fail_solve: true,
            ..fixed_engine()
        };

        let mut s = setup(engine, FakeSink::default(), 4096, 1024);

        assert!(matches!(s.worker.cycle().await, Outcome::Failed(_)));
        assert!(s.sink.published.lock().unwrap().is_empty());
        assert!(s.worker.last_publish().is_none());
    }

    #[tokio::test]
    async fn no_solution() {
        let mut s = setup(FakeEngine::default(), FakeSink::default(), 4096, 1024);

        assert!(matches!(
            s.worker.cycle().await,
            Outcome::Skipped(Skip::NoSolution)
        ));
        assert_eq!(s.worker.engine.conversions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stale_solution_is_not_reused() {
        let mut s = setup(FakeEngine::default(), FakeSink::default(), 4096, 1024);

        let scratch = s.worker.settings().scratch_dir.clone();
        std::fs::create_dir_all(&scratch).unwrap();
        std::fs::write(scratch.join("solution.pos"), SOLUTION_FIXED).unwrap();

        assert!(matches!(
            s.worker.cycle().await,
            Outcome::Skipped(Skip::NoSolution)
        ));
    }

    #[tokio::test]
    async fn unavailable_engine() {
        let mut s = setup(
            FakeEngine {
                unavailable: true,
                ..fixed_engine()
            },
            FakeSink::default(),
            4096,
            1024,
        );

        assert!(matches!(s.worker.cycle().await, Outcome::Unavailable(_)));

        // retried on every cycle
        s.worker.engine.unavailable = false;
        assert!(matches!(
            s.worker.cycle().await,
            Outcome::Published { .. }
        ));
    }

    #[tokio::test]
    async fn publication_failure_is_not_fatal() {
        let sink = FakeSink {
            offline: true,
            ..Default::default()
        };

        let mut s = setup(fixed_engine(), sink, 4096, 1024);

        assert!(matches!(s.worker.cycle().await, Outcome::Failed(_)));
        assert!(s.worker.last_publish().is_none());

        // no throttling after a failed publication
        s.worker.sink.offline = false;
        s.clock.advance(Duration::from_milliseconds(100.0));
        assert!(matches!(
            s.worker.cycle().await,
            Outcome::Published { .. }
        ));
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let s = setup(FakeEngine::default(), FakeSink::default(), 0, 0);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(s.worker.run(rx));
        tx.send(true).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
