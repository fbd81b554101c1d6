//! Differential positioning engine.
//!
//! The engine is an external batch process. It is driven through the
//! [SolverEngine] capability, so alternate engines (or fakes) plug in.
use std::{
    fmt::Display,
    future::Future,
    path::{Path, PathBuf},
    process::Stdio,
};

use hifitime::prelude::Duration;
use log::{debug, trace};
use tokio::process::Command;

use crate::{
    error::{Error, Result},
    rtk::settings::Settings,
};

/// Raw log formats the engine converts from
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RawFormat {
    /// U-Blox receiver stream
    Ubx,
    /// RTCM3 corrections
    Rtcm3,
}

impl Display for RawFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ubx => write!(f, "ubx"),
            Self::Rtcm3 => write!(f, "rtcm3"),
        }
    }
}

/// Files produced by one conversion, named after a prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Products {
    /// Observation RINEX
    pub obs: PathBuf,
    /// GPS navigation
    pub nav: PathBuf,
    /// Glonass navigation
    pub gnav: PathBuf,
    /// Galileo navigation
    pub lnav: PathBuf,
    /// SBAS messages
    pub sbs: PathBuf,
}

impl Products {
    pub fn new(dir: &Path, prefix: &str) -> Self {
        Self {
            obs: dir.join(format!("{}.obs", prefix)),
            nav: dir.join(format!("{}.nav", prefix)),
            gnav: dir.join(format!("{}.gnav", prefix)),
            lnav: dir.join(format!("{}.lnav", prefix)),
            sbs: dir.join(format!("{}.sbs", prefix)),
        }
    }

    pub fn all(&self) -> [&Path; 5] {
        [&self.obs, &self.nav, &self.gnav, &self.lnav, &self.sbs]
    }
}

/// Kinematic solving request
#[derive(Debug, Clone)]
pub struct SolveJob {
    pub rover_obs: PathBuf,
    pub base_obs: PathBuf,
    /// Navigation data, in order of preference
    pub navigation: Vec<PathBuf>,
    pub output: PathBuf,
}

pub trait SolverEngine: Send + Sync {
    /// Verifies the engine can run at all
    fn check(&self) -> Result<()>;

    /// Converts a raw log to observation and navigation files
    fn convert(
        &self,
        input: &Path,
        format: RawFormat,
        products: &Products,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Kinematic solution, at most one output file
    fn solve(&self, job: &SolveJob) -> impl Future<Output = Result<()>> + Send;
}

/// RTKLIB command line tools (`convbin`, `rnx2rtkp`)
#[derive(Debug, Clone)]
pub struct RtkLib {
    convbin: PathBuf,
    rnx2rtkp: PathBuf,
    config: PathBuf,
    workdir: PathBuf,
    timeout: Duration,
}

impl RtkLib {
    pub fn new(settings: &Settings) -> Self {
        Self {
            convbin: settings.convbin(),
            rnx2rtkp: settings.rnx2rtkp(),
            config: settings.config_file.clone(),
            workdir: settings.rtklib_dir.clone(),
            timeout: settings.engine_timeout,
        }
    }

    fn convert_args(input: &Path, format: RawFormat, products: &Products) -> Vec<String> {
        vec![
            "-r".to_string(),
            format.to_string(),
            "-o".to_string(),
            products.obs.display().to_string(),
            "-n".to_string(),
            products.nav.display().to_string(),
            "-g".to_string(),
            products.gnav.display().to_string(),
            "-l".to_string(),
            products.lnav.display().to_string(),
            "-s".to_string(),
            products.sbs.display().to_string(),
            input.display().to_string(),
        ]
    }

    fn solve_args(&self, job: &SolveJob) -> Vec<String> {
        // kinematic mode
        let mut args = vec![
            "-p".to_string(),
            "2".to_string(),
            "-k".to_string(),
            self.config.display().to_string(),
            "-o".to_string(),
            job.output.display().to_string(),
            job.rover_obs.display().to_string(),
            job.base_obs.display().to_string(),
        ];

        args.extend(job.navigation.iter().map(|p| p.display().to_string()));
        args
    }

    async fn run(&self, program: &Path, args: &[String]) -> Result<()> {
        let name = program
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| program.display().to_string());

        debug!("{} {}", name, args.join(" "));

        let mut command = Command::new(program);

        command
            .args(args)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let child = command.output();

        let timeout = std::time::Duration::from_secs_f64(self.timeout.to_seconds().max(0.0));

        let output = match tokio::time::timeout(timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(Error::EngineSpawn {
                    program: name,
                    source: e,
                });
            },
            Err(_) => {
                return Err(Error::EngineTimeout {
                    program: name,
                    timeout: self.timeout,
                });
            },
        };

        trace!("{}: {}", name, String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(())
        } else {
            debug!("{}: {}", name, String::from_utf8_lossy(&output.stderr).trim());
            Err(Error::EngineExit {
                program: name,
                status: output.status.to_string(),
            })
        }
    }
}

impl SolverEngine for RtkLib {
    fn check(&self) -> Result<()> {
        for required in [&self.convbin, &self.rnx2rtkp, &self.config] {
            if !required.exists() {
                return Err(Error::EngineUnavailable(required.clone()));
            }
        }
        Ok(())
    }

    async fn convert(&self, input: &Path, format: RawFormat, products: &Products) -> Result<()> {
        let args = Self::convert_args(input, format, products);
        self.run(&self.convbin, &args).await
    }

    async fn solve(&self, job: &SolveJob) -> Result<()> {
        let args = self.solve_args(job);
        self.run(&self.rnx2rtkp, &args).await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn rtklib(dir: &Path) -> RtkLib {
        let settings = Settings {
            rtklib_dir: dir.to_path_buf(),
            config_file: dir.join("rtk_conf.conf"),
            engine_timeout: Duration::from_seconds(5.0),
            ..Default::default()
        };
        RtkLib::new(&settings)
    }

    #[test]
    fn convbin_command_line() {
        let products = Products::new(Path::new("/tmp/rtk"), "base");
        let args = RtkLib::convert_args(Path::new("/tmp/rtk/base.rtcm3"), RawFormat::Rtcm3, &products);

        assert_eq!(
            args.join(" "),
            "-r rtcm3 -o /tmp/rtk/base.obs -n /tmp/rtk/base.nav -g /tmp/rtk/base.gnav \
             -l /tmp/rtk/base.lnav -s /tmp/rtk/base.sbs /tmp/rtk/base.rtcm3"
        );
    }

    #[test]
    fn rnx2rtkp_command_line() {
        let engine = rtklib(Path::new("/opt/rtklib"));
        let job = SolveJob {
            rover_obs: PathBuf::from("/tmp/rtk/rover.obs"),
            base_obs: PathBuf::from("/tmp/rtk/base.obs"),
            navigation: vec![PathBuf::from("/tmp/rtk/base.nav")],
            output: PathBuf::from("/tmp/rtk/solution.pos"),
        };

        assert_eq!(
            engine.solve_args(&job).join(" "),
            "-p 2 -k /opt/rtklib/rtk_conf.conf -o /tmp/rtk/solution.pos \
             /tmp/rtk/rover.obs /tmp/rtk/base.obs /tmp/rtk/base.nav"
        );
    }

    #[test]
    fn unavailable_engine() {
        let dir = tempfile::tempdir().unwrap();
        let engine = rtklib(dir.path());

        match engine.check() {
            Err(Error::EngineUnavailable(path)) => assert_eq!(path, engine.convbin),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_status_is_checked() {
        let dir = tempfile::tempdir().unwrap();
        let engine = rtklib(dir.path());

        assert!(engine.run(Path::new("/bin/true"), &[]).await.is_ok());

        match engine.run(Path::new("/bin/false"), &[]).await {
            Err(Error::EngineExit { program, .. }) => assert_eq!(program, "false"),
            other => panic!("unexpected {:?}", other),
        }

        match engine.run(&dir.path().join("missing"), &[]).await {
            Err(Error::EngineSpawn { .. }) => {},
            other => panic!("unexpected {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_engine_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = rtklib(dir.path());
        engine.timeout = Duration::from_milliseconds(100.0);

        match engine.run(Path::new("/bin/sleep"), &["5".to_string()]).await {
            Err(Error::EngineTimeout { .. }) => {},
            other => panic!("unexpected {:?}", other),
        }
    }
}
