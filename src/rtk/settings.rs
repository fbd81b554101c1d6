use std::path::PathBuf;

use hifitime::prelude::Duration;

use crate::fix::quality;

/// RTK post-processing settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory holding the RTKLIB executables
    pub rtklib_dir: PathBuf,

    /// Scratch directory, wiped at the start of every run
    pub scratch_dir: PathBuf,

    /// RTKLIB processing options
    pub config_file: PathBuf,

    /// Period between two runs
    pub interval: Duration,

    /// Bound on each engine invocation
    pub engine_timeout: Duration,

    /// Rover raw log size required before running
    pub min_rover_log: u64,

    /// Correction log size required before running
    pub min_correction_log: u64,

    /// Minimal (published scale) fix quality worth publishing
    pub min_quality: u8,

    /// Minimal delay between two publications
    pub min_publish_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rtklib_dir: PathBuf::from("../RTKLIB"),
            scratch_dir: PathBuf::from("./rtk_tmp"),
            config_file: PathBuf::from("rtk_conf.conf"),
            interval: Duration::from_seconds(5.0),
            engine_timeout: Duration::from_seconds(60.0),
            min_rover_log: 2048,
            min_correction_log: 512,
            min_quality: quality::RTK_FIXED,
            min_publish_interval: Duration::from_seconds(1.0),
        }
    }
}

impl Settings {
    /// Absolute paths: the engine runs from the RTKLIB directory
    pub fn resolve(self) -> Self {
        let absolute = |p: PathBuf| std::path::absolute(&p).unwrap_or(p);

        Self {
            rtklib_dir: absolute(self.rtklib_dir),
            scratch_dir: absolute(self.scratch_dir),
            config_file: absolute(self.config_file),
            ..self
        }
    }

    pub fn convbin(&self) -> PathBuf {
        self.rtklib_dir.join(executable("convbin"))
    }

    pub fn rnx2rtkp(&self) -> PathBuf {
        self.rtklib_dir.join(executable("rnx2rtkp"))
    }
}

fn executable(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn resolved_paths() {
        let settings = Settings::default().resolve();

        assert!(settings.rtklib_dir.is_absolute());
        assert!(settings.scratch_dir.is_absolute());
        assert!(settings.config_file.is_absolute());
        assert!(settings.convbin().ends_with("convbin") || settings.convbin().ends_with("convbin.exe"));
        assert_eq!(settings.min_quality, quality::RTK_FIXED);
    }
}
