use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use log::warn;

use crate::{
    error::{Error, Result},
    rtk::engine::{Products, SolveJob},
};

/// Artifacts of one post-processing run, all in the scratch directory
#[derive(Debug, Clone)]
pub struct Run {
    /// Rover raw log snapshot
    pub rover_raw: PathBuf,
    /// Correction log snapshot
    pub base_raw: PathBuf,
    pub rover: Products,
    pub base: Products,
    pub solution: PathBuf,
}

impl Run {
    pub fn new(dir: &Path) -> Self {
        Self {
            rover_raw: dir.join("rover.ubx"),
            base_raw: dir.join("base.rtcm3"),
            rover: Products::new(dir, "rover"),
            base: Products::new(dir, "base"),
            solution: dir.join("solution.pos"),
        }
    }

    fn artifacts(&self) -> Vec<&Path> {
        let mut all = vec![self.rover_raw.as_path(), self.base_raw.as_path()];
        all.extend(self.rover.all());
        all.extend(self.base.all());
        all.push(&self.solution);
        all
    }

    /// Deletes everything a previous run may have left
    pub fn clean(&self) {
        for path in self.artifacts() {
            match std::fs::remove_file(path) {
                Ok(()) => {},
                Err(e) if e.kind() == ErrorKind::NotFound => {},
                Err(e) => warn!("failed to remove {}: {}", path.display(), e),
            }
        }
    }

    /// Copies the live logs, so the engine works on stable inputs
    pub fn snapshot(&self, rover_log: &Path, correction_log: &Path) -> Result<()> {
        for (live, snapshot) in [(rover_log, &self.rover_raw), (correction_log, &self.base_raw)] {
            std::fs::copy(live, snapshot).map_err(|e| Error::file(live, e))?;
        }
        Ok(())
    }

    /// Navigation data that was actually produced, rover first
    pub fn navigation(&self) -> Vec<PathBuf> {
        [
            &self.rover.nav,
            &self.base.nav,
            &self.base.gnav,
            &self.base.lnav,
            &self.base.sbs,
            &self.rover.gnav,
            &self.rover.lnav,
            &self.rover.sbs,
        ]
        .into_iter()
        .filter(|p| p.exists())
        .cloned()
        .collect()
    }

    pub fn solve_job(&self) -> SolveJob {
        SolveJob {
            rover_obs: self.rover.obs.clone(),
            base_obs: self.base.obs.clone(),
            navigation: self.navigation(),
            output: self.solution.clone(),
        }
    }
}
