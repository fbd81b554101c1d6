use hifitime::prelude::{Duration, Epoch};
use log::{debug, info, warn};

use crate::{
    fix::{PositionFix, quality},
    nmea::Sentence,
};

/// Rover live state, fed by the local receiver telemetry
#[derive(Debug)]
pub struct Runtime {
    /// Current [Epoch]
    pub epoch: Epoch,

    /// Epoch of deployment
    deploy_time: Epoch,

    /// Uptime as [Duration]
    pub uptime: Duration,

    /// Latest position reported by the receiver
    pub fix: Option<PositionFix>,

    /// Latest position dilution of precision
    pub pdop: Option<f64>,
}

impl Runtime {
    pub fn new(epoch: Epoch) -> Self {
        Self {
            epoch,
            deploy_time: epoch,
            uptime: Default::default(),
            fix: None,
            pdop: None,
        }
    }

    /// Update latest epoch
    pub fn new_epoch(&mut self, epoch: Epoch) {
        self.epoch = epoch;
        self.uptime = epoch - self.deploy_time;
    }

    /// Latest fix quality, invalid until a position is reported
    pub fn fix_quality(&self) -> u8 {
        self.fix.map(|fix| fix.quality).unwrap_or(quality::INVALID)
    }

    /// Latches one receiver sentence
    pub fn latch(&mut self, sentence: Sentence) {
        match sentence {
            Sentence::Position(fix) => {
                let previous = self.fix_quality();

                if fix.quality != previous {
                    if quality::rank(fix.quality) < quality::rank(previous) {
                        warn!("{} - fix quality degraded: {} -> {}", self.epoch, previous, fix.quality);
                    } else {
                        info!("{} - fix quality: {} -> {}", self.epoch, previous, fix.quality);
                    }
                }

                debug!("{} - {}", self.epoch, fix);
                self.fix = Some(fix);
            },
            Sentence::Precision(pdop) => {
                self.pdop = Some(pdop);
            },
        }
    }
}
