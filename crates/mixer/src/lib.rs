//! voicebridge-mixer – Konferenz-Mixer
//!
//! Mischt fuer jeden Hoerer einer Konferenz eine persoenliche Summe aller
//! anderen aktiven Quellen, gewichtet mit der Daempfung ihres Spatializers.
//!
//! ## Module
//! - [`call`] – Teilnehmer-Zustand und Audio-Puffer
//! - [`konferenz`] – Mitgliedschaft (Copy-on-Write) und Misch-Tick
//! - [`mixer`] – Reine Mischfunktion und Misch-Worker
//! - [`manager`] – Register aller Konferenzen

pub mod call;
pub mod konferenz;
pub mod manager;
pub mod mixer;

pub use call::{Call, CallInfo};
pub use konferenz::{Konferenz, TickBericht};
pub use manager::KonferenzManager;
pub use mixer::{mischen, MischEingang};

use std::time::Duration;
use voicebridge_core::{BridgeError, Result};

/// Parameter des Misch-Ticks und der Call-Puffer
#[derive(Debug, Clone, PartialEq)]
pub struct MixerKonfig {
    /// Abtastrate in Hz
    pub sample_rate: u32,
    /// Dauer eines Frames / Ticks in Millisekunden
    pub frame_ms: u32,
    /// Maximale Anzahl wartender Eingangs-Frames pro Call
    pub eingangs_puffer_frames: usize,
    /// Maximale Anzahl wartender Ausgangs-Frames pro Call
    pub ausgangs_puffer_frames: usize,
    /// Aeltere Eingangs-Frames gelten als veraltet und werden verworfen
    pub max_frame_alter: Duration,
    /// Nach so vielen fehlenden Frames in Folge wird ein Unterlauf gemeldet
    pub unterlauf_meldung_frames: u64,
}

impl Default for MixerKonfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_ms: 20,
            eingangs_puffer_frames: 8,
            ausgangs_puffer_frames: 16,
            max_frame_alter: Duration::from_millis(200),
            unterlauf_meldung_frames: 50,
        }
    }
}

impl MixerKonfig {
    /// Samples pro Frame (320 bei 16 kHz / 20 ms)
    pub fn frame_samples(&self) -> usize {
        (self.sample_rate as usize * self.frame_ms as usize) / 1000
    }

    /// Tick-Intervall
    pub fn frame_dauer(&self) -> Duration {
        Duration::from_millis(self.frame_ms as u64)
    }

    pub fn validieren(&self) -> Result<()> {
        if self.frame_samples() == 0 {
            return Err(BridgeError::konfiguration(format!(
                "Frame ohne Samples: sample_rate={} frame_ms={}",
                self.sample_rate, self.frame_ms
            )));
        }
        if self.eingangs_puffer_frames == 0 || self.ausgangs_puffer_frames == 0 {
            return Err(BridgeError::konfiguration("Puffergroessen muessen > 0 sein"));
        }
        if self.unterlauf_meldung_frames == 0 {
            return Err(BridgeError::konfiguration("unterlauf_meldung_frames muss > 0 sein"));
        }
        Ok(())
    }
}
