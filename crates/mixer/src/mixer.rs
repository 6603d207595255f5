//! Mischfunktion und Misch-Worker
//!
//! [`mischen`] ist rein: gleiche Eingaben liefern bitgleiche Ausgaben. Der
//! Worker ruft pro Konferenz im Frame-Takt [`Konferenz::tick`] auf.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use voicebridge_core::{Frame, Pose};
use voicebridge_spatial::Spatializer;

use crate::konferenz::Konferenz;

/// Eine Quelle/ein Hoerer eines Ticks
#[derive(Debug, Clone)]
pub struct MischEingang {
    pub pose: Pose,
    /// Spatializer der Quelle (bestimmt, wie andere sie hoeren)
    pub spatializer: Arc<dyn Spatializer>,
    /// `None` = Stille (stumm oder kein Frame eingetroffen)
    pub frame: Option<Frame>,
}

/// Mischt fuer jeden Eintrag die Summe aller anderen Quellen
///
/// Ausgabe `i` enthaelt nie Anteile von Eingabe `i`. Frames werden auf
/// `frame_samples` aufgefuellt bzw. gekuerzt, die Summe wird auf den
/// i16-Bereich begrenzt.
pub fn mischen(eingaenge: &[MischEingang], frame_samples: usize) -> Vec<Frame> {
    let mut summen = vec![vec![0f32; frame_samples]; eingaenge.len()];

    for (q, quelle) in eingaenge.iter().enumerate() {
        let Some(frame) = quelle.frame.as_deref() else {
            continue;
        };
        for (h, hoerer) in eingaenge.iter().enumerate() {
            if h == q {
                continue;
            }
            let gain = quelle.spatializer.daempfung(&quelle.pose, &hoerer.pose).gain as f32;
            if gain <= 0.0 {
                continue;
            }
            // fehlende Samples zaehlen als 0, ueberzaehlige fallen weg
            for (summe, &sample) in summen[h].iter_mut().zip(frame) {
                *summe += sample as f32 * gain;
            }
        }
    }

    summen
        .into_iter()
        .map(|summe| summe.into_iter().map(begrenzen).collect())
        .collect()
}

fn begrenzen(wert: f32) -> i16 {
    wert.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Startet den Misch-Worker einer Konferenz
///
/// Verpasste Ticks werden uebersprungen, nicht nachgeholt. Der Worker endet,
/// sobald die Konferenz geschlossen wird.
pub fn worker_starten(konferenz: Arc<Konferenz>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut intervall = tokio::time::interval(konferenz.konfig().frame_dauer());
        intervall.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut geschlossen = konferenz.geschlossen_empfaenger();

        tracing::debug!(konferenz = %konferenz.name(), "Misch-Worker gestartet");
        loop {
            tokio::select! {
                _ = intervall.tick() => {
                    konferenz.tick();
                }
                ergebnis = geschlossen.changed() => {
                    if ergebnis.is_err() || *geschlossen.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!(konferenz = %konferenz.name(), "Misch-Worker beendet");
    })
}
