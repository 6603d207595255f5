//! Konferenz – Mitgliedschaft und Misch-Tick
//!
//! Die Mitgliederliste wird per Copy-on-Write ersetzt: ein Tick arbeitet auf
//! einem Schnappschuss und sieht einen Call entweder ganz oder gar nicht.
//! Austragen und Tick teilen sich eine Sperre, damit ein ausgetragener Call
//! nach der Rueckkehr von [`Konferenz::verlassen`] in keinem Tick mehr auftaucht.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use voicebridge_core::{BridgeError, CallId, CallStatus, Result};
use voicebridge_spatial::Spatializer;

use crate::call::Call;
use crate::mixer::{mischen, MischEingang};
use crate::MixerKonfig;

/// Ergebnis eines Ticks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickBericht {
    /// Gemischte (aktive) Teilnehmer
    pub teilnehmer: usize,
    /// Teilnehmer ohne Eingangs-Frame in diesem Tick
    pub fehlend: usize,
}

#[derive(Debug)]
pub struct Konferenz {
    name: String,
    mitglieder: RwLock<Arc<Vec<Arc<Call>>>>,
    tick_sperre: Mutex<()>,
    standard_spatializer: Arc<dyn Spatializer>,
    konfig: MixerKonfig,
    ticks: AtomicU64,
    geschlossen: watch::Sender<bool>,
}

impl Konferenz {
    pub fn neu(
        name: impl Into<String>,
        standard_spatializer: Arc<dyn Spatializer>,
        konfig: MixerKonfig,
    ) -> Self {
        let (geschlossen, _) = watch::channel(false);
        Self {
            name: name.into(),
            mitglieder: RwLock::new(Arc::new(Vec::new())),
            tick_sperre: Mutex::new(()),
            standard_spatializer,
            konfig,
            ticks: AtomicU64::new(0),
            geschlossen,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn konfig(&self) -> &MixerKonfig {
        &self.konfig
    }

    pub fn standard_spatializer(&self) -> &Arc<dyn Spatializer> {
        &self.standard_spatializer
    }

    /// Schnappschuss der aktuellen Mitglieder
    pub fn mitglieder(&self) -> Arc<Vec<Arc<Call>>> {
        self.mitglieder.read().clone()
    }

    pub fn anzahl(&self) -> usize {
        self.mitglieder.read().len()
    }

    pub fn ist_leer(&self) -> bool {
        self.mitglieder.read().is_empty()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Traegt einen Call ein und aktiviert ihn
    pub fn beitreten(&self, call: Arc<Call>) -> Result<()> {
        {
            let mut mitglieder = self.mitglieder.write();
            if mitglieder.iter().any(|c| c.id() == call.id()) {
                return Err(BridgeError::UngueltigerZustand(format!(
                    "Call {} ist bereits in Konferenz {}",
                    call.id(),
                    self.name
                )));
            }
            let mut neu = Vec::with_capacity(mitglieder.len() + 1);
            neu.extend(mitglieder.iter().cloned());
            neu.push(call.clone());
            *mitglieder = Arc::new(neu);
        }
        call.aktivieren(self.standard_spatializer.as_ref());
        tracing::info!(
            konferenz = %self.name,
            call_id = %call.id(),
            mitglieder = self.anzahl(),
            "Call beigetreten"
        );
        Ok(())
    }

    /// Traegt einen Call aus und gibt seine Puffer frei
    ///
    /// Wartet einen laufenden Tick ab; danach ist der Call in keinem Tick
    /// mehr enthalten.
    pub fn verlassen(&self, call_id: CallId) -> Option<Arc<Call>> {
        let _tick = self.tick_sperre.lock();
        let entfernt = {
            let mut mitglieder = self.mitglieder.write();
            let pos = mitglieder.iter().position(|c| c.id() == call_id)?;
            let mut neu: Vec<Arc<Call>> = (**mitglieder).clone();
            let call = neu.remove(pos);
            *mitglieder = Arc::new(neu);
            call
        };
        entfernt.freigeben();
        tracing::info!(
            konferenz = %self.name,
            %call_id,
            mitglieder = self.anzahl(),
            "Call ausgetreten"
        );
        Some(entfernt)
    }

    /// Ein Misch-Durchlauf
    ///
    /// Jeder aktive Call liefert hoechstens einen Eingangs-Frame; fehlt er,
    /// zaehlt die Quelle als Stille und der Unterlauf-Zaehler steigt.
    pub fn tick(&self) -> TickBericht {
        let _tick = self.tick_sperre.lock();
        let mitglieder = self.mitglieder();
        let jetzt = Instant::now();

        let mut calls = Vec::with_capacity(mitglieder.len());
        let mut eingaenge = Vec::with_capacity(mitglieder.len());
        let mut fehlend = 0;

        for call in mitglieder.iter() {
            let schnappschuss = call.schnappschuss();
            if schnappschuss.status != CallStatus::Aktiv {
                continue;
            }
            let frame = match call.eingang_holen(jetzt, self.konfig.max_frame_alter) {
                Some(frame) => {
                    call.frame_erhalten();
                    Some(frame)
                }
                None => {
                    call.fehlend_registrieren();
                    fehlend += 1;
                    None
                }
            };
            eingaenge.push(MischEingang {
                pose: schnappschuss.pose,
                spatializer: schnappschuss
                    .spatializer
                    .unwrap_or_else(|| self.standard_spatializer.clone()),
                frame: if schnappschuss.stumm { None } else { frame },
            });
            calls.push(call);
        }

        let ausgaben = mischen(&eingaenge, self.konfig.frame_samples());
        for (call, frame) in calls.into_iter().zip(ausgaben) {
            call.ausgang_senden(frame);
        }

        self.ticks.fetch_add(1, Ordering::Relaxed);
        TickBericht {
            teilnehmer: eingaenge.len(),
            fehlend,
        }
    }

    /// Beendet den Misch-Worker
    pub fn schliessen(&self) {
        self.geschlossen.send_replace(true);
        tracing::debug!(konferenz = %self.name, "Konferenz geschlossen");
    }

    pub fn ist_geschlossen(&self) -> bool {
        *self.geschlossen.borrow()
    }

    pub(crate) fn geschlossen_empfaenger(&self) -> watch::Receiver<bool> {
        self.geschlossen.subscribe()
    }
}
