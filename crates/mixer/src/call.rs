//! Call – ein Teilnehmer einer Konferenz
//!
//! Haelt Pose, Spatializer und Stummschaltung hinter einem RwLock, damit der
//! Misch-Tick pro Call einen konsistenten Schnappschuss liest. Eingangs-Frames
//! liegen in einer begrenzten Warteschlange (bei Ueberlauf faellt der aelteste
//! Frame weg), Ausgangs-Frames gehen per `try_send` an den Medien-Sender.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::mpsc;
use voicebridge_core::{CallEreignis, CallId, CallStatus, Frame, Pose, SpatializerArt};
use voicebridge_spatial::Spatializer;

use crate::MixerKonfig;

/// Veraenderlicher Zustand, der gemeinsam gelesen und geschrieben wird
#[derive(Debug)]
struct CallZustand {
    pose: Pose,
    spatializer: Option<Arc<dyn Spatializer>>,
    stumm: bool,
    status: CallStatus,
}

/// Konsistente Sicht auf einen Call fuer einen Misch-Tick
#[derive(Debug, Clone)]
pub(crate) struct CallSchnappschuss {
    pub pose: Pose,
    pub spatializer: Option<Arc<dyn Spatializer>>,
    pub stumm: bool,
    pub status: CallStatus,
}

/// Zustand eines Calls fuer `callinfo`
#[derive(Debug, Clone, Serialize)]
pub struct CallInfo {
    pub call: CallId,
    pub ziel: String,
    pub konferenz: String,
    pub status: CallStatus,
    pub pose: Pose,
    pub stumm: bool,
    pub spatializer: Option<SpatializerArt>,
    pub attenuator: Option<f64>,
    pub eingang_wartend: usize,
    pub fehlende_frames: u64,
    pub erstellt_am: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Call {
    id: CallId,
    ziel: String,
    konferenz: String,
    erstellt_am: DateTime<Utc>,
    zustand: RwLock<CallZustand>,

    eingang: Mutex<VecDeque<(Instant, Frame)>>,
    eingang_max: usize,
    ausgang_tx: Mutex<Option<mpsc::Sender<Frame>>>,
    ausgang_rx: Mutex<Option<mpsc::Receiver<Frame>>>,

    fehlend_gesamt: AtomicU64,
    fehlend_in_folge: AtomicU64,
    unterlauf_schwelle: u64,

    ereignisse: Option<mpsc::UnboundedSender<CallEreignis>>,
}

impl Call {
    /// Legt einen Call im Status `Aufbau` an
    ///
    /// `ereignisse` ist der Kanal der besitzenden Session; ohne Kanal werden
    /// Ereignisse nur geloggt.
    pub fn neu(
        id: CallId,
        ziel: impl Into<String>,
        konferenz: impl Into<String>,
        pose: Pose,
        konfig: &MixerKonfig,
        ereignisse: Option<mpsc::UnboundedSender<CallEreignis>>,
    ) -> Self {
        let (ausgang_tx, ausgang_rx) = mpsc::channel(konfig.ausgangs_puffer_frames.max(1));
        Self {
            id,
            ziel: ziel.into(),
            konferenz: konferenz.into(),
            erstellt_am: Utc::now(),
            zustand: RwLock::new(CallZustand {
                pose,
                spatializer: None,
                stumm: false,
                status: CallStatus::Aufbau,
            }),
            eingang: Mutex::new(VecDeque::with_capacity(konfig.eingangs_puffer_frames)),
            eingang_max: konfig.eingangs_puffer_frames.max(1),
            ausgang_tx: Mutex::new(Some(ausgang_tx)),
            ausgang_rx: Mutex::new(Some(ausgang_rx)),
            fehlend_gesamt: AtomicU64::new(0),
            fehlend_in_folge: AtomicU64::new(0),
            unterlauf_schwelle: konfig.unterlauf_meldung_frames.max(1),
            ereignisse,
        }
    }

    pub fn id(&self) -> CallId {
        self.id
    }

    pub fn ziel(&self) -> &str {
        &self.ziel
    }

    pub fn konferenz(&self) -> &str {
        &self.konferenz
    }

    pub fn status(&self) -> CallStatus {
        self.zustand.read().status
    }

    pub fn pose(&self) -> Pose {
        self.zustand.read().pose
    }

    /// Neue Pose; wird ab dem naechsten Tick verwendet
    pub fn pose_setzen(&self, pose: Pose) {
        self.zustand.write().pose = pose;
        tracing::trace!(call_id = %self.id, ?pose, "Pose gesetzt");
    }

    pub fn ist_stumm(&self) -> bool {
        self.zustand.read().stumm
    }

    pub fn stumm_setzen(&self, stumm: bool) {
        self.zustand.write().stumm = stumm;
        tracing::debug!(call_id = %self.id, stumm, "Stummschaltung geaendert");
    }

    pub fn spatializer(&self) -> Option<Arc<dyn Spatializer>> {
        self.zustand.read().spatializer.clone()
    }

    /// Ersetzt den Spatializer atomar
    pub fn spatializer_setzen(&self, spatializer: Arc<dyn Spatializer>) {
        let art = spatializer.art();
        self.zustand.write().spatializer = Some(spatializer);
        tracing::debug!(call_id = %self.id, art = art.als_str(), "Spatializer gesetzt");
    }

    /// Wechselt nach `Aktiv`; ohne eigenen Spatializer wird eine Kopie des
    /// Konferenz-Standards uebernommen
    pub fn aktivieren(&self, standard: &dyn Spatializer) {
        {
            let mut zustand = self.zustand.write();
            if zustand.status != CallStatus::Aufbau {
                return;
            }
            if zustand.spatializer.is_none() {
                zustand.spatializer = Some(Arc::from(standard.klonen()));
            }
            zustand.status = CallStatus::Aktiv;
        }
        tracing::info!(call_id = %self.id, konferenz = %self.konferenz, "Call aktiv");
        self.melden(CallEreignis::Status {
            call_id: self.id,
            status: CallStatus::Aktiv,
        });
    }

    /// Beendet den Call und gibt seine Puffer frei
    ///
    /// Der Ausgangs-Sender wird verworfen, damit der Medien-Sender endet.
    pub fn freigeben(&self) {
        {
            let mut zustand = self.zustand.write();
            if zustand.status == CallStatus::Beendet {
                return;
            }
            zustand.status = CallStatus::Beendet;
        }
        self.eingang.lock().clear();
        self.ausgang_tx.lock().take();
        tracing::info!(
            call_id = %self.id,
            fehlende_frames = self.fehlend_gesamt.load(Ordering::Relaxed),
            "Call beendet"
        );
        self.melden(CallEreignis::Status {
            call_id: self.id,
            status: CallStatus::Beendet,
        });
    }

    // -----------------------------------------------------------------------
    // Audio-Pfad
    // -----------------------------------------------------------------------

    /// Nimmt einen empfangenen Frame an; bei voller Warteschlange faellt der
    /// aelteste Frame weg
    pub fn eingang_schieben(&self, frame: Frame) {
        if self.status() == CallStatus::Beendet {
            return;
        }
        let mut eingang = self.eingang.lock();
        if eingang.len() >= self.eingang_max {
            eingang.pop_front();
            tracing::trace!(call_id = %self.id, "Eingangspuffer voll, aeltester Frame verworfen");
        }
        eingang.push_back((Instant::now(), frame));
    }

    pub fn eingang_wartend(&self) -> usize {
        self.eingang.lock().len()
    }

    /// Holt den naechsten nicht veralteten Frame
    pub(crate) fn eingang_holen(&self, jetzt: Instant, max_alter: Duration) -> Option<Frame> {
        let mut eingang = self.eingang.lock();
        while let Some((empfangen, frame)) = eingang.pop_front() {
            if jetzt.saturating_duration_since(empfangen) <= max_alter {
                return Some(frame);
            }
            tracing::trace!(call_id = %self.id, "Veralteten Frame verworfen");
        }
        None
    }

    /// Uebergibt den Empfaenger der gemischten Frames (genau einmal)
    pub fn ausgang_empfaenger_nehmen(&self) -> Option<mpsc::Receiver<Frame>> {
        self.ausgang_rx.lock().take()
    }

    /// Stellt einen gemischten Frame zu; ist die Warteschlange voll, wird der
    /// neue Frame verworfen
    pub(crate) fn ausgang_senden(&self, frame: Frame) {
        let tx = self.ausgang_tx.lock();
        let Some(tx) = tx.as_ref() else {
            return;
        };
        match tx.try_send(frame) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::trace!(call_id = %self.id, "Ausgangspuffer voll, Frame verworfen");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    /// Zaehlt einen fehlenden Frame; meldet bei jedem Vielfachen der Schwelle
    /// einen Unterlauf
    pub(crate) fn fehlend_registrieren(&self) {
        self.fehlend_gesamt.fetch_add(1, Ordering::Relaxed);
        let in_folge = self.fehlend_in_folge.fetch_add(1, Ordering::Relaxed) + 1;
        if in_folge % self.unterlauf_schwelle == 0 {
            tracing::debug!(call_id = %self.id, fehlend = in_folge, "Unterlauf");
            self.melden(CallEreignis::Unterlauf {
                call_id: self.id,
                fehlend: in_folge,
            });
        }
    }

    pub(crate) fn frame_erhalten(&self) {
        self.fehlend_in_folge.store(0, Ordering::Relaxed);
    }

    pub fn fehlende_frames(&self) -> u64 {
        self.fehlend_gesamt.load(Ordering::Relaxed)
    }

    pub(crate) fn schnappschuss(&self) -> CallSchnappschuss {
        let z = self.zustand.read();
        CallSchnappschuss {
            pose: z.pose,
            spatializer: z.spatializer.clone(),
            stumm: z.stumm,
            status: z.status,
        }
    }

    pub fn info(&self) -> CallInfo {
        let z = self.schnappschuss();
        CallInfo {
            call: self.id,
            ziel: self.ziel.clone(),
            konferenz: self.konferenz.clone(),
            status: z.status,
            pose: z.pose,
            stumm: z.stumm,
            spatializer: z.spatializer.as_ref().map(|s| s.art()),
            attenuator: z.spatializer.as_ref().map(|s| s.attenuator()),
            eingang_wartend: self.eingang_wartend(),
            fehlende_frames: self.fehlende_frames(),
            erstellt_am: self.erstellt_am,
        }
    }

    fn melden(&self, ereignis: CallEreignis) {
        if let Some(tx) = &self.ereignisse {
            // Session bereits weg: Ereignis verfaellt
            let _ = tx.send(ereignis);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicebridge_spatial::VollSpatializer;

    fn call_mit_kanal(
        konfig: &MixerKonfig,
    ) -> (Call, mpsc::UnboundedReceiver<CallEreignis>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let call = Call::neu(CallId::new(), "10.0.0.9:5000", "lobby", Pose::default(), konfig, Some(tx));
        (call, rx)
    }

    #[test]
    fn neuer_call_ist_im_aufbau() {
        let (call, _rx) = call_mit_kanal(&MixerKonfig::default());
        assert_eq!(call.status(), CallStatus::Aufbau);
        assert!(call.spatializer().is_none());
        assert_eq!(call.konferenz(), "lobby");
    }

    #[test]
    fn aktivieren_klont_standard() {
        let (call, mut rx) = call_mit_kanal(&MixerKonfig::default());
        let standard = VollSpatializer::neu();
        call.aktivieren(&standard);

        assert_eq!(call.status(), CallStatus::Aktiv);
        let eigener = call.spatializer().unwrap();
        eigener.attenuator_setzen(0.3);
        assert_eq!(standard.attenuator(), 1.0, "Standard darf nicht geteilt werden");

        assert_eq!(
            rx.try_recv().unwrap(),
            CallEreignis::Status { call_id: call.id(), status: CallStatus::Aktiv }
        );
    }

    #[test]
    fn eigener_spatializer_bleibt_bei_aktivierung() {
        let (call, _rx) = call_mit_kanal(&MixerKonfig::default());
        let eigener: Arc<dyn Spatializer> = Arc::new(VollSpatializer::neu());
        eigener.attenuator_setzen(0.5);
        call.spatializer_setzen(eigener);
        call.aktivieren(&VollSpatializer::neu());
        assert_eq!(call.spatializer().unwrap().attenuator(), 0.5);
    }

    #[test]
    fn eingang_verwirft_aeltesten_frame() {
        let konfig = MixerKonfig {
            eingangs_puffer_frames: 2,
            ..Default::default()
        };
        let (call, _rx) = call_mit_kanal(&konfig);
        call.eingang_schieben(vec![1]);
        call.eingang_schieben(vec![2]);
        call.eingang_schieben(vec![3]);
        assert_eq!(call.eingang_wartend(), 2);

        let jetzt = Instant::now();
        assert_eq!(call.eingang_holen(jetzt, Duration::from_secs(1)), Some(vec![2]));
        assert_eq!(call.eingang_holen(jetzt, Duration::from_secs(1)), Some(vec![3]));
        assert_eq!(call.eingang_holen(jetzt, Duration::from_secs(1)), None);
    }

    #[test]
    fn veraltete_frames_werden_uebersprungen() {
        let (call, _rx) = call_mit_kanal(&MixerKonfig::default());
        call.eingang_schieben(vec![7]);
        let spaeter = Instant::now() + Duration::from_millis(500);
        assert_eq!(call.eingang_holen(spaeter, Duration::from_millis(200)), None);
        assert_eq!(call.eingang_wartend(), 0);
    }

    #[test]
    fn ausgang_verwirft_bei_voller_warteschlange() {
        let konfig = MixerKonfig {
            ausgangs_puffer_frames: 1,
            ..Default::default()
        };
        let (call, _rx) = call_mit_kanal(&konfig);
        let mut empfaenger = call.ausgang_empfaenger_nehmen().unwrap();
        assert!(call.ausgang_empfaenger_nehmen().is_none());

        call.ausgang_senden(vec![1]);
        call.ausgang_senden(vec![2]);
        assert_eq!(empfaenger.try_recv().unwrap(), vec![1]);
        assert!(empfaenger.try_recv().is_err());
    }

    #[test]
    fn unterlauf_bei_jedem_vielfachen() {
        let konfig = MixerKonfig {
            unterlauf_meldung_frames: 3,
            ..Default::default()
        };
        let (call, mut rx) = call_mit_kanal(&konfig);
        for _ in 0..7 {
            call.fehlend_registrieren();
        }
        let fehlend: Vec<u64> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|e| match e {
                CallEreignis::Unterlauf { fehlend, .. } => Some(fehlend),
                _ => None,
            })
            .collect();
        assert_eq!(fehlend, vec![3, 6]);

        call.frame_erhalten();
        call.fehlend_registrieren();
        assert!(rx.try_recv().is_err(), "Folge wurde zurueckgesetzt");
        assert_eq!(call.fehlende_frames(), 8);
    }

    #[test]
    fn freigeben_schliesst_ausgang() {
        let (call, mut rx) = call_mit_kanal(&MixerKonfig::default());
        let mut empfaenger = call.ausgang_empfaenger_nehmen().unwrap();
        call.eingang_schieben(vec![1, 2]);
        call.freigeben();

        assert_eq!(call.status(), CallStatus::Beendet);
        assert_eq!(call.eingang_wartend(), 0);
        assert!(matches!(
            empfaenger.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert_eq!(
            rx.try_recv().unwrap(),
            CallEreignis::Status { call_id: call.id(), status: CallStatus::Beendet }
        );

        // zweites Freigeben ist wirkungslos
        call.freigeben();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn info_spiegelt_zustand() {
        let (call, _rx) = call_mit_kanal(&MixerKonfig::default());
        call.stumm_setzen(true);
        let info = call.info();
        assert!(info.stumm);
        assert_eq!(info.ziel, "10.0.0.9:5000");
        assert!(info.spatializer.is_none());
    }
}
