//! Session-Controller – eine Control-Verbindung
//!
//! Zustandsmaschine:
//! `Verbindend → Authentifizierend → Leerlauf → ImCall → Beendend → Geschlossen`
//!
//! Befehle einer Verbindung werden in Eingangsreihenfolge verarbeitet.
//! Fehlerhafte Befehle erzeugen eine Fehlerantwort und aendern den Zustand
//! nicht. Beim Beenden wird der Call ausgetragen und seine Medien freigegeben.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::codec::FramedRead;
use voicebridge_core::{CallEreignis, CallId, Pose, VoiceManager};
use voicebridge_mixer::{Call, KonferenzManager};

use crate::befehle::{Befehl, DaempfungsAenderung};
use crate::codec::{Eingabe, ZeilenCodec};
use crate::diagnose::UdpTest;
use crate::dispatcher::{ablehnen, UrsprungsRichtlinie};
use crate::error::{ControlError, ControlResult};
use crate::medien::{MedienBinder, MedienHandle};
use crate::protokoll::Protokoll;

/// Ausstehende Zeilen, bevor ein Client als haengend gilt
const AUSGANG_KAPAZITAET: usize = 256;

/// Frist fuer die letzten Zeilen beim Abbau
const ABSCHLUSS_FRIST: Duration = Duration::from_secs(2);

/// Zustand einer Control-Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionZustand {
    /// Verbindung angenommen, noch nicht geprueft
    Verbindend,
    /// Herkunft wird geprueft
    Authentifizierend,
    /// Bereit, kein Call
    Leerlauf,
    /// Call aktiv
    ImCall,
    /// Call wird ausgetragen
    Beendend,
    Geschlossen,
}

impl fmt::Display for SessionZustand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Verbindend => "Verbindend",
            Self::Authentifizierend => "Authentifizierend",
            Self::Leerlauf => "Leerlauf",
            Self::ImCall => "ImCall",
            Self::Beendend => "Beendend",
            Self::Geschlossen => "Geschlossen",
        };
        f.write_str(name)
    }
}

/// Einstellungen fuer alle Sessions
#[derive(Debug, Clone)]
pub struct SessionKonfig {
    /// Ohne eingehende Zeile wird die Session nach dieser Zeit beendet
    pub idle_timeout: Duration,
    pub max_zeilen_laenge: usize,
    /// Konferenz fuer `createcall` ohne `conf=`
    pub standard_konferenz: String,
    /// Lokale Adresse fuer Diagnose-Sockets
    pub private_adresse: IpAddr,
}

impl Default for SessionKonfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(600),
            max_zeilen_laenge: 4096,
            standard_konferenz: "default".to_string(),
            private_adresse: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }
}

/// Gemeinsame Abhaengigkeiten aller Sessions
pub struct SessionKontext {
    pub voice: Arc<VoiceManager>,
    pub konferenzen: KonferenzManager,
    pub medien: Arc<dyn MedienBinder>,
    pub protokoll: Arc<dyn Protokoll>,
    pub richtlinie: UrsprungsRichtlinie,
    pub konfig: SessionKonfig,
}

/// Call einer Session samt Medien-Strecke
#[derive(Debug)]
struct AktiverCall {
    call: Arc<Call>,
    _medien: Box<dyn MedienHandle>,
}

pub struct SessionController {
    kontext: Arc<SessionKontext>,
    peer: SocketAddr,
    zustand: SessionZustand,
    call: Option<AktiverCall>,
    diagnose: Option<JoinHandle<u32>>,
    ereignis_tx: mpsc::UnboundedSender<CallEreignis>,
    ereignis_rx: Option<mpsc::UnboundedReceiver<CallEreignis>>,
}

impl SessionController {
    pub fn neu(kontext: Arc<SessionKontext>, peer: SocketAddr) -> Self {
        let (ereignis_tx, ereignis_rx) = mpsc::unbounded_channel();
        Self {
            kontext,
            peer,
            zustand: SessionZustand::Verbindend,
            call: None,
            diagnose: None,
            ereignis_tx,
            ereignis_rx: Some(ereignis_rx),
        }
    }

    pub fn zustand(&self) -> SessionZustand {
        self.zustand
    }

    pub fn call_id(&self) -> Option<CallId> {
        self.call.as_ref().map(|c| c.call.id())
    }

    /// Prueft die Herkunft der Verbindung
    ///
    /// Ohne aktive Richtlinie geht es direkt nach `Leerlauf`. Abgelehnte
    /// Verbindungen landen in `Geschlossen`.
    pub fn authentifizieren(&mut self) -> bool {
        if self.zustand != SessionZustand::Verbindend {
            return self.zustand == SessionZustand::Leerlauf;
        }
        if self.kontext.richtlinie.ist_aktiv() {
            self.zustand = SessionZustand::Authentifizierend;
            if !self.kontext.richtlinie.pruefen(self.peer.ip()) {
                tracing::warn!(peer = %self.peer, "Verbindung abgelehnt: keine lokale Adresse");
                self.zustand = SessionZustand::Geschlossen;
                return false;
            }
        }
        self.zustand = SessionZustand::Leerlauf;
        true
    }

    /// Verarbeitet die Verbindung bis zum Ende
    ///
    /// Gelesen wird ueber `FramedRead`, geschrieben von einem eigenen Task
    /// aus einer begrenzten Queue. Ein Client, der nicht mehr liest, blockiert
    /// so weder den Idle-Timeout noch den Abbau; laeuft seine Queue voll, wird
    /// die Session beendet.
    pub async fn ausfuehren<S>(mut self, stream: S, mut shutdown_rx: watch::Receiver<bool>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (leser, mut schreiber) = tokio::io::split(stream);

        if !self.authentifizieren() {
            ablehnen(&mut schreiber, self.peer.ip()).await;
            return;
        }
        tracing::info!(peer = %self.peer, "Control-Session gestartet");

        let mut ereignis_rx = match self.ereignis_rx.take() {
            Some(rx) => rx,
            None => return,
        };
        let idle = self.kontext.konfig.idle_timeout;
        let max_laenge = self.kontext.konfig.max_zeilen_laenge;
        let mut zeilen = FramedRead::new(leser, ZeilenCodec::neu(max_laenge));

        let (ausgang_tx, ausgang_rx) = mpsc::channel::<String>(AUSGANG_KAPAZITAET);
        let mut schreib_task = tokio::spawn(zeilen_schreiben(schreiber, ausgang_rx, self.peer));

        let idle_frist = tokio::time::sleep(idle);
        tokio::pin!(idle_frist);

        loop {
            tokio::select! {
                eingabe = zeilen.next() => {
                    let antwort = match eingabe {
                        None => {
                            tracing::info!(peer = %self.peer, "Verbindung vom Client getrennt");
                            break;
                        }
                        Some(Err(e)) => {
                            tracing::warn!(peer = %self.peer, fehler = %e, "Lesefehler auf Control-Verbindung");
                            break;
                        }
                        Some(Ok(eingabe)) => {
                            idle_frist.as_mut().reset(Instant::now() + idle);
                            match eingabe {
                                Eingabe::ZuLang => self.kontext.protokoll.fehler(&ControlError::Protokoll(
                                    format!("Zeile laenger als {max_laenge} Bytes"),
                                )),
                                Eingabe::Zeile(zeile) if zeile.trim().is_empty() => continue,
                                Eingabe::Zeile(zeile) => self.zeile_verarbeiten(&zeile).await,
                            }
                        }
                    };

                    if !self.zustellen(&ausgang_tx, antwort) {
                        break;
                    }
                    if matches!(self.zustand, SessionZustand::Beendend | SessionZustand::Geschlossen) {
                        break;
                    }
                }

                Some(ereignis) = ereignis_rx.recv() => {
                    let zeile = self.kontext.protokoll.ereignis(&ereignis);
                    if !self.zustellen(&ausgang_tx, zeile) {
                        break;
                    }
                }

                () = &mut idle_frist => {
                    tracing::info!(peer = %self.peer, "Idle-Timeout");
                    break;
                }

                // Schreib-Task beendet: Verbindung kaputt
                () = ausgang_tx.closed() => {
                    break;
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(peer = %self.peer, "Shutdown-Signal – Session wird beendet");
                        break;
                    }
                }
            }
        }

        self.beenden();

        // Ereignisse aus dem Abbau (z.B. Call beendet) noch zustellen
        while let Ok(ereignis) = ereignis_rx.try_recv() {
            if !self.zustellen(&ausgang_tx, self.kontext.protokoll.ereignis(&ereignis)) {
                break;
            }
        }
        drop(ausgang_tx);
        if tokio::time::timeout(ABSCHLUSS_FRIST, &mut schreib_task).await.is_err() {
            tracing::debug!(peer = %self.peer, "Ausstehende Zeilen verworfen");
            schreib_task.abort();
        }
        tracing::info!(peer = %self.peer, "Control-Session beendet");
    }

    /// Reiht eine Zeile zum Senden ein; false beendet die Session
    fn zustellen(&self, ausgang: &mpsc::Sender<String>, zeile: String) -> bool {
        match ausgang.try_send(zeile) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(peer = %self.peer, "Client liest nicht, Session wird beendet");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Parst und fuehrt eine Zeile aus, liefert die Antwortzeile
    pub async fn zeile_verarbeiten(&mut self, zeile: &str) -> String {
        let protokoll = Arc::clone(&self.kontext.protokoll);
        let ergebnis = match protokoll.parsen(zeile) {
            Ok(cmd) => match Befehl::aus_zeile(&cmd, &self.kontext.voice) {
                Ok(befehl) => self.befehl_verarbeiten(befehl).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        match ergebnis {
            Ok(felder) => protokoll.ok(&felder),
            Err(e) => {
                tracing::debug!(peer = %self.peer, zustand = %self.zustand, fehler = %e, "Befehl abgelehnt");
                protokoll.fehler(&e)
            }
        }
    }

    /// Fuehrt einen Befehl aus
    pub async fn befehl_verarbeiten(
        &mut self,
        befehl: Befehl,
    ) -> ControlResult<Vec<(&'static str, String)>> {
        if !befehl.erlaubt_in(self.zustand) {
            return Err(ControlError::UngueltigerZustand(format!(
                "'{}' im Zustand {}",
                befehl.name(),
                self.zustand
            )));
        }

        match befehl {
            Befehl::CallErstellen {
                ziel,
                konferenz,
                pose,
                spatializer,
            } => self.call_erstellen(ziel, konferenz, pose, spatializer).await,

            Befehl::Positionieren {
                call,
                position,
                orientierung,
            } => {
                let call = self.aktiver_call(call)?;
                let orientierung = orientierung.unwrap_or_else(|| call.pose().orientierung);
                call.pose_setzen(Pose {
                    position,
                    orientierung,
                });
                Ok(Vec::new())
            }

            Befehl::Stumm { call, an } => {
                self.aktiver_call(call)?.stumm_setzen(an);
                Ok(Vec::new())
            }

            Befehl::DaempfungSetzen { call, aenderung } => {
                let call = self.aktiver_call(call)?;
                match aenderung {
                    DaempfungsAenderung::Spatializer(auswahl) => {
                        call.spatializer_setzen(auswahl.bauen(&self.kontext.voice)?);
                    }
                    // Laufende Ticks behalten ihren Schnappschuss
                    DaempfungsAenderung::Lautstaerke(wert) => match call.spatializer() {
                        Some(s) => {
                            let neu = s.klonen();
                            neu.attenuator_setzen(wert);
                            call.spatializer_setzen(Arc::from(neu));
                        }
                        None => {
                            return Err(ControlError::UngueltigerZustand(
                                "Call hat noch keinen Spatializer".into(),
                            ))
                        }
                    },
                }
                Ok(Vec::new())
            }

            Befehl::CallInfo { call } => {
                let info = self.aktiver_call(call)?.info();
                let json = serde_json::to_string(&info).map_err(anyhow::Error::from)?;
                Ok(vec![("data", json)])
            }

            Befehl::UdpTesten { host, port, dauer } => {
                let ziel = tokio::net::lookup_host((host.as_str(), port))
                    .await
                    .map_err(|e| ControlError::UngueltigeEingabe(format!("{host}: {e}")))?
                    .next()
                    .ok_or_else(|| ControlError::NichtGefunden(format!("Keine Adresse fuer {host}")))?;
                let test = UdpTest::neu(ziel, self.kontext.konfig.private_adresse, dauer);
                if let Some(alt) = self.diagnose.take() {
                    alt.abort();
                }
                self.diagnose = Some(tokio::spawn(test.ausfuehren(self.ereignis_tx.clone())));
                tracing::info!(peer = %self.peer, %ziel, "UDP-Test gestartet");
                Ok(Vec::new())
            }

            Befehl::Version => Ok(vec![("version", env!("CARGO_PKG_VERSION").to_string())]),

            Befehl::Auflegen { call } => {
                self.aktiver_call(call)?;
                self.zustand = SessionZustand::Beendend;
                Ok(Vec::new())
            }

            Befehl::Beenden => {
                self.zustand = SessionZustand::Beendend;
                Ok(vec![("msg", "bye".to_string())])
            }
        }
    }

    async fn call_erstellen(
        &mut self,
        ziel: String,
        konferenz: Option<String>,
        pose: Pose,
        spatializer: Option<crate::befehle::SpatializerAuswahl>,
    ) -> ControlResult<Vec<(&'static str, String)>> {
        let konferenz = konferenz.unwrap_or_else(|| self.kontext.konfig.standard_konferenz.clone());
        let call = Arc::new(Call::neu(
            CallId::new(),
            ziel.as_str(),
            konferenz.as_str(),
            pose,
            self.kontext.konferenzen.konfig(),
            Some(self.ereignis_tx.clone()),
        ));
        if let Some(auswahl) = spatializer {
            call.spatializer_setzen(auswahl.bauen(&self.kontext.voice)?);
        }

        let medien = self.kontext.medien.binden(Arc::clone(&call), &ziel).await?;
        let port = medien.lokaler_port();
        self.kontext.konferenzen.beitreten(Arc::clone(&call))?;

        tracing::info!(
            peer = %self.peer,
            call_id = %call.id(),
            konferenz = %konferenz,
            ziel = %ziel,
            port,
            "Call aufgebaut"
        );
        let felder = vec![
            ("call", call.id().to_string()),
            ("conf", konferenz),
            ("port", port.to_string()),
        ];
        self.call = Some(AktiverCall {
            call,
            _medien: medien,
        });
        self.zustand = SessionZustand::ImCall;
        Ok(felder)
    }

    /// Der Call dieser Session; eine abweichende `call=`-ID ist unbekannt
    fn aktiver_call(&self, angegeben: Option<CallId>) -> ControlResult<&Arc<Call>> {
        let aktiv = self
            .call
            .as_ref()
            .map(|c| &c.call)
            .ok_or_else(|| ControlError::UngueltigerZustand("Kein aktiver Call".into()))?;
        match angegeben {
            Some(id) if id != aktiv.id() => Err(ControlError::NichtGefunden(format!("Call {id}"))),
            _ => Ok(aktiv),
        }
    }

    /// Traegt den Call aus, beendet die Diagnose und schliesst die Session
    pub fn beenden(&mut self) {
        if self.zustand == SessionZustand::Geschlossen {
            return;
        }
        self.zustand = SessionZustand::Beendend;
        if let Some(aktiv) = self.call.take() {
            let id = aktiv.call.id();
            if self.kontext.konferenzen.verlassen(id).is_none() {
                aktiv.call.freigeben();
            }
            tracing::info!(peer = %self.peer, call_id = %id, "Call ausgetragen");
        }
        if let Some(diagnose) = self.diagnose.take() {
            diagnose.abort();
        }
        self.zustand = SessionZustand::Geschlossen;
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.beenden();
    }
}

/// Schreibt Antworten und Ereignisse in Eingangsreihenfolge
async fn zeilen_schreiben<W>(mut schreiber: W, mut ausgang: mpsc::Receiver<String>, peer: SocketAddr)
where
    W: AsyncWrite + Unpin,
{
    while let Some(zeile) = ausgang.recv().await {
        if let Err(e) = schreiber.write_all(zeile.as_bytes()).await {
            tracing::warn!(peer = %peer, fehler = %e, "Senden fehlgeschlagen");
            return;
        }
    }
    let _ = schreiber.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medien::SpeicherBinder;
    use crate::protokoll::ZeilenProtokoll;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use voicebridge_core::{CallStatus, Position};
    use voicebridge_mixer::MixerKonfig;

    struct Aufbau {
        kontext: Arc<SessionKontext>,
        binder: SpeicherBinder,
    }

    fn aufbau(nur_lokal: bool) -> Aufbau {
        aufbau_mit(nur_lokal, SessionKonfig::default())
    }

    fn aufbau_mit(nur_lokal: bool, konfig: SessionKonfig) -> Aufbau {
        let voice = Arc::new(VoiceManager::default());
        let binder = SpeicherBinder::neu();
        let konferenzen = KonferenzManager::manuell(Arc::clone(&voice), MixerKonfig::default()).unwrap();
        let kontext = Arc::new(SessionKontext {
            voice,
            konferenzen,
            medien: Arc::new(binder.clone()),
            protokoll: Arc::new(ZeilenProtokoll),
            richtlinie: UrsprungsRichtlinie::neu(nur_lokal, None),
            konfig,
        });
        Aufbau { kontext, binder }
    }

    fn lokaler_peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    fn session(a: &Aufbau) -> SessionController {
        let mut s = SessionController::neu(Arc::clone(&a.kontext), lokaler_peer());
        assert!(s.authentifizieren());
        s
    }

    fn call_erstellen() -> Befehl {
        Befehl::CallErstellen {
            ziel: "127.0.0.1:5004".into(),
            konferenz: Some("raum".into()),
            pose: Pose::default(),
            spatializer: None,
        }
    }

    #[test]
    fn authentifizierung_ohne_richtlinie() {
        let a = aufbau(false);
        let mut s = SessionController::neu(Arc::clone(&a.kontext), "8.8.8.8:1".parse().unwrap());
        assert_eq!(s.zustand(), SessionZustand::Verbindend);
        assert!(s.authentifizieren());
        assert_eq!(s.zustand(), SessionZustand::Leerlauf);
    }

    #[test]
    fn fremde_herkunft_wird_geschlossen() {
        let a = aufbau(true);
        let mut s = SessionController::neu(Arc::clone(&a.kontext), "8.8.8.8:1".parse().unwrap());
        assert!(!s.authentifizieren());
        assert_eq!(s.zustand(), SessionZustand::Geschlossen);
    }

    #[tokio::test]
    async fn reposition_im_leerlauf_ist_fehler() {
        let a = aufbau(false);
        let mut s = session(&a);
        let e = s
            .befehl_verarbeiten(Befehl::Positionieren {
                call: None,
                position: Position::neu(1.0, 2.0, 0.0),
                orientierung: None,
            })
            .await
            .unwrap_err();
        assert!(e.ist_protokollfehler());
        assert_eq!(e.fehler_code(), 1002);
        assert_eq!(s.zustand(), SessionZustand::Leerlauf);
    }

    #[tokio::test]
    async fn reposition_im_call_wirkt_im_naechsten_tick() {
        let a = aufbau(false);
        let mut s = session(&a);
        let felder = s.befehl_verarbeiten(call_erstellen()).await.unwrap();
        assert_eq!(s.zustand(), SessionZustand::ImCall);
        assert_eq!(felder[1], ("conf", "raum".to_string()));
        let id = s.call_id().unwrap();
        assert_eq!(felder[0], ("call", id.to_string()));

        // Zweiter Teilnehmer, weit weg ausserhalb der Reichweite
        let b = Arc::new(Call::neu(
            CallId::new(),
            "127.0.0.1:6000",
            "raum",
            Pose::neu(500.0, 0.0, 0.0, 0.0),
            &MixerKonfig::default(),
            None,
        ));
        let mut b_aus = b.ausgang_empfaenger_nehmen().unwrap();
        a.kontext.konferenzen.beitreten(Arc::clone(&b)).unwrap();
        let konferenz = a.kontext.konferenzen.konferenz("raum").unwrap();

        a.binder.frame_einspeisen(&id, vec![1000; 320]);
        konferenz.tick();
        assert_eq!(b_aus.try_recv().unwrap(), vec![0; 320], "ausser Reichweite");

        s.befehl_verarbeiten(Befehl::Positionieren {
            call: Some(id),
            position: Position::neu(500.0, 0.5, 0.0),
            orientierung: None,
        })
        .await
        .unwrap();
        assert_eq!(s.zustand(), SessionZustand::ImCall);

        a.binder.frame_einspeisen(&id, vec![1000; 320]);
        konferenz.tick();
        assert_eq!(b_aus.try_recv().unwrap(), vec![1000; 320], "neue Pose wirkt sofort");
    }

    #[tokio::test]
    async fn zweiter_createcall_ist_fehler() {
        let a = aufbau(false);
        let mut s = session(&a);
        s.befehl_verarbeiten(call_erstellen()).await.unwrap();
        let e = s.befehl_verarbeiten(call_erstellen()).await.unwrap_err();
        assert_eq!(e.fehler_code(), 1002);
        assert_eq!(a.binder.gebunden(), 1);
    }

    #[tokio::test]
    async fn fremde_call_id_ist_unbekannt() {
        let a = aufbau(false);
        let mut s = session(&a);
        s.befehl_verarbeiten(call_erstellen()).await.unwrap();
        let e = s
            .befehl_verarbeiten(Befehl::Stumm {
                call: Some(CallId::new()),
                an: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(e, ControlError::NichtGefunden(_)));
    }

    #[tokio::test]
    async fn fehlerhafte_zeile_aendert_zustand_nicht() {
        let a = aufbau(false);
        let mut s = session(&a);
        let antwort = s.zeile_verarbeiten("reposition x=1").await;
        assert!(antwort.starts_with("error id=1005"), "{antwort}");
        let antwort = s.zeile_verarbeiten("blubb").await;
        assert!(antwort.starts_with("error id=1001"), "{antwort}");
        assert_eq!(s.zustand(), SessionZustand::Leerlauf);
    }

    #[tokio::test]
    async fn hangup_traegt_call_aus() {
        let a = aufbau(false);
        let mut s = session(&a);
        s.befehl_verarbeiten(call_erstellen()).await.unwrap();
        let call = a.kontext.konferenzen.konferenz("raum").unwrap().mitglieder()[0].clone();

        let antwort = s.zeile_verarbeiten("hangup").await;
        assert_eq!(antwort, "ok\n");
        assert_eq!(s.zustand(), SessionZustand::Beendend);

        s.beenden();
        assert_eq!(s.zustand(), SessionZustand::Geschlossen);
        assert_eq!(call.status(), CallStatus::Beendet);
        assert_eq!(a.kontext.konferenzen.anzahl_konferenzen(), 0);
        assert_eq!(a.binder.gebunden(), 0);
    }

    #[tokio::test]
    async fn lautstaerke_und_spatializer_wechsel() {
        let a = aufbau(false);
        let mut s = session(&a);
        s.befehl_verarbeiten(call_erstellen()).await.unwrap();

        assert_eq!(s.zeile_verarbeiten("setattenuation volume=0.25").await, "ok\n");
        let call = a.kontext.konferenzen.konferenz("raum").unwrap().mitglieder()[0].clone();
        assert_eq!(call.spatializer().unwrap().attenuator(), 0.25);

        assert_eq!(s.zeile_verarbeiten("setattenuation type=full").await, "ok\n");
        assert_eq!(
            call.spatializer().unwrap().art(),
            voicebridge_core::SpatializerArt::Voll
        );

        let antwort = s.zeile_verarbeiten("setattenuation type=point zero_radius=0.1 full_radius=1").await;
        assert!(antwort.starts_with("error id=2001"), "{antwort}");
    }

    #[tokio::test]
    async fn lautstaerke_laesst_alten_schnappschuss_unveraendert() {
        let a = aufbau(false);
        let mut s = session(&a);
        s.befehl_verarbeiten(call_erstellen()).await.unwrap();
        let call = a.kontext.konferenzen.konferenz("raum").unwrap().mitglieder()[0].clone();

        let vorher = call.spatializer().unwrap();
        let quelle = Pose::default();
        let hoerer = Pose::neu(0.5, 0.0, 0.0, 0.0);
        let daempfung_vorher = vorher.daempfung(&quelle, &hoerer);
        let attenuator_vorher = vorher.attenuator();

        assert_eq!(s.zeile_verarbeiten("setattenuation volume=0.25").await, "ok\n");

        // Ein laufender Tick mit dem alten Schnappschuss sieht keine Aenderung
        assert_eq!(vorher.attenuator(), attenuator_vorher);
        assert_eq!(vorher.daempfung(&quelle, &hoerer), daempfung_vorher);

        let nachher = call.spatializer().unwrap();
        assert!(!Arc::ptr_eq(&vorher, &nachher));
        assert_eq!(nachher.attenuator(), 0.25);
        assert_eq!(nachher.art(), vorher.art());
    }

    #[tokio::test]
    async fn idle_timeout_greift_auch_wenn_client_nicht_liest() {
        let a = aufbau_mit(
            false,
            SessionKonfig {
                idle_timeout: Duration::from_millis(100),
                ..Default::default()
            },
        );
        // Kleiner Puffer: die Antwort auf createcall passt nicht hinein
        let (mut client, server) = tokio::io::duplex(16);
        let (_tx, rx) = watch::channel(false);
        let s = SessionController::neu(Arc::clone(&a.kontext), lokaler_peer());
        let lauf = tokio::spawn(s.ausfuehren(server, rx));

        client
            .write_all(b"createcall dest=127.0.0.1:5004 conf=raum\n")
            .await
            .unwrap();
        for _ in 0..100 {
            if a.kontext.konferenzen.anzahl_calls() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(a.kontext.konferenzen.anzahl_calls(), 1);

        tokio::time::timeout(Duration::from_secs(5), lauf)
            .await
            .expect("Session haengt am Schreiben")
            .unwrap();
        assert_eq!(a.kontext.konferenzen.anzahl_calls(), 0);
        assert_eq!(a.binder.gebunden(), 0);
        drop(client);
    }

    #[tokio::test]
    async fn callinfo_liefert_json() {
        let a = aufbau(false);
        let mut s = session(&a);
        s.befehl_verarbeiten(call_erstellen()).await.unwrap();
        s.zeile_verarbeiten("mute on=1").await;

        let felder = s.befehl_verarbeiten(Befehl::CallInfo { call: None }).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&felder[0].1).unwrap();
        assert_eq!(json["stumm"], serde_json::Value::Bool(true));
        assert_eq!(json["konferenz"], "raum");
    }

    #[tokio::test]
    async fn quit_im_leerlauf() {
        let a = aufbau(false);
        let mut s = session(&a);
        assert_eq!(s.zeile_verarbeiten("quit").await, "ok msg=bye\n");
        assert_eq!(s.zustand(), SessionZustand::Beendend);
    }

    #[tokio::test]
    async fn abgelehnte_herkunft_bekommt_text() {
        let a = aufbau(true);
        let (client, server) = tokio::io::duplex(1024);
        let (_tx, rx) = watch::channel(false);
        let s = SessionController::neu(Arc::clone(&a.kontext), "8.8.8.8:4000".parse().unwrap());
        s.ausfuehren(server, rx).await;

        let mut client = client;
        let mut text = String::new();
        client.read_to_string(&mut text).await.unwrap();
        assert_eq!(text, "Connection from 8.8.8.8 rejected:  must connect from site local address\n");
        assert_eq!(a.kontext.konferenzen.anzahl_calls(), 0);
    }
}
