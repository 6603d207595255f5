//! Konferenz-Register
//!
//! Konferenzen entstehen beim ersten Beitritt und verschwinden mit dem
//! letzten Austritt. Jede Konferenz bekommt einen eigenen Misch-Worker.
//! Thread-safe durch DashMap, `Clone`-faehig ueber einen inneren Arc.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use voicebridge_core::{BridgeError, CallId, Result, VoiceManager};

use crate::call::Call;
use crate::konferenz::Konferenz;
use crate::mixer::worker_starten;
use crate::MixerKonfig;

struct KonferenzEintrag {
    konferenz: Arc<Konferenz>,
    worker: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct KonferenzManager {
    inner: Arc<KonferenzManagerInner>,
}

struct KonferenzManagerInner {
    konferenzen: DashMap<String, KonferenzEintrag>,
    /// Call -> Konferenzname fuer schnelles Austragen
    call_konferenz: DashMap<CallId, String>,
    voice: Arc<VoiceManager>,
    konfig: MixerKonfig,
    /// false: Ticks werden von aussen ausgeloest (Tests, Einbettung)
    worker_starten: bool,
}

impl KonferenzManager {
    /// Register mit einem Misch-Worker pro Konferenz (braucht Tokio-Runtime)
    pub fn neu(voice: Arc<VoiceManager>, konfig: MixerKonfig) -> Result<Self> {
        Self::erstellen(voice, konfig, true)
    }

    /// Register ohne Worker; [`Konferenz::tick`] wird manuell aufgerufen
    pub fn manuell(voice: Arc<VoiceManager>, konfig: MixerKonfig) -> Result<Self> {
        Self::erstellen(voice, konfig, false)
    }

    fn erstellen(voice: Arc<VoiceManager>, konfig: MixerKonfig, worker_starten: bool) -> Result<Self> {
        konfig.validieren()?;
        Ok(Self {
            inner: Arc::new(KonferenzManagerInner {
                konferenzen: DashMap::new(),
                call_konferenz: DashMap::new(),
                voice,
                konfig,
                worker_starten,
            }),
        })
    }

    pub fn voice(&self) -> &Arc<VoiceManager> {
        &self.inner.voice
    }

    pub fn konfig(&self) -> &MixerKonfig {
        &self.inner.konfig
    }

    /// Traegt einen Call in die Konferenz `call.konferenz()` ein
    ///
    /// Ein Call gehoert hoechstens einer Konferenz an.
    pub fn beitreten(&self, call: Arc<Call>) -> Result<Arc<Konferenz>> {
        let call_id = call.id();
        if self.inner.call_konferenz.contains_key(&call_id) {
            return Err(BridgeError::UngueltigerZustand(format!(
                "Call {call_id} ist bereits einer Konferenz zugeordnet"
            )));
        }

        let name = call.konferenz().to_string();
        let eintrag = match self.inner.konferenzen.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(e) => e.into_ref(),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                let eintrag = self.konferenz_anlegen(&name)?;
                e.insert(eintrag)
            }
        };
        // Beitritt unter der Eintragssperre: kein gleichzeitiges Entfernen
        eintrag.konferenz.beitreten(call)?;
        let konferenz = eintrag.konferenz.clone();
        drop(eintrag);

        self.inner.call_konferenz.insert(call_id, name);
        Ok(konferenz)
    }

    fn konferenz_anlegen(&self, name: &str) -> Result<KonferenzEintrag> {
        let standard = voicebridge_spatial::standard(&self.inner.voice)?;
        let konferenz = Arc::new(Konferenz::neu(name, standard, self.inner.konfig.clone()));
        let worker = if self.inner.worker_starten {
            Some(worker_starten(konferenz.clone()))
        } else {
            None
        };
        tracing::info!(konferenz = %name, "Konferenz erstellt");
        Ok(KonferenzEintrag { konferenz, worker })
    }

    /// Traegt einen Call aus; leere Konferenzen werden entfernt
    pub fn verlassen(&self, call_id: CallId) -> Option<Arc<Call>> {
        let (_, name) = self.inner.call_konferenz.remove(&call_id)?;
        let konferenz = self.konferenz(&name)?;
        let call = konferenz.verlassen(call_id);

        if let Some((_, eintrag)) = self
            .inner
            .konferenzen
            .remove_if(&name, |_, e| e.konferenz.ist_leer())
        {
            eintrag.konferenz.schliessen();
            drop(eintrag.worker);
            tracing::info!(konferenz = %name, "Leere Konferenz entfernt");
        }
        call
    }

    pub fn konferenz(&self, name: &str) -> Option<Arc<Konferenz>> {
        self.inner.konferenzen.get(name).map(|e| e.konferenz.clone())
    }

    /// Konferenz, in der ein Call gerade gemischt wird
    pub fn konferenz_von(&self, call_id: &CallId) -> Option<Arc<Konferenz>> {
        let name = self.inner.call_konferenz.get(call_id).map(|n| n.value().clone())?;
        self.konferenz(&name)
    }

    pub fn anzahl_konferenzen(&self) -> usize {
        self.inner.konferenzen.len()
    }

    pub fn anzahl_calls(&self) -> usize {
        self.inner.call_konferenz.len()
    }

    /// Alle Konferenzen schliessen und Calls freigeben (Shutdown)
    pub fn alle_beenden(&self) {
        let ids: Vec<CallId> = self.inner.call_konferenz.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.verlassen(id);
        }
        tracing::debug!("Alle Konferenzen beendet");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicebridge_core::{CallStatus, Pose};

    fn manager() -> KonferenzManager {
        KonferenzManager::manuell(Arc::new(VoiceManager::default()), MixerKonfig::default()).unwrap()
    }

    fn call(m: &KonferenzManager, konferenz: &str) -> Arc<Call> {
        Arc::new(Call::neu(
            CallId::new(),
            "127.0.0.1:9000",
            konferenz,
            Pose::default(),
            m.konfig(),
            None,
        ))
    }

    #[test]
    fn erster_beitritt_erstellt_konferenz() {
        let m = manager();
        let a = call(&m, "raum");
        let k = m.beitreten(a.clone()).unwrap();
        assert_eq!(k.name(), "raum");
        assert_eq!(m.anzahl_konferenzen(), 1);
        assert_eq!(a.status(), CallStatus::Aktiv);
        assert!(m.konferenz_von(&a.id()).is_some());
    }

    #[test]
    fn doppelter_beitritt_wird_abgelehnt() {
        let m = manager();
        let a = call(&m, "raum");
        m.beitreten(a.clone()).unwrap();
        assert!(m.beitreten(a).is_err());
        assert_eq!(m.anzahl_calls(), 1);
    }

    #[test]
    fn letzter_austritt_entfernt_konferenz() {
        let m = manager();
        let a = call(&m, "raum");
        let b = call(&m, "raum");
        let k = m.beitreten(a.clone()).unwrap();
        m.beitreten(b.clone()).unwrap();

        m.verlassen(a.id()).unwrap();
        assert_eq!(m.anzahl_konferenzen(), 1);
        assert!(!k.ist_geschlossen());

        m.verlassen(b.id()).unwrap();
        assert_eq!(m.anzahl_konferenzen(), 0);
        assert!(k.ist_geschlossen());
        assert!(m.verlassen(b.id()).is_none());
    }

    #[test]
    fn konferenzen_sind_getrennt() {
        let m = manager();
        let a = call(&m, "eins");
        let b = call(&m, "zwei");
        m.beitreten(a.clone()).unwrap();
        m.beitreten(b.clone()).unwrap();
        assert_eq!(m.anzahl_konferenzen(), 2);
        assert_eq!(m.konferenz("eins").unwrap().anzahl(), 1);
        assert_eq!(m.konferenz_von(&b.id()).unwrap().name(), "zwei");
    }

    #[test]
    fn alle_beenden_gibt_calls_frei() {
        let m = manager();
        let calls: Vec<_> = (0..4).map(|i| call(&m, if i % 2 == 0 { "a" } else { "b" })).collect();
        for c in &calls {
            m.beitreten(c.clone()).unwrap();
        }
        m.alle_beenden();
        assert_eq!(m.anzahl_konferenzen(), 0);
        assert!(calls.iter().all(|c| c.status() == CallStatus::Beendet));
    }

    #[tokio::test]
    async fn worker_wird_mit_konferenz_gestoppt() {
        let m = KonferenzManager::neu(Arc::new(VoiceManager::default()), MixerKonfig::default()).unwrap();
        let a = call(&m, "raum");
        let k = m.beitreten(a.clone()).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(k.ticks() > 0);

        m.verlassen(a.id());
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        let stand = k.ticks();
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        assert_eq!(k.ticks(), stand, "Worker laeuft nach Entfernen weiter");
    }
}
