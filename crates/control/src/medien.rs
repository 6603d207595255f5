//! Medien-Anbindung eines Calls
//!
//! Eine Session bindet beim Aufbau die Audio-Strecke ihres Calls an ein Ziel.
//! Das zurueckgegebene Handle haelt die Strecke am Leben; Drop gibt sie frei.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use voicebridge_core::{CallId, Frame};
use voicebridge_mixer::Call;

use crate::error::ControlResult;

/// Bindet die Medien eines Calls an ein Ziel
#[async_trait]
pub trait MedienBinder: Send + Sync {
    async fn binden(&self, call: Arc<Call>, ziel: &str) -> ControlResult<Box<dyn MedienHandle>>;
}

/// Aktive Medien-Strecke; Drop gibt sie frei
pub trait MedienHandle: Send + Sync + fmt::Debug {
    /// Lokaler Port, an den das Ziel senden soll
    fn lokaler_port(&self) -> u16;
}

/// Medien im Speicher, ohne Netzwerk
///
/// Frames werden direkt eingespeist, gemischte Frames bleiben im
/// Empfaenger liegen, bis sie abgeholt werden.
#[derive(Debug, Clone)]
pub struct SpeicherBinder {
    inner: Arc<SpeicherInner>,
}

#[derive(Debug)]
struct SpeicherInner {
    strecken: Mutex<HashMap<CallId, SpeicherStrecke>>,
    naechster_port: AtomicU16,
}

#[derive(Debug)]
struct SpeicherStrecke {
    call: Arc<Call>,
    ziel: String,
    ausgang: Option<mpsc::Receiver<Frame>>,
}

impl Default for SpeicherBinder {
    fn default() -> Self {
        Self::neu()
    }
}

impl SpeicherBinder {
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(SpeicherInner {
                strecken: Mutex::new(HashMap::new()),
                naechster_port: AtomicU16::new(40_000),
            }),
        }
    }

    /// Anzahl gebundener Strecken
    pub fn gebunden(&self) -> usize {
        self.inner.strecken.lock().len()
    }

    pub fn ziel(&self, id: &CallId) -> Option<String> {
        self.inner.strecken.lock().get(id).map(|s| s.ziel.clone())
    }

    /// Speist einen empfangenen Frame ein; false wenn der Call nicht gebunden ist
    pub fn frame_einspeisen(&self, id: &CallId, frame: Frame) -> bool {
        let strecken = self.inner.strecken.lock();
        match strecken.get(id) {
            Some(strecke) => {
                strecke.call.eingang_schieben(frame);
                true
            }
            None => false,
        }
    }

    /// Uebergibt den Empfaenger der gemischten Frames eines Calls
    pub fn ausgang_nehmen(&self, id: &CallId) -> Option<mpsc::Receiver<Frame>> {
        self.inner.strecken.lock().get_mut(id)?.ausgang.take()
    }
}

#[async_trait]
impl MedienBinder for SpeicherBinder {
    async fn binden(&self, call: Arc<Call>, ziel: &str) -> ControlResult<Box<dyn MedienHandle>> {
        let id = call.id();
        let port = self.inner.naechster_port.fetch_add(1, Ordering::Relaxed);
        let ausgang = call.ausgang_empfaenger_nehmen();
        self.inner.strecken.lock().insert(
            id,
            SpeicherStrecke {
                call,
                ziel: ziel.to_string(),
                ausgang,
            },
        );
        tracing::debug!(call_id = %id, ziel, port, "Speicher-Medien gebunden");
        Ok(Box::new(SpeicherHandle {
            id,
            port,
            inner: Arc::clone(&self.inner),
        }))
    }
}

#[derive(Debug)]
struct SpeicherHandle {
    id: CallId,
    port: u16,
    inner: Arc<SpeicherInner>,
}

impl MedienHandle for SpeicherHandle {
    fn lokaler_port(&self) -> u16 {
        self.port
    }
}

impl Drop for SpeicherHandle {
    fn drop(&mut self) {
        self.inner.strecken.lock().remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicebridge_core::Pose;
    use voicebridge_mixer::MixerKonfig;

    fn call() -> Arc<Call> {
        Arc::new(Call::neu(
            CallId::new(),
            "ziel:1",
            "raum",
            Pose::default(),
            &MixerKonfig::default(),
            None,
        ))
    }

    #[tokio::test]
    async fn binden_und_freigeben() {
        let binder = SpeicherBinder::neu();
        let c = call();
        let handle = binder.binden(c.clone(), "10.0.0.1:5004").await.unwrap();
        assert_eq!(binder.gebunden(), 1);
        assert_eq!(binder.ziel(&c.id()).as_deref(), Some("10.0.0.1:5004"));
        assert!(handle.lokaler_port() >= 40_000);

        assert!(binder.frame_einspeisen(&c.id(), vec![1, 2, 3]));
        assert_eq!(c.eingang_wartend(), 1);
        assert!(binder.ausgang_nehmen(&c.id()).is_some());
        assert!(binder.ausgang_nehmen(&c.id()).is_none());

        drop(handle);
        assert_eq!(binder.gebunden(), 0);
        assert!(!binder.frame_einspeisen(&c.id(), vec![1]));
    }

    #[tokio::test]
    async fn ports_sind_eindeutig() {
        let binder = SpeicherBinder::neu();
        let a = binder.binden(call(), "a").await.unwrap();
        let b = binder.binden(call(), "b").await.unwrap();
        assert_ne!(a.lokaler_port(), b.lokaler_port());
    }
}
