//! UDP-Medienstrecke
//!
//! Pro Call ein UDP-Socket auf `<private Adresse>:0`. Eingehende Datagramme
//! sind rohe PCM-Samples (i16, Little Endian) und gehen in den Eingang des
//! Calls; gemischte Frames werden im selben Format an das Ziel geschickt.
//! Angenommen wird nur, was vom Ziel des Calls kommt.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use voicebridge_control::{ControlError, ControlResult, MedienBinder, MedienHandle};
use voicebridge_core::{CallStatus, Frame};
use voicebridge_mixer::Call;

/// Groesstes angenommenes Datagramm
const MAX_DATAGRAMM: usize = 4096;

/// Pause nach einem Empfangsfehler
const FEHLER_PAUSE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct UdpMedienBinder {
    private: IpAddr,
}

impl UdpMedienBinder {
    pub fn neu(private: IpAddr) -> Self {
        Self { private }
    }
}

#[async_trait]
impl MedienBinder for UdpMedienBinder {
    async fn binden(&self, call: Arc<Call>, ziel: &str) -> ControlResult<Box<dyn MedienHandle>> {
        let ziel_adresse = tokio::net::lookup_host(ziel)
            .await
            .map_err(|e| ControlError::UngueltigeEingabe(format!("Ziel '{ziel}': {e}")))?
            .next()
            .ok_or_else(|| ControlError::UngueltigeEingabe(format!("Ziel '{ziel}' nicht aufloesbar")))?;

        let mut ausgang = call.ausgang_empfaenger_nehmen().ok_or_else(|| {
            ControlError::UngueltigerZustand(format!("Medien von Call {} bereits gebunden", call.id()))
        })?;

        let socket = Arc::new(UdpSocket::bind(SocketAddr::new(self.private, 0)).await?);
        let port = socket.local_addr()?.port();

        let empfang = {
            let socket = Arc::clone(&socket);
            let call = Arc::clone(&call);
            tokio::spawn(async move {
                let mut puffer = vec![0u8; MAX_DATAGRAMM];
                loop {
                    match socket.recv_from(&mut puffer).await {
                        Ok((n, quelle)) => {
                            if call.status() == CallStatus::Beendet {
                                break;
                            }
                            if quelle != ziel_adresse {
                                tracing::trace!(call_id = %call.id(), %quelle, "Fremdes Datagramm verworfen");
                                continue;
                            }
                            call.eingang_schieben(pcm_dekodieren(&puffer[..n]));
                        }
                        Err(e) => {
                            tracing::debug!(call_id = %call.id(), fehler = %e, "UDP-Empfang fehlgeschlagen");
                            tokio::time::sleep(FEHLER_PAUSE).await;
                        }
                    }
                }
            })
        };

        let senden = {
            let socket = Arc::clone(&socket);
            let id = call.id();
            tokio::spawn(async move {
                while let Some(frame) = ausgang.recv().await {
                    if let Err(e) = socket.send_to(&pcm_kodieren(&frame), ziel_adresse).await {
                        tracing::debug!(call_id = %id, fehler = %e, "UDP-Senden fehlgeschlagen");
                    }
                }
            })
        };

        tracing::info!(call_id = %call.id(), ziel = %ziel_adresse, port, "UDP-Medien gebunden");
        Ok(Box::new(UdpMedienHandle {
            port,
            tasks: [empfang, senden],
        }))
    }
}

#[derive(Debug)]
struct UdpMedienHandle {
    port: u16,
    tasks: [JoinHandle<()>; 2],
}

impl MedienHandle for UdpMedienHandle {
    fn lokaler_port(&self) -> u16 {
        self.port
    }
}

impl Drop for UdpMedienHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// i16 Little Endian; ein ueberzaehliges Byte wird ignoriert
pub fn pcm_dekodieren(daten: &[u8]) -> Frame {
    daten
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

pub fn pcm_kodieren(frame: &[i16]) -> Vec<u8> {
    frame.iter().flat_map(|s| s.to_le_bytes()).collect()
}
