//! UDP-Diagnose (`testudp`)
//!
//! Sendet einmal pro Sekunde ein 1260-Byte-Paket mit fortlaufender Nummer
//! (Big Endian in den ersten vier Bytes) an das Ziel und wartet bis zu drei
//! Sekunden auf eine Antwort. Die Laufzeit ist auf 300 Sekunden begrenzt.
//! Fortschritt geht als `testudp`-Ereignis an die Session.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::Instant;
use voicebridge_core::CallEreignis;

pub const MAX_TESTDAUER: Duration = Duration::from_secs(300);
pub const STANDARD_TESTDAUER: Duration = Duration::from_secs(10);
pub const PAKET_GROESSE: usize = 1260;

#[derive(Debug, Clone)]
pub struct UdpTest {
    pub ziel: SocketAddr,
    /// Lokale Adresse, an die der Test-Socket gebunden wird
    pub lokal: IpAddr,
    pub dauer: Duration,
    pub pause: Duration,
    pub empfangs_timeout: Duration,
}

impl UdpTest {
    /// Test mit Standard-Takt; `dauer` wird auf [`MAX_TESTDAUER`] begrenzt
    pub fn neu(ziel: SocketAddr, lokal: IpAddr, dauer: Option<Duration>) -> Self {
        let gewuenscht = dauer.unwrap_or(STANDARD_TESTDAUER);
        if gewuenscht > MAX_TESTDAUER {
            tracing::info!(
                gewuenscht_sek = gewuenscht.as_secs(),
                max_sek = MAX_TESTDAUER.as_secs(),
                "UDP-Testdauer auf Maximum begrenzt"
            );
        }
        Self {
            ziel,
            lokal,
            dauer: gewuenscht.min(MAX_TESTDAUER),
            pause: Duration::from_secs(1),
            empfangs_timeout: Duration::from_secs(3),
        }
    }

    /// Fuehrt den Test aus; gibt die Anzahl beantworteter Pakete zurueck
    pub async fn ausfuehren(self, ereignisse: mpsc::UnboundedSender<CallEreignis>) -> u32 {
        let melden = |info: String| {
            tracing::debug!(ziel = %self.ziel, %info, "UDP-Test");
            let _ = ereignisse.send(CallEreignis::Diagnose { info });
        };

        let socket = match UdpSocket::bind(SocketAddr::new(self.lokal, 0)).await {
            Ok(s) => s,
            Err(e) => {
                melden(format!("Unable to create datagram socket on {}: {e}", self.lokal));
                return 0;
            }
        };

        let port = self.ziel.port();
        let mut puffer = vec![0u8; PAKET_GROESSE];
        let mut empfang = vec![0u8; PAKET_GROESSE];
        let mut paket_nummer: u32 = 0;
        let ende = Instant::now() + self.dauer;

        while Instant::now() < ende {
            melden(format!(
                "Sending packet {paket_nummer}, length {PAKET_GROESSE} bytes to {port}."
            ));
            puffer[..4].copy_from_slice(&paket_nummer.to_be_bytes());

            if let Err(e) = socket.send_to(&puffer, self.ziel).await {
                melden(format!("Unable to send to {}: {e}", self.ziel));
                return paket_nummer;
            }

            match tokio::time::timeout(self.empfangs_timeout, socket.recv_from(&mut empfang)).await {
                Ok(Ok(_)) => paket_nummer += 1,
                Ok(Err(e)) => {
                    melden(format!("Receive failed on port {port}: {e}"));
                    return paket_nummer;
                }
                Err(_) => melden(format!("Receive timed out on port {port}!")),
            }

            tokio::time::sleep(self.pause).await;
        }

        melden(format!("Done testing UDP port {port}"));
        paket_nummer
    }
}
