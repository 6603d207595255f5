//! Statusmeldung an externe Listener
//!
//! Nach dem Binden des Control-Listeners bekommt jedes konfigurierte
//! `host:port`-Ziel per TCP eine Zeile, dass die Bridge online ist.
//! Nicht erreichbare Listener werden nur geloggt.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::adressen::BridgeAdressen;

/// Frist fuer Verbindungsaufbau und Senden pro Listener
const MELDE_FRIST: Duration = Duration::from_secs(5);

/// Zeile im Format der Control-Ereignisse
pub fn online_meldung(adressen: &BridgeAdressen, control_port: u16) -> String {
    let oeffentlich = SocketAddr::new(adressen.public, adressen.public_control_port_fuer(control_port));
    let privat = SocketAddr::new(adressen.private, control_port);
    format!("event type=bridgestatus status=online address={oeffentlich} private={privat}\n")
}

/// Startet pro Listener einen Melde-Task
pub fn online_melden(listener: &[String], adressen: &BridgeAdressen, control_port: u16) -> Vec<JoinHandle<()>> {
    if listener.is_empty() {
        tracing::info!("Keine Status-Listener konfiguriert");
        return Vec::new();
    }

    let meldung = online_meldung(adressen, control_port);
    listener
        .iter()
        .map(|ziel| {
            let ziel = ziel.trim().to_string();
            let meldung = meldung.clone();
            tokio::spawn(async move {
                match tokio::time::timeout(MELDE_FRIST, senden(&ziel, &meldung)).await {
                    Ok(Ok(())) => tracing::info!(listener = %ziel, "Status-Listener benachrichtigt"),
                    Ok(Err(e)) => {
                        tracing::warn!(listener = %ziel, fehler = %e, "Status-Listener nicht erreichbar")
                    }
                    Err(_) => tracing::warn!(listener = %ziel, "Status-Listener antwortet nicht"),
                }
            })
        })
        .collect()
}

async fn senden(ziel: &str, meldung: &str) -> std::io::Result<()> {
    let mut stream = TcpStream::connect(ziel).await?;
    stream.write_all(meldung.as_bytes()).await?;
    stream.shutdown().await
}
