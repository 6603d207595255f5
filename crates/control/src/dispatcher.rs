//! Dispatcher – nimmt Control-Verbindungen an
//!
//! Startet fuer jede angenommene Verbindung einen eigenen tokio-Task mit
//! einem [`SessionController`]. Ist die Herkunftsrichtlinie aktiv, bekommen
//! Verbindungen von fremden Adressen nur eine Ablehnungszeile.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::session::{SessionController, SessionKontext};

/// Welche Gegenstellen eine Control-Verbindung oeffnen duerfen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrsprungsRichtlinie {
    nur_lokal: bool,
    /// Eigene private Adresse der Bridge, immer erlaubt
    eigene_adresse: Option<IpAddr>,
}

impl UrsprungsRichtlinie {
    pub fn neu(nur_lokal: bool, eigene_adresse: Option<IpAddr>) -> Self {
        Self {
            nur_lokal,
            eigene_adresse,
        }
    }

    pub fn ist_aktiv(&self) -> bool {
        self.nur_lokal
    }

    /// true, wenn eine Gegenstelle mit dieser Adresse zugelassen ist
    pub fn pruefen(&self, ip: IpAddr) -> bool {
        if !self.nur_lokal {
            return true;
        }
        let ip = normalisieren(ip);
        ip.is_loopback() || ist_site_local(ip) || self.eigene_adresse.map(normalisieren) == Some(ip)
    }
}

/// IPv4-gemappte IPv6-Adressen als IPv4 behandeln
fn normalisieren(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        v4 => v4,
    }
}

/// Private Adressbereiche: 10/8, 172.16/12, 192.168/16, fec0::/10, fc00::/7
pub fn ist_site_local(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private(),
        IpAddr::V6(v6) => {
            let erstes = v6.segments()[0];
            (erstes & 0xffc0) == 0xfec0 || (erstes & 0xfe00) == 0xfc00
        }
    }
}

/// Text, den abgelehnte Gegenstellen erhalten
pub fn ablehnungs_text(ip: IpAddr) -> String {
    format!("Connection from {ip} rejected:  must connect from site local address\n")
}

/// Schreibt die Ablehnung und schliesst die Schreibrichtung
pub async fn ablehnen<W>(schreiber: &mut W, ip: IpAddr)
where
    W: AsyncWrite + Unpin,
{
    if let Err(e) = schreiber.write_all(ablehnungs_text(ip).as_bytes()).await {
        tracing::debug!(peer = %ip, fehler = %e, "Ablehnung nicht zustellbar");
    }
    let _ = schreiber.shutdown().await;
}

/// Gebundener Control-Listener
pub struct Dispatcher {
    kontext: Arc<SessionKontext>,
    listener: TcpListener,
}

impl Dispatcher {
    /// Bindet den Listener; Port 0 waehlt einen freien Port
    pub async fn binden(kontext: Arc<SessionKontext>, adresse: SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(adresse).await?;
        Ok(Self { kontext, listener })
    }

    pub fn lokale_adresse(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept-Loop; laeuft bis `shutdown_rx` ein `true`-Signal empfaengt
    pub async fn ausfuehren(self, mut shutdown_rx: watch::Receiver<bool>) {
        if let Ok(adresse) = self.listener.local_addr() {
            tracing::info!(
                adresse = %adresse,
                nur_lokal = self.kontext.richtlinie.ist_aktiv(),
                "Control-Dispatcher gestartet"
            );
        }

        loop {
            tokio::select! {
                ergebnis = self.listener.accept() => {
                    match ergebnis {
                        Ok((mut stream, peer)) => {
                            if !self.kontext.richtlinie.pruefen(peer.ip()) {
                                tracing::warn!(peer = %peer, "Verbindung abgelehnt: keine lokale Adresse");
                                tokio::spawn(async move {
                                    ablehnen(&mut stream, peer.ip()).await;
                                });
                                continue;
                            }

                            tracing::debug!(peer = %peer, "Verbindung akzeptiert");
                            let _ = stream.set_nodelay(true);
                            let session = SessionController::neu(Arc::clone(&self.kontext), peer);
                            let shutdown = shutdown_rx.clone();
                            tokio::spawn(async move {
                                session.ausfuehren(stream, shutdown).await;
                            });
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Control-Dispatcher: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        tracing::info!("Control-Dispatcher gestoppt");
    }
}
