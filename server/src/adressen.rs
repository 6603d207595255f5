//! Adressen der Bridge
//!
//! Die private Adresse wird beim Start einmal ermittelt: konfigurierter Wert
//! oder die Quelladresse der Route ins Netz, notfalls `127.0.0.1`. Die
//! oeffentliche Adresse und der oeffentliche Control-Port fallen auf die
//! privaten Werte zurueck.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use crate::config::NetzwerkEinstellungen;

/// Ermittelt die lokale Adresse der Maschine
pub trait AdressAufloesung: Send + Sync {
    fn lokale_adresse(&self) -> Option<IpAddr>;
}

/// Quelladresse, die das Betriebssystem fuer eine Route nach aussen waehlt
///
/// Ein unverbundener UDP-Socket wird nur "verbunden"; es geht kein Paket raus.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutenAufloesung;

impl AdressAufloesung for RoutenAufloesung {
    fn lokale_adresse(&self) -> Option<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
        socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9)).ok()?;
        let ip = socket.local_addr().ok()?.ip();
        (!ip.is_unspecified()).then_some(ip)
    }
}

/// Einmal ermittelte Adressen, danach unveraenderlich
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeAdressen {
    pub private: IpAddr,
    pub public: IpAddr,
    pub control_port: u16,
    pub public_control_port: u16,
}

impl BridgeAdressen {
    pub fn ermitteln(
        netz: &NetzwerkEinstellungen,
        aufloesung: &dyn AdressAufloesung,
    ) -> anyhow::Result<Self> {
        let private = match konfigurierte_adresse(netz.private_adresse.as_deref(), "private_adresse")? {
            Some(ip) => ip,
            None => aufloesung.lokale_adresse().unwrap_or_else(|| {
                tracing::warn!("Lokale Adresse nicht ermittelbar, verwende 127.0.0.1");
                IpAddr::V4(Ipv4Addr::LOCALHOST)
            }),
        };

        if private == IpAddr::V4(Ipv4Addr::new(127, 0, 1, 1)) {
            tracing::warn!(
                adresse = %private,
                "Private Adresse ist 127.0.1.1 (Hostname-Eintrag in /etc/hosts?); private_adresse konfigurieren"
            );
        } else if private.is_loopback() {
            tracing::warn!(adresse = %private, "Private Adresse ist Loopback, Bridge nur lokal nutzbar");
        }

        let public = konfigurierte_adresse(netz.public_adresse.as_deref(), "public_adresse")?
            .unwrap_or(private);

        Ok(Self {
            private,
            public,
            control_port: netz.control_port,
            public_control_port: netz.public_control_port.unwrap_or(netz.control_port),
        })
    }

    /// Oeffentlicher Control-Port; folgt dem tatsaechlich gebundenen Port,
    /// solange kein abweichender Wert konfiguriert ist
    pub fn public_control_port_fuer(&self, gebunden: u16) -> u16 {
        if self.public_control_port == 0 || self.public_control_port == self.control_port {
            gebunden
        } else {
            self.public_control_port
        }
    }
}

/// Leer und "localhost" gelten als nicht gesetzt
fn konfigurierte_adresse(wert: Option<&str>, feld: &str) -> anyhow::Result<Option<IpAddr>> {
    match wert.map(str::trim) {
        None | Some("") => Ok(None),
        Some(w) if w.eq_ignore_ascii_case("localhost") => Ok(None),
        Some(w) => w
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{feld} '{w}' ist keine IP-Adresse: {e}")),
    }
}
