//! voicebridge-server – Bibliotheks-Root
//!
//! Setzt die Bridge aus Konfiguration, Adressen, Mixer und Control-Dispatcher
//! zusammen und stellt den Einstiegspunkt fuer Tests bereit.

pub mod adressen;
pub mod config;
pub mod logging;
pub mod medien;
pub mod status;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use voicebridge_control::{Dispatcher, SessionKontext, UrsprungsRichtlinie, ZeilenProtokoll};
use voicebridge_core::VoiceManager;
use voicebridge_mixer::KonferenzManager;

use adressen::{AdressAufloesung, BridgeAdressen, RoutenAufloesung};
use config::BridgeConfig;
use medien::UdpMedienBinder;

/// Konfigurierte, noch nicht lauschende Bridge
pub struct Bridge {
    pub config: BridgeConfig,
    pub adressen: BridgeAdressen,
}

impl Bridge {
    /// Ermittelt die Adressen ueber die Route ins Netz
    pub fn neu(config: BridgeConfig) -> Result<Self> {
        Self::mit_aufloesung(config, &RoutenAufloesung)
    }

    pub fn mit_aufloesung(config: BridgeConfig, aufloesung: &dyn AdressAufloesung) -> Result<Self> {
        let adressen = BridgeAdressen::ermitteln(&config.netzwerk, aufloesung)?;
        Ok(Self { config, adressen })
    }

    /// Laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        self.ausfuehren(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(fehler = %e, "Ctrl-C-Handler nicht installierbar");
            }
        })
        .await
    }

    /// Startet alle Subsysteme und laeuft, bis `stopp` fertig ist
    ///
    /// Reihenfolge:
    /// 1. Voice-Parameter und Mixer-Konfiguration pruefen
    /// 2. Control-Listener binden
    /// 3. Dispatcher starten, Status-Listener benachrichtigen
    /// 4. Bei Stopp: Dispatcher und Sessions beenden, Konferenzen schliessen
    pub async fn ausfuehren<F>(self, stopp: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let voice = Arc::new(VoiceManager::neu(self.config.voice_parameter()?)?);
        let konferenzen = KonferenzManager::neu(Arc::clone(&voice), self.config.mixer_konfig()?)?;
        let richtlinie = UrsprungsRichtlinie::neu(
            self.config.sicherheit.nur_lokale_verbindungen,
            Some(self.adressen.private),
        );

        let kontext = Arc::new(SessionKontext {
            voice: Arc::clone(&voice),
            konferenzen: konferenzen.clone(),
            medien: Arc::new(UdpMedienBinder::neu(self.adressen.private)),
            protokoll: Arc::new(ZeilenProtokoll),
            richtlinie,
            konfig: self.config.session_konfig(self.adressen.private)?,
        });

        let bind = self.config.control_bind_adresse()?;
        let dispatcher = Dispatcher::binden(kontext, bind)
            .await
            .with_context(|| format!("Control-Listener auf {bind} nicht bindbar"))?;
        let lokal = dispatcher.lokale_adresse()?;

        self.banner_ausgeben(&voice, lokal.port());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatcher_task = tokio::spawn(dispatcher.ausfuehren(shutdown_rx));
        tracing::info!(adresse = %lokal, "Bridge initialisiert und bereit");
        let meldungen = status::online_melden(&self.config.netzwerk.status_listener, &self.adressen, lokal.port());

        stopp.await;
        tracing::info!("Shutdown-Signal empfangen, Bridge wird beendet");

        let _ = shutdown_tx.send(true);
        if let Err(e) = dispatcher_task.await {
            tracing::error!(fehler = %e, "Dispatcher-Task abgebrochen");
        }
        for meldung in meldungen {
            meldung.abort();
        }
        konferenzen.alle_beenden();
        Ok(())
    }

    fn banner_ausgeben(&self, voice: &VoiceManager, control_port: u16) {
        let p = voice.parameter();
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            standort = %self.config.bridge.standort,
            "Voicebridge startet"
        );
        tracing::info!(
            private = %self.adressen.private,
            control_port,
            public = %self.adressen.public,
            public_control_port = self.adressen.public_control_port_fuer(control_port),
            "Adressen"
        );
        tracing::info!(
            nur_lokal = self.config.sicherheit.nur_lokale_verbindungen,
            skala = p.skala,
            spatializer = p.standard_spatializer.als_str(),
            "Richtlinie und Voice-Parameter"
        );
    }
}
