//! Bridge-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass die Bridge ohne Konfigurationsdatei
//! lauffaehig ist.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use voicebridge_control::SessionKonfig;
use voicebridge_core::{SpatializerArt, VoiceParameter};
use voicebridge_mixer::MixerKonfig;

/// Vollstaendige Bridge-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub bridge: BridgeEinstellungen,
    pub netzwerk: NetzwerkEinstellungen,
    pub sicherheit: SicherheitsEinstellungen,
    pub voice: VoiceEinstellungen,
    pub mixer: MixerEinstellungen,
    pub session: SessionEinstellungen,
    pub logging: LoggingEinstellungen,
}

/// Allgemeine Angaben zur Bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeEinstellungen {
    /// Standort, nur fuer das Start-Banner
    pub standort: String,
}

impl Default for BridgeEinstellungen {
    fn default() -> Self {
        Self {
            standort: "unbekannt".into(),
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse des Control-Listeners
    pub bind_adresse: String,
    pub control_port: u16,
    /// Private Adresse der Bridge (leer oder "localhost" = automatisch)
    pub private_adresse: Option<String>,
    /// Oeffentliche Adresse (Standard: private Adresse)
    pub public_adresse: Option<String>,
    /// Oeffentlicher Control-Port (Standard: `control_port`)
    pub public_control_port: Option<u16>,
    /// `host:port`-Ziele, die beim Start "online" gemeldet bekommen
    pub status_listener: Vec<String>,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            control_port: 6666,
            private_adresse: None,
            public_adresse: None,
            public_control_port: None,
            status_listener: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SicherheitsEinstellungen {
    /// Nur Verbindungen von lokalen / privaten Adressen annehmen
    pub nur_lokale_verbindungen: bool,
}

impl Default for SicherheitsEinstellungen {
    fn default() -> Self {
        Self {
            nur_lokale_verbindungen: true,
        }
    }
}

/// Voice-Parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceEinstellungen {
    /// Teiler fuer alle Rohkoordinaten
    pub skala: f64,
    pub standard_attenuator: f64,
    /// "ambient", "point", "cone" oder "full"
    pub standard_spatializer: String,
    pub voll_radius: f64,
    pub null_radius: f64,
    pub falloff: f64,
}

impl Default for VoiceEinstellungen {
    fn default() -> Self {
        let p = VoiceParameter::default();
        Self {
            skala: p.skala,
            standard_attenuator: p.standard_attenuator,
            standard_spatializer: p.standard_spatializer.als_str().into(),
            voll_radius: p.voll_radius,
            null_radius: p.null_radius,
            falloff: p.falloff,
        }
    }
}

/// Misch-Takt und Puffer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerEinstellungen {
    pub sample_rate: u32,
    pub frame_ms: u32,
    pub eingangs_puffer_frames: usize,
    pub ausgangs_puffer_frames: usize,
    pub max_frame_alter_ms: u64,
    pub unterlauf_meldung_frames: u64,
}

impl Default for MixerEinstellungen {
    fn default() -> Self {
        let m = MixerKonfig::default();
        Self {
            sample_rate: m.sample_rate,
            frame_ms: m.frame_ms,
            eingangs_puffer_frames: m.eingangs_puffer_frames,
            ausgangs_puffer_frames: m.ausgangs_puffer_frames,
            max_frame_alter_ms: m.max_frame_alter.as_millis() as u64,
            unterlauf_meldung_frames: m.unterlauf_meldung_frames,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionEinstellungen {
    pub idle_timeout_sek: u64,
    pub max_zeilen_laenge: usize,
    /// Konferenz fuer `createcall` ohne `conf=`
    pub standard_konferenz: String,
}

impl Default for SessionEinstellungen {
    fn default() -> Self {
        let s = SessionKonfig::default();
        Self {
            idle_timeout_sek: s.idle_timeout.as_secs(),
            max_zeilen_laenge: s.max_zeilen_laenge,
            standard_konferenz: s.standard_konferenz,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl BridgeConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Voice-Parameter; ungueltige Werte sind ein Startfehler
    pub fn voice_parameter(&self) -> anyhow::Result<VoiceParameter> {
        let standard_spatializer: SpatializerArt = self.voice.standard_spatializer.parse()?;
        let parameter = VoiceParameter {
            skala: self.voice.skala,
            standard_attenuator: self.voice.standard_attenuator,
            standard_spatializer,
            voll_radius: self.voice.voll_radius,
            null_radius: self.voice.null_radius,
            falloff: self.voice.falloff,
        };
        parameter.validieren()?;
        Ok(parameter)
    }

    pub fn mixer_konfig(&self) -> anyhow::Result<MixerKonfig> {
        let konfig = MixerKonfig {
            sample_rate: self.mixer.sample_rate,
            frame_ms: self.mixer.frame_ms,
            eingangs_puffer_frames: self.mixer.eingangs_puffer_frames,
            ausgangs_puffer_frames: self.mixer.ausgangs_puffer_frames,
            max_frame_alter: Duration::from_millis(self.mixer.max_frame_alter_ms),
            unterlauf_meldung_frames: self.mixer.unterlauf_meldung_frames,
        };
        konfig.validieren()?;
        Ok(konfig)
    }

    /// Session-Einstellungen; die private Adresse kommt aus der Adressermittlung
    pub fn session_konfig(&self, private_adresse: std::net::IpAddr) -> anyhow::Result<SessionKonfig> {
        if self.session.idle_timeout_sek == 0 {
            anyhow::bail!("session.idle_timeout_sek muss > 0 sein");
        }
        if self.session.max_zeilen_laenge == 0 {
            anyhow::bail!("session.max_zeilen_laenge muss > 0 sein");
        }
        Ok(SessionKonfig {
            idle_timeout: Duration::from_secs(self.session.idle_timeout_sek),
            max_zeilen_laenge: self.session.max_zeilen_laenge,
            standard_konferenz: self.session.standard_konferenz.clone(),
            private_adresse,
        })
    }

    /// Bind-Adresse des Control-Listeners
    pub fn control_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        let text = format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.control_port);
        text.parse()
            .map_err(|e| anyhow::anyhow!("Ungueltige Bind-Adresse '{text}': {e}"))
    }
}
