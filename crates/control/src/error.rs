//! Fehlertypen fuer Control-Verbindungen

use thiserror::Error;
use voicebridge_core::BridgeError;

/// Alle Fehler, die eine Control-Verbindung als `error id=...` sehen kann
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    #[error("Im aktuellen Zustand nicht erlaubt: {0}")]
    UngueltigerZustand(String),

    #[error("Nicht gefunden: {0}")]
    NichtGefunden(String),

    #[error("Ungueltige Eingabe: {0}")]
    UngueltigeEingabe(String),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Interner Fehler: {0}")]
    Intern(#[from] anyhow::Error),
}

pub type ControlResult<T> = Result<T, ControlError>;

impl ControlError {
    /// Fehler-Code fuer Antwortzeilen
    pub fn fehler_code(&self) -> u32 {
        match self {
            Self::Protokoll(_) => 1001,
            Self::UngueltigerZustand(_) => 1002,
            Self::NichtGefunden(_) => 1004,
            Self::UngueltigeEingabe(_) => 1005,
            Self::Konfiguration(_) => 2001,
            Self::Intern(_) => 5000,
            Self::Io(_) => 5001,
        }
    }

    /// Fehler, die nur dem Client gemeldet werden und den Zustand nicht aendern
    pub fn ist_protokollfehler(&self) -> bool {
        matches!(
            self,
            Self::Protokoll(_)
                | Self::UngueltigerZustand(_)
                | Self::NichtGefunden(_)
                | Self::UngueltigeEingabe(_)
        )
    }
}

impl From<BridgeError> for ControlError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Konfiguration(msg) => Self::Konfiguration(msg),
            BridgeError::Protokoll(msg) => Self::Protokoll(msg),
            BridgeError::UngueltigerZustand(msg) => Self::UngueltigerZustand(msg),
            BridgeError::NichtGefunden(msg) => Self::NichtGefunden(msg),
            BridgeError::Transport(io) => Self::Io(io),
        }
    }
}
