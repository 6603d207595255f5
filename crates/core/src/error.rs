//! Fehlertypen fuer Voicebridge
//!
//! Zentraler Fehler-Enum mit der Taxonomie der Bridge. Fehler werden in der
//! niedrigsten Komponente behandelt, die sie sicher absorbieren kann.
//! Startfehler laufen als `anyhow::Error` bis `main`.
//!
//! Fehlende Audio-Frames (Unterlauf) sind bewusst kein Variant: der Mixer
//! ersetzt sie durch Stille und zaehlt sie nur.

use thiserror::Error;

/// Globaler Result-Alias fuer Voicebridge
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Alle moeglichen Fehler im Voicebridge-System
#[derive(Debug, Error)]
pub enum BridgeError {
    // --- Konfiguration ---
    /// Ungueltige Skala, Grenzen oder Spatializer-Parameter
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Protokoll ---
    /// Fehlerhafter Befehl auf der Control-Verbindung
    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    /// Befehl im aktuellen Session-Zustand nicht erlaubt
    #[error("Ungueltiger Zustand: {0}")]
    UngueltigerZustand(String),

    /// Call oder Konferenz nicht gefunden
    #[error("Nicht gefunden: {0}")]
    NichtGefunden(String),

    // --- Transport ---
    /// Socket- oder Verbindungsfehler
    #[error("Transportfehler: {0}")]
    Transport(#[from] std::io::Error),
}

impl BridgeError {
    /// Erstellt einen Konfigurationsfehler
    pub fn konfiguration(msg: impl Into<String>) -> Self {
        Self::Konfiguration(msg.into())
    }

    /// Erstellt einen Protokollfehler
    pub fn protokoll(msg: impl Into<String>) -> Self {
        Self::Protokoll(msg.into())
    }
}
