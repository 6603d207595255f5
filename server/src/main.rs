//! Voicebridge – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet die Bridge.

use anyhow::Result;
use voicebridge_server::{config::BridgeConfig, logging::logging_initialisieren, Bridge};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("VOICEBRIDGE_CONFIG").unwrap_or_else(|_| "voicebridge.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = BridgeConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Voicebridge wird initialisiert"
    );

    let bridge = Bridge::neu(config)?;
    bridge.starten().await?;

    Ok(())
}
