//! Structured Logging Setup via tracing-subscriber
//!
//! Level und Format kommen aus der Konfiguration und lassen sich per
//! Umgebungsvariable ueberschreiben:
//! - `VB_LOG_LEVEL`: Filter-Ausdruck (z.B. `debug` oder `voicebridge_mixer=trace`)
//! - `VB_LOG_FORMAT`: `text` oder `json`

use tracing_subscriber::{fmt, EnvFilter};

pub const LEVEL_VARIABLE: &str = "VB_LOG_LEVEL";
pub const FORMAT_VARIABLE: &str = "VB_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// Ungueltige Filter fallen auf `info` zurueck, unbekannte Formate auf `text`.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(LEVEL_VARIABLE)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match format_waehlen(format).as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Format aus der Umgebung, sonst der konfigurierte Wert
fn format_waehlen(konfiguriert: &str) -> String {
    std::env::var(FORMAT_VARIABLE)
        .ok()
        .filter(|f| log_format_gueltig(f))
        .unwrap_or_else(|| konfiguriert.to_string())
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
