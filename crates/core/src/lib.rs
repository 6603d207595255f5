//! voicebridge-core – Gemeinsame Typen, Parameter und Fehlertypen
//!
//! Dieses Crate stellt die Bausteine bereit, die von allen anderen
//! Voicebridge-Crates gemeinsam genutzt werden: IDs, Positionen,
//! Call-Ereignisse, die Fehler-Taxonomie und die prozessweiten
//! Voice-Parameter.

pub mod error;
pub mod event;
pub mod parameter;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{BridgeError, Result};
pub use event::{CallEreignis, CallStatus};
pub use parameter::{SpatializerArt, VoiceManager, VoiceParameter};
pub use types::{CallId, Frame, Pose, Position};
