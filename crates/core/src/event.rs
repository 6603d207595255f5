//! Call-Ereignisse
//!
//! Asynchrone Meldungen, die eine Session ihrem Client als
//! `event type=<typ> ...`-Zeile schickt. Erzeugt werden sie von der
//! Session selbst, vom Mixer (Unterlauf) und vom UDP-Tester.

use crate::types::CallId;
use serde::{Deserialize, Serialize};

/// Lebenszyklus-Status eines Calls, wie er dem Client gemeldet wird
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// Call angelegt, Medien gebunden, noch nicht gemischt
    Aufbau,
    /// Call wird in jedem Tick gemischt
    Aktiv,
    /// Call ausgetragen, Puffer freigegeben
    Beendet,
}

impl CallStatus {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Aufbau => "establishing",
            Self::Aktiv => "established",
            Self::Beendet => "ended",
        }
    }
}

/// Alle Ereignisse, die an eine Control-Verbindung gehen koennen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallEreignis {
    /// Statuswechsel eines Calls
    Status { call_id: CallId, status: CallStatus },
    /// Wiederholt fehlende Eingangs-Frames
    Unterlauf { call_id: CallId, fehlend: u64 },
    /// Fortschritt oder Ergebnis eines Netzwerktests
    Diagnose { info: String },
}

impl CallEreignis {
    /// Ereignistyp fuer das `type=`-Feld
    pub fn typ(&self) -> &'static str {
        match self {
            Self::Status { .. } => "callstatus",
            Self::Unterlauf { .. } => "underrun",
            Self::Diagnose { .. } => "testudp",
        }
    }

    /// Key-Value-Felder des Ereignisses (ohne `type`)
    pub fn felder(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Status { call_id, status } => vec![
                ("call", call_id.to_string()),
                ("status", status.als_str().to_string()),
            ],
            Self::Unterlauf { call_id, fehlend } => vec![
                ("call", call_id.to_string()),
                ("missing", fehlend.to_string()),
            ],
            Self::Diagnose { info } => vec![("info", info.clone())],
        }
    }
}
