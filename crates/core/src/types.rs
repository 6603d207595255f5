//! Gemeinsame Identifikations- und Geometrietypen fuer Voicebridge

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Ein dekodierter Mono-Audio-Frame (16 Bit signed PCM)
pub type Frame = Vec<i16>;

/// Eindeutige Call-ID (Session-ID eines Teilnehmers)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub Uuid);

impl CallId {
    /// Erstellt eine neue zufaellige CallId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CallId {
    type Err = uuid::Error;

    /// Akzeptiert die nackte UUID und die Form `call:<uuid>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let roh = s.strip_prefix("call:").unwrap_or(s);
        Uuid::parse_str(roh).map(Self)
    }
}

/// Punkt im virtuellen Raum (Rohkoordinaten, noch nicht skaliert)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const fn neu(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Teilt alle Koordinaten durch `skala`
    pub fn skaliert(&self, skala: f64) -> Self {
        Self {
            x: self.x / skala,
            y: self.y / skala,
            z: self.z / skala,
        }
    }

    /// Euklidischer Abstand
    pub fn abstand(&self, andere: &Position) -> f64 {
        let dx = self.x - andere.x;
        let dy = self.y - andere.y;
        let dz = self.z - andere.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Position plus Blickrichtung (Yaw in Grad) eines Teilnehmers
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Position,
    /// Yaw in Grad, 0 = Blick entlang +Y, positiv im Uhrzeigersinn
    pub orientierung: f64,
}

impl Pose {
    pub const fn neu(x: f64, y: f64, z: f64, orientierung: f64) -> Self {
        Self {
            position: Position::neu(x, y, z),
            orientierung,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_id_eindeutig() {
        let a = CallId::new();
        let b = CallId::new();
        assert_ne!(a, b, "Zwei neue CallIds muessen verschieden sein");
    }

    #[test]
    fn call_id_parsen_mit_und_ohne_praefix() {
        let id = CallId::new();
        assert_eq!(id.to_string().parse::<CallId>().unwrap(), id);
        assert_eq!(format!("call:{id}").parse::<CallId>().unwrap(), id);
        assert!("kein-call".parse::<CallId>().is_err());
    }

    #[test]
    fn abstand_und_skalierung() {
        let a = Position::neu(0.0, 0.0, 0.0);
        let b = Position::neu(6.0, 8.0, 0.0);
        assert!((a.abstand(&b) - 10.0).abs() < 1e-12);
        assert!((b.skaliert(2.0).abstand(&a) - 5.0).abs() < 1e-12);
    }
}
