//! Prozessweite Voice-Parameter
//!
//! `VoiceManager` wird einmal beim Start aus der Konfiguration gebaut und
//! danach nur noch gelesen. Er wird explizit (als `Arc<VoiceManager>`) an
//! Spatializer-Konstruktion, Mixer und Sessions weitergereicht.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Maximale Lautstaerke eines Spatializers, falls nichts anderes gesetzt ist
pub const STANDARD_MAXIMALE_LAUTSTAERKE: f64 = 1.0;

/// Art eines Spatializers (fuer Konfiguration und Befehle)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpatializerArt {
    /// Volle Lautstaerke innerhalb eines Quaders
    Ambient,
    /// Punktquelle mit Abstandsabfall
    Punkt,
    /// Gerichtete Quelle (Kegel)
    Kegel,
    /// Ueberall volle Lautstaerke
    Voll,
}

impl SpatializerArt {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Ambient => "ambient",
            Self::Punkt => "point",
            Self::Kegel => "cone",
            Self::Voll => "full",
        }
    }
}

impl FromStr for SpatializerArt {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ambient" => Ok(Self::Ambient),
            "point" | "punkt" => Ok(Self::Punkt),
            "cone" | "kegel" => Ok(Self::Kegel),
            "full" | "voll" => Ok(Self::Voll),
            other => Err(BridgeError::konfiguration(format!(
                "Unbekannte Spatializer-Art: {other}"
            ))),
        }
    }
}

/// Wertobjekt mit allen prozessweiten Voice-Parametern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceParameter {
    /// Teiler fuer alle Rohkoordinaten (> 0)
    pub skala: f64,
    /// Standard-Obergrenze der Daempfung
    pub standard_attenuator: f64,
    /// Spatializer fuer Calls ohne eigene Angabe
    pub standard_spatializer: SpatializerArt,
    /// Radius mit voller Lautstaerke (Punkt/Kegel)
    pub voll_radius: f64,
    /// Ab diesem Radius ist eine Punktquelle stumm
    pub null_radius: f64,
    /// Steilheit des Abstandsabfalls
    pub falloff: f64,
}

impl Default for VoiceParameter {
    fn default() -> Self {
        Self {
            skala: 1.0,
            standard_attenuator: STANDARD_MAXIMALE_LAUTSTAERKE,
            standard_spatializer: SpatializerArt::Punkt,
            voll_radius: 1.0,
            null_radius: 30.0,
            falloff: 0.5,
        }
    }
}

impl VoiceParameter {
    /// Prueft alle Werte; wird einmal beim Start aufgerufen
    pub fn validieren(&self) -> Result<()> {
        skala_pruefen(self.skala)?;
        if !(self.standard_attenuator.is_finite() && self.standard_attenuator >= 0.0) {
            return Err(BridgeError::konfiguration(format!(
                "standard_attenuator muss >= 0 sein, ist {}",
                self.standard_attenuator
            )));
        }
        if !(self.voll_radius >= 0.0 && self.null_radius > self.voll_radius) {
            return Err(BridgeError::konfiguration(format!(
                "Radien ungueltig: voll={} null={}",
                self.voll_radius, self.null_radius
            )));
        }
        if !(self.falloff.is_finite() && self.falloff >= 0.0) {
            return Err(BridgeError::konfiguration("falloff muss >= 0 sein"));
        }
        Ok(())
    }
}

/// Prueft, dass eine Skala endlich und strikt positiv ist
pub fn skala_pruefen(skala: f64) -> Result<()> {
    if skala.is_finite() && skala > 0.0 {
        Ok(())
    } else {
        Err(BridgeError::konfiguration(format!(
            "Skala muss strikt positiv sein, ist {skala}"
        )))
    }
}

/// Prozessweites Register der Voice-Parameter (nach dem Start unveraenderlich)
#[derive(Debug)]
pub struct VoiceManager {
    parameter: VoiceParameter,
}

impl VoiceManager {
    /// Erstellt den Manager; ungueltige Parameter sind ein Konfigurationsfehler
    pub fn neu(parameter: VoiceParameter) -> Result<Self> {
        parameter.validieren()?;
        Ok(Self { parameter })
    }

    pub fn parameter(&self) -> &VoiceParameter {
        &self.parameter
    }

    pub fn skala(&self) -> f64 {
        self.parameter.skala
    }

    pub fn standard_attenuator(&self) -> f64 {
        self.parameter.standard_attenuator
    }
}

impl Default for VoiceManager {
    fn default() -> Self {
        Self {
            parameter: VoiceParameter::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_parameter_sind_gueltig() {
        assert!(VoiceParameter::default().validieren().is_ok());
        let vm = VoiceManager::default();
        assert_eq!(vm.skala(), 1.0);
        assert_eq!(vm.standard_attenuator(), STANDARD_MAXIMALE_LAUTSTAERKE);
    }

    #[test]
    fn nicht_positive_skala_ist_konfigurationsfehler() {
        for skala in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let p = VoiceParameter { skala, ..Default::default() };
            assert!(
                matches!(VoiceManager::neu(p), Err(BridgeError::Konfiguration(_))),
                "Skala {skala} muss abgelehnt werden"
            );
        }
    }

    #[test]
    fn radien_muessen_aufsteigen() {
        let p = VoiceParameter {
            voll_radius: 5.0,
            null_radius: 5.0,
            ..Default::default()
        };
        assert!(p.validieren().is_err());
    }

    #[test]
    fn spatializer_art_parsen() {
        assert_eq!("ambient".parse::<SpatializerArt>().unwrap(), SpatializerArt::Ambient);
        assert_eq!("POINT".parse::<SpatializerArt>().unwrap(), SpatializerArt::Punkt);
        assert_eq!("cone".parse::<SpatializerArt>().unwrap(), SpatializerArt::Kegel);
        assert_eq!("full".parse::<SpatializerArt>().unwrap(), SpatializerArt::Voll);
        assert!("hrtf".parse::<SpatializerArt>().is_err());
    }
}
