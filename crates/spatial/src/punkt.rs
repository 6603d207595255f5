//! Punktquelle mit Abstandsabfall
//!
//! Bis `voll_radius` volle Lautstaerke, ab `null_radius` Stille, dazwischen
//! `attenuator / (1 + falloff * (d - voll_radius))`.

use voicebridge_core::parameter::skala_pruefen;
use voicebridge_core::{BridgeError, Pose, Result, SpatializerArt};

use crate::obergrenze::Obergrenze;
use crate::{lokale_richtung, Daempfung, Spatializer};

#[derive(Debug, Clone)]
pub struct PunktSpatializer {
    skala: f64,
    voll_radius: f64,
    null_radius: f64,
    falloff: f64,
    attenuator: Obergrenze,
}

impl PunktSpatializer {
    pub fn neu(skala: f64, voll_radius: f64, null_radius: f64, falloff: f64) -> Result<Self> {
        skala_pruefen(skala)?;
        if !(voll_radius.is_finite() && voll_radius >= 0.0) {
            return Err(BridgeError::konfiguration(format!(
                "voll_radius muss >= 0 sein, ist {voll_radius}"
            )));
        }
        if !(null_radius > voll_radius) {
            return Err(BridgeError::konfiguration(format!(
                "null_radius ({null_radius}) muss groesser als voll_radius ({voll_radius}) sein"
            )));
        }
        if !(falloff.is_finite() && falloff >= 0.0) {
            return Err(BridgeError::konfiguration(format!(
                "falloff muss >= 0 sein, ist {falloff}"
            )));
        }
        Ok(Self {
            skala,
            voll_radius,
            null_radius,
            falloff,
            attenuator: Obergrenze::default(),
        })
    }

    /// Verstaerkung nur aus dem (skalierten) Abstand
    pub fn gain_fuer_abstand(&self, abstand: f64) -> f64 {
        let max = self.attenuator.lesen();
        let gain = if abstand <= self.voll_radius {
            max
        } else if abstand >= self.null_radius {
            0.0
        } else {
            max / (1.0 + self.falloff * (abstand - self.voll_radius))
        };
        self.attenuator.begrenzen(gain)
    }

    pub(crate) fn skala(&self) -> f64 {
        self.skala
    }
}

impl Spatializer for PunktSpatializer {
    fn daempfung(&self, quelle: &Pose, hoerer: &Pose) -> Daempfung {
        let abstand = quelle
            .position
            .skaliert(self.skala)
            .abstand(&hoerer.position.skaliert(self.skala));
        let gain = self.gain_fuer_abstand(abstand);
        if gain == 0.0 {
            return Daempfung::STILLE;
        }
        Daempfung {
            richtung: lokale_richtung(hoerer, &quelle.position, self.skala),
            gain,
        }
    }

    fn attenuator(&self) -> f64 {
        self.attenuator.lesen()
    }

    fn attenuator_setzen(&self, wert: f64) {
        self.attenuator.setzen(wert);
    }

    fn klonen(&self) -> Box<dyn Spatializer> {
        Box::new(self.clone())
    }

    fn art(&self) -> SpatializerArt {
        SpatializerArt::Punkt
    }
}
