//! Omnidirektional – jeder hoert jeden mit voller Lautstaerke

use voicebridge_core::{Pose, SpatializerArt};

use crate::obergrenze::Obergrenze;
use crate::{Daempfung, Spatializer};

#[derive(Debug, Clone, Default)]
pub struct VollSpatializer {
    attenuator: Obergrenze,
}

impl VollSpatializer {
    pub fn neu() -> Self {
        Self::default()
    }
}

impl Spatializer for VollSpatializer {
    fn daempfung(&self, _quelle: &Pose, _hoerer: &Pose) -> Daempfung {
        Daempfung::ungerichtet(self.attenuator.lesen())
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
        SpatializerArt::Voll
    }
}
