//! Gerichtete Quelle (Kegel)
//!
//! Multipliziert die Punktquellen-Verstaerkung mit einem Kegelfaktor, der vom
//! Winkel zwischen Blickrichtung der Quelle und der Richtung Quelle→Hoerer
//! abhaengt: innerhalb `innen_winkel / 2` ist er 1, ausserhalb
//! `aussen_winkel / 2` gleich `aussen_gain`, dazwischen linear.

use voicebridge_core::{BridgeError, Pose, Result, SpatializerArt};

use crate::punkt::PunktSpatializer;
use crate::{Daempfung, Spatializer};

pub const STANDARD_INNEN_WINKEL: f64 = 90.0;
pub const STANDARD_AUSSEN_WINKEL: f64 = 180.0;
pub const STANDARD_AUSSEN_GAIN: f64 = 0.25;

#[derive(Debug, Clone)]
pub struct KegelSpatializer {
    punkt: PunktSpatializer,
    innen_winkel: f64,
    aussen_winkel: f64,
    aussen_gain: f64,
}

impl KegelSpatializer {
    pub fn neu(
        punkt: PunktSpatializer,
        innen_winkel: f64,
        aussen_winkel: f64,
        aussen_gain: f64,
    ) -> Result<Self> {
        let winkel_ok = |w: f64| (0.0..=360.0).contains(&w);
        if !(winkel_ok(innen_winkel) && winkel_ok(aussen_winkel) && innen_winkel <= aussen_winkel) {
            return Err(BridgeError::konfiguration(format!(
                "Kegelwinkel ungueltig: innen={innen_winkel} aussen={aussen_winkel}"
            )));
        }
        if !(0.0..=1.0).contains(&aussen_gain) {
            return Err(BridgeError::konfiguration(format!(
                "aussen_gain muss in [0, 1] liegen, ist {aussen_gain}"
            )));
        }
        Ok(Self {
            punkt,
            innen_winkel,
            aussen_winkel,
            aussen_gain,
        })
    }

    /// Faktor in `[aussen_gain, 1]` fuer einen Abweichungswinkel in Grad
    fn kegel_faktor(&self, winkel: f64) -> f64 {
        let innen = self.innen_winkel / 2.0;
        let aussen = self.aussen_winkel / 2.0;
        if winkel <= innen {
            1.0
        } else if winkel >= aussen {
            self.aussen_gain
        } else {
            let t = (winkel - innen) / (aussen - innen);
            1.0 + t * (self.aussen_gain - 1.0)
        }
    }

    /// Winkel zwischen Blickrichtung der Quelle und Richtung zum Hoerer (XY)
    fn abweichung(&self, quelle: &Pose, hoerer: &Pose) -> Option<f64> {
        let skala = self.punkt.skala();
        let q = quelle.position.skaliert(skala);
        let h = hoerer.position.skaliert(skala);
        let (dx, dy) = (h.x - q.x, h.y - q.y);
        let laenge = (dx * dx + dy * dy).sqrt();
        if laenge < f64::EPSILON {
            return None;
        }
        let (sin, cos) = quelle.orientierung.to_radians().sin_cos();
        let skalarprodukt = (dx * sin + dy * cos) / laenge;
        Some(skalarprodukt.clamp(-1.0, 1.0).acos().to_degrees())
    }
}

impl Spatializer for KegelSpatializer {
    fn daempfung(&self, quelle: &Pose, hoerer: &Pose) -> Daempfung {
        let basis = self.punkt.daempfung(quelle, hoerer);
        let faktor = self
            .abweichung(quelle, hoerer)
            .map(|w| self.kegel_faktor(w))
            .unwrap_or(1.0);
        Daempfung {
            richtung: basis.richtung,
            gain: (basis.gain * faktor).clamp(0.0, self.attenuator()),
        }
    }

    fn attenuator(&self) -> f64 {
        self.punkt.attenuator()
    }

    fn attenuator_setzen(&self, wert: f64) {
        self.punkt.attenuator_setzen(wert);
    }

    fn klonen(&self) -> Box<dyn Spatializer> {
        Box::new(self.clone())
    }

    fn art(&self) -> SpatializerArt {
        SpatializerArt::Kegel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kegel() -> KegelSpatializer {
        let punkt = PunktSpatializer::neu(1.0, 10.0, 50.0, 0.5).unwrap();
        KegelSpatializer::neu(punkt, 90.0, 180.0, 0.25).unwrap()
    }

    #[test]
    fn vor_der_quelle_volle_lautstaerke() {
        // Quelle blickt entlang +Y, Hoerer steht davor
        let quelle = Pose::neu(0.0, 0.0, 0.0, 0.0);
        let hoerer = Pose::neu(0.0, 5.0, 0.0, 180.0);
        assert!((kegel().daempfung(&quelle, &hoerer).gain - 1.0).abs() < 1e-9);
    }

    #[test]
    fn hinter_der_quelle_aussen_gain() {
        let quelle = Pose::neu(0.0, 0.0, 0.0, 0.0);
        let hoerer = Pose::neu(0.0, -5.0, 0.0, 0.0);
        assert!((kegel().daempfung(&quelle, &hoerer).gain - 0.25).abs() < 1e-9);
    }

    #[test]
    fn uebergang_ist_linear() {
        let k = kegel();
        // 67.5 Grad liegt in der Mitte zwischen 45 und 90
        assert!((k.kegel_faktor(67.5) - 0.625).abs() < 1e-12);
        assert_eq!(k.kegel_faktor(10.0), 1.0);
        assert_eq!(k.kegel_faktor(170.0), 0.25);
    }

    #[test]
    fn drehung_der_quelle_zaehlt() {
        // Quelle blickt nach +X, Hoerer bei +X
        let quelle = Pose::neu(0.0, 0.0, 0.0, 90.0);
        let hoerer = Pose::neu(5.0, 0.0, 0.0, 0.0);
        assert!((kegel().daempfung(&quelle, &hoerer).gain - 1.0).abs() < 1e-9);
    }

    #[test]
    fn ungueltige_winkel() {
        let punkt = PunktSpatializer::neu(1.0, 1.0, 10.0, 0.5).unwrap();
        assert!(KegelSpatializer::neu(punkt.clone(), 200.0, 100.0, 0.5).is_err());
        assert!(KegelSpatializer::neu(punkt.clone(), 90.0, 400.0, 0.5).is_err());
        assert!(KegelSpatializer::neu(punkt, 90.0, 180.0, 1.5).is_err());
    }

    #[test]
    fn attenuator_begrenzt_gain() {
        let k = kegel();
        k.attenuator_setzen(0.4);
        let quelle = Pose::neu(0.0, 0.0, 0.0, 0.0);
        let hoerer = Pose::neu(0.0, 1.0, 0.0, 0.0);
        assert!((k.daempfung(&quelle, &hoerer).gain - 0.4).abs() < 1e-9);
    }
}
