//! Ambient-Zone – volle Lautstaerke innerhalb eines Quaders
//!
//! Die Grenzen werden aus zwei gegenueberliegenden Ecken in Rohkoordinaten
//! berechnet: jede Koordinate durch die Skala geteilt, pro Achse Min/Max
//! gebildet und auf zwei Nachkommastellen gerundet. Die Rundung haelt
//! Vergleiche stabil, wenn dieselbe Zone wiederholt neu gesetzt wird.
//!
//! Die Enthaltenseins-Pruefung betrachtet nur X und Y. Die Z-Koordinate der
//! Hoerer ist praktisch nie null, deshalb wird sie nicht geprueft; die
//! Z-Grenzen werden nur gespeichert und angezeigt.

use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;

use voicebridge_core::parameter::skala_pruefen;
use voicebridge_core::{Pose, Position, Result, SpatializerArt};

use crate::obergrenze::Obergrenze;
use crate::{Daempfung, Spatializer};

/// Rundet auf zwei Nachkommastellen (halbe Hundertstel werden aufgerundet)
pub fn runden_100(wert: f64) -> f64 {
    (wert * 100.0 + 0.5).floor() / 100.0
}

/// Achsenparalleler Quader in skalierten Koordinaten
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Quader {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub min_z: f64,
    pub max_z: f64,
}

impl Quader {
    /// Berechnet den Quader aus zwei beliebigen gegenueberliegenden Ecken
    pub fn aus_ecken(a: Position, b: Position, skala: f64) -> Self {
        let (a, b) = (a.skaliert(skala), b.skaliert(skala));
        Self {
            min_x: runden_100(a.x.min(b.x)),
            max_x: runden_100(a.x.max(b.x)),
            min_y: runden_100(a.y.min(b.y)),
            max_y: runden_100(a.y.max(b.y)),
            min_z: runden_100(a.z.min(b.z)),
            max_z: runden_100(a.z.max(b.z)),
        }
    }

    /// Geschlossener Test auf X und Y; Z wird ignoriert
    pub fn enthaelt_xy(&self, p: &Position) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }
}

/// Spatializer fuer Ambient-Zonen
#[derive(Debug)]
pub struct AmbientSpatializer {
    bereich: RwLock<Quader>,
    attenuator: Obergrenze,
    skala: f64,
}

impl AmbientSpatializer {
    /// Erstellt eine Zone aus zwei Ecken; `skala` muss strikt positiv sein
    pub fn neu(ecke_a: Position, ecke_b: Position, skala: f64) -> Result<Self> {
        skala_pruefen(skala)?;
        Ok(Self {
            bereich: RwLock::new(Quader::aus_ecken(ecke_a, ecke_b, skala)),
            attenuator: Obergrenze::default(),
            skala,
        })
    }

    /// Setzt neue Grenzen; Abfragen sehen entweder den alten oder den neuen
    /// Quader, nie eine Mischung
    pub fn grenzen_setzen(&self, ecke_a: Position, ecke_b: Position) {
        let neu = Quader::aus_ecken(ecke_a, ecke_b, self.skala);
        *self.bereich.write() = neu;
        tracing::trace!(bereich = %QuaderAnzeige(&neu), "Ambient-Grenzen gesetzt");
    }

    pub fn grenzen(&self) -> Quader {
        *self.bereich.read()
    }

    pub fn skala(&self) -> f64 {
        self.skala
    }

    /// Liegt die (rohe) Position innerhalb der Zone?
    pub fn ist_innen(&self, position: &Position) -> bool {
        self.bereich.read().enthaelt_xy(&position.skaliert(self.skala))
    }
}

impl Spatializer for AmbientSpatializer {
    fn daempfung(&self, _quelle: &Pose, hoerer: &Pose) -> Daempfung {
        if self.ist_innen(&hoerer.position) {
            Daempfung::ungerichtet(self.attenuator.lesen())
        } else {
            Daempfung::STILLE
        }
    }

    fn attenuator(&self) -> f64 {
        self.attenuator.lesen()
    }

    fn attenuator_setzen(&self, wert: f64) {
        self.attenuator.setzen(wert);
    }

    fn klonen(&self) -> Box<dyn Spatializer> {
        Box::new(Self {
            bereich: RwLock::new(self.grenzen()),
            attenuator: self.attenuator.clone(),
            skala: self.skala,
        })
    }

    fn art(&self) -> SpatializerArt {
        SpatializerArt::Ambient
    }
}

impl fmt::Display for AmbientSpatializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AmbientSpatializer({} attenuator={})",
            QuaderAnzeige(&self.grenzen()),
            self.attenuator()
        )
    }
}

struct QuaderAnzeige<'a>(&'a Quader);

impl fmt::Display for QuaderAnzeige<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let q = self.0;
        write!(
            f,
            "minX={} maxX={} minY={} maxY={} minZ={} maxZ={}",
            q.min_x, q.max_x, q.min_y, q.max_y, q.min_z, q.max_z
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicebridge_core::BridgeError;

    fn zone() -> AmbientSpatializer {
        AmbientSpatializer::neu(
            Position::neu(0.0, 0.0, 0.0),
            Position::neu(10.0, 10.0, 2.0),
            1.0,
        )
        .unwrap()
    }

    fn hoerer(x: f64, y: f64, z: f64) -> Pose {
        Pose::neu(x, y, z, 0.0)
    }

    #[test]
    fn innen_volle_lautstaerke_unabhaengig_von_z() {
        let z = zone();
        let quelle = Pose::default();
        // Z ausserhalb [0, 2] wird absichtlich nicht geprueft
        for hz in [-100.0, 0.0, 1.0, 2.5, 999.0] {
            let d = z.daempfung(&quelle, &hoerer(5.0, 5.0, hz));
            assert_eq!(d.gain, 1.0, "z={hz} muss als innen gelten");
            assert_eq!(d.richtung, [0.0; 3]);
        }
    }

    #[test]
    fn ausserhalb_auf_x_oder_y_ist_still_unabhaengig_von_z() {
        let z = zone();
        let quelle = Pose::default();
        for (x, y) in [(-0.5, 5.0), (10.5, 5.0), (5.0, -0.5), (5.0, 10.5)] {
            for hz in [0.0, 1.0, 50.0] {
                let d = z.daempfung(&quelle, &hoerer(x, y, hz));
                assert_eq!(d, Daempfung::STILLE, "({x}, {y}, {hz}) muss still sein");
            }
        }
    }

    #[test]
    fn grenzen_sind_geschlossen() {
        let z = zone();
        assert!(z.ist_innen(&Position::neu(0.0, 0.0, 7.0)));
        assert!(z.ist_innen(&Position::neu(10.0, 10.0, -7.0)));
    }

    #[test]
    fn ecken_werden_vor_min_max_gerundet() {
        let z = AmbientSpatializer::neu(
            Position::neu(1.004, 2.006, 0.0),
            Position::neu(5.001, 5.999, 0.0),
            1.0,
        )
        .unwrap();
        let q = z.grenzen();
        assert_eq!(q.min_x, 1.0);
        assert_eq!(q.max_x, 5.0);
        assert_eq!(q.min_y, 2.01);
        assert_eq!(q.max_y, 6.0);

        // Innerhalb der gerundeten, aber ausserhalb der rohen Grenzen
        assert!(z.ist_innen(&Position::neu(1.002, 3.0, 0.0)));
        assert!(z.ist_innen(&Position::neu(3.0, 5.9995, 0.0)));
        // Innerhalb der rohen, aber ausserhalb der gerundeten Grenzen
        assert!(!z.ist_innen(&Position::neu(5.0005, 3.0, 0.0)));
        assert!(!z.ist_innen(&Position::neu(3.0, 2.008, 0.0)));
    }

    #[test]
    fn ecken_reihenfolge_egal() {
        let a = Quader::aus_ecken(Position::neu(4.0, -1.0, 3.0), Position::neu(-2.0, 6.0, 0.0), 1.0);
        let b = Quader::aus_ecken(Position::neu(-2.0, 6.0, 0.0), Position::neu(4.0, -1.0, 3.0), 1.0);
        assert_eq!(a, b);
        assert_eq!((a.min_x, a.max_x, a.min_y, a.max_y), (-2.0, 4.0, -1.0, 6.0));
    }

    #[test]
    fn skala_teilt_ecken_und_hoererposition() {
        let z = AmbientSpatializer::neu(
            Position::neu(0.0, 0.0, 0.0),
            Position::neu(20.0, 20.0, 0.0),
            2.0,
        )
        .unwrap();
        assert_eq!(z.grenzen().max_x, 10.0);
        assert!(z.ist_innen(&Position::neu(19.0, 19.0, 0.0)));
        assert!(!z.ist_innen(&Position::neu(21.0, 19.0, 0.0)));
    }

    #[test]
    fn nicht_positive_skala_wird_abgelehnt() {
        let e = AmbientSpatializer::neu(Position::default(), Position::default(), 0.0);
        assert!(matches!(e, Err(BridgeError::Konfiguration(_))));
        let e = AmbientSpatializer::neu(Position::default(), Position::default(), -1.0);
        assert!(matches!(e, Err(BridgeError::Konfiguration(_))));
    }

    #[test]
    fn entarteter_quader_ist_erlaubt() {
        let p = Position::neu(3.0, 3.0, 0.0);
        let z = AmbientSpatializer::neu(p, p, 1.0).unwrap();
        assert!(!z.ist_innen(&Position::neu(3.01, 3.0, 0.0)));
        // Nur der exakte Punkt liegt im geschlossenen Quader
        assert!(z.ist_innen(&p));
    }

    #[test]
    fn klon_ist_unabhaengig() {
        let original = zone();
        original.attenuator_setzen(0.8);
        let kopie = original.klonen();
        assert_eq!(kopie.attenuator(), 0.8);
        assert_eq!(
            kopie.daempfung(&Pose::default(), &hoerer(5.0, 5.0, 0.0)).gain,
            0.8
        );

        kopie.attenuator_setzen(0.3);
        assert_eq!(original.attenuator(), 0.8);
        assert_eq!(kopie.attenuator(), 0.3);
    }

    #[test]
    fn grenzen_setzen_ersetzt_quader() {
        let z = zone();
        z.grenzen_setzen(Position::neu(20.0, 20.0, 0.0), Position::neu(30.0, 30.0, 0.0));
        assert!(!z.ist_innen(&Position::neu(5.0, 5.0, 0.0)));
        assert!(z.ist_innen(&Position::neu(25.0, 25.0, 0.0)));
    }

    #[test]
    fn grenzen_setzen_ist_atomar_fuer_leser() {
        use std::sync::Arc;
        let z = Arc::new(zone());
        let a = (Position::neu(0.0, 0.0, 0.0), Position::neu(10.0, 10.0, 0.0));
        let b = (Position::neu(100.0, 100.0, 0.0), Position::neu(110.0, 110.0, 0.0));

        let schreiber = {
            let z = Arc::clone(&z);
            std::thread::spawn(move || {
                for i in 0..2000 {
                    let (e1, e2) = if i % 2 == 0 { b } else { a };
                    z.grenzen_setzen(e1, e2);
                }
            })
        };
        for _ in 0..2000 {
            let q = z.grenzen();
            let ist_a = q.min_x == 0.0 && q.max_x == 10.0 && q.min_y == 0.0 && q.max_y == 10.0;
            let ist_b = q.min_x == 100.0 && q.max_x == 110.0 && q.min_y == 100.0 && q.max_y == 110.0;
            assert!(ist_a || ist_b, "Halb aktualisierter Quader beobachtet: {q:?}");
        }
        schreiber.join().unwrap();
    }

    #[test]
    fn runden_100_halbe_aufrunden() {
        assert_eq!(runden_100(1.005_000_1), 1.01);
        assert_eq!(runden_100(1.004), 1.0);
        assert_eq!(runden_100(-1.004), -1.0);
    }

    #[test]
    fn anzeige_enthaelt_grenzen() {
        let text = zone().to_string();
        assert!(text.contains("maxX=10"));
        assert!(text.contains("attenuator=1"));
    }
}
