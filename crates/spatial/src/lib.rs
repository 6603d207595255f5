//! voicebridge-spatial – Spatializer-Modelle
//!
//! Ein Spatializer bestimmt fuer ein Paar (Quelle, Hoerer), wie laut die
//! Quelle beim Hoerer ankommt. Der Mixer kennt nur den Trait
//! [`Spatializer`], nie eine konkrete Variante.
//!
//! ## Module
//! - [`ambient`] – Volle Lautstaerke innerhalb eines Quaders
//! - [`punkt`] – Punktquelle mit Abstandsabfall
//! - [`kegel`] – Gerichtete Quelle
//! - [`voll`] – Ueberall volle Lautstaerke

pub mod ambient;
pub mod kegel;
pub mod punkt;
pub mod voll;

mod obergrenze;

pub use ambient::{AmbientSpatializer, Quader};
pub use kegel::KegelSpatializer;
pub use punkt::PunktSpatializer;
pub use voll::VollSpatializer;

use std::fmt;
use std::sync::Arc;
use voicebridge_core::{Pose, Position, Result, SpatializerArt, VoiceManager};

/// Ergebnis einer Daempfungsberechnung
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Daempfung {
    /// Richtungshinweis im lokalen Hoerer-Koordinatensystem
    /// (x = rechts, y = vorne, z = oben); Nullvektor wenn nicht unterstuetzt
    pub richtung: [f64; 3],
    /// Verstaerkung in `[0, attenuator]`
    pub gain: f64,
}

impl Daempfung {
    /// Unhoerbar
    pub const STILLE: Self = Self {
        richtung: [0.0; 3],
        gain: 0.0,
    };

    /// Ungerichtete Verstaerkung
    pub fn ungerichtet(gain: f64) -> Self {
        Self {
            richtung: [0.0; 3],
            gain,
        }
    }
}

/// Faehigkeit: Daempfung zwischen Quelle und Hoerer berechnen
///
/// Implementierungen sind nach der Konstruktion unveraenderlich, bis auf die
/// Obergrenze (`attenuator_setzen`) und variantenspezifische, atomar
/// veroeffentlichte Setter.
pub trait Spatializer: Send + Sync + fmt::Debug {
    /// Berechnet Richtung und Verstaerkung; `gain` liegt immer in
    /// `[0, attenuator()]`
    fn daempfung(&self, quelle: &Pose, hoerer: &Pose) -> Daempfung;

    /// Aktuelle Obergrenze der Verstaerkung
    fn attenuator(&self) -> f64;

    /// Setzt die Obergrenze (negative Werte werden auf 0 gesetzt)
    fn attenuator_setzen(&self, wert: f64);

    /// Unabhaengige Kopie ohne geteilten veraenderlichen Zustand
    fn klonen(&self) -> Box<dyn Spatializer>;

    fn art(&self) -> SpatializerArt;
}

impl Clone for Box<dyn Spatializer> {
    fn clone(&self) -> Self {
        self.klonen()
    }
}

/// Beschreibung eines zu bauenden Spatializers (aus Befehl oder Konfiguration)
#[derive(Debug, Clone, PartialEq)]
pub enum SpatializerKonfig {
    Ambient {
        ecke_a: Position,
        ecke_b: Position,
    },
    Punkt {
        voll_radius: f64,
        null_radius: f64,
        falloff: f64,
    },
    Kegel {
        voll_radius: f64,
        null_radius: f64,
        falloff: f64,
        innen_winkel: f64,
        aussen_winkel: f64,
        aussen_gain: f64,
    },
    Voll,
}

impl SpatializerKonfig {
    /// Standardbeschreibung einer Art, Parameter aus dem VoiceManager
    pub fn standard(art: SpatializerArt, vm: &VoiceManager) -> Self {
        let p = vm.parameter();
        match art {
            SpatializerArt::Ambient => Self::Ambient {
                ecke_a: Position::default(),
                ecke_b: Position::default(),
            },
            SpatializerArt::Punkt => Self::Punkt {
                voll_radius: p.voll_radius,
                null_radius: p.null_radius,
                falloff: p.falloff,
            },
            SpatializerArt::Kegel => Self::Kegel {
                voll_radius: p.voll_radius,
                null_radius: p.null_radius,
                falloff: p.falloff,
                innen_winkel: kegel::STANDARD_INNEN_WINKEL,
                aussen_winkel: kegel::STANDARD_AUSSEN_WINKEL,
                aussen_gain: kegel::STANDARD_AUSSEN_GAIN,
            },
            SpatializerArt::Voll => Self::Voll,
        }
    }

    pub fn art(&self) -> SpatializerArt {
        match self {
            Self::Ambient { .. } => SpatializerArt::Ambient,
            Self::Punkt { .. } => SpatializerArt::Punkt,
            Self::Kegel { .. } => SpatializerArt::Kegel,
            Self::Voll => SpatializerArt::Voll,
        }
    }
}

/// Baut einen Spatializer; Skala und Standard-Obergrenze kommen aus dem
/// VoiceManager. Ungueltige Parameter sind ein Konfigurationsfehler.
pub fn erstellen(konfig: &SpatializerKonfig, vm: &VoiceManager) -> Result<Arc<dyn Spatializer>> {
    let skala = vm.skala();
    let spatializer: Arc<dyn Spatializer> = match *konfig {
        SpatializerKonfig::Ambient { ecke_a, ecke_b } => {
            Arc::new(AmbientSpatializer::neu(ecke_a, ecke_b, skala)?)
        }
        SpatializerKonfig::Punkt {
            voll_radius,
            null_radius,
            falloff,
        } => Arc::new(PunktSpatializer::neu(skala, voll_radius, null_radius, falloff)?),
        SpatializerKonfig::Kegel {
            voll_radius,
            null_radius,
            falloff,
            innen_winkel,
            aussen_winkel,
            aussen_gain,
        } => {
            let punkt = PunktSpatializer::neu(skala, voll_radius, null_radius, falloff)?;
            Arc::new(KegelSpatializer::neu(punkt, innen_winkel, aussen_winkel, aussen_gain)?)
        }
        SpatializerKonfig::Voll => Arc::new(VollSpatializer::neu()),
    };
    spatializer.attenuator_setzen(vm.standard_attenuator());
    Ok(spatializer)
}

/// Standard-Spatializer laut VoiceManager
pub fn standard(vm: &VoiceManager) -> Result<Arc<dyn Spatializer>> {
    let konfig = SpatializerKonfig::standard(vm.parameter().standard_spatializer, vm);
    erstellen(&konfig, vm)
}

/// Einheitsvektor vom Hoerer zur Quelle im lokalen Hoerer-System
///
/// Yaw 0 blickt entlang +Y, positive Winkel drehen im Uhrzeigersinn.
pub(crate) fn lokale_richtung(hoerer: &Pose, quelle: &Position, skala: f64) -> [f64; 3] {
    let h = hoerer.position.skaliert(skala);
    let q = quelle.skaliert(skala);
    let (dx, dy, dz) = (q.x - h.x, q.y - h.y, q.z - h.z);
    let laenge = (dx * dx + dy * dy + dz * dz).sqrt();
    if laenge < f64::EPSILON {
        return [0.0; 3];
    }

    let yaw = hoerer.orientierung.to_radians();
    let (sin, cos) = yaw.sin_cos();
    let rechts = dx * cos - dy * sin;
    let vorne = dx * sin + dy * cos;
    [rechts / laenge, vorne / laenge, dz / laenge]
}
