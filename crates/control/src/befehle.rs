//! Befehle der Control-Verbindung
//!
//! Uebersetzt geparste Zeilen in [`Befehl`]-Werte. Spatializer-Parameter
//! ohne Angabe kommen aus dem VoiceManager.

use std::sync::Arc;
use std::time::Duration;

use voicebridge_core::{CallId, Pose, Position, SpatializerArt, VoiceManager};
use voicebridge_spatial::{Spatializer, SpatializerKonfig};

use crate::error::{ControlError, ControlResult};
use crate::protokoll::BefehlsZeile;
use crate::session::SessionZustand;

/// Gewuenschter Spatializer samt optionaler Obergrenze
#[derive(Debug, Clone, PartialEq)]
pub struct SpatializerAuswahl {
    pub konfig: SpatializerKonfig,
    pub attenuator: Option<f64>,
}

impl SpatializerAuswahl {
    pub fn bauen(&self, vm: &VoiceManager) -> ControlResult<Arc<dyn Spatializer>> {
        let spatializer = voicebridge_spatial::erstellen(&self.konfig, vm)?;
        if let Some(wert) = self.attenuator {
            spatializer.attenuator_setzen(wert);
        }
        Ok(spatializer)
    }
}

/// Aenderung der Daempfung eines laufenden Calls
#[derive(Debug, Clone, PartialEq)]
pub enum DaempfungsAenderung {
    /// Spatializer ersetzen
    Spatializer(SpatializerAuswahl),
    /// Nur die Obergrenze des aktuellen Spatializers setzen
    Lautstaerke(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Befehl {
    CallErstellen {
        ziel: String,
        konferenz: Option<String>,
        pose: Pose,
        spatializer: Option<SpatializerAuswahl>,
    },
    Positionieren {
        call: Option<CallId>,
        position: Position,
        orientierung: Option<f64>,
    },
    Stumm {
        call: Option<CallId>,
        an: bool,
    },
    DaempfungSetzen {
        call: Option<CallId>,
        aenderung: DaempfungsAenderung,
    },
    CallInfo {
        call: Option<CallId>,
    },
    UdpTesten {
        host: String,
        port: u16,
        dauer: Option<Duration>,
    },
    Version,
    Auflegen {
        call: Option<CallId>,
    },
    Beenden,
}

impl Befehl {
    /// Befehlsname wie auf der Leitung
    pub fn name(&self) -> &'static str {
        match self {
            Self::CallErstellen { .. } => "createcall",
            Self::Positionieren { .. } => "reposition",
            Self::Stumm { .. } => "mute",
            Self::DaempfungSetzen { .. } => "setattenuation",
            Self::CallInfo { .. } => "callinfo",
            Self::UdpTesten { .. } => "testudp",
            Self::Version => "version",
            Self::Auflegen { .. } => "hangup",
            Self::Beenden => "quit",
        }
    }

    /// Ob der Befehl im Zustand angenommen wird
    pub fn erlaubt_in(&self, zustand: SessionZustand) -> bool {
        use SessionZustand::*;
        match self {
            Self::CallErstellen { .. } => zustand == Leerlauf,
            Self::Positionieren { .. }
            | Self::Stumm { .. }
            | Self::DaempfungSetzen { .. }
            | Self::CallInfo { .. }
            | Self::Auflegen { .. } => zustand == ImCall,
            Self::UdpTesten { .. } | Self::Version | Self::Beenden => {
                matches!(zustand, Leerlauf | ImCall)
            }
        }
    }

    /// Konvertiert eine geparste Zeile
    pub fn aus_zeile(cmd: &BefehlsZeile, vm: &VoiceManager) -> ControlResult<Self> {
        match cmd.name.as_str() {
            "createcall" => {
                let ziel = cmd.pflicht_param("dest")?.to_string();
                let position = Position::neu(
                    cmd.zahl_param("x")?.unwrap_or(0.0),
                    cmd.zahl_param("y")?.unwrap_or(0.0),
                    cmd.zahl_param("z")?.unwrap_or(0.0),
                );
                let orientierung = cmd.zahl_param("orientation")?.unwrap_or(0.0);
                endlich_pruefen(&[position.x, position.y, position.z, orientierung])?;
                let art = cmd.param("spatializer").or_else(|| cmd.param("type"));
                let spatializer = match art {
                    Some(art) => Some(spatializer_auswahl(cmd, art, vm)?),
                    None => None,
                };
                Ok(Self::CallErstellen {
                    ziel,
                    konferenz: cmd.param("conf").map(String::from),
                    pose: Pose {
                        position,
                        orientierung,
                    },
                    spatializer,
                })
            }
            "reposition" => {
                let position = Position::neu(
                    cmd.pflicht_zahl("x")?,
                    cmd.pflicht_zahl("y")?,
                    cmd.pflicht_zahl("z")?,
                );
                let orientierung: Option<f64> = cmd.zahl_param("orientation")?;
                endlich_pruefen(&[position.x, position.y, position.z, orientierung.unwrap_or(0.0)])?;
                Ok(Self::Positionieren {
                    call: cmd.call_param()?,
                    position,
                    orientierung,
                })
            }
            "mute" => Ok(Self::Stumm {
                call: cmd.call_param()?,
                an: cmd.schalter_param("on")?.ok_or_else(|| {
                    ControlError::UngueltigeEingabe("Pflicht-Parameter fehlt: on".into())
                })?,
            }),
            "setattenuation" => {
                let art = cmd.param("type").or_else(|| cmd.param("spatializer"));
                let aenderung = match (art, cmd.zahl_param::<f64>("volume")?) {
                    (Some(art), _) => DaempfungsAenderung::Spatializer(spatializer_auswahl(cmd, art, vm)?),
                    (None, Some(lautstaerke)) => {
                        if !(lautstaerke.is_finite() && lautstaerke >= 0.0) {
                            return Err(ControlError::UngueltigeEingabe(format!(
                                "volume muss >= 0 sein, ist {lautstaerke}"
                            )));
                        }
                        DaempfungsAenderung::Lautstaerke(lautstaerke)
                    }
                    (None, None) => {
                        return Err(ControlError::UngueltigeEingabe(
                            "setattenuation braucht type= oder volume=".into(),
                        ))
                    }
                };
                Ok(Self::DaempfungSetzen {
                    call: cmd.call_param()?,
                    aenderung,
                })
            }
            "callinfo" => Ok(Self::CallInfo {
                call: cmd.call_param()?,
            }),
            "testudp" => Ok(Self::UdpTesten {
                host: cmd.pflicht_param("host")?.to_string(),
                port: cmd.pflicht_zahl("port")?,
                dauer: cmd.zahl_param::<u64>("duration")?.map(Duration::from_secs),
            }),
            "version" => Ok(Self::Version),
            "hangup" => Ok(Self::Auflegen {
                call: cmd.call_param()?,
            }),
            "quit" => Ok(Self::Beenden),
            andere => Err(ControlError::Protokoll(format!("Unbekannter Befehl: {andere}"))),
        }
    }
}

fn endlich_pruefen(werte: &[f64]) -> ControlResult<()> {
    if werte.iter().all(|w| w.is_finite()) {
        Ok(())
    } else {
        Err(ControlError::UngueltigeEingabe("Koordinaten muessen endlich sein".into()))
    }
}

/// Spatializer-Beschreibung aus den Befehlsparametern
fn spatializer_auswahl(
    cmd: &BefehlsZeile,
    art: &str,
    vm: &VoiceManager,
) -> ControlResult<SpatializerAuswahl> {
    let art: SpatializerArt = art
        .parse()
        .map_err(|_| ControlError::UngueltigeEingabe(format!("Unbekannter Spatializer: {art}")))?;

    let konfig = match SpatializerKonfig::standard(art, vm) {
        SpatializerKonfig::Ambient { .. } => SpatializerKonfig::Ambient {
            ecke_a: Position::neu(
                cmd.pflicht_zahl("x1")?,
                cmd.pflicht_zahl("y1")?,
                cmd.zahl_param("z1")?.unwrap_or(0.0),
            ),
            ecke_b: Position::neu(
                cmd.pflicht_zahl("x2")?,
                cmd.pflicht_zahl("y2")?,
                cmd.zahl_param("z2")?.unwrap_or(0.0),
            ),
        },
        SpatializerKonfig::Punkt {
            voll_radius,
            null_radius,
            falloff,
        } => SpatializerKonfig::Punkt {
            voll_radius: cmd.zahl_param("full_radius")?.unwrap_or(voll_radius),
            null_radius: cmd.zahl_param("zero_radius")?.unwrap_or(null_radius),
            falloff: cmd.zahl_param("falloff")?.unwrap_or(falloff),
        },
        SpatializerKonfig::Kegel {
            voll_radius,
            null_radius,
            falloff,
            innen_winkel,
            aussen_winkel,
            aussen_gain,
        } => SpatializerKonfig::Kegel {
            voll_radius: cmd.zahl_param("full_radius")?.unwrap_or(voll_radius),
            null_radius: cmd.zahl_param("zero_radius")?.unwrap_or(null_radius),
            falloff: cmd.zahl_param("falloff")?.unwrap_or(falloff),
            innen_winkel: cmd.zahl_param("inner_angle")?.unwrap_or(innen_winkel),
            aussen_winkel: cmd.zahl_param("outer_angle")?.unwrap_or(aussen_winkel),
            aussen_gain: cmd.zahl_param("outer_gain")?.unwrap_or(aussen_gain),
        },
        SpatializerKonfig::Voll => SpatializerKonfig::Voll,
    };

    Ok(SpatializerAuswahl {
        konfig,
        attenuator: cmd.zahl_param("attenuator")?,
    })
}
