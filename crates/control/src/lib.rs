//! voicebridge-control – Control-Verbindungen
//!
//! Zeilenbasiertes Steuerprotokoll fuer Calls: Aufbau, Positionierung,
//! Daempfung, Diagnose.
//!
//! ## Module
//! - [`protokoll`] – Parsen und Formatieren der Zeilen
//! - [`befehle`] – Befehls-Enum und Konvertierung
//! - [`session`] – Zustandsmaschine einer Verbindung
//! - [`dispatcher`] – Accept-Loop und Herkunftsrichtlinie
//! - [`medien`] – Anbindung der Audio-Strecke
//! - [`diagnose`] – UDP-Erreichbarkeitstest

pub mod befehle;
pub mod codec;
pub mod diagnose;
pub mod dispatcher;
pub mod error;
pub mod medien;
pub mod protokoll;
pub mod session;

pub use befehle::Befehl;
pub use dispatcher::{Dispatcher, UrsprungsRichtlinie};
pub use error::{ControlError, ControlResult};
pub use medien::{MedienBinder, MedienHandle, SpeicherBinder};
pub use protokoll::{Protokoll, ZeilenProtokoll};
pub use session::{SessionController, SessionKonfig, SessionKontext, SessionZustand};
