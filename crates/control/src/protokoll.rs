//! Zeilenprotokoll der Control-Verbindung
//!
//! Befehle im Format:
//!   befehlsname key1=value1 key2="value with spaces" key3=wert3
//!
//! Sonderzeichen in Werten werden mit Backslash escaped:
//!   \s = Leerzeichen, \n = Newline, \\ = Backslash, \| = Pipe
//!
//! Antworten: `ok [k=v ...]` oder `error id=N msg=...`,
//! Ereignisse: `event type=<typ> [k=v ...]`.

use std::collections::HashMap;
use std::str::FromStr;

use voicebridge_core::{CallEreignis, CallId};

use crate::error::{ControlError, ControlResult};

/// Ein geparster Befehl
#[derive(Debug, Clone, PartialEq)]
pub struct BefehlsZeile {
    /// Befehlsname in Kleinbuchstaben (z.B. "createcall")
    pub name: String,
    /// Key-Value-Parameter (Keys in Kleinbuchstaben)
    pub params: HashMap<String, String>,
}

impl BefehlsZeile {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(|s| s.as_str())
    }

    /// Gibt einen Pflicht-Parameter zurueck oder einen Fehler
    pub fn pflicht_param(&self, key: &str) -> ControlResult<&str> {
        self.param(key).ok_or_else(|| {
            ControlError::UngueltigeEingabe(format!("Pflicht-Parameter fehlt: {key}"))
        })
    }

    /// Optionaler Parameter, der als `T` parsebar sein muss, falls vorhanden
    pub fn zahl_param<T: FromStr>(&self, key: &str) -> ControlResult<Option<T>> {
        match self.param(key) {
            None => Ok(None),
            Some(s) => s.parse::<T>().map(Some).map_err(|_| {
                ControlError::UngueltigeEingabe(format!("Ungueltige Zahl fuer '{key}': {s}"))
            }),
        }
    }

    pub fn pflicht_zahl<T: FromStr>(&self, key: &str) -> ControlResult<T> {
        self.zahl_param(key)?.ok_or_else(|| {
            ControlError::UngueltigeEingabe(format!("Pflicht-Parameter fehlt: {key}"))
        })
    }

    /// Schalter: 1/0, true/false, on/off
    pub fn schalter_param(&self, key: &str) -> ControlResult<Option<bool>> {
        match self.param(key).map(|s| s.to_ascii_lowercase()) {
            None => Ok(None),
            Some(s) => match s.as_str() {
                "1" | "true" | "on" | "yes" => Ok(Some(true)),
                "0" | "false" | "off" | "no" => Ok(Some(false)),
                _ => Err(ControlError::UngueltigeEingabe(format!(
                    "Ungueltiger Schalter fuer '{key}': {s}"
                ))),
            },
        }
    }

    /// Optionale Call-ID (`call=<uuid>` oder `call=call:<uuid>`)
    pub fn call_param(&self) -> ControlResult<Option<CallId>> {
        match self.param("call") {
            None => Ok(None),
            Some(s) => s.parse::<CallId>().map(Some).map_err(|_| {
                ControlError::UngueltigeEingabe(format!("Ungueltige Call-ID: {s}"))
            }),
        }
    }
}

/// Parst eine Befehlszeile
///
/// Format: `befehlsname [key=value ...]`
/// Werte koennen mit " " gequotet oder mit \s escaped sein.
pub fn zeile_parsen(zeile: &str) -> ControlResult<BefehlsZeile> {
    let zeile = zeile.trim();
    if zeile.is_empty() {
        return Err(ControlError::Protokoll("Leere Befehlszeile".into()));
    }

    let tokens = tokenize(zeile)?;
    let Some((name, rest)) = tokens.split_first() else {
        return Err(ControlError::Protokoll("Kein Befehlsname".into()));
    };
    if name.contains('=') {
        return Err(ControlError::Protokoll(format!("Kein Befehlsname: {name}")));
    }

    let mut params = HashMap::new();
    for token in rest {
        let Some((key, wert)) = token.split_once('=') else {
            return Err(ControlError::Protokoll(format!("Parameter ohne Wert: {token}")));
        };
        if key.is_empty() {
            return Err(ControlError::Protokoll(format!("Parameter ohne Namen: {token}")));
        }
        params.insert(key.to_lowercase(), decode_value(wert));
    }

    Ok(BefehlsZeile {
        name: name.to_lowercase(),
        params,
    })
}

/// Zerlegt eine Zeile in Tokens, beachtet quoted Strings
///
/// Escape-Sequenzen bleiben erhalten und werden erst pro Wert dekodiert.
fn tokenize(input: &str) -> ControlResult<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => in_quotes = !in_quotes,
            ' ' | '\t' if !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            '\\' => {
                current.push('\\');
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            _ => current.push(c),
        }
    }

    if in_quotes {
        return Err(ControlError::Protokoll("Nicht geschlossenes Anfuehrungszeichen".into()));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Dekodiert Escape-Sequenzen in einem Wert-String
fn decode_value(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('s') => result.push(' '),
                Some('n') => result.push('\n'),
                Some('\\') => result.push('\\'),
                Some('|') => result.push('|'),
                Some('"') => result.push('"'),
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(c);
        }
    }

    result
}

/// Kodiert einen Wert fuer die Ausgabe (Escape-Sequenzen einfuegen)
pub fn encode_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(' ', "\\s")
        .replace('\n', "\\n")
        .replace('|', "\\|")
}

fn felder_anhaengen(zeile: &mut String, felder: &[(&str, String)]) {
    for (k, v) in felder {
        zeile.push(' ');
        zeile.push_str(k);
        zeile.push('=');
        zeile.push_str(&encode_value(v));
    }
}

/// Parsen und Formatieren der Control-Zeilen
///
/// Die Session kennt nur diesen Trait; das Zeilenformat ist austauschbar.
pub trait Protokoll: Send + Sync {
    fn parsen(&self, zeile: &str) -> ControlResult<BefehlsZeile>;

    fn ok(&self, felder: &[(&str, String)]) -> String;

    fn fehler(&self, fehler: &ControlError) -> String;

    fn ereignis(&self, ereignis: &CallEreignis) -> String;
}

/// Standardformat: eine Zeile pro Befehl, Antwort oder Ereignis
#[derive(Debug, Clone, Default)]
pub struct ZeilenProtokoll;

impl Protokoll for ZeilenProtokoll {
    fn parsen(&self, zeile: &str) -> ControlResult<BefehlsZeile> {
        zeile_parsen(zeile)
    }

    fn ok(&self, felder: &[(&str, String)]) -> String {
        let mut zeile = String::from("ok");
        felder_anhaengen(&mut zeile, felder);
        zeile.push('\n');
        zeile
    }

    fn fehler(&self, fehler: &ControlError) -> String {
        format!(
            "error id={} msg={}\n",
            fehler.fehler_code(),
            encode_value(&fehler.to_string())
        )
    }

    fn ereignis(&self, ereignis: &CallEreignis) -> String {
        let mut zeile = format!("event type={}", ereignis.typ());
        felder_anhaengen(&mut zeile, &ereignis.felder());
        zeile.push('\n');
        zeile
    }
}
