//! Zeilen-Codec fuer die Control-Verbindung
//!
//! tokio-util `Decoder`, der Befehlszeilen aus dem Lesepuffer schneidet.
//! Unvollstaendige Zeilen bleiben im Puffer von `FramedRead`; ein im
//! `select!` abgebrochenes `next()` verliert daher nichts.
//!
//! Ueberlange Zeilen sind kein Stream-Fehler: sie werden bis zum naechsten
//! Zeilenende verworfen und als `Eingabe::ZuLang` gemeldet, danach geht es
//! normal weiter.

use std::io;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

/// Ein Element des Eingabestroms
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eingabe {
    /// Zeile ohne Zeilenende (`\n` bzw. `\r\n`)
    Zeile(String),
    /// Zeile ueber der Laengengrenze, Inhalt verworfen
    ZuLang,
}

#[derive(Debug, Clone)]
pub struct ZeilenCodec {
    max_laenge: usize,
    /// Ab hier wurde noch nicht nach `\n` gesucht
    gesucht_bis: usize,
    /// Rest einer ueberlangen Zeile wird verworfen
    verwerfen: bool,
}

impl ZeilenCodec {
    pub fn neu(max_laenge: usize) -> Self {
        Self {
            max_laenge,
            gesucht_bis: 0,
            verwerfen: false,
        }
    }

    pub fn max_laenge(&self) -> usize {
        self.max_laenge
    }

    fn zeile_bauen(&self, mut roh: BytesMut) -> Eingabe {
        if roh.last() == Some(&b'\n') {
            roh.truncate(roh.len() - 1);
        }
        if roh.last() == Some(&b'\r') {
            roh.truncate(roh.len() - 1);
        }
        if roh.len() > self.max_laenge {
            return Eingabe::ZuLang;
        }
        Eingabe::Zeile(String::from_utf8_lossy(&roh).into_owned())
    }
}

impl Decoder for ZeilenCodec {
    type Item = Eingabe;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let ende = src[self.gesucht_bis.min(src.len())..]
            .iter()
            .position(|b| *b == b'\n')
            .map(|i| i + self.gesucht_bis);

        if self.verwerfen {
            return Ok(match ende {
                Some(i) => {
                    src.advance(i + 1);
                    self.gesucht_bis = 0;
                    self.verwerfen = false;
                    Some(Eingabe::ZuLang)
                }
                None => {
                    src.clear();
                    self.gesucht_bis = 0;
                    None
                }
            });
        }

        match ende {
            Some(i) => {
                let roh = src.split_to(i + 1);
                self.gesucht_bis = 0;
                Ok(Some(self.zeile_bauen(roh)))
            }
            // +1 fuer ein noch fehlendes `\n` hinter `\r`
            None if src.len() > self.max_laenge + 1 => {
                src.clear();
                self.gesucht_bis = 0;
                self.verwerfen = true;
                Ok(None)
            }
            None => {
                self.gesucht_bis = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(eingabe) = self.decode(src)? {
            return Ok(Some(eingabe));
        }
        self.gesucht_bis = 0;
        if self.verwerfen {
            self.verwerfen = false;
            src.clear();
            return Ok(Some(Eingabe::ZuLang));
        }
        if src.is_empty() {
            return Ok(None);
        }
        // Letzte Zeile ohne Zeilenende
        let roh = src.split_to(src.len());
        Ok(Some(self.zeile_bauen(roh)))
    }
}
