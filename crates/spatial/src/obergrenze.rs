use std::sync::atomic::{AtomicU64, Ordering};

use voicebridge_core::parameter::STANDARD_MAXIMALE_LAUTSTAERKE;

/// Atomar setzbare Obergrenze der Verstaerkung (f64 als Bitmuster)
#[derive(Debug)]
pub(crate) struct Obergrenze(AtomicU64);

impl Obergrenze {
    pub(crate) fn neu(wert: f64) -> Self {
        Self(AtomicU64::new(normalisieren(wert).to_bits()))
    }

    pub(crate) fn lesen(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn setzen(&self, wert: f64) {
        self.0.store(normalisieren(wert).to_bits(), Ordering::Release);
    }

    /// Begrenzt `gain` auf `[0, obergrenze]`
    pub(crate) fn begrenzen(&self, gain: f64) -> f64 {
        let max = self.lesen();
        if gain.is_nan() {
            return 0.0;
        }
        gain.clamp(0.0, max)
    }
}

impl Default for Obergrenze {
    fn default() -> Self {
        Self::neu(STANDARD_MAXIMALE_LAUTSTAERKE)
    }
}

impl Clone for Obergrenze {
    fn clone(&self) -> Self {
        Self::neu(self.lesen())
    }
}

fn normalisieren(wert: f64) -> f64 {
    if wert.is_finite() {
        wert.max(0.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_werte_werden_null() {
        let o = Obergrenze::neu(-2.0);
        assert_eq!(o.lesen(), 0.0);
        o.setzen(f64::NAN);
        assert_eq!(o.lesen(), 0.0);
    }

    #[test]
    fn begrenzen_haelt_intervall_ein() {
        let o = Obergrenze::neu(0.8);
        assert_eq!(o.begrenzen(2.0), 0.8);
        assert_eq!(o.begrenzen(-1.0), 0.0);
        assert_eq!(o.begrenzen(0.5), 0.5);
        assert_eq!(o.begrenzen(f64::NAN), 0.0);
    }

    #[test]
    fn clone_teilt_keinen_zustand() {
        let a = Obergrenze::neu(1.0);
        let b = a.clone();
        b.setzen(0.1);
        assert_eq!(a.lesen(), 1.0);
    }
}
