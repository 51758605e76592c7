//! Regroupe une rafale de mises à jour en une seule, émise après un silence.

use std::time::{Duration, Instant};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

/// Une seule valeur en attente à la fois; chaque `schedule` remplace la
/// précédente et repousse l'échéance.
#[derive(Debug)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Default for Debouncer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: None }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn schedule(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now + self.delay));
    }

    /// Abandonne la valeur en attente et la renvoie.
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Échéance de la valeur en attente.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, at)| *at)
    }

    /// Renvoie la valeur si le délai de silence est écoulé.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((_, at)) if now >= *at => self.pending.take().map(|(value, _)| value),
            _ => None,
        }
    }

    /// Renvoie immédiatement la valeur en attente, échue ou non.
    pub fn flush(&mut self) -> Option<T> {
        self.cancel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_collapses_to_last_value() {
        let mut d = Debouncer::default();
        let t0 = Instant::now();
        for (i, v) in [1, 2, 3, 4].iter().enumerate() {
            d.schedule(*v, t0 + Duration::from_millis(10 * i as u64));
            assert_eq!(d.poll(t0 + Duration::from_millis(10 * i as u64 + 5)), None);
        }
        // Dernier schedule à 30 ms: rien avant 80 ms.
        assert_eq!(d.poll(t0 + Duration::from_millis(79)), None);
        assert_eq!(d.poll(t0 + Duration::from_millis(80)), Some(4));
        assert_eq!(d.poll(t0 + Duration::from_millis(200)), None);
    }

    #[test]
    fn test_cancel() {
        let mut d = Debouncer::new(Duration::from_millis(20));
        let t0 = Instant::now();
        d.schedule("a", t0);
        assert_eq!(d.cancel(), Some("a"));
        assert!(!d.is_pending());
        assert_eq!(d.poll(t0 + Duration::from_secs(1)), None);
    }

    #[test]
    fn test_flush_ignores_deadline() {
        let mut d = Debouncer::default();
        let t0 = Instant::now();
        d.schedule(7, t0);
        assert_eq!(d.deadline(), Some(t0 + DEFAULT_DEBOUNCE));
        assert_eq!(d.flush(), Some(7));
    }
}
