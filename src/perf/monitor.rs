//! Mesure du temps de frame et du débit.
//!
//! Les instants sont fournis par l'appelant: le moniteur n'interroge jamais
//! l'horloge lui-même, ce qui le rend pilotable depuis les tests.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Taille par défaut de la fenêtre glissante des temps de frame.
pub const DEFAULT_FRAME_WINDOW: usize = 60;
/// Intervalle par défaut de recalcul des fps.
pub const DEFAULT_FPS_INTERVAL: Duration = Duration::from_millis(1000);
/// fps annoncés avant la première mesure.
pub const INITIAL_FPS: f64 = 60.0;

/// Seuils du prédicat « performance acceptable ».
pub const ACCEPTABLE_FPS: f64 = 58.0;
pub const ACCEPTABLE_FRAME_MS: f64 = 17.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub fps: f64,
    /// Moyenne de la fenêtre glissante.
    pub frame_time_ms: f64,
    pub last_frame_ms: f64,
    pub frame_count: u64,
    pub gpu_memory_bytes: u64,
}

impl PerformanceMetrics {
    /// fps ≥ 58 et temps moyen ≤ 17 ms.
    pub fn is_acceptable(&self) -> bool {
        self.fps >= ACCEPTABLE_FPS && self.frame_time_ms <= ACCEPTABLE_FRAME_MS
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            fps: INITIAL_FPS,
            frame_time_ms: 0.0,
            last_frame_ms: 0.0,
            frame_count: 0,
            gpu_memory_bytes: 0,
        }
    }
}

/// Moniteur d'une session de rendu. Construit et passé explicitement à la
/// boucle de rendu.
#[derive(Debug)]
pub struct PerformanceMonitor {
    window: VecDeque<f64>,
    window_size: usize,
    fps_interval: Duration,
    frame_start: Option<Instant>,
    interval_start: Option<Instant>,
    frames_in_interval: u32,
    metrics: PerformanceMetrics,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_WINDOW, DEFAULT_FPS_INTERVAL)
    }
}

impl PerformanceMonitor {
    pub fn new(window_size: usize, fps_interval: Duration) -> Self {
        let window_size = window_size.max(1);
        Self {
            window: VecDeque::with_capacity(window_size),
            window_size,
            fps_interval: if fps_interval.is_zero() { DEFAULT_FPS_INTERVAL } else { fps_interval },
            frame_start: None,
            interval_start: None,
            frames_in_interval: 0,
            metrics: PerformanceMetrics::default(),
        }
    }

    /// Début de frame (avant le dessin).
    pub fn begin_frame(&mut self, now: Instant) {
        self.frame_start = Some(now);
        if self.interval_start.is_none() {
            self.interval_start = Some(now);
        }
    }

    /// Fin de frame: enregistre la durée et recalcule les fps si l'intervalle
    /// est écoulé. Renvoie la durée de la frame en ms, ou `None` sans
    /// `begin_frame` préalable.
    pub fn end_frame(&mut self, now: Instant) -> Option<f64> {
        let start = self.frame_start.take()?;
        let frame_ms = now.saturating_duration_since(start).as_secs_f64() * 1000.0;

        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(frame_ms);

        self.metrics.last_frame_ms = frame_ms;
        self.metrics.frame_time_ms = self.window.iter().sum::<f64>() / self.window.len() as f64;
        self.metrics.frame_count += 1;
        self.frames_in_interval += 1;

        if let Some(interval_start) = self.interval_start {
            let elapsed = now.saturating_duration_since(interval_start);
            if elapsed >= self.fps_interval {
                self.metrics.fps = self.frames_in_interval as f64 / elapsed.as_secs_f64();
                self.frames_in_interval = 0;
                self.interval_start = Some(now);
            }
        }

        Some(frame_ms)
    }

    /// Estimation de la mémoire GPU allouée (cibles, LUT, géométrie).
    pub fn set_gpu_memory_estimate(&mut self, bytes: u64) {
        self.metrics.gpu_memory_bytes = bytes;
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        self.metrics
    }

    pub fn is_performance_acceptable(&self) -> bool {
        self.metrics.is_acceptable()
    }

    /// Oublie la frame en cours et l'intervalle de comptage (reprise après
    /// perte de contexte). La fenêtre et les fps courants sont conservés.
    pub fn pause(&mut self) {
        self.frame_start = None;
        self.interval_start = None;
        self.frames_in_interval = 0;
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.window_size, self.fps_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_frames(monitor: &mut PerformanceMonitor, t0: Instant, count: u32, period_ms: u64, draw_ms: u64) -> Instant {
        let mut t = t0;
        for _ in 0..count {
            monitor.begin_frame(t);
            monitor.end_frame(t + Duration::from_millis(draw_ms));
            t += Duration::from_millis(period_ms);
        }
        t
    }

    #[test]
    fn test_initial_metrics() {
        let m = PerformanceMonitor::default().metrics();
        assert_eq!(m.fps, INITIAL_FPS);
        assert_eq!(m.frame_count, 0);
        assert!(m.is_acceptable());
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut monitor = PerformanceMonitor::new(3, DEFAULT_FPS_INTERVAL);
        let t0 = Instant::now();
        for (i, ms) in [10u64, 20, 30, 40].iter().enumerate() {
            let t = t0 + Duration::from_millis(100 * i as u64);
            monitor.begin_frame(t);
            monitor.end_frame(t + Duration::from_millis(*ms));
        }
        let m = monitor.metrics();
        assert!((m.frame_time_ms - 30.0).abs() < 1e-9);
        assert!((m.last_frame_ms - 40.0).abs() < 1e-9);
        assert_eq!(m.frame_count, 4);
    }

    #[test]
    fn test_fps_recomputed_each_interval() {
        let mut monitor = PerformanceMonitor::default();
        let t0 = Instant::now();
        // 30 frames espacées de 33 ms ≈ 990 ms, puis quelques-unes de plus.
        run_frames(&mut monitor, t0, 40, 33, 5);
        let fps = monitor.metrics().fps;
        assert!((fps - 30.0).abs() < 1.5, "fps = {fps}");
        assert!(!monitor.is_performance_acceptable());
    }

    #[test]
    fn test_slow_frames_not_acceptable() {
        let mut monitor = PerformanceMonitor::default();
        run_frames(&mut monitor, Instant::now(), 10, 16, 25);
        // fps encore à la valeur initiale mais moyenne > 17 ms.
        assert_eq!(monitor.metrics().fps, INITIAL_FPS);
        assert!(!monitor.is_performance_acceptable());
    }

    #[test]
    fn test_end_without_begin() {
        let mut monitor = PerformanceMonitor::default();
        assert_eq!(monitor.end_frame(Instant::now()), None);
        assert_eq!(monitor.metrics().frame_count, 0);
    }
}
