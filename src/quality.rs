use std::collections::VecDeque;

/// Default number of samples kept
pub const QUALITY_WINDOW: usize = 60;

/// Summary of the current window
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QualityStats {
    pub fps_avg: f32,
    pub fps_min: f32,
    pub confidence_avg: f32,
    pub latency_avg: f32,
}

/// Rolling fps / confidence / latency recorder
pub struct QualityMonitor {
    capacity: usize,
    fps: VecDeque<f32>,
    confidence: VecDeque<f32>,
    latency_ms: VecDeque<f32>,
}

impl QualityMonitor {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            fps: VecDeque::with_capacity(capacity + 1),
            confidence: VecDeque::with_capacity(capacity + 1),
            latency_ms: VecDeque::with_capacity(capacity + 1),
        }
    }

    pub fn len(&self) -> usize {
        self.fps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fps.is_empty()
    }

    pub fn record(&mut self, fps: f32, confidence: f32, latency_ms: f32) {
        self.fps.push_back(fps);
        self.confidence.push_back(confidence);
        self.latency_ms.push_back(latency_ms);
        while self.fps.len() > self.capacity {
            self.fps.pop_front();
            self.confidence.pop_front();
            self.latency_ms.pop_front();
        }
    }

    /// All zeros when nothing has been recorded yet.
    pub fn stats(&self) -> QualityStats {
        if self.is_empty() {
            return QualityStats::default();
        }
        QualityStats {
            fps_avg: mean(&self.fps),
            fps_min: self.fps.iter().copied().fold(f32::INFINITY, f32::min),
            confidence_avg: mean(&self.confidence),
            latency_avg: mean(&self.latency_ms),
        }
    }
}

impl Default for QualityMonitor {
    fn default() -> Self {
        Self::new(QUALITY_WINDOW)
    }
}

fn mean(values: &VecDeque<f32>) -> f32 {
    values.iter().sum::<f32>() / values.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_window_is_zero() {
        let monitor = QualityMonitor::default();
        assert_eq!(monitor.stats(), QualityStats::default());
    }

    #[test]
    fn test_stats() {
        let mut monitor = QualityMonitor::default();
        monitor.record(30.0, 0.9, 10.0);
        monitor.record(20.0, 0.7, 20.0);
        monitor.record(40.0, 0.8, 30.0);
        let stats = monitor.stats();
        assert!((stats.fps_avg - 30.0).abs() < 1e-5);
        assert_eq!(stats.fps_min, 20.0);
        assert!((stats.confidence_avg - 0.8).abs() < 1e-5);
        assert!((stats.latency_avg - 20.0).abs() < 1e-5);
    }

    #[test]
    fn test_evicts_oldest_beyond_capacity() {
        let mut monitor = QualityMonitor::default();
        // 最初の1件だけ極端に低いfps
        monitor.record(1.0, 0.0, 0.0);
        for _ in 0..QUALITY_WINDOW {
            monitor.record(60.0, 1.0, 5.0);
        }
        assert_eq!(monitor.len(), QUALITY_WINDOW);
        let stats = monitor.stats();
        assert_eq!(stats.fps_min, 60.0);
        assert!((stats.confidence_avg - 1.0).abs() < 1e-6);
    }
}
