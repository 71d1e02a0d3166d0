use foundation::math::Vec3;

/// Camera pose the throttle compares against between recomputes.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CameraSnapshot {
    pub position: Vec3,
    /// Orbit target the camera looks at.
    pub target: Vec3,
}

impl CameraSnapshot {
    pub fn new(position: Vec3, target: Vec3) -> Self {
        Self { position, target }
    }

    /// True when either the eye or the look target moved strictly more than `threshold`.
    pub fn moved_beyond(&self, other: &Self, threshold: f64) -> bool {
        self.position.distance(other.position) > threshold
            || self.target.distance(other.target) > threshold
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ThrottleConfig {
    pub interval_ms: u64,
    pub movement_threshold: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            movement_threshold: 0.1,
        }
    }
}

/// Time + movement gate for per-frame recomputation.
///
/// `poll` is cheap enough to call every frame. It answers `true` only when at
/// least `interval_ms` elapsed since the last time the interval gate opened
/// *and* the camera moved beyond `movement_threshold` since the last
/// accepted snapshot. Accepted snapshots are recorded by `poll` itself.
#[derive(Debug, Clone)]
pub struct UpdateThrottle {
    config: ThrottleConfig,
    last_time_ms: Option<u64>,
    last_snapshot: Option<CameraSnapshot>,
}

impl UpdateThrottle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            last_time_ms: None,
            last_snapshot: None,
        }
    }

    pub fn config(&self) -> ThrottleConfig {
        self.config
    }

    pub fn last_snapshot(&self) -> Option<CameraSnapshot> {
        self.last_snapshot
    }

    /// Seed the throttle after an out-of-band recompute (e.g. initial load).
    pub fn prime(&mut self, now_ms: u64, snapshot: CameraSnapshot) {
        self.last_time_ms = Some(now_ms);
        self.last_snapshot = Some(snapshot);
    }

    pub fn poll(&mut self, now_ms: u64, snapshot: CameraSnapshot) -> bool {
        if let Some(last) = self.last_time_ms
            && now_ms.saturating_sub(last) < self.config.interval_ms
        {
            return false;
        }
        self.last_time_ms = Some(now_ms);

        let moved = match &self.last_snapshot {
            Some(prev) => snapshot.moved_beyond(prev, self.config.movement_threshold),
            None => true,
        };
        if moved {
            self.last_snapshot = Some(snapshot);
        }
        moved
    }

    pub fn reset(&mut self) {
        self.last_time_ms = None;
        self.last_snapshot = None;
    }
}
