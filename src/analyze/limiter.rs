//! # Adaptive Rate Limiter
//! Sliding 60s window limiter, one instance per scoring tier.
//!
//! - `acquire()` never rejects; it sleeps until the oldest call leaves the window and rechecks.
//! - `on_throttled()` lowers the current capacity to `floor(cap * 0.8)` (min 1).
//! - `restore_tick()` puts the capacity back to base once the quiet period has elapsed.
//!
//! Time comes from `tokio::time::Instant`, so paused-clock tests drive the window deterministically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use super::Tier;

pub const WINDOW: Duration = Duration::from_secs(60);
pub const QUIET_PERIOD: Duration = Duration::from_secs(5 * 60);
pub const RESTORE_TICK: Duration = Duration::from_secs(60);
const THROTTLE_FACTOR: f64 = 0.8;
/// Slack added after the oldest slot expires so the recheck lands outside the window.
const WAKE_SLACK: Duration = Duration::from_millis(25);

#[derive(Debug)]
struct Inner {
    current: u32,
    calls: VecDeque<Instant>,
    last_throttle: Option<Instant>,
}

#[derive(Debug)]
pub struct RateLimiter {
    tier: Tier,
    base: u32,
    adaptive: bool,
    inner: Mutex<Inner>,
    throttles: AtomicU64,
}

impl RateLimiter {
    pub fn new(tier: Tier, base_rpm: u32, adaptive: bool) -> Self {
        let base = base_rpm.max(1);
        gauge!("limiter_capacity", "tier" => tier.as_str()).set(base as f64);
        Self {
            tier,
            base,
            adaptive,
            inner: Mutex::new(Inner {
                current: base,
                calls: VecDeque::new(),
                last_throttle: None,
            }),
            throttles: AtomicU64::new(0),
        }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn base_capacity(&self) -> u32 {
        self.base
    }

    pub fn current_capacity(&self) -> u32 {
        self.lock().current
    }

    /// Number of quota rejections reported through `on_throttled`.
    pub fn throttle_count(&self) -> u64 {
        self.throttles.load(Ordering::Relaxed)
    }

    /// Wait until a slot is free under the current capacity, then claim it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut g = self.lock();
                let now = Instant::now();
                while let Some(&front) = g.calls.front() {
                    if now.duration_since(front) >= WINDOW {
                        g.calls.pop_front();
                    } else {
                        break;
                    }
                }
                if (g.calls.len() as u32) < g.current {
                    g.calls.push_back(now);
                    return;
                }
                match g.calls.front() {
                    Some(&oldest) => WINDOW.saturating_sub(now.duration_since(oldest)) + WAKE_SLACK,
                    None => WAKE_SLACK,
                }
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Record a quota rejection and lower the capacity when adaptive mode is on.
    pub fn on_throttled(&self) {
        self.throttles.fetch_add(1, Ordering::Relaxed);
        counter!("scoring_throttled_total", "tier" => self.tier.as_str()).increment(1);

        let mut g = self.lock();
        g.last_throttle = Some(Instant::now());
        if !self.adaptive {
            return;
        }
        let lowered = ((g.current as f64 * THROTTLE_FACTOR).floor() as u32).max(1);
        if lowered < g.current {
            g.current = lowered;
            gauge!("limiter_capacity", "tier" => self.tier.as_str()).set(lowered as f64);
            warn!(
                target: "limiter",
                tier = self.tier.as_str(),
                capacity = lowered,
                "quota rejection; lowering capacity"
            );
        }
    }

    /// Restore base capacity if adaptive and nothing was throttled for the quiet period.
    /// Returns `true` when the capacity changed.
    pub fn restore_tick(&self) -> bool {
        if !self.adaptive {
            return false;
        }
        let mut g = self.lock();
        if g.current >= self.base {
            return false;
        }
        let quiet = g
            .last_throttle
            .map(|t| Instant::now().duration_since(t) > QUIET_PERIOD)
            .unwrap_or(true);
        if !quiet {
            return false;
        }
        g.current = self.base;
        gauge!("limiter_capacity", "tier" => self.tier.as_str()).set(self.base as f64);
        info!(
            target: "limiter",
            tier = self.tier.as_str(),
            capacity = self.base,
            "capacity restored to base"
        );
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Critical sections never panic, so a poisoned lock still holds consistent state.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// The two independently limited scoring tiers.
#[derive(Debug, Clone)]
pub struct Limiters {
    pub title: Arc<RateLimiter>,
    pub analysis: Arc<RateLimiter>,
}

impl Limiters {
    pub fn new(title_rpm: u32, analysis_rpm: u32, adaptive: bool) -> Self {
        Self {
            title: Arc::new(RateLimiter::new(Tier::Title, title_rpm, adaptive)),
            analysis: Arc::new(RateLimiter::new(Tier::Analysis, analysis_rpm, adaptive)),
        }
    }

    pub fn for_tier(&self, tier: Tier) -> &Arc<RateLimiter> {
        match tier {
            Tier::Title => &self.title,
            Tier::Analysis => &self.analysis,
        }
    }

    /// Spawn the periodic restore timer for both tiers. The timer stops when the
    /// returned handle is dropped.
    pub fn spawn_restore_ticker(&self, period: Duration) -> RestoreTicker {
        let title = Arc::clone(&self.title);
        let analysis = Arc::clone(&self.analysis);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                title.restore_tick();
                analysis.restore_tick();
            }
        });
        RestoreTicker { handle }
    }
}

/// Owned restore timer; aborts its task on drop.
#[derive(Debug)]
pub struct RestoreTicker {
    handle: JoinHandle<()>,
}

impl Drop for RestoreTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
