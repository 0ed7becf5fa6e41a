// src/attempt/timer.rs

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};

/// Source of wall-clock time for the countdown.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Remaining time anchored to an absolute start.
///
/// `remaining = max(0, duration - (now - start))`, rounded up to whole
/// seconds so the value reaches 0 exactly at `start + duration`. `observe`
/// additionally clamps against the previous reading, so a clock stepping
/// backwards never hands time back.
#[derive(Debug, Clone)]
pub struct Countdown {
    started_at: DateTime<Utc>,
    total_secs: u64,
    last_remaining: Option<u64>,
}

impl Countdown {
    pub fn new(started_at: DateTime<Utc>, total_secs: u64) -> Self {
        Self {
            started_at,
            total_secs,
            last_remaining: None,
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn total_secs(&self) -> u64 {
        self.total_secs
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.started_at + chrono::Duration::seconds(self.total_secs as i64)
    }

    /// Pure reading, no clamping.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> u64 {
        let left_ms = (self.deadline() - now).num_milliseconds();
        if left_ms <= 0 {
            0
        } else {
            (left_ms as u64).div_ceil(1000).min(self.total_secs)
        }
    }

    /// Reading clamped to never exceed the previous one.
    pub fn observe(&mut self, now: DateTime<Utc>) -> u64 {
        let raw = self.remaining_at(now);
        let remaining = match self.last_remaining {
            Some(prev) => raw.min(prev),
            None => raw,
        };
        self.last_remaining = Some(remaining);
        remaining
    }

    /// Last value handed out by `observe`, or the full duration before any.
    pub fn last_remaining(&self) -> u64 {
        self.last_remaining.unwrap_or(self.total_secs)
    }

    pub fn reading(&mut self, now: DateTime<Utc>) -> TimerReading {
        let remaining = self.observe(now);
        TimerReading {
            remaining,
            elapsed: self.total_secs - remaining,
            total: self.total_secs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimerReading {
    pub remaining: u64,
    pub elapsed: u64,
    pub total: u64,
}

impl TimerReading {
    /// Percent of the time limit still left, `0..=100`.
    pub fn percent_left(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.remaining as f64 * 100.0 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TimerEvent {
    Tick {
        remaining: u64,
        elapsed: u64,
        total: u64,
    },
    Expired,
}

impl From<TimerReading> for TimerEvent {
    fn from(r: TimerReading) -> Self {
        TimerEvent::Tick {
            remaining: r.remaining,
            elapsed: r.elapsed,
            total: r.total,
        }
    }
}

/// Owner of a running ticker. Dropping it cancels the task.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns the countdown ticker.
///
/// Every `period` it calls `sample` and publishes a `Tick`. `sample`
/// returning `None` means the owner is gone and the ticker stops silently.
/// When the remaining time reaches 0 it publishes `Expired`, runs
/// `on_expire` once and stops.
pub fn spawn_ticker<S, E, Fut>(
    period: Duration,
    mut sample: S,
    events: Option<mpsc::UnboundedSender<TimerEvent>>,
    on_expire: E,
) -> TimerHandle
where
    S: FnMut() -> Option<TimerReading> + Send + 'static,
    E: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let task = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let Some(reading) = sample() else {
                tracing::debug!("Countdown owner dropped, stopping ticker");
                return;
            };

            if let Some(tx) = &events {
                // The receiver going away does not stop the countdown.
                let _ = tx.send(reading.into());
            }

            if reading.remaining == 0 {
                tracing::info!("Countdown expired after {}s", reading.total);
                if let Some(tx) = &events {
                    let _ = tx.send(TimerEvent::Expired);
                }
                on_expire().await;
                return;
            }
        }
    });

    TimerHandle { task }
}
