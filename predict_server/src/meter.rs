use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use tokio::{task::JoinHandle, time::interval};

pub static METER: Meter = Meter::new();

/// Counters of served predictions.
#[derive(Default)]
pub struct Meter {
    predictions: AtomicU64,
    failures: AtomicU64,
    latency_micros: AtomicU64,
}

/// Counter values taken by [`Meter::get_reset`].
#[derive(Debug, Default, Eq, PartialEq)]
pub struct MeterReading {
    pub predictions: u64,
    pub failures: u64,
    pub latency: Duration,
}

impl MeterReading {
    pub fn requests(&self) -> u64 {
        self.predictions + self.failures
    }

    pub fn mean_latency(&self) -> Option<Duration> {
        match self.requests() {
            0 => None,
            n => Some(self.latency / u32::try_from(n).unwrap_or(u32::MAX)),
        }
    }
}

impl Meter {
    pub const fn new() -> Meter {
        Meter {
            predictions: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            latency_micros: AtomicU64::new(0),
        }
    }

    pub fn tick_prediction(&self, elapsed: Duration) {
        self.predictions.fetch_add(1, Ordering::Relaxed);
        self.add_latency(elapsed);
    }

    pub fn tick_failure(&self, elapsed: Duration) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.add_latency(elapsed);
    }

    fn add_latency(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.latency_micros.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn get_reset(&self) -> MeterReading {
        MeterReading {
            predictions: self.predictions.swap(0, Ordering::Relaxed),
            failures: self.failures.swap(0, Ordering::Relaxed),
            latency: Duration::from_micros(self.latency_micros.swap(0, Ordering::Relaxed)),
        }
    }
}

pub fn spawn_meter_logger(period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut log_interval = interval(period);
        log_interval.tick().await;

        loop {
            let start = Instant::now();
            log_interval.tick().await;

            let reading = METER.get_reset();
            let elapsed = start.elapsed().as_secs_f32();
            let per_second = reading.requests() as f32 / elapsed;

            if let Some(mean_latency) = reading.mean_latency() {
                log::info!(
                    "Requests per second: {per_second:.2} ({} ok, {} failed, mean latency {:.1} ms)",
                    reading.predictions,
                    reading.failures,
                    mean_latency.as_secs_f32() * 1000.0
                )
            }
        }
    })
}
