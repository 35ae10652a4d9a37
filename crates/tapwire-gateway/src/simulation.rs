//! Background generator of synthetic client traffic.
//!
//! Emits one outbound record per interval and its inbound counterpart a
//! short delay later, through the same [`Interceptor`] as real traffic.

use crate::config::SimulationConfig;
use crate::intercept::Interceptor;
use crate::store::TrafficRecord;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const ENDPOINTS: &[&str] = &[
    "/api/v1/completions",
    "/api/v1/chat/completions",
    "/api/v1/models",
    "/api/v1/user/info",
    "/api/v1/settings",
];
const METHODS: &[&str] = &["GET", "POST"];

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct Simulation {
    interceptor: Interceptor,
    interval: Duration,
    response_delay: Duration,
    running: Mutex<Option<Running>>,
}

impl Simulation {
    pub fn new(interceptor: Interceptor, config: &SimulationConfig) -> Self {
        Self {
            interceptor,
            interval: Duration::from_millis(config.interval_ms.max(1)),
            response_delay: Duration::from_millis(config.response_delay_ms),
            running: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        is_alive(&self.running.lock())
    }

    /// Start the generator. Must be called inside a tokio runtime.
    /// Returns false if it was already running.
    pub fn start(&self) -> bool {
        self.start_locked(&mut self.running.lock())
    }

    /// Stop the generator. Returns false if it was not running.
    pub fn stop(&self) -> bool {
        stop_locked(&mut self.running.lock())
    }

    /// Flip the generator; returns whether it runs afterwards.
    pub fn toggle(&self) -> bool {
        let mut running = self.running.lock();
        if is_alive(&running) {
            stop_locked(&mut running);
            false
        } else {
            self.start_locked(&mut running)
        }
    }

    fn start_locked(&self, running: &mut Option<Running>) -> bool {
        if is_alive(running) {
            return false;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(run(
            self.interceptor.clone(),
            self.interval,
            self.response_delay,
            token.clone(),
        ));
        *running = Some(Running { token, handle });
        info!("Traffic simulation started (every {:?})", self.interval);
        true
    }
}

fn is_alive(running: &Option<Running>) -> bool {
    running.as_ref().is_some_and(|r| !r.handle.is_finished())
}

fn stop_locked(running: &mut Option<Running>) -> bool {
    match running.take() {
        Some(running) => {
            running.token.cancel();
            info!("Traffic simulation stopped");
            true
        }
        None => false,
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.token.cancel();
        }
    }
}

async fn run(
    interceptor: Interceptor,
    interval: Duration,
    response_delay: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let (method, endpoint, size) = {
            let mut rng = rand::thread_rng();
            (
                METHODS.choose(&mut rng).copied().unwrap_or("GET"),
                ENDPOINTS.choose(&mut rng).copied().unwrap_or("/api/v1/models"),
                rng.gen_range(500u64..5_500),
            )
        };
        debug!("Simulating {} {}", method, endpoint);

        let mut request = TrafficRecord::outbound(method, endpoint, size);
        request.status = 200;
        interceptor.record(request);

        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(response_delay) => {}
        }
        interceptor.record(TrafficRecord::inbound(endpoint, 200, size * 3 / 2));
    }
}
