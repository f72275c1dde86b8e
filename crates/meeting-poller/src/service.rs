//! Timer-driven loop around [`Pipeline`].
//!
//! Shutdown is cooperative: the stop signal is observed between scans and
//! during the idle wait, never in the middle of a scan.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::Config;
use crate::processor::Pipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Idle,
    Check,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub poll_interval: Duration,
    pub error_cooldown: Duration,
    /// Longest stretch of idle time before the stop flag is looked at again
    pub shutdown_check: Duration,
    pub max_messages: u32,
}

impl From<&Config> for ServiceConfig {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            error_cooldown: config.error_cooldown(),
            shutdown_check: config.shutdown_check(),
            max_messages: config.max_messages_per_scan,
        }
    }
}

/// Counters for the lifetime of one [`PollingService::run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub checks: usize,
    pub failed_checks: usize,
    pub events_created: usize,
}

pub struct PollingService {
    pipeline: Pipeline,
    config: ServiceConfig,
    state: ServiceState,
}

impl PollingService {
    pub fn new(pipeline: Pipeline, config: ServiceConfig) -> Self {
        Self {
            pipeline,
            config,
            state: ServiceState::Idle,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Scan immediately, then every `poll_interval`, until `shutdown` turns
    /// true or its sender goes away.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> ServiceStats {
        tracing::info!(
            "Meeting poller started (interval: {:?}, max messages: {})",
            self.config.poll_interval,
            self.config.max_messages
        );

        let mut stats = ServiceStats::default();

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.transition(ServiceState::Check);
            stats.checks += 1;
            tracing::info!("Checking for new messages...");

            let wait = match self.pipeline.run(self.config.max_messages).await {
                Ok(summary) => {
                    stats.events_created += summary.new_events_created;
                    self.config.poll_interval
                }
                Err(e) => {
                    stats.failed_checks += 1;
                    tracing::error!(
                        "Check failed: {} (retrying in {:?})",
                        e,
                        self.config.error_cooldown
                    );
                    self.config.error_cooldown
                }
            };

            self.transition(ServiceState::Idle);

            if self.idle(wait, &mut shutdown).await {
                break;
            }
        }

        self.transition(ServiceState::Stopping);
        tracing::info!(
            "Stopping after {} checks ({} failed, {} events created)",
            stats.checks,
            stats.failed_checks,
            stats.events_created
        );
        self.transition(ServiceState::Stopped);

        stats
    }

    /// Wait for `duration` in slices of at most `shutdown_check`.
    /// Returns true when a stop was requested.
    async fn idle(&self, duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
        let deadline = Instant::now() + duration;

        loop {
            if *shutdown.borrow() {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let slice = (deadline - now).min(self.config.shutdown_check);

            tokio::select! {
                _ = tokio::time::sleep(slice) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        tracing::warn!("Shutdown channel closed");
                        return true;
                    }
                }
            }
        }
    }

    fn transition(&mut self, next: ServiceState) {
        tracing::debug!("Service state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
