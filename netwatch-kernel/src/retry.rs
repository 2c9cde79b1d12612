//! Retry avec backoff exponentiel du timeout, politique "premier succès gagne".
//!
//! Jusqu'à `retries + 1` tentatives ; le timeout de la tentative k vaut
//! `base_timeout * backoff_factor^(k-1)` arrondi à la milliseconde. La première
//! tentative réussie est retournée immédiatement.

use crate::models::ProbeVerdict;
use crate::probe::Prober;
use crate::state::SharedClock;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetrySettings {
    pub base_timeout: Duration,
    pub retries: u32,
    pub backoff_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            base_timeout: Duration::from_millis(1000),
            retries: 3,
            backoff_factor: 1.5,
        }
    }
}

impl RetrySettings {
    /// Timeout de la tentative `attempt` (1-indexée)
    pub fn timeout_for(&self, attempt: u32) -> Duration {
        let base = self.base_timeout.as_millis() as f64;
        let factor = self.backoff_factor.powi(attempt.saturating_sub(1) as i32);
        Duration::from_millis((base * factor).round() as u64)
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries + 1
    }
}

#[derive(Clone)]
pub struct RetryPolicy {
    prober: Arc<dyn Prober>,
    settings: RetrySettings,
    clock: SharedClock,
}

impl RetryPolicy {
    pub fn new(prober: Arc<dyn Prober>, settings: RetrySettings, clock: SharedClock) -> Self {
        Self { prober, settings, clock }
    }

    pub fn settings(&self) -> &RetrySettings {
        &self.settings
    }

    /// Réduit le bruit des pings en un verdict unique succès/échec + latence
    pub async fn check(&self, address: &str) -> ProbeVerdict {
        let max_attempts = self.settings.max_attempts();
        let mut execution_failed = false;

        for attempt in 1..=max_attempts {
            let timeout = self.settings.timeout_for(attempt);
            match self.prober.probe(address, timeout).await {
                Ok(outcome) if outcome.success => {
                    tracing::debug!("[retry] {} reachable on attempt {}", address, attempt);
                    return ProbeVerdict {
                        success: true,
                        latency_ms: outcome.latency_ms,
                        packet_loss: outcome.packet_loss,
                        attempts: attempt,
                        execution_failed,
                        timestamp: self.clock.now(),
                    };
                }
                Ok(outcome) => {
                    tracing::warn!(
                        "[retry] {} attempt {} failed ({}/{} packets, timeout {:?})",
                        address, attempt, outcome.received, outcome.sent, timeout
                    );
                }
                Err(e) => {
                    tracing::error!("[retry] {} probe execution failed on attempt {}: {}", address, attempt, e);
                    execution_failed = true;
                }
            }
        }

        tracing::warn!("[retry] {} unreachable after {} attempts", address, max_attempts);
        ProbeVerdict {
            success: false,
            latency_ms: None,
            packet_loss: 100,
            attempts: max_attempts,
            execution_failed,
            timestamp: self.clock.now(),
        }
    }
}
