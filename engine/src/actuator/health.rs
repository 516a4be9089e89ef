//! Actuator health monitoring
//!
//! Tracks whether the browser session is usable and performs bounded
//! reconnection. The restart budget is per controller session; once it is
//! spent the controller has to stop.

use sdk::actuator::{Actuator, TaskOutcome};
use std::time::Duration;
use tracing::{error, info, warn};

/// Result of a health check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    /// Connected without intervention
    Healthy,
    /// Was disconnected and a restart brought it back
    Reconnected,
    /// Restart budget exhausted
    Unrecoverable,
}

/// Bounded reconnection for one controller session
#[derive(Debug)]
pub struct HealthMonitor {
    max_restarts: u32,
    pause: Duration,
    restarts: u32,
}

impl HealthMonitor {
    pub fn new(max_restarts: u32, pause: Duration) -> Self {
        Self {
            max_restarts,
            pause,
            restarts: 0,
        }
    }

    /// Restarts performed so far
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    pub fn exhausted(&self) -> bool {
        self.restarts >= self.max_restarts
    }

    /// Whether an outcome says the session was lost
    pub fn lost_session(&self, outcome: &TaskOutcome) -> bool {
        if outcome.disconnected() {
            warn!("Actuator reported disconnect: {}", outcome.error_message());
            true
        } else {
            false
        }
    }

    /// Make sure the actuator is usable, restarting it if needed
    pub async fn ensure_connected(&mut self, actuator: &dyn Actuator) -> Health {
        if actuator.is_connected() {
            return Health::Healthy;
        }

        while !self.exhausted() {
            self.restarts += 1;
            warn!(
                "Actuator disconnected, restart {}/{}",
                self.restarts, self.max_restarts
            );
            if !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
            if actuator.restart().await && actuator.is_connected() {
                info!("Actuator reconnected after {} restart(s)", self.restarts);
                return Health::Reconnected;
            }
        }

        error!("Actuator unrecoverable after {} restarts", self.restarts);
        Health::Unrecoverable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::fake::ScriptedActuator;

    #[tokio::test]
    async fn test_healthy_actuator_needs_no_restart() {
        let actuator = ScriptedActuator::new();
        let mut monitor = HealthMonitor::new(3, Duration::ZERO);
        assert_eq!(monitor.ensure_connected(&actuator).await, Health::Healthy);
        assert_eq!(monitor.restarts(), 0);
    }

    #[tokio::test]
    async fn test_reconnects_within_budget() {
        let actuator = ScriptedActuator::new();
        actuator.set_connected(false);
        actuator.push_restarts([false, true]);

        let mut monitor = HealthMonitor::new(3, Duration::ZERO);
        assert_eq!(monitor.ensure_connected(&actuator).await, Health::Reconnected);
        assert_eq!(monitor.restarts(), 2);
    }

    #[tokio::test]
    async fn test_budget_is_per_session() {
        let actuator = ScriptedActuator::new();
        actuator.set_connected(false);
        actuator.push_restarts([false, false, false, true]);

        let mut monitor = HealthMonitor::new(3, Duration::ZERO);
        assert_eq!(
            monitor.ensure_connected(&actuator).await,
            Health::Unrecoverable
        );
        assert_eq!(monitor.restarts(), 3);
        // no further attempts once exhausted
        assert_eq!(
            monitor.ensure_connected(&actuator).await,
            Health::Unrecoverable
        );
        assert_eq!(actuator.restart_calls(), 3);
    }
}
