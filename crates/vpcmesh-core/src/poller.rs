//! Bounded-time instance state polling

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use vpcmesh_cloud::{InstanceState, RegionClient};

/// An instance to watch, with the client for its region
#[derive(Clone)]
pub struct PollTarget {
    pub client: Arc<dyn RegionClient>,
    pub instance_id: String,
}

impl PollTarget {
    pub fn new(client: Arc<dyn RegionClient>, instance_id: impl Into<String>) -> Self {
        Self {
            client,
            instance_id: instance_id.into(),
        }
    }
}

/// Result of one wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Satisfied,
    /// Instances that had not reached the target state by the deadline
    DeadlineExceeded { pending: Vec<String> },
}

impl PollOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied)
    }
}

/// Instance is up
pub fn is_running(state: Option<InstanceState>) -> bool {
    state == Some(InstanceState::Running)
}

/// Instance is gone; a missing instance counts as gone
pub fn is_terminated(state: Option<InstanceState>) -> bool {
    matches!(state, None | Some(InstanceState::Terminated))
}

#[derive(Debug, Clone, Copy)]
pub struct Poller {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Poller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Poll until every target satisfies `predicate` or the timeout elapses
    ///
    /// The predicate sees `None` when the provider no longer knows the
    /// instance. A failed describe counts as "not yet" for that round.
    pub async fn wait_until<P>(
        &self,
        targets: &[PollTarget],
        target_state: &str,
        predicate: P,
    ) -> PollOutcome
    where
        P: Fn(Option<InstanceState>) -> bool,
    {
        let deadline = Instant::now() + self.timeout;
        let mut pending: Vec<&PollTarget> = targets.iter().collect();
        let mut round = 0u32;

        loop {
            round += 1;
            let mut still_pending = Vec::new();
            for target in pending {
                match observe(target).await {
                    Ok(state) if predicate(state) => {
                        tracing::debug!(instance_id = %target.instance_id, target_state, "Instance reached state");
                    }
                    Ok(state) => {
                        tracing::debug!(
                            instance_id = %target.instance_id,
                            state = state.map(|s| s.to_string()).unwrap_or_else(|| "missing".into()),
                            target_state,
                            "Instance not there yet"
                        );
                        still_pending.push(target);
                    }
                    Err(err) => {
                        tracing::debug!(instance_id = %target.instance_id, error = %err, "Ignoring describe failure");
                        still_pending.push(target);
                    }
                }
            }
            pending = still_pending;

            if pending.is_empty() {
                tracing::info!(target_state, rounds = round, "All instances reached state");
                return PollOutcome::Satisfied;
            }

            let now = Instant::now();
            if now >= deadline {
                let pending: Vec<String> = pending.iter().map(|t| t.instance_id.clone()).collect();
                tracing::warn!(target_state, pending = ?pending, "Gave up waiting for instances");
                return PollOutcome::DeadlineExceeded { pending };
            }
            sleep(self.interval.min(deadline - now)).await;
        }
    }
}

async fn observe(target: &PollTarget) -> vpcmesh_cloud::Result<Option<InstanceState>> {
    let ids = [target.instance_id.clone()];
    match target.client.describe_instances(&ids).await {
        Ok(instances) => Ok(instances
            .iter()
            .find(|i| i.id == target.instance_id)
            .map(|i| i.state)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}
