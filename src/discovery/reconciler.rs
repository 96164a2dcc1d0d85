//! Discovery Reconciler
//!
//! Reconciles `LocalVolumeDiscovery` objects: prunes results left behind
//! by nodes that fell out of the node selector and reports the health of
//! the discovery DaemonSet in the status.

use crate::crd::{
    DiscoveryCondition, DiscoveryPhase, LocalVolumeDiscovery, LocalVolumeDiscoveryStatus,
};
use crate::discovery::orphans::delete_orphan_results;
use crate::domain::ports::{DaemonSetCounts, DiscoveryClusterView};
use crate::error::{Error, ErrorAction, Result};
use chrono::Utc;
use futures::StreamExt;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Api, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default name of the DaemonSet running the discovery agent
pub const DEFAULT_DISCOVERY_DAEMONSET: &str = "devicefinder-discovery";

/// Readiness is not watched, so healthy objects are revisited periodically
const RESYNC_INTERVAL: Duration = Duration::from_secs(60);

const BACKOFF_INTERVAL: Duration = Duration::from_secs(15);

const CONDITION_AVAILABLE: &str = "Available";
const CONDITION_PROGRESSING: &str = "Progressing";
const CONDITION_DEGRADED: &str = "Degraded";

/// Shared state handed to every reconcile call
pub struct ReconcilerContext {
    pub cluster: Arc<dyn DiscoveryClusterView>,
    pub daemonset_name: String,
}

// =============================================================================
// Status
// =============================================================================

/// Phase and condition derived from the DaemonSet counts
pub fn discovery_status(counts: Option<DaemonSetCounts>) -> (DiscoveryPhase, DiscoveryCondition) {
    let condition = |kind: &str, status: &str, reason: &str, message: String| DiscoveryCondition {
        r#type: kind.to_string(),
        status: status.to_string(),
        last_transition_time: Some(Utc::now()),
        reason: Some(reason.to_string()),
        message: Some(message),
    };

    match counts {
        Some(c) if c.desired > 0 && c.ready > 0 && c.ready < c.desired => (
            DiscoveryPhase::Discovering,
            condition(
                CONDITION_PROGRESSING,
                "False",
                "DiscoveryDaemonSetProgressing",
                format!("{}/{} discovery pods ready", c.ready, c.desired),
            ),
        ),
        Some(c) if c.desired > 0 && c.ready >= c.desired => (
            DiscoveryPhase::Discovering,
            condition(
                CONDITION_AVAILABLE,
                "True",
                "DiscoveryDaemonSetReady",
                format!("{}/{} discovery pods ready", c.ready, c.desired),
            ),
        ),
        Some(c) => (
            DiscoveryPhase::DiscoveryFailed,
            condition(
                CONDITION_DEGRADED,
                "False",
                "DiscoveryDaemonSetUnavailable",
                format!("{}/{} discovery pods ready", c.ready, c.desired),
            ),
        ),
        None => (
            DiscoveryPhase::DiscoveryFailed,
            condition(
                CONDITION_DEGRADED,
                "False",
                "DiscoveryDaemonSetMissing",
                "discovery DaemonSet not found".to_string(),
            ),
        ),
    }
}

/// Next status of the object. Only the condition that applies now is kept,
/// with its transition time carried over while its status is unchanged.
pub fn next_status(
    previous: Option<&LocalVolumeDiscoveryStatus>,
    counts: Option<DaemonSetCounts>,
    generation: Option<i64>,
) -> LocalVolumeDiscoveryStatus {
    let (phase, condition) = discovery_status(counts);
    let mut status = LocalVolumeDiscoveryStatus {
        phase: Some(phase),
        conditions: previous
            .map(|p| {
                p.conditions
                    .iter()
                    .filter(|c| c.r#type == condition.r#type)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default(),
        observed_generation: generation,
    };
    status.set_condition(condition);
    status
}

// =============================================================================
// Reconcile
// =============================================================================

/// Reconcile one discovery object
pub async fn reconcile(
    discovery: Arc<LocalVolumeDiscovery>,
    ctx: Arc<ReconcilerContext>,
) -> Result<Action> {
    let name = discovery.name_any();
    let namespace = discovery.namespace().ok_or_else(|| {
        Error::Configuration(format!("LocalVolumeDiscovery {} has no namespace", name))
    })?;
    debug!("reconciling LocalVolumeDiscovery {}/{}", namespace, name);

    let deleted = delete_orphan_results(ctx.cluster.as_ref(), &discovery).await?;
    if !deleted.is_empty() {
        info!("deleted {} orphan discovery results", deleted.len());
    }

    let counts = ctx
        .cluster
        .daemonset_counts(&namespace, &ctx.daemonset_name)
        .await?;
    let status = next_status(
        discovery.status.as_ref(),
        counts,
        discovery.metadata.generation,
    );
    ctx.cluster
        .update_discovery_status(&namespace, &name, &status)
        .await?;

    Ok(Action::requeue(RESYNC_INTERVAL))
}

/// Map reconcile failures onto requeue decisions
pub fn error_policy(
    discovery: Arc<LocalVolumeDiscovery>,
    err: &Error,
    _ctx: Arc<ReconcilerContext>,
) -> Action {
    warn!(
        "reconcile of LocalVolumeDiscovery {} failed: {}",
        discovery.name_any(),
        err
    );
    match err.action() {
        ErrorAction::RequeueWithBackoff => Action::requeue(BACKOFF_INTERVAL),
        ErrorAction::RequeueAfter(after) => Action::requeue(after),
        ErrorAction::NoRequeue => Action::await_change(),
    }
}

/// Run the controller until the watch stream ends
pub async fn run_controller(api: Api<LocalVolumeDiscovery>, ctx: ReconcilerContext) {
    info!(
        "starting LocalVolumeDiscovery controller for DaemonSet {}",
        ctx.daemonset_name
    );
    Controller::new(api, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, Arc::new(ctx))
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!("reconciled {}", obj.name),
                Err(e) => warn!("reconcile error: {}", e),
            }
        })
        .await;
}
