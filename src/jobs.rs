use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::auth::subject::Subject;
use crate::catalog::EnvironmentContext;
use crate::errors::{JitError, Result};
use crate::provisioning::{ComplianceSummary, Environment};

/// Outcome of reconciling one environment during a sweep.
#[derive(Debug)]
pub struct ReconciliationRun {
    pub environment: String,
    pub summary: Result<ComplianceSummary>,
}

/// Initialize and start the job scheduler with the reconciliation sweep.
///
/// `subject` is the identity the sweep runs as; it needs the RECONCILE
/// permission on every environment.
pub async fn init_scheduler(
    environments: Vec<Arc<Environment>>,
    subject: Arc<Subject>,
    schedule: &str,
) -> Result<JobScheduler> {
    let sched = JobScheduler::new()
        .await
        .map_err(|e| JitError::Scheduler(format!("Failed to create job scheduler: {}", e)))?;

    let environments = Arc::new(environments);
    let reconcile_job = Job::new_async(schedule, move |_uuid, _l| {
        let environments = environments.clone();
        let subject = subject.clone();
        Box::pin(async move {
            info!("Running reconcile_environments job");
            run_reconciliation(&environments, &subject).await;
        })
    })
    .map_err(|e| JitError::Scheduler(format!("Failed to create reconciliation job: {}", e)))?;

    sched
        .add(reconcile_job)
        .await
        .map_err(|e| JitError::Scheduler(format!("Failed to add reconciliation job: {}", e)))?;

    sched
        .start()
        .await
        .map_err(|e| JitError::Scheduler(format!("Failed to start job scheduler: {}", e)))?;

    info!(schedule, "Job scheduler started");

    Ok(sched)
}

/// Reconcile every environment once. Environments are processed in order;
/// a failing environment doesn't prevent the others from being reconciled.
pub async fn run_reconciliation(
    environments: &[Arc<Environment>],
    subject: &Subject,
) -> Vec<ReconciliationRun> {
    let mut runs = Vec::with_capacity(environments.len());
    for environment in environments {
        let summary = EnvironmentContext::new(environment, subject)
            .reconcile()
            .await
            .map(|records| ComplianceSummary::of(&records));

        match &summary {
            Ok(summary) => {
                info!(environment = %environment.name(), %summary, "Reconciled environment")
            }
            Err(e) => {
                error!(environment = %environment.name(), error = %e, "Failed to reconcile environment")
            }
        }

        runs.push(ReconciliationRun {
            environment: environment.name().to_string(),
            summary,
        });
    }
    runs
}
