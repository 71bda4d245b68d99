use batch_reconciler::collaborators::mem::{
    InMemoryJobSpecStore, InMemoryLogStream, InMemoryMetricsBackend, InMemoryOrchestrator,
    InMemoryQueueService, InMemoryStateStore,
};
use batch_reconciler::model::{JobKey, JobSpec, JobState, JobStatus};
use batch_reconciler::opts::Opts;
use batch_reconciler::reconciler::Reconciler;
use batch_reconciler::time_source::SystemClock;
use batch_reconciler::timeout::TimeoutGuard;
use clap::Parser;
use time::OffsetDateTime;
use tracing::metadata::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let opts = Opts::parse();

    let log_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(true))
        .with(log_filter)
        .init();

    let config = opts.to_config();
    let now = OffsetDateTime::now_utc();

    let state_store = InMemoryStateStore::new();
    let queue_service = InMemoryQueueService::new();
    let orchestrator = InMemoryOrchestrator::new();
    let job_spec_store = InMemoryJobSpecStore::new();
    let metrics = InMemoryMetricsBackend::new();
    let log_stream = InMemoryLogStream::new();

    seed_demo_job(&opts.api_kind, now, &state_store, &queue_service, &job_spec_store);

    // Each external call is bounded at half the reconcile period (spec.md
    // §5) so a stuck collaborator call can't starve the next pass.
    let call_budget = (config.reconcile_period / 2).unsigned_abs();

    let mut reconciler = Reconciler::new(
        opts.api_kind.clone(),
        TimeoutGuard::new(state_store, call_budget),
        TimeoutGuard::new(queue_service, call_budget),
        TimeoutGuard::new(orchestrator, call_budget),
        TimeoutGuard::new(job_spec_store, call_budget),
        TimeoutGuard::new(metrics, call_budget),
        TimeoutGuard::new(log_stream, call_budget),
        SystemClock,
        config,
    );

    if opts.once {
        if let Err(err) = reconciler.run_once().await {
            tracing::error!(error = %err, "reconciliation pass failed");
            std::process::exit(1);
        }
        println!("{:#?}", reconciler.telemetry);
    } else {
        reconciler.run_forever().await;
    }
}

/// Seeds a single in-progress, still-enqueuing job so `--once` has something
/// to reconcile. Real deployments never call this — they wire a state
/// store, queue service, and orchestrator client backed by the platform's
/// actual infrastructure instead of the in-memory fakes.
fn seed_demo_job(
    api_kind: &str,
    now: OffsetDateTime,
    state_store: &InMemoryStateStore,
    queue_service: &InMemoryQueueService,
    job_spec_store: &InMemoryJobSpecStore,
) {
    let key = JobKey::new(api_kind, "demo-job-1");
    let mut state = JobState::new(key.clone(), JobStatus::Enqueuing);
    state.touch(batch_reconciler::model::JobPhase::Enqueuing, now);
    state.touch(batch_reconciler::model::JobPhase::LivenessFile, now);
    state_store.insert(state);
    queue_service.create(&key, now);
    job_spec_store.put(
        key,
        JobSpec {
            workers: 4,
            total_batch_count: 1000,
            timeout: Some(time::Duration::hours(1)),
            start_time: now,
        },
    );
}
