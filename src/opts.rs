use clap::Parser;

use crate::config::ReconcileConfig;

#[derive(Parser, Debug)]
pub struct Opts {
    /// The `apiKind` this reconciler instance serves; a deployment runs one
    /// reconciler per API kind.
    #[clap(long, env, default_value = "demo-api")]
    pub api_kind: String,

    #[clap(long, env, default_value = "60")]
    pub reconcile_period_secs: u64,

    #[clap(long, env, default_value = "30")]
    pub queue_exist_grace_period_secs: u64,

    #[clap(long, env, default_value = "30")]
    pub enqueuing_liveness_period_secs: u64,

    #[clap(long, env, default_value = "30")]
    pub enqueuing_liveness_buffer_secs: u64,

    #[clap(long, env, default_value = "10")]
    pub k8s_job_existence_grace_period_secs: u64,

    /// Run a single pass against the seeded in-memory demo fixture and exit,
    /// instead of looping forever on `reconcile_period_secs`.
    #[clap(long)]
    pub once: bool,
}

impl Opts {
    pub fn to_config(&self) -> ReconcileConfig {
        ReconcileConfig {
            reconcile_period: time::Duration::seconds(self.reconcile_period_secs as i64),
            queue_exist_grace_period: time::Duration::seconds(
                self.queue_exist_grace_period_secs as i64,
            ),
            enqueuing_liveness_period: time::Duration::seconds(
                self.enqueuing_liveness_period_secs as i64,
            ),
            enqueuing_liveness_buffer: time::Duration::seconds(
                self.enqueuing_liveness_buffer_secs as i64,
            ),
            k8s_job_existence_grace_period: time::Duration::seconds(
                self.k8s_job_existence_grace_period_secs as i64,
            ),
        }
    }
}
