use async_trait::async_trait;

use crate::entities::Job;

/// One job kind's execution logic.
///
/// Handlers hold their own collaborators (stores, clients) and receive the
/// full row so they can fold queue bookkeeping (id, attempt, enqueue time)
/// into their domain payloads. Returning `Err` asks the supervisor to
/// schedule a retry; terminal conditions should be absorbed and logged.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn run(&self, job: &Job) -> anyhow::Result<()>;

    /// The job kind this handler processes.
    fn kind(&self) -> &'static str;
}
