use std::future::{Future, ready};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::{FutureExt, StreamExt};
use futures_concurrency::stream::Merge;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_stream::wrappers::IntervalStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use typed_builder::TypedBuilder;

use crate::admission::DelayPolicy;
use crate::column_family::ColumnFamily;
use crate::compact::{CompactionOutput, CompactionTask, verify_output_file};
use crate::env::Env;

/// Runs the merge a [`CompactionTask`] describes and reports the files it wrote.
pub trait CompactionExecutor: Send + Sync + 'static {
    fn execute(
        &self,
        task: &CompactionTask,
    ) -> impl Future<Output = anyhow::Result<Vec<CompactionOutput>>> + Send;
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct SchedulerOptions {
    #[builder(default = Duration::from_millis(100))]
    pub interval: Duration,
    /// Compactions running at the same time.
    #[builder(default = 1)]
    pub max_background_compactions: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Background loop looking for compaction work on every tick until shut down or dropped.
pub struct CompactionScheduler {
    cancel_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl CompactionScheduler {
    pub fn spawn<D, E, X>(
        cf: Arc<ColumnFamily<D>>,
        env: Arc<E>,
        executor: Arc<X>,
        options: SchedulerOptions,
    ) -> Self
    where
        D: DelayPolicy,
        E: Env,
        X: CompactionExecutor,
    {
        use Signal::*;

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn({
            let cancel_token = cancel_token.clone();
            async move {
                let max_jobs = options.max_background_compactions.max(1);
                let permits = Arc::new(Semaphore::new(max_jobs));
                let trigger = IntervalStream::new(interval(options.interval)).map(|_| Trigger);
                let cancel_stream = cancel_token.cancelled().into_stream().map(|_| Cancel);
                (trigger, cancel_stream)
                    .merge()
                    .take_while(|signal| ready(matches!(signal, Trigger)))
                    .for_each(|_| async {
                        let Ok(permit) = permits.clone().try_acquire_owned() else {
                            return;
                        };
                        let task = match cf.claim_compaction() {
                            Ok(Some(task)) => task,
                            Ok(None) => return,
                            Err(e) if e.is_disabled() => return,
                            Err(e) => {
                                error!(cf = cf.name(), error = ?e, "picking compaction failed");
                                return;
                            }
                        };
                        let cf = cf.clone();
                        let env = env.clone();
                        let executor = executor.clone();
                        tokio::spawn(async move {
                            let _permit = permit;
                            run_compaction(&cf, env.as_ref(), executor.as_ref(), &task)
                                .await
                                .inspect_err(|e| {
                                    error!(cf = cf.name(), level = task.level(), error = ?e);
                                    cf.release_compaction(&task);
                                })
                                .ok();
                        });
                    })
                    .await;

                // let running jobs finish before reporting shutdown
                let _ = permits.acquire_many(max_jobs as u32).await;
                info!(cf = cf.name(), "compaction scheduler stopped");
            }
        });
        Self {
            cancel_token,
            handle: Some(handle),
        }
    }

    /// Stops looking for work and waits for running compactions.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        self.cancel_token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.await.context("compaction scheduler panicked")?;
        }
        Ok(())
    }
}

impl Drop for CompactionScheduler {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn run_compaction<D, E, X>(
    cf: &ColumnFamily<D>,
    env: &E,
    executor: &X,
    task: &CompactionTask,
) -> anyhow::Result<()>
where
    D: DelayPolicy,
    E: Env,
    X: CompactionExecutor,
{
    if task.is_trivial_move() {
        debug!(cf = cf.name(), level = task.level(), "trivial move");
        cf.apply_compaction(task, task.inputs().iter().cloned());
        return Ok(());
    }

    let outputs = executor.execute(task).await?;
    if task.paranoid_file_checks() {
        for output in &outputs {
            let verified = verify_output_file(env, output)
                .await
                .with_context(|| format!("verifying {}", output.path.display()));
            if let Err(e) = verified {
                discard_outputs(env, &outputs).await;
                return Err(e);
            }
        }
    }
    let meta = cf.apply_compaction(task, outputs.into_iter().map(|output| output.file));
    debug!(
        cf = cf.name(),
        level = task.level(),
        input_bytes = task.input_bytes(),
        l0_files = meta.l0_file_count(),
        "compaction installed"
    );
    Ok(())
}

/// Removes the files of a job whose results are not installed.
async fn discard_outputs<E: Env>(env: &E, outputs: &[CompactionOutput]) {
    for output in outputs {
        env.delete_file(&output.path)
            .await
            .inspect_err(|e| warn!(path = %output.path.display(), error = ?e, "deleting output failed"))
            .ok();
    }
}

#[derive(Debug, Copy, Clone)]
enum Signal {
    Trigger,
    Cancel,
}
