//! Concurrent fan-out of branch probes over a dependency list.
//!
//! One task per require, admission-gated by a counting semaphore; each
//! task owns one slot of the output so results merge without locking and
//! come back in input order. A failed probe is recorded in its own slot
//! and never disturbs the others.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, warn};

use crate::analysis::{commit_ref, BranchProbe, GitCli, ModuleAnalysis, ProbeError};
use crate::manifest::ModuleRequire;

/// Default number of probes allowed in flight at once. Each probe is a
/// cold network clone, so the bound stays small.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Knobs for one analysis run.
#[derive(Clone, Copy, Debug)]
pub struct AnalyzeOptions {
    /// Maximum probes in flight at once; `0` is normalized to `1`.
    pub concurrency: usize,
    /// Run-wide deadline. Probes still in flight when it fires are killed
    /// and report a cancellation error; finished ones keep their results.
    pub timeout: Option<Duration>,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout: None,
        }
    }
}

/// Probes every module and returns exactly one [`ModuleAnalysis`] per
/// input, in input order. Returns only once every task has finished.
pub async fn analyze<C: GitCli + 'static>(
    probe: Arc<BranchProbe<C>>,
    modules: Vec<ModuleRequire>,
    opts: AnalyzeOptions,
) -> Vec<ModuleAnalysis> {
    let total = modules.len();
    let gate = Arc::new(Semaphore::new(opts.concurrency.max(1)));
    let deadline = opts.timeout.map(|t| tokio::time::Instant::now() + t);

    let mut tasks: JoinSet<(usize, ModuleAnalysis)> = JoinSet::new();
    for (slot, module) in modules.into_iter().enumerate() {
        let probe = Arc::clone(&probe);
        let gate = Arc::clone(&gate);

        tasks.spawn(async move {
            let repo_url = format!("https://{}", module.path);
            let reference = commit_ref(&module.version).to_string();

            let work = async {
                let _permit = gate
                    .acquire_owned()
                    .await
                    .map_err(|_| ProbeError::Cancelled)?;
                probe.probe(&repo_url, &reference).await
            };

            // The deadline covers semaphore wait time too: a probe that
            // never got admitted still reports cancellation.
            let outcome = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, work)
                    .await
                    .unwrap_or(Err(ProbeError::Cancelled)),
                None => work.await,
            };

            let analysis = match outcome {
                Ok(branches) => ModuleAnalysis {
                    require: module,
                    branches,
                    error: None,
                },
                Err(err) => {
                    warn!(
                        module = %module.path,
                        version = %module.version,
                        error = %err,
                        "branch containment probe failed"
                    );
                    ModuleAnalysis {
                        require: module,
                        branches: Vec::new(),
                        error: Some(err),
                    }
                }
            };

            (slot, analysis)
        });
    }

    // Slot-per-input collection: no lock, deterministic order.
    let mut slots: Vec<Option<ModuleAnalysis>> = std::iter::repeat_with(|| None)
        .take(total)
        .collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((slot, analysis)) => slots[slot] = Some(analysis),
            // A panicked probe task would lose its slot; the probe itself
            // never panics, it records errors.
            Err(err) => error!(error = %err, "analysis task failed to join"),
        }
    }

    slots.into_iter().flatten().collect()
}
