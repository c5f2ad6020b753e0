//! Bulk Driver (§4.8).
//!
//! Walks a directory tree, identifies every discovered video
//! concurrently under a bounded worker count, and reports a summary.
//! The worker-bound-via-semaphore shape follows the pack's
//! `TaskScheduler`/`WorkerPool` pair, generalized here to a flat
//! `Semaphore`-gated `tokio::spawn` loop since bulk identification has no
//! priority queue or task-type registry to manage, just one job per
//! discovered file.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::config::ConfigHandle;
use crate::error::EpidError;

const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "m4v", "webm", "mov"];

/// Rate limit on emitted [`Progress`] events (§4.8: at most once per 100ms).
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Outcome of identifying a single discovered file.
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: Result<crate::core::orchestrator::Outcome, EpidError>,
}

/// A bounded, newest-wins record of per-file failures.
pub struct ErrorLog {
    max_entries: usize,
    entries: VecDeque<(PathBuf, String)>,
}

impl ErrorLog {
    fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            entries: VecDeque::new(),
        }
    }

    fn push(&mut self, path: PathBuf, message: String) {
        if self.entries.len() == self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back((path, message));
    }

    pub fn entries(&self) -> &VecDeque<(PathBuf, String)> {
        &self.entries
    }
}

/// How a bulk run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Completed,
    CompletedWithErrors,
    Cancelled,
}

/// Final tally of a bulk run. `discovered == succeeded + failed + skipped`
/// holds for every termination (§4.8 invariant).
pub struct Summary {
    pub discovered: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub termination: Termination,
    pub errors: ErrorLog,
}

/// A progress sample, rate-limited to [`PROGRESS_INTERVAL`].
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub discovered_so_far: usize,
    pub completed_so_far: usize,
}

/// Discover video files under `root`, honoring `recursive` and an
/// exclusion list that takes precedence over the extension allow-list,
/// in lexicographic order.
pub fn discover(root: &Path, recursive: bool, excluded: &[PathBuf]) -> Vec<PathBuf> {
    let walker = if recursive {
        WalkDir::new(root)
    } else {
        WalkDir::new(root).max_depth(1)
    };

    let mut found: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            !excluded.iter().any(|ex| ex == path)
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| {
                        VIDEO_EXTENSIONS
                            .iter()
                            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
                    })
                    .unwrap_or(false)
        })
        .collect();

    found.sort();
    found
}

/// Runs a bounded-concurrency batch over a discovered file list, calling
/// `identify_one` for each and reporting rate-limited progress.
pub struct BulkDriver {
    max_errors: usize,
}

impl BulkDriver {
    pub fn new(max_errors: usize) -> Self {
        Self {
            max_errors: max_errors.max(1),
        }
    }

    /// Run `identify_one` over every path in `files`, honoring the live
    /// `config_handle`'s concurrency bound and stopping early if
    /// `cancellation` fires.
    ///
    /// The worker semaphore is resized at every scheduling pass (a natural
    /// batch boundary: the point where the next file would be dispatched)
    /// to match the handle's *current* effective concurrency. Growing adds
    /// permits immediately; shrinking only reclaims permits that are
    /// currently free, so a hot-reload can never abort or duplicate an
    /// in-flight task (§4.8, §5) — it simply changes how many new tasks
    /// the next batch is allowed to start.
    pub async fn run<F, Fut>(
        &self,
        files: Vec<PathBuf>,
        config_handle: ConfigHandle,
        cancellation: CancellationToken,
        mut on_progress: impl FnMut(Progress),
        identify_one: F,
    ) -> Summary
    where
        F: Fn(PathBuf) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<crate::core::orchestrator::Outcome, EpidError>>
            + Send
            + 'static,
    {
        let discovered = files.len();
        let identify_one = Arc::new(identify_one);
        let mut capacity = config_handle.load().effective_concurrency();
        let semaphore = Arc::new(Semaphore::new(capacity));
        let mut join_set = tokio::task::JoinSet::new();
        let mut errors = ErrorLog::new(self.max_errors);
        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut completed = 0usize;
        let mut cancelled = false;
        let mut last_progress = Instant::now() - PROGRESS_INTERVAL;

        let mut remaining: VecDeque<PathBuf> = files.into();

        loop {
            let target = config_handle.load().effective_concurrency();
            if target > capacity {
                semaphore.add_permits(target - capacity);
                capacity = target;
            } else if target < capacity {
                if let Ok(surplus) = semaphore.clone().try_acquire_many_owned((capacity - target) as u32) {
                    surplus.forget();
                    capacity = target;
                }
                // Permits currently held by in-flight tasks aren't reclaimed
                // here; the next pass retries once more become free.
            }

            while join_set.len() < semaphore.available_permits().max(1) && !remaining.is_empty() {
                if cancellation.is_cancelled() {
                    break;
                }
                let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                    break;
                };
                let path = remaining.pop_front().expect("checked non-empty above");
                let identify_one = Arc::clone(&identify_one);
                let fut = identify_one(path.clone());
                join_set.spawn(async move {
                    let result = fut.await;
                    drop(permit);
                    FileOutcome { path, result }
                });
            }

            if join_set.is_empty() {
                break;
            }

            tokio::select! {
                _ = cancellation.cancelled() => {
                    cancelled = true;
                    break;
                }
                Some(joined) = join_set.join_next() => {
                    let outcome = match joined {
                        Ok(outcome) => outcome,
                        Err(_join_err) => continue,
                    };
                    completed += 1;
                    match outcome.result {
                        Ok(_) => succeeded += 1,
                        Err(e) => {
                            failed += 1;
                            errors.push(outcome.path, e.user_friendly_message());
                        }
                    }

                    if failed >= self.max_errors {
                        // Drain already-spawned work, stop pulling new files.
                        remaining.clear();
                    }

                    if last_progress.elapsed() >= PROGRESS_INTERVAL {
                        on_progress(Progress {
                            discovered_so_far: discovered,
                            completed_so_far: completed,
                        });
                        last_progress = Instant::now();
                    }
                }
            }
        }

        let skipped = discovered - succeeded - failed;
        let termination = if cancelled {
            Termination::Cancelled
        } else if failed > 0 {
            Termination::CompletedWithErrors
        } else {
            Termination::Completed
        };

        Summary {
            discovered,
            succeeded,
            failed,
            skipped,
            termination,
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn discover_filters_to_video_extensions_in_lexicographic_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.mkv"), b"").unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"").unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"").unwrap();

        let found = discover(dir.path(), false, &[]);
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.mp4", "b.mkv"]);
    }

    #[test]
    fn discover_honors_non_recursive_depth() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("season1");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("e1.mkv"), b"").unwrap();
        std::fs::write(dir.path().join("top.mkv"), b"").unwrap();

        assert_eq!(discover(dir.path(), false, &[]).len(), 1);
        assert_eq!(discover(dir.path(), true, &[]).len(), 2);
    }

    #[test]
    fn discover_exclusion_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let excluded = dir.path().join("skip.mkv");
        std::fs::write(&excluded, b"").unwrap();
        std::fs::write(dir.path().join("keep.mkv"), b"").unwrap();

        let found = discover(dir.path(), false, &[excluded]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file_name().unwrap(), "keep.mkv");
    }

    fn stub_identified() -> crate::core::orchestrator::Outcome {
        use crate::core::matcher::{Candidate, MatchOutcome};
        crate::core::orchestrator::Outcome {
            match_outcome: MatchOutcome::Identified {
                result: Candidate {
                    series: "Show".to_string(),
                    season: "01".to_string(),
                    episode: "01".to_string(),
                    episode_name: None,
                    confidence: 0.95,
                },
                rename_eligible: false,
            },
            proposed_filename: None,
            renamed_to: None,
        }
    }

    #[tokio::test]
    async fn run_tracks_success_and_failure_with_the_discovered_invariant() {
        let files: Vec<PathBuf> = (0..5).map(|i| PathBuf::from(format!("f{i}.mkv"))).collect();
        let config_handle: ConfigHandle = Arc::new(arc_swap::ArcSwap::from_pointee(Config::default()));
        let driver = BulkDriver::new(100);
        let token = CancellationToken::new();

        let summary = driver
            .run(files, config_handle, token, |_p| {}, |path| async move {
                if path.to_string_lossy().ends_with("f3.mkv") {
                    Err(EpidError::NoMatch)
                } else {
                    Ok(stub_identified())
                }
            })
            .await;

        assert_eq!(summary.discovered, 5);
        assert_eq!(summary.succeeded, 4);
        assert_eq!(summary.failed, 1);
        assert_eq!(
            summary.discovered,
            summary.succeeded + summary.failed + summary.skipped
        );
        assert_eq!(summary.termination, Termination::CompletedWithErrors);
    }

    #[tokio::test]
    async fn hot_reload_mid_run_changes_effective_concurrency_without_losing_files() {
        let mut initial = Config::default();
        initial.max_concurrency = 1;
        let config_handle: ConfigHandle = Arc::new(arc_swap::ArcSwap::from_pointee(initial));
        let driver = BulkDriver::new(100);
        let token = CancellationToken::new();

        let files: Vec<PathBuf> = (0..8).map(|i| PathBuf::from(format!("f{i}.mkv"))).collect();
        let reload_handle = Arc::clone(&config_handle);

        let summary = driver
            .run(files, config_handle, token, |_p| {}, move |path| {
                let reload_handle = Arc::clone(&reload_handle);
                async move {
                    if path.to_string_lossy().ends_with("f0.mkv") {
                        let mut bumped = Config::default();
                        bumped.max_concurrency = 4;
                        reload_handle.store(Arc::new(bumped));
                    }
                    Ok(stub_identified())
                }
            })
            .await;

        assert_eq!(summary.discovered, 8);
        assert_eq!(summary.succeeded, 8);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.termination, Termination::Completed);
    }
}
