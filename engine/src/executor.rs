//! Worker pool execution of external-command jobs.
//!
//! Jobs run concurrently on a rayon thread pool bounded by the configured
//! parallelism (default: available CPUs). Completed `(Job, Outcome)` pairs
//! are forwarded over a channel and consumed by the calling thread in
//! completion order, not submission order, so the pool stays saturated
//! while the caller records results.
//!
//! Each job has its own error boundary: a launch failure, an I/O fault, or
//! a panic while running or classifying one job becomes an `Error` outcome
//! for that job alone and never terminates sibling jobs or the pool.
//!
//! There is no cancellation and, by default, no per-command timeout: a hang
//! in the external tool hangs that worker slot indefinitely. Operators who
//! have been bitten by hung loaders can opt into a timeout via
//! [`CommandRunner::with_timeout`].

use std::io::Read;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use rasterload_core::{Job, JobResult, Outcome};
use rayon::prelude::*;
use tracing::debug;
use wait_timeout::ChildExt;

use crate::classify::Classifier;

/// Runs one job and captures its raw output.
///
/// Implemented by [`CommandRunner`] for real external processes and by
/// plain closures in tests.
pub trait JobRunner: Sync {
    fn run(&self, job: &Job) -> JobResult;
}

impl<F> JobRunner for F
where
    F: Fn(&Job) -> JobResult + Sync,
{
    fn run(&self, job: &Job) -> JobResult {
        self(job)
    }
}

/// Bounded worker pool that executes jobs and classifies their results.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    classifier: Classifier,
    max_parallelism: Option<usize>,
}

impl Executor {
    /// Creates an executor with the given classifier and parallelism bound.
    /// `None` sizes the pool to the number of available processing units.
    pub fn new(classifier: Classifier, max_parallelism: Option<usize>) -> Self {
        Self {
            classifier,
            max_parallelism,
        }
    }

    /// Executes all jobs, invoking `sink` once per job as completions
    /// arrive. Every submitted job reaches the sink exactly once, whatever
    /// happens while it runs.
    pub fn run<R>(&self, jobs: &[Job], runner: &R, mut sink: impl FnMut(Job, Outcome))
    where
        R: JobRunner,
    {
        if jobs.is_empty() {
            return;
        }

        let threads = self
            .max_parallelism
            .filter(|threads| *threads > 0)
            .unwrap_or_else(|| default_parallelism(jobs.len()));
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .expect("failed to build rayon thread pool");

        let (tx, rx) = mpsc::channel::<(Job, Outcome)>();

        std::thread::scope(|scope| {
            scope.spawn(move || {
                pool.install(|| {
                    jobs.par_iter()
                        // One rayon task per job so a free worker always
                        // picks up the next queued job immediately.
                        .with_max_len(1)
                        .for_each_with(tx, |tx, job| {
                            let outcome = self.execute_one(job, runner);
                            // The receiver outlives the pool; a send failure
                            // here means the collecting thread is gone.
                            let _ = tx.send((job.clone(), outcome));
                        });
                });
            });

            for (job, outcome) in rx.iter() {
                sink(job, outcome);
            }
        });
    }

    /// Runs and classifies one job inside a panic boundary.
    fn execute_one<R: JobRunner>(&self, job: &Job, runner: &R) -> Outcome {
        let attempt = catch_unwind(AssertUnwindSafe(|| {
            let result = runner.run(job);
            self.classifier.classify(job, &result)
        }));

        attempt.unwrap_or_else(|panic| {
            let detail = panic
                .downcast_ref::<String>()
                .map(String::as_str)
                .or_else(|| panic.downcast_ref::<&str>().copied())
                .unwrap_or("unknown panic");
            debug!(label = %job.label, detail, "job crashed inside the worker");
            Outcome::error(job, format!("job crashed: {detail}"))
        })
    }
}

fn default_parallelism(job_count: usize) -> usize {
    let cpu_count = std::thread::available_parallelism()
        .map(|parallelism| parallelism.get())
        .unwrap_or(4);
    cpu_count.clamp(1, job_count.max(1))
}

/// Production [`JobRunner`]: spawns the job's command as an external
/// process and captures stdout, stderr, exit code, and elapsed time.
///
/// Commands containing shell metacharacters (the loader pipelines always
/// do, they pipe into `psql`) run through `sh -c`; plain commands are split
/// on whitespace and exec'd directly.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    timeout: Option<Duration>,
}

impl CommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kills commands that run longer than `timeout` and reports them as
    /// errors. Off by default.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    fn build_command(command_text: &str) -> Option<Command> {
        if contains_shell_metacharacters(command_text) {
            let mut command = Command::new("sh");
            command.arg("-c").arg(command_text);
            return Some(command);
        }

        let mut parts = command_text.split_whitespace();
        let program = parts.next()?;
        let mut command = Command::new(program);
        command.args(parts);
        Some(command)
    }
}

impl JobRunner for CommandRunner {
    fn run(&self, job: &Job) -> JobResult {
        let started = Instant::now();

        let Some(mut command) = Self::build_command(&job.command) else {
            return JobResult {
                launch_error: Some("empty command".to_string()),
                elapsed: started.elapsed(),
                ..Default::default()
            };
        };
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                debug!(label = %job.label, error = %err, "failed to spawn command");
                return JobResult {
                    launch_error: Some(err.to_string()),
                    elapsed: started.elapsed(),
                    ..Default::default()
                };
            }
        };

        // Drain both pipes on background threads so the child cannot
        // deadlock on a full pipe buffer before exiting.
        let stdout_thread = child.stdout.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf);
                buf
            })
        });
        let stderr_thread = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf);
                buf
            })
        });

        let (exit_code, timed_out) = match self.timeout {
            Some(timeout) => match child.wait_timeout(timeout) {
                Ok(Some(status)) => (status.code(), false),
                Ok(None) => {
                    debug!(label = %job.label, ?timeout, "command timed out, killing process");
                    let _ = child.kill();
                    let _ = child.wait();
                    (None, true)
                }
                Err(err) => {
                    return JobResult {
                        launch_error: Some(format!("wait failed: {err}")),
                        elapsed: started.elapsed(),
                        ..Default::default()
                    };
                }
            },
            None => match child.wait() {
                Ok(status) => (status.code(), false),
                Err(err) => {
                    return JobResult {
                        launch_error: Some(format!("wait failed: {err}")),
                        elapsed: started.elapsed(),
                        ..Default::default()
                    };
                }
            },
        };

        let stdout = stdout_thread
            .and_then(|thread| thread.join().ok())
            .unwrap_or_default();
        let mut stderr = stderr_thread
            .and_then(|thread| thread.join().ok())
            .unwrap_or_default();
        if timed_out {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&format!(
                "process timed out after {}s and was killed",
                self.timeout.unwrap_or_default().as_secs()
            ));
        }

        JobResult {
            stdout,
            stderr,
            exit_code,
            elapsed: started.elapsed(),
            launch_error: None,
        }
    }
}

/// Returns `true` if the command needs a shell to interpret it.
fn contains_shell_metacharacters(command: &str) -> bool {
    command
        .chars()
        .any(|ch| matches!(ch, '|' | ';' | '&' | '$' | '>' | '<' | '`' | '(' | ')' | '*' | '?'))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use rasterload_core::OutcomeKind;

    use super::*;

    fn stub_jobs(count: usize) -> Vec<Job> {
        (0..count)
            .map(|index| Job::new(index, format!("tile-{index}"), format!("raster2pgsql {index}")))
            .collect()
    }

    fn ok_result() -> JobResult {
        JobResult {
            exit_code: Some(0),
            ..Default::default()
        }
    }

    #[test]
    fn test_every_job_produces_exactly_one_outcome() {
        let jobs = stub_jobs(12);
        let executor = Executor::new(Classifier::default(), Some(3));
        let seen = Mutex::new(Vec::new());

        executor.run(&jobs, &|_job: &Job| ok_result(), |job, outcome| {
            seen.lock().unwrap().push((job.index, outcome.kind));
        });

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 12);
        let indices: HashSet<usize> = seen.iter().map(|(index, _)| *index).collect();
        assert_eq!(indices.len(), 12);
        assert!(seen.iter().all(|(_, kind)| *kind == OutcomeKind::Success));
    }

    #[test]
    fn test_panicking_job_is_isolated_as_error() {
        let jobs = stub_jobs(10);
        let executor = Executor::new(Classifier::default(), Some(4));
        let outcomes = Mutex::new(Vec::new());

        let runner = |job: &Job| {
            if job.index == 5 {
                panic!("simulated crash in worker");
            }
            ok_result()
        };
        executor.run(&jobs, &runner, |job, outcome| {
            outcomes.lock().unwrap().push((job.index, outcome));
        });

        let mut outcomes = outcomes.into_inner().unwrap();
        outcomes.sort_by_key(|(index, _)| *index);
        assert_eq!(outcomes.len(), 10);
        for (index, outcome) in &outcomes {
            if *index == 5 {
                assert_eq!(outcome.kind, OutcomeKind::Error);
                assert!(outcome.message.as_deref().unwrap().contains("simulated crash"));
            } else {
                assert_eq!(outcome.kind, OutcomeKind::Success);
            }
        }
    }

    #[test]
    fn test_parallelism_bound_is_respected() {
        let d = Duration::from_millis(150);
        let jobs = stub_jobs(5);
        let executor = Executor::new(Classifier::default(), Some(2));

        let runner = |_job: &Job| {
            std::thread::sleep(d);
            ok_result()
        };

        let started = Instant::now();
        let mut count = 0;
        executor.run(&jobs, &runner, |_, _| count += 1);
        let elapsed = started.elapsed();

        assert_eq!(count, 5);
        // ceil(5/2) * d = 3d; allow generous scheduling slack but stay
        // clearly below the 5d serial bound and above the 1d unbounded one.
        assert!(elapsed >= d.mul_f32(2.5), "too fast: {elapsed:?}");
        assert!(elapsed < d.mul_f32(4.5), "too slow: {elapsed:?}");
    }

    #[test]
    fn test_command_runner_captures_exit_code() {
        let runner = CommandRunner::new();
        let job = Job::new(0, "false", "false");
        let result = runner.run(&job);
        assert_eq!(result.exit_code, Some(1));
        assert!(result.launch_error.is_none());
    }

    #[test]
    fn test_command_runner_reports_launch_failure() {
        let runner = CommandRunner::new();
        let job = Job::new(0, "ghost", "definitely-not-a-real-binary-zzz");
        let result = runner.run(&job);
        assert!(result.launch_error.is_some());
        assert_eq!(result.exit_code, None);
    }

    #[test]
    fn test_command_runner_uses_shell_for_pipelines() {
        let runner = CommandRunner::new();
        let job = Job::new(0, "pipeline", "printf 'a\\nb\\n' | wc -l");
        let result = runner.run(&job);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout.trim(), "2");
    }

    #[test]
    fn test_command_runner_timeout_kills_hung_process() {
        let runner = CommandRunner::with_timeout(Some(Duration::from_millis(200)));
        let job = Job::new(0, "sleeper", "sleep 30");
        let started = Instant::now();
        let result = runner.run(&job);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(result.exit_code, None);
        assert!(result.stderr.contains("timed out"));
        assert!(!result.exited_ok());
    }
}
