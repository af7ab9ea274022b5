//! Drives an asynchronous provider job to a terminal state.
//!
//! Each poll is classified into exactly one [`PollBucket`]. The loop ends on
//! any terminal bucket, on cancellation, or when either the attempt budget
//! or the wall-clock budget runs out, whichever comes first.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::{
    error::{GenerationError, Result},
    models::{GenerationTask, TaskOutcome},
    providers::{JobState, PollStatus, ProviderAdapter},
};

/// Backoff and budget for one provider's jobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollConfig {
    /// Delay before the first status check.
    pub initial_delay: Duration,
    /// Factor applied to the delay after every poll.
    pub multiplier: f64,
    /// Upper bound on the delay between polls.
    pub max_delay: Duration,
    pub max_attempts: u32,
    /// Wall-clock ceiling for the whole loop, independent of per-call timeouts.
    pub max_wait: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 1.3,
            max_delay: Duration::from_secs(4),
            max_attempts: 60,
            max_wait: Duration::from_secs(300),
        }
    }
}

impl PollConfig {
    /// Upper bound on time spent sleeping across the whole loop.
    pub fn worst_case_wait(&self) -> Duration {
        (self.max_delay * self.max_attempts).min(self.max_wait)
    }
}

/// Next backoff delay, clamped to [`PollConfig::max_delay`].
pub fn next_delay(current: Duration, config: &PollConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier.max(1.0)) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

#[derive(Debug)]
pub enum PollBucket {
    TerminalSuccess(String),
    TerminalFailure(GenerationError),
    TerminalNotFound,
    Transient,
}

/// Map a normalized provider status onto the four buckets.
pub fn classify(provider: &str, status: PollStatus) -> PollBucket {
    let detail = status
        .error_detail
        .unwrap_or_else(|| "no detail provided".to_string());

    match status.state {
        JobState::Pending => PollBucket::Transient,
        JobState::Succeeded => match status.result_ref {
            Some(result_ref) if !result_ref.is_empty() => PollBucket::TerminalSuccess(result_ref),
            _ => PollBucket::TerminalFailure(GenerationError::ProviderFailed {
                provider: provider.to_string(),
                detail: "job completed without a result".to_string(),
            }),
        },
        JobState::Failed => PollBucket::TerminalFailure(GenerationError::ProviderFailed {
            provider: provider.to_string(),
            detail,
        }),
        JobState::Moderated => PollBucket::TerminalFailure(GenerationError::ContentModerated {
            provider: provider.to_string(),
            detail,
        }),
        JobState::NotFound => PollBucket::TerminalNotFound,
    }
}

/// Poll `job_id` until it settles, updating `task` along the way.
///
/// Returns the provider's result reference on success.
pub async fn await_completion(
    adapter: &dyn ProviderAdapter,
    job_id: &str,
    task: &mut GenerationTask,
    cancel: &CancellationToken,
) -> Result<String> {
    let provider = adapter.provider().as_str();
    if task.is_terminal() {
        return Err(GenerationError::Validation(format!(
            "unit {} already settled as {:?}",
            task.unit,
            task.outcome()
        )));
    }

    let config = adapter.polling();
    let started = Instant::now();
    let mut delay = config.initial_delay.min(config.max_delay);

    loop {
        let elapsed = started.elapsed();
        if task.attempts >= config.max_attempts || elapsed >= config.max_wait {
            return Err(timed_out(provider, job_id, task, elapsed));
        }

        let wait = delay.min(config.max_wait - elapsed);
        tokio::select! {
            _ = cancel.cancelled() => {
                task.finish(TaskOutcome::Cancelled);
                return Err(GenerationError::Cancelled);
            }
            _ = tokio::time::sleep(wait) => {}
        }

        // The ceiling also bounds a status call that is still in flight.
        let remaining = config.max_wait.saturating_sub(started.elapsed());
        let polled = tokio::select! {
            _ = cancel.cancelled() => {
                task.finish(TaskOutcome::Cancelled);
                return Err(GenerationError::Cancelled);
            }
            polled = tokio::time::timeout(remaining, adapter.poll_status(job_id)) => polled,
        };
        task.record_poll(started.elapsed());
        let Ok(result) = polled else {
            log::warn!(
                "{} job {} status call outlived the {}ms polling ceiling",
                provider,
                job_id,
                config.max_wait.as_millis()
            );
            return Err(timed_out(provider, job_id, task, started.elapsed()));
        };

        match result {
            Ok(status) => match classify(provider, status) {
                PollBucket::TerminalSuccess(result_ref) => {
                    log::debug!(
                        "{} job {} ready after {} polls ({}ms)",
                        provider,
                        job_id,
                        task.attempts,
                        task.waited.as_millis()
                    );
                    task.finish(TaskOutcome::Succeeded);
                    return Ok(result_ref);
                }
                PollBucket::TerminalFailure(err) => {
                    task.fail_with(&err);
                    return Err(err);
                }
                PollBucket::TerminalNotFound => {
                    task.finish(TaskOutcome::NotFound);
                    return Err(GenerationError::JobNotFound {
                        provider: provider.to_string(),
                        job_id: job_id.to_string(),
                    });
                }
                PollBucket::Transient => {
                    log::trace!("{} job {} still running (poll {})", provider, job_id, task.attempts);
                }
            },
            Err(err) if err.is_retryable() => {
                log::warn!(
                    "Transient error polling {} job {} (poll {}): {}",
                    provider,
                    job_id,
                    task.attempts,
                    err
                );
            }
            Err(err) => {
                task.fail_with(&err);
                return Err(err);
            }
        }

        delay = next_delay(delay, &config);
    }
}

fn timed_out(
    provider: &str,
    job_id: &str,
    task: &mut GenerationTask,
    elapsed: Duration,
) -> GenerationError {
    task.finish(TaskOutcome::TimedOut);
    GenerationError::PollingTimeout {
        provider: provider.to_string(),
        job_id: job_id.to_string(),
        attempts: task.attempts,
        elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::{MockAdapter, MockBehavior};

    fn fast() -> PollConfig {
        PollConfig {
            initial_delay: Duration::from_millis(1),
            multiplier: 1.5,
            max_delay: Duration::from_millis(4),
            max_attempts: 10,
            max_wait: Duration::from_secs(2),
        }
    }

    #[test]
    fn next_delay_grows_by_multiplier() {
        let config = PollConfig {
            initial_delay: Duration::from_millis(500),
            multiplier: 1.5,
            max_delay: Duration::from_secs(5),
            ..Default::default()
        };
        assert_eq!(
            next_delay(Duration::from_millis(500), &config),
            Duration::from_millis(750)
        );
    }

    #[test]
    fn next_delay_clamps_at_ceiling() {
        let config = PollConfig::default();
        assert_eq!(next_delay(Duration::from_secs(4), &config), config.max_delay);
        assert_eq!(next_delay(Duration::from_millis(3900), &config), config.max_delay);
    }

    #[test]
    fn delays_are_non_decreasing_until_ceiling() {
        let config = PollConfig {
            initial_delay: Duration::from_millis(300),
            multiplier: 1.2,
            max_delay: Duration::from_secs(2),
            ..Default::default()
        };
        let mut delay = config.initial_delay;
        let mut reached_ceiling = false;
        for _ in 0..50 {
            let next = next_delay(delay, &config);
            assert!(next >= delay, "{:?} < {:?}", next, delay);
            assert!(next <= config.max_delay);
            reached_ceiling |= next == config.max_delay;
            delay = next;
        }
        assert!(reached_ceiling);
    }

    #[test]
    fn multiplier_below_one_never_shrinks() {
        let config = PollConfig {
            multiplier: 0.5,
            ..Default::default()
        };
        assert_eq!(
            next_delay(Duration::from_secs(1), &config),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn classify_every_state() {
        assert!(matches!(
            classify("mock", PollStatus::pending()),
            PollBucket::Transient
        ));
        assert!(matches!(
            classify("mock", PollStatus::succeeded("https://cdn/x.png")),
            PollBucket::TerminalSuccess(r) if r == "https://cdn/x.png"
        ));
        assert!(matches!(
            classify("mock", PollStatus::failed("boom")),
            PollBucket::TerminalFailure(GenerationError::ProviderFailed { .. })
        ));
        assert!(matches!(
            classify("mock", PollStatus::moderated("nsfw")),
            PollBucket::TerminalFailure(GenerationError::ContentModerated { detail, .. }) if detail == "nsfw"
        ));
        assert!(matches!(
            classify("mock", PollStatus::not_found()),
            PollBucket::TerminalNotFound
        ));
    }

    #[test]
    fn success_without_result_is_failure() {
        let status = PollStatus {
            state: JobState::Succeeded,
            result_ref: None,
            error_detail: None,
        };
        assert!(matches!(
            classify("mock", status),
            PollBucket::TerminalFailure(_)
        ));
    }

    async fn submit_job(adapter: &MockAdapter, unit: usize) -> String {
        let request = crate::models::GenerationRequest::new("fox", "mock-provider");
        match crate::providers::ProviderAdapter::submit(adapter, &request, unit)
            .await
            .unwrap()
        {
            crate::providers::Submission::Job(id) => id,
            other => panic!("expected job, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn completes_after_scripted_polls() {
        let adapter = MockAdapter::new(vec![MockBehavior::SucceedAfter(2)]).with_polling(fast());
        let job = submit_job(&adapter, 0).await;
        let mut task = GenerationTask::new(0);

        let result = await_completion(&adapter, &job, &mut task, &CancellationToken::new()).await;
        assert!(result.is_ok());
        assert_eq!(task.attempts, 2);
        assert_eq!(task.outcome(), Some(TaskOutcome::Succeeded));
    }

    #[tokio::test]
    async fn gives_up_after_attempt_budget() {
        let adapter = MockAdapter::new(vec![MockBehavior::NeverFinish]).with_polling(fast());
        let job = submit_job(&adapter, 0).await;
        let mut task = GenerationTask::new(0);

        let started = Instant::now();
        let err = await_completion(&adapter, &job, &mut task, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::PollingTimeout { attempts: 10, .. }));
        assert_eq!(task.outcome(), Some(TaskOutcome::TimedOut));
        // Generous slack for scheduler jitter on top of the sleep bound.
        assert!(started.elapsed() < fast().worst_case_wait() + Duration::from_secs(1));
    }

    #[tokio::test]
    async fn gives_up_at_wall_clock_ceiling() {
        let config = PollConfig {
            initial_delay: Duration::from_millis(20),
            multiplier: 1.0,
            max_delay: Duration::from_millis(20),
            max_attempts: 1_000,
            max_wait: Duration::from_millis(100),
        };
        let adapter = MockAdapter::new(vec![MockBehavior::NeverFinish]).with_polling(config);
        let job = submit_job(&adapter, 0).await;
        let mut task = GenerationTask::new(0);

        let err = await_completion(&adapter, &job, &mut task, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::PollingTimeout { .. }));
        assert!(task.attempts < 1_000);
    }

    #[tokio::test]
    async fn ceiling_bounds_a_hung_status_call() {
        let config = PollConfig {
            initial_delay: Duration::from_millis(5),
            multiplier: 1.0,
            max_delay: Duration::from_millis(10),
            max_attempts: 3,
            max_wait: Duration::from_millis(100),
        };
        let adapter = MockAdapter::new(vec![MockBehavior::HangPoll(Duration::from_millis(1500))])
            .with_polling(config);
        let job = submit_job(&adapter, 0).await;
        let mut task = GenerationTask::new(0);

        let started = Instant::now();
        let err = await_completion(&adapter, &job, &mut task, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::PollingTimeout { .. }));
        assert_eq!(task.outcome(), Some(TaskOutcome::TimedOut));
        assert!(
            started.elapsed() < Duration::from_millis(600),
            "loop ran {:?} past a {:?} ceiling",
            started.elapsed(),
            config.max_wait
        );
    }

    #[tokio::test]
    async fn transient_poll_errors_keep_looping() {
        let adapter = MockAdapter::new(vec![MockBehavior::FlakyThenSucceed(3)]).with_polling(fast());
        let job = submit_job(&adapter, 0).await;
        let mut task = GenerationTask::new(0);

        let result = await_completion(&adapter, &job, &mut task, &CancellationToken::new()).await;
        assert!(result.is_ok());
        assert_eq!(task.attempts, 4);
    }

    #[tokio::test]
    async fn moderation_is_terminal_with_detail() {
        let adapter = MockAdapter::new(vec![MockBehavior::Moderate(
            "Derivative Works Filter".into(),
        )])
        .with_polling(fast());
        let job = submit_job(&adapter, 0).await;
        let mut task = GenerationTask::new(0);

        let err = await_completion(&adapter, &job, &mut task, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Derivative Works Filter"));
        assert_eq!(task.attempts, 1);
        assert_eq!(task.outcome(), Some(TaskOutcome::Moderated));
    }

    #[tokio::test]
    async fn vanished_job_is_not_found() {
        let adapter = MockAdapter::new(vec![MockBehavior::Vanish]).with_polling(fast());
        let job = submit_job(&adapter, 0).await;
        let mut task = GenerationTask::new(0);

        let err = await_completion(&adapter, &job, &mut task, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::JobNotFound { .. }));
        assert_eq!(task.outcome(), Some(TaskOutcome::NotFound));
    }

    #[tokio::test]
    async fn cancellation_interrupts_wait() {
        let config = PollConfig {
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(30),
            ..fast()
        };
        let adapter = MockAdapter::new(vec![MockBehavior::NeverFinish]).with_polling(config);
        let job = submit_job(&adapter, 0).await;
        let mut task = GenerationTask::new(0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = await_completion(&adapter, &job, &mut task, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Cancelled));
        assert_eq!(task.attempts, 0);
    }

    #[tokio::test]
    async fn settled_task_is_never_polled_again() {
        let adapter = MockAdapter::new(vec![MockBehavior::SucceedAfter(1)]).with_polling(fast());
        let job = submit_job(&adapter, 0).await;
        let mut task = GenerationTask::new(0);
        task.finish(TaskOutcome::Failed);

        assert!(await_completion(&adapter, &job, &mut task, &CancellationToken::new())
            .await
            .is_err());
        assert_eq!(adapter.total_polls(), 0);
    }
}
