use std::time::Duration;

use serde::Serialize;

use crate::error::{ErrorKind, GenerationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded,
    Failed,
    Moderated,
    NotFound,
    TimedOut,
    Rejected,
    Cancelled,
}

impl TaskOutcome {
    pub fn from_error(err: &GenerationError) -> Self {
        match err.kind() {
            ErrorKind::Moderated => TaskOutcome::Moderated,
            ErrorKind::NotFound => TaskOutcome::NotFound,
            ErrorKind::Timeout => TaskOutcome::TimedOut,
            ErrorKind::Rejected | ErrorKind::Configuration | ErrorKind::Validation => {
                TaskOutcome::Rejected
            }
            ErrorKind::Cancelled => TaskOutcome::Cancelled,
            _ => TaskOutcome::Failed,
        }
    }
}

/// In-memory unit of work for one item of a batch. Never persisted.
#[derive(Debug, Clone)]
pub struct GenerationTask {
    pub unit: usize,
    pub external_job_id: Option<String>,
    pub attempts: u32,
    pub waited: Duration,
    outcome: Option<TaskOutcome>,
}

impl GenerationTask {
    pub fn new(unit: usize) -> Self {
        Self {
            unit,
            external_job_id: None,
            attempts: 0,
            waited: Duration::ZERO,
            outcome: None,
        }
    }

    pub fn assign_job(&mut self, job_id: impl Into<String>) {
        self.external_job_id = Some(job_id.into());
    }

    pub fn record_poll(&mut self, waited: Duration) {
        self.attempts += 1;
        self.waited = waited;
    }

    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.outcome
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    /// Set the terminal outcome. Returns false if one was already recorded.
    pub fn finish(&mut self, outcome: TaskOutcome) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        self.outcome = Some(outcome);
        true
    }

    pub fn fail_with(&mut self, err: &GenerationError) -> bool {
        self.finish(TaskOutcome::from_error(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_is_monotonic() {
        let mut task = GenerationTask::new(0);
        assert!(!task.is_terminal());
        assert!(task.finish(TaskOutcome::Moderated));
        assert!(!task.finish(TaskOutcome::Succeeded));
        assert_eq!(task.outcome(), Some(TaskOutcome::Moderated));
    }

    #[test]
    fn records_polls() {
        let mut task = GenerationTask::new(2);
        task.assign_job("job-1");
        task.record_poll(Duration::from_millis(300));
        task.record_poll(Duration::from_millis(700));
        assert_eq!(task.attempts, 2);
        assert_eq!(task.waited, Duration::from_millis(700));
        assert_eq!(task.external_job_id.as_deref(), Some("job-1"));
    }

    #[test]
    fn outcome_from_error() {
        let err = GenerationError::PollingTimeout {
            provider: "flux".into(),
            job_id: "x".into(),
            attempts: 3,
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(TaskOutcome::from_error(&err), TaskOutcome::TimedOut);
        assert_eq!(
            TaskOutcome::from_error(&GenerationError::Persistence("disk".into())),
            TaskOutcome::Failed
        );
    }
}
