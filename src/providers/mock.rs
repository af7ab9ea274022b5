//! Scriptable in-process provider. Each unit of a batch follows the
//! behavior at its index in the script; units past the end use the default.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::{GenerationError, Result},
    models::{GenerationRequest, ModelSpec, ProviderKind, MOCK_PROVIDER},
    polling::PollConfig,
    providers::traits::{PollStatus, ProviderAdapter, ResultPayload, Submission},
};

const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Report pending until the nth poll, then succeed.
    SucceedAfter(u32),
    /// Return the payload straight from `submit`.
    Immediate,
    RejectSubmit(String),
    Moderate(String),
    Fail(String),
    /// The job disappears server-side.
    Vanish,
    NeverFinish,
    /// Poll calls error transiently n times, then succeed.
    FlakyThenSucceed(u32),
    /// Job succeeds but the result download fails.
    BrokenDownload,
    /// Every status call stalls this long, then reports pending.
    HangPoll(Duration),
}

#[derive(Debug)]
struct MockJob {
    unit: usize,
    behavior: MockBehavior,
    polls: u32,
}

pub struct MockAdapter {
    spec: &'static ModelSpec,
    script: Vec<MockBehavior>,
    fallback: MockBehavior,
    polling: PollConfig,
    jobs: Mutex<HashMap<String, MockJob>>,
    submissions: AtomicUsize,
    polls: AtomicU32,
}

impl MockAdapter {
    pub fn new(script: Vec<MockBehavior>) -> Self {
        Self {
            spec: &MOCK_PROVIDER,
            script,
            fallback: MockBehavior::SucceedAfter(1),
            polling: PollConfig {
                initial_delay: Duration::from_millis(2),
                multiplier: 1.5,
                max_delay: Duration::from_millis(10),
                max_attempts: 20,
                max_wait: Duration::from_secs(5),
            },
            jobs: Mutex::new(HashMap::new()),
            submissions: AtomicUsize::new(0),
            polls: AtomicU32::new(0),
        }
    }

    /// Every unit behaves the same way.
    pub fn always(behavior: MockBehavior) -> Self {
        let mut adapter = Self::new(Vec::new());
        adapter.fallback = behavior;
        adapter
    }

    pub fn with_polling(mut self, polling: PollConfig) -> Self {
        self.polling = polling;
        self
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn total_polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    fn behavior_for(&self, unit: usize) -> MockBehavior {
        self.script
            .get(unit)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    fn payload(unit: usize, tag: &str) -> ResultPayload {
        let mut bytes = PNG_MAGIC.to_vec();
        bytes.extend_from_slice(format!("mock unit {} {}", unit, tag).as_bytes());
        ResultPayload::new(bytes, "image/png")
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Mock
    }

    fn model(&self) -> &'static ModelSpec {
        self.spec
    }

    fn polling(&self) -> PollConfig {
        self.polling
    }

    async fn submit(&self, _request: &GenerationRequest, unit: usize) -> Result<Submission> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior_for(unit);

        match behavior {
            MockBehavior::RejectSubmit(message) => Err(GenerationError::SubmissionRejected {
                provider: "mock".into(),
                status: Some(400),
                message,
            }),
            MockBehavior::Immediate => Ok(Submission::Immediate(Self::payload(unit, "inline"))),
            behavior => {
                let job_id = format!("mock-{}-{}", unit, Uuid::new_v4());
                let mut jobs = self
                    .jobs
                    .lock()
                    .map_err(|_| GenerationError::transient("mock", "job table poisoned"))?;
                jobs.insert(
                    job_id.clone(),
                    MockJob {
                        unit,
                        behavior,
                        polls: 0,
                    },
                );
                Ok(Submission::Job(job_id))
            }
        }
    }

    async fn poll_status(&self, job_id: &str) -> Result<PollStatus> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let stall = match self
            .jobs
            .lock()
            .map_err(|_| GenerationError::transient("mock", "job table poisoned"))?
            .get(job_id)
            .map(|job| &job.behavior)
        {
            Some(MockBehavior::HangPoll(stall)) => Some(*stall),
            _ => None,
        };
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
            return Ok(PollStatus::pending());
        }

        let mut jobs = self
            .jobs
            .lock()
            .map_err(|_| GenerationError::transient("mock", "job table poisoned"))?;
        let Some(job) = jobs.get_mut(job_id) else {
            return Ok(PollStatus::not_found());
        };
        job.polls += 1;
        let result_ref = format!("mock://{}", job_id);

        Ok(match &job.behavior {
            MockBehavior::SucceedAfter(n) if job.polls >= *n => PollStatus::succeeded(result_ref),
            MockBehavior::SucceedAfter(_)
            | MockBehavior::NeverFinish
            | MockBehavior::HangPoll(_) => PollStatus::pending(),
            MockBehavior::Moderate(detail) => PollStatus::moderated(detail.clone()),
            MockBehavior::Fail(detail) => PollStatus::failed(detail.clone()),
            MockBehavior::Vanish => PollStatus::not_found(),
            MockBehavior::FlakyThenSucceed(n) => {
                if job.polls <= *n {
                    return Err(GenerationError::transient("mock", "502 Bad Gateway"));
                }
                PollStatus::succeeded(result_ref)
            }
            MockBehavior::BrokenDownload => PollStatus::succeeded(format!("{}#broken", result_ref)),
            MockBehavior::Immediate | MockBehavior::RejectSubmit(_) => PollStatus::failed(
                "job should never have been queued".to_string(),
            ),
        })
    }

    async fn fetch_result(&self, result_ref: &str) -> Result<ResultPayload> {
        if result_ref.ends_with("#broken") {
            return Err(GenerationError::transient("mock", "result download reset"));
        }
        let job_id = result_ref.trim_start_matches("mock://");
        let jobs = self
            .jobs
            .lock()
            .map_err(|_| GenerationError::transient("mock", "job table poisoned"))?;
        let job = jobs.get(job_id).ok_or_else(|| GenerationError::JobNotFound {
            provider: "mock".into(),
            job_id: job_id.to_string(),
        })?;
        Ok(Self::payload(job.unit, job_id))
    }
}
