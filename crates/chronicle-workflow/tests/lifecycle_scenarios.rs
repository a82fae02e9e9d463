use async_trait::async_trait;
use chronicle_domain::SubmissionRequest;
use chronicle_workflow::stubs::{RecordingDispatcher, RecordingTrigger};
use chronicle_workflow::{AdapterError, CallbackEvent, CallbackHandler, JobLifecycleManager, WorkflowConfig,
                         WorkflowError, WorkflowTrigger};
use jobs::{ArtifactKind, InMemoryArtifactStore, InMemoryJobRepository, Job, JobFilter, JobRepository, JobStatus};
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, Notify};
use uuid::Uuid;

struct Harness {
    repo: Arc<InMemoryJobRepository>,
    trigger: Arc<RecordingTrigger>,
    dispatcher: Arc<RecordingDispatcher>,
    files: Arc<InMemoryArtifactStore>,
    manager: JobLifecycleManager,
    callbacks: CallbackHandler,
}

fn harness(kinds: &[&str]) -> Harness {
    let repo = Arc::new(InMemoryJobRepository::new());
    let trigger = Arc::new(RecordingTrigger::new());
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let files = Arc::new(InMemoryArtifactStore::new());
    let config = WorkflowConfig { artifact_kinds: kinds.iter().map(|k| ArtifactKind::new(*k)).collect(),
                                  ..WorkflowConfig::default() };
    let manager = JobLifecycleManager::new(repo.clone(), trigger.clone(), files.clone(), config);
    let callbacks = CallbackHandler::new(repo.clone(), dispatcher.clone());
    Harness { repo,
              trigger,
              dispatcher,
              files,
              manager,
              callbacks }
}

fn transcript() -> SubmissionRequest {
    SubmissionRequest::transcript("Ana Ruiz", "2024-05-01", "uploads/ana.txt").with_owner("u1")
}

// J1: A y luego B
#[tokio::test]
async fn j1_two_artifacts_complete_and_notify_once() {
    let h = harness(&["A", "B"]);
    let job = h.manager.submit(&transcript()).await.unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.name, "Ana Ruiz - 2024-05-01");

    let calls = h.trigger.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, job.id);
    assert_eq!(calls[0].1["outputPath"], "ana-ruiz-2024-05-01");
    assert_eq!(calls[0].1["attempt"], 1);

    let t = h.callbacks.apply_callback(&CallbackEvent::ready(job.id, "A", "out/a.md")).await.unwrap();
    assert_eq!(t.after.status, JobStatus::Processing);
    assert_eq!(h.dispatcher.count(), 0);

    let t = h.callbacks.apply_callback(&CallbackEvent::ready(job.id, "B", "out/b.md")).await.unwrap();
    assert_eq!(t.after.status, JobStatus::Complete);
    assert!(t.after.completed_at.is_some());
    assert_eq!(h.dispatcher.count(), 1);
    assert_eq!(h.dispatcher.notified(), vec![job.id]);
}

// J2: B, A y un A repetido
#[tokio::test]
async fn j2_out_of_order_and_duplicate_callbacks() {
    let h = harness(&["A", "B"]);
    let job = h.manager.submit(&transcript()).await.unwrap();
    h.callbacks.apply_callback(&CallbackEvent::ready(job.id, "B", "out/b.md")).await.unwrap();
    h.callbacks.apply_callback(&CallbackEvent::ready(job.id, "A", "out/a.md")).await.unwrap();
    let completed = h.repo.get(&job.id).unwrap();

    let t = h.callbacks.apply_callback(&CallbackEvent::ready(job.id, "A", "out/other.md")).await.unwrap();
    assert!(!t.changed());
    let after = h.repo.get(&job.id).unwrap();
    assert_eq!(after, completed);
    assert_eq!(after.artifacts["A"].location(), Some("out/a.md"));
    assert_eq!(h.dispatcher.count(), 1);
}

#[tokio::test]
async fn invalid_submission_is_not_persisted() {
    let h = harness(&["A"]);
    let err = h.manager.submit(&SubmissionRequest::default()).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));
    assert!(h.repo.is_empty());
    assert!(h.trigger.calls().is_empty());
}

#[tokio::test]
async fn trigger_failure_is_absorbed_into_job_state() {
    let h = harness(&["A", "B"]);
    h.trigger.fail_next("workflow unreachable");
    let job = h.manager.submit(&transcript()).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_detail.as_deref(), Some("workflow unreachable"));
    assert!(job.completed_at.is_some());
    assert_eq!(h.repo.get(&job.id).unwrap(), job);
}

#[tokio::test]
async fn retry_resets_and_triggers_new_attempt() {
    let h = harness(&["A", "B"]);
    h.trigger.fail_next("timeout");
    let job = h.manager.submit(&SubmissionRequest::media("https://youtu.be/vid9", "a@b.co")).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);

    let retried = h.manager.retry(&job.id).await.unwrap();
    assert_eq!(retried.status, JobStatus::Processing);
    assert_eq!(retried.attempt, 2);
    assert!(retried.completed_at.is_none());
    assert!(retried.error_detail.is_none());
    assert!(retried.readiness().values().all(|r| !r));

    let calls = h.trigger.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].1["outputPath"], "vid9-1");
    assert_eq!(calls[1].1["outputPath"], "vid9-2");
}

#[tokio::test]
async fn retry_is_rejected_unless_failed_or_cancelled() {
    let h = harness(&["A"]);
    let job = h.manager.submit(&transcript()).await.unwrap();
    let err = h.manager.retry(&job.id).await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidState { status: JobStatus::Processing, operation: "retry", .. }));
}

#[tokio::test]
async fn cancel_rules_and_late_callbacks() {
    let h = harness(&["A", "B"]);
    let job = h.manager.submit(&transcript()).await.unwrap();
    let cancelled = h.manager.cancel(&job.id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    let completed_at = cancelled.completed_at;
    assert!(completed_at.is_some());
    assert_eq!(h.trigger.calls().len(), 1);

    // cancelar otra vez no cambia nada
    let again = h.manager.cancel(&job.id).await.unwrap();
    assert_eq!(again.completed_at, completed_at);

    // un callback tardío se ignora
    let t = h.callbacks.apply_callback(&CallbackEvent::ready(job.id, "A", "a.md")).await.unwrap();
    assert!(!t.changed());
    assert_eq!(h.repo.get(&job.id).unwrap().status, JobStatus::Cancelled);

    // un trabajo completo no se puede cancelar
    let done = h.manager.submit(&transcript()).await.unwrap();
    for k in ["A", "B"] {
        h.callbacks.apply_callback(&CallbackEvent::ready(done.id, k, "x.md")).await.unwrap();
    }
    let err = h.manager.cancel(&done.id).await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidState { status: JobStatus::Complete, operation: "cancel", .. }));
}

#[tokio::test]
async fn callback_errors_are_typed() {
    let h = harness(&["A"]);
    let job = h.manager.submit(&transcript()).await.unwrap();

    let unknown_job = CallbackEvent::ready(Uuid::new_v4(), "A", "a.md");
    assert!(matches!(h.callbacks.apply_callback(&unknown_job).await, Err(WorkflowError::NotFound(_))));

    let unknown_kind = CallbackEvent::ready(job.id, "Z", "z.md");
    assert!(matches!(h.callbacks.apply_callback(&unknown_kind).await,
                     Err(WorkflowError::UnknownArtifactKind(k)) if k == "Z"));

    let mut no_location = CallbackEvent::ready(job.id, "A", "a.md");
    no_location.location = None;
    assert!(matches!(h.callbacks.apply_callback(&no_location).await, Err(WorkflowError::Validation(_))));
    assert_eq!(h.repo.get(&job.id).unwrap().version, job.version);
}

#[tokio::test]
async fn artifact_failure_keeps_siblings_going_unless_fail_job() {
    let h = harness(&["A", "B", "C"]);
    let job = h.manager.submit(&transcript()).await.unwrap();

    let t = h.callbacks.apply_callback(&CallbackEvent::failed(job.id, "A", "llm timeout")).await.unwrap();
    assert_eq!(t.after.status, JobStatus::Processing);
    assert_eq!(t.after.error_detail.as_deref(), Some("A: llm timeout"));

    h.callbacks.apply_callback(&CallbackEvent::ready(job.id, "B", "b.md")).await.unwrap();
    let mut fatal = CallbackEvent::failed(job.id, "C", "workflow crashed");
    fatal.fail_job = true;
    let t = h.callbacks.apply_callback(&fatal).await.unwrap();
    assert_eq!(t.after.status, JobStatus::Failed);
    assert!(t.after.completed_at.is_some());
    assert_eq!(h.dispatcher.count(), 0);
}

#[tokio::test]
async fn dispatcher_errors_are_not_propagated() {
    let repo = Arc::new(InMemoryJobRepository::new());
    let dispatcher = Arc::new(RecordingDispatcher::failing());
    let config = WorkflowConfig { artifact_kinds: vec![ArtifactKind::new("A")],
                                  ..WorkflowConfig::default() };
    let manager = JobLifecycleManager::new(repo.clone(),
                                           Arc::new(RecordingTrigger::new()),
                                           Arc::new(InMemoryArtifactStore::new()),
                                           config);
    let callbacks = CallbackHandler::new(repo.clone(), dispatcher.clone());
    let job = manager.submit(&transcript()).await.unwrap();
    let t = callbacks.apply_callback(&CallbackEvent::ready(job.id, "A", "a.md")).await.unwrap();
    assert!(t.entered(JobStatus::Complete));
    assert_eq!(dispatcher.count(), 1);
}

#[tokio::test]
async fn delete_cascades_to_artifacts_and_transcript() {
    let h = harness(&["A", "B"]);
    let job = h.manager.submit(&transcript()).await.unwrap();
    h.callbacks.apply_callback(&CallbackEvent::ready(job.id, "A", "ana-ruiz-2024-05-01/a.md")).await.unwrap();

    let removed = h.manager.delete(&job.id).await.unwrap();
    assert_eq!(removed.id, job.id);
    assert_eq!(h.files.removed(), vec!["ana-ruiz-2024-05-01/a.md".to_string(), "uploads/ana.txt".to_string()]);
    assert!(matches!(h.manager.get(&job.id).await, Err(WorkflowError::NotFound(_))));
    assert!(matches!(h.manager.delete(&job.id).await, Err(WorkflowError::NotFound(_))));
}

#[tokio::test]
async fn active_stats_and_activity() {
    let h = harness(&["A"]);
    let running = h.manager.submit(&transcript()).await.unwrap();
    let done = h.manager.submit(&transcript()).await.unwrap();
    h.callbacks.apply_callback(&CallbackEvent::ready(done.id, "A", "a.md")).await.unwrap();

    let active = h.manager.active().await.unwrap();
    assert_eq!(active.iter().map(|j| j.id).collect::<Vec<_>>(), vec![running.id]);

    let stats = h.manager.stats(chrono::Utc::now().date_naive()).await.unwrap();
    assert_eq!(stats.processing_count, 1);
    assert_eq!(stats.completed_today, 1);

    let feed = h.manager.activity(20).await.unwrap();
    assert_eq!(feed.len(), 2);
    assert_eq!(feed[0].job_id, done.id);

    let mine = h.manager.list(&JobFilter::for_owner("u1")).await.unwrap();
    assert_eq!(mine.len(), 2);
}

#[tokio::test]
async fn ready_with_fail_job_on_last_artifact_fails_the_job() {
    let h = harness(&["A", "B"]);
    let job = h.manager.submit(&transcript()).await.unwrap();
    h.callbacks.apply_callback(&CallbackEvent::ready(job.id, "A", "a.md")).await.unwrap();

    let mut event = CallbackEvent::ready(job.id, "B", "b.md");
    event.fail_job = true;
    let t = h.callbacks.apply_callback(&event).await.unwrap();
    assert!(t.entered(JobStatus::Failed));
    assert!(!t.after.readiness()["B"]);
    assert!(t.after.error_detail.is_some());

    let stored = h.repo.get(&job.id).unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(h.dispatcher.count(), 0);
}

#[tokio::test]
async fn retry_from_cancelled_starts_a_fresh_attempt() {
    let h = harness(&["A", "B"]);
    let job = h.manager.submit(&transcript()).await.unwrap();
    h.callbacks.apply_callback(&CallbackEvent::ready(job.id, "A", "a.md")).await.unwrap();
    h.manager.cancel(&job.id).await.unwrap();

    let retried = h.manager.retry(&job.id).await.unwrap();
    assert_eq!(retried.status, JobStatus::Processing);
    assert_eq!(retried.attempt, 2);
    assert!(retried.completed_at.is_none());
    assert!(retried.readiness().values().all(|r| !r));
    assert_eq!(h.trigger.calls()[1].1["attempt"], 2);
}

/// Disparador cuya primera llamada queda retenida hasta `release`.
#[derive(Default)]
struct HeldTrigger {
    attempts: Mutex<Vec<u64>>,
    held: Mutex<Option<oneshot::Receiver<Result<(), AdapterError>>>>,
    started: Notify,
}

impl HeldTrigger {
    fn hold_first() -> (Arc<Self>, oneshot::Sender<Result<(), AdapterError>>) {
        let (tx, rx) = oneshot::channel();
        let trigger = HeldTrigger::default();
        *trigger.held.lock().unwrap() = Some(rx);
        (Arc::new(trigger), tx)
    }

    fn attempts(&self) -> Vec<u64> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkflowTrigger for HeldTrigger {
    async fn trigger(&self, _job_id: Uuid, payload: &JsonValue) -> Result<(), AdapterError> {
        self.attempts.lock().unwrap().push(payload["attempt"].as_u64().unwrap_or_default());
        let held = self.held.lock().unwrap().take();
        match held {
            Some(rx) => {
                self.started.notify_one();
                rx.await.unwrap_or(Ok(()))
            }
            None => Ok(()),
        }
    }
}

struct HeldHarness {
    repo: Arc<InMemoryJobRepository>,
    trigger: Arc<HeldTrigger>,
    release: oneshot::Sender<Result<(), AdapterError>>,
    manager: Arc<JobLifecycleManager>,
}

fn held_harness() -> HeldHarness {
    let repo = Arc::new(InMemoryJobRepository::new());
    let (trigger, release) = HeldTrigger::hold_first();
    let config = WorkflowConfig { artifact_kinds: vec![ArtifactKind::new("A"), ArtifactKind::new("B")],
                                  ..WorkflowConfig::default() };
    let manager = Arc::new(JobLifecycleManager::new(repo.clone(),
                                                    trigger.clone(),
                                                    Arc::new(InMemoryArtifactStore::new()),
                                                    config));
    HeldHarness { repo,
                  trigger,
                  release,
                  manager }
}

async fn submit_in_flight(h: &HeldHarness) -> (tokio::task::JoinHandle<Job>, Uuid) {
    let manager = h.manager.clone();
    let submit = tokio::spawn(async move { manager.submit(&transcript()).await.unwrap() });
    h.trigger.started.notified().await;
    let pending = h.repo.list(&JobFilter::default()).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].status, JobStatus::Pending);
    (submit, pending[0].id)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_while_trigger_in_flight_stays_cancelled() {
    let h = held_harness();
    let (submit, id) = submit_in_flight(&h).await;

    let cancelled = h.manager.cancel(&id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);

    h.release.send(Ok(())).unwrap();
    let returned = submit.await.unwrap();
    assert_eq!(returned.status, JobStatus::Cancelled);
    let stored = h.repo.get(&id).unwrap();
    assert_eq!(stored.status, JobStatus::Cancelled);
    assert_eq!(stored.completed_at, cancelled.completed_at);
    assert!(stored.error_detail.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn late_trigger_failure_does_not_touch_newer_attempt() {
    let h = held_harness();
    let (submit, id) = submit_in_flight(&h).await;

    h.manager.cancel(&id).await.unwrap();
    let retried = h.manager.retry(&id).await.unwrap();
    assert_eq!(retried.status, JobStatus::Processing);
    assert_eq!(retried.attempt, 2);

    // llega el fallo del disparo del intento 1
    h.release.send(Err(AdapterError::new("timeout del intento 1"))).unwrap();
    let returned = submit.await.unwrap();
    assert_eq!(returned.attempt, 2);
    assert_eq!(returned.status, JobStatus::Processing);

    let stored = h.repo.get(&id).unwrap();
    assert_eq!(stored.status, JobStatus::Processing);
    assert_eq!(stored.attempt, 2);
    assert!(stored.error_detail.is_none());
    assert!(stored.completed_at.is_none());
    assert_eq!(stored, retried);
    assert_eq!(h.trigger.attempts(), vec![1, 2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn late_trigger_success_does_not_revive_cancelled_job() {
    let h = held_harness();
    let (submit, id) = submit_in_flight(&h).await;

    h.manager.cancel(&id).await.unwrap();
    let cancelled = h.repo.get(&id).unwrap();
    h.release.send(Ok(())).unwrap();
    submit.await.unwrap();
    assert_eq!(h.repo.get(&id).unwrap(), cancelled);

    let retried = h.manager.retry(&id).await.unwrap();
    assert_eq!(retried.attempt, 2);
    assert_eq!(retried.status, JobStatus::Processing);
}
