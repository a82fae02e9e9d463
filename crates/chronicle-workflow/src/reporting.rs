use chrono::{DateTime, NaiveDate, Utc};
use jobs::{Job, JobStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Contadores del panel principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    /// Trabajos en `pending` o `processing`.
    pub processing_count: usize,
    /// Trabajos completados en el día indicado (UTC).
    pub completed_today: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Complete,
    Error,
    Submission,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub job_id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub timestamp: DateTime<Utc>,
}

pub fn dashboard_stats(jobs: &[Job], day: NaiveDate) -> DashboardStats {
    let processing_count = jobs.iter()
                               .filter(|j| matches!(j.status, JobStatus::Pending | JobStatus::Processing))
                               .count();
    let completed_today = jobs.iter()
                              .filter(|j| j.status == JobStatus::Complete)
                              .filter(|j| j.completed_at.map(|t| t.date_naive() == day).unwrap_or(false))
                              .count();
    DashboardStats { processing_count,
                     completed_today }
}

/// Últimos `limit` trabajos, ordenados por `completedAt` o, si no hay,
/// por `submittedAt`.
pub fn activity_feed(jobs: &[Job], limit: usize) -> Vec<ActivityEntry> {
    let mut sorted: Vec<&Job> = jobs.iter().collect();
    sorted.sort_by(|a, b| {
              let ka = a.completed_at.unwrap_or(a.submitted_at);
              let kb = b.completed_at.unwrap_or(b.submitted_at);
              kb.cmp(&ka).then_with(|| a.id.cmp(&b.id))
          });
    sorted.into_iter()
          .take(limit)
          .map(|job| {
              let (kind, timestamp) = match (job.status, job.completed_at) {
                  (JobStatus::Complete, Some(at)) => (ActivityKind::Complete, at),
                  (JobStatus::Failed, _) => (ActivityKind::Error, job.submitted_at),
                  _ => (ActivityKind::Submission, job.submitted_at),
              };
              ActivityEntry { job_id: job.id,
                              name: job.name.clone(),
                              kind,
                              timestamp }
          })
          .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use jobs::{ArtifactKind, ArtifactOutcome};
    use serde_json::json;

    fn job(name: &str) -> Job {
        Job::new(name, &[ArtifactKind::new("notes")], None, json!({})).unwrap()
    }

    fn completed(name: &str, at: DateTime<Utc>) -> Job {
        let mut j = job(name);
        j.apply_outcome("notes", &ArtifactOutcome::Ready { location: "n.md".into() }, false, at)
         .unwrap();
        j
    }

    #[test]
    fn stats_count_active_and_completed_today() {
        let now = Utc::now();
        let mut failed = job("f");
        failed.mark_failed("x", now);
        let jobs = vec![job("p"),
                        completed("today", now),
                        completed("yesterday", now - Duration::days(1)),
                        failed];
        let stats = dashboard_stats(&jobs, now.date_naive());
        assert_eq!(stats, DashboardStats { processing_count: 1, completed_today: 1 });
    }

    #[test]
    fn feed_orders_by_completion_or_submission() {
        let now = Utc::now();
        let mut failed = job("failed");
        failed.mark_failed("boom", now + Duration::seconds(5));
        let mut cancelled = job("cancelled");
        cancelled.cancel(now + Duration::seconds(1)).unwrap();
        let jobs = vec![job("pending"), completed("done", now + Duration::seconds(10)), failed, cancelled];

        let feed = activity_feed(&jobs, 3);
        assert_eq!(feed.len(), 3);
        assert_eq!(feed[0].name, "done");
        assert_eq!(feed[0].kind, ActivityKind::Complete);
        assert_eq!(feed[1].name, "failed");
        assert_eq!(feed[1].kind, ActivityKind::Error);
        assert_eq!(feed[2].kind, ActivityKind::Submission);
        assert_eq!(serde_json::to_value(&feed[0]).unwrap()["type"], "complete");
    }
}
