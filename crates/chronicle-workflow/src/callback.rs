use crate::adapters::NotificationDispatcher;
use crate::blocking::on_store;
use crate::errors::{Result, WorkflowError};
use chrono::Utc;
use jobs::{ArtifactOutcome, JobRepository, JobStatus, Transition};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Evento que envía el flujo externo cuando termina (o falla) un artefacto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackEvent {
    pub job_id: Uuid,
    pub artifact_kind: String,
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// El flujo indica que el trabajo entero no puede continuar.
    #[serde(default)]
    pub fail_job: bool,
}

impl CallbackEvent {
    pub fn ready(job_id: Uuid, artifact_kind: &str, location: &str) -> Self {
        Self { job_id,
               artifact_kind: artifact_kind.to_string(),
               ready: true,
               location: Some(location.to_string()),
               error: None,
               fail_job: false }
    }

    pub fn failed(job_id: Uuid, artifact_kind: &str, error: &str) -> Self {
        Self { job_id,
               artifact_kind: artifact_kind.to_string(),
               ready: false,
               location: None,
               error: Some(error.to_string()),
               fail_job: false }
    }

    pub fn from_json(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }

    /// Traduce el evento a un resultado de artefacto. Un `ready: true` sin
    /// ubicación es un error de validación.
    pub fn outcome(&self) -> Result<ArtifactOutcome> {
        if self.ready {
            match self.location.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
                Some(location) => Ok(ArtifactOutcome::Ready { location: location.to_string() }),
                None => Err(WorkflowError::Validation(format!("callback de {} listo sin ubicacion",
                                                              self.artifact_kind))),
            }
        } else {
            let error = self.error.clone().unwrap_or_else(|| "error no especificado".to_string());
            Ok(ArtifactOutcome::Failed { error })
        }
    }
}

/// Aplica callbacks de artefactos y avisa al dispatcher cuando un trabajo
/// pasa a `complete`.
pub struct CallbackHandler {
    repo: Arc<dyn JobRepository>,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl CallbackHandler {
    pub fn new(repo: Arc<dyn JobRepository>, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { repo, dispatcher }
    }

    /// Marca el artefacto del evento y recalcula el estado en una sola
    /// actualización atómica. Sólo la actualización que lleva el trabajo a
    /// `complete` notifica, así que la notificación es única aunque lleguen
    /// callbacks concurrentes o repetidos.
    pub async fn apply_callback(&self, event: &CallbackEvent) -> Result<Transition> {
        let outcome = event.outcome()?;
        let now = Utc::now();
        let repo = self.repo.clone();
        let id = event.job_id;
        let kind = event.artifact_kind.clone();
        let fail_job = event.fail_job;
        let t = on_store(move || {
                    repo.update(&id, &mut |job| {
                            let mut next = job.clone();
                            next.apply_outcome(&kind, &outcome, fail_job, now)?;
                            Ok(next)
                        })
                })
                .await?;

        if !t.changed() {
            if t.before.status.is_terminal() {
                log::warn!("callback de {} ignorado: job {} ya esta {}",
                           event.artifact_kind, event.job_id, t.before.status);
            } else {
                log::debug!("callback repetido de {} para job {}", event.artifact_kind, event.job_id);
            }
            return Ok(t);
        }

        if t.entered(JobStatus::Failed) {
            log::warn!("job {} fallido por callback de {}", event.job_id, event.artifact_kind);
        }
        if t.entered(JobStatus::Complete) {
            log::info!("job {} completo", event.job_id);
            if let Err(e) = self.dispatcher.notify(event.job_id, &t.after).await {
                log::warn!("job {}: fallo al notificar: {}", event.job_id, e);
            }
        }
        Ok(t)
    }
}
