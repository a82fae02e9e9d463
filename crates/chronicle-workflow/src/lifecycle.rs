use crate::adapters::WorkflowTrigger;
use crate::blocking::on_store;
use crate::config::WorkflowConfig;
use crate::errors::{Result, WorkflowError};
use crate::reporting::{activity_feed, dashboard_stats, ActivityEntry, DashboardStats};
use chrono::{NaiveDate, Utc};
use chronicle_domain::{trigger_payload, SubmissionRequest};
use jobs::{ArtifactStore, Job, JobFilter, JobRepository, JobStatus};
use std::sync::Arc;
use uuid::Uuid;

/// Coordina el ciclo de vida de los trabajos: envío, disparo del flujo
/// externo, cancelación, reintento y borrado.
///
/// No mantiene estado propio: cada operación es una lectura/actualización
/// atómica sobre el `JobRepository`. Los colaboradores se invocan siempre
/// fuera de la actualización, con el registro ya confirmado.
pub struct JobLifecycleManager {
    repo: Arc<dyn JobRepository>,
    trigger: Arc<dyn WorkflowTrigger>,
    artifacts: Arc<dyn ArtifactStore>,
    config: WorkflowConfig,
}

impl JobLifecycleManager {
    pub fn new(repo: Arc<dyn JobRepository>,
               trigger: Arc<dyn WorkflowTrigger>,
               artifacts: Arc<dyn ArtifactStore>,
               config: WorkflowConfig)
               -> Self {
        Self { repo,
               trigger,
               artifacts,
               config }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Valida la entrada, crea el trabajo en `pending` y dispara el flujo.
    ///
    /// Un fallo del disparador no es un error de la operación: el trabajo
    /// queda `failed` con el motivo en `error_detail` y se devuelve igual.
    pub async fn submit(&self, request: &SubmissionRequest) -> Result<Job> {
        let submission = request.validate()?;
        let payload = submission.payload()?;
        let job = Job::new(submission.name.clone(),
                           &self.config.artifact_kinds,
                           submission.owner_ref.clone(),
                           payload)?;
        let repo = self.repo.clone();
        let job = on_store(move || repo.create(job)).await?;
        log::info!("job {} enviado ({}, {})", job.id, job.name, submission.source);
        self.fire_trigger(job).await
    }

    /// Cancela un trabajo. `InvalidState` si ya está completo.
    pub async fn cancel(&self, id: &Uuid) -> Result<Job> {
        let now = Utc::now();
        let repo = self.repo.clone();
        let job_id = *id;
        let t = on_store(move || {
                    repo.update(&job_id, &mut |job| {
                            let mut next = job.clone();
                            next.cancel(now)?;
                            Ok(next)
                        })
                })
                .await?;
        if t.entered(JobStatus::Cancelled) {
            log::info!("job {} cancelado (estaba {})", id, t.before.status);
        }
        Ok(t.after)
    }

    /// Reinicia un trabajo `failed` o `cancelled` y lo vuelve a disparar.
    pub async fn retry(&self, id: &Uuid) -> Result<Job> {
        let repo = self.repo.clone();
        let job_id = *id;
        let t = on_store(move || {
                    repo.update(&job_id, &mut |job| {
                            let mut next = job.clone();
                            next.reset_for_retry()?;
                            Ok(next)
                        })
                })
                .await?;
        log::info!("job {} reintentado (intento {})", id, t.after.attempt);
        self.fire_trigger(t.after).await
    }

    /// Elimina el trabajo y, en cascada, sus artefactos y la transcripción
    /// subida. Los fallos al borrar ficheros se registran pero no se
    /// propagan.
    pub async fn delete(&self, id: &Uuid) -> Result<Job> {
        let repo = self.repo.clone();
        let job_id = *id;
        let deleted = on_store(move || repo.delete(&job_id)).await?;
        let job = deleted.ok_or(WorkflowError::NotFound(*id))?;
        let mut locations: Vec<String> =
            job.artifacts.values().filter_map(|s| s.location().map(str::to_string)).collect();
        if let Some(path) = job.payload.get("transcriptPath").and_then(|v| v.as_str()) {
            locations.push(path.to_string());
        }
        let artifacts = self.artifacts.clone();
        let removed = on_store(move || {
                          for location in &locations {
                              if let Err(e) = artifacts.remove(location) {
                                  log::warn!("job {}: no se pudo eliminar {}: {}", job_id, location, e);
                              }
                          }
                          Ok(locations.len())
                      })
                      .await?;
        log::info!("job {} eliminado ({} ficheros)", id, removed);
        Ok(job)
    }

    pub async fn get(&self, id: &Uuid) -> Result<Job> {
        let repo = self.repo.clone();
        let job_id = *id;
        on_store(move || repo.get(&job_id)).await
    }

    pub async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        self.load(filter.clone()).await
    }

    /// Trabajos en `pending` o `processing`, más recientes primero.
    pub async fn active(&self) -> Result<Vec<Job>> {
        self.load(JobFilter::active()).await
    }

    pub async fn stats(&self, day: NaiveDate) -> Result<DashboardStats> {
        let jobs = self.load(JobFilter::default()).await?;
        Ok(dashboard_stats(&jobs, day))
    }

    pub async fn activity(&self, limit: usize) -> Result<Vec<ActivityEntry>> {
        let jobs = self.load(JobFilter::default()).await?;
        Ok(activity_feed(&jobs, limit))
    }

    async fn load(&self, filter: JobFilter) -> Result<Vec<Job>> {
        let repo = self.repo.clone();
        on_store(move || repo.list(&filter)).await
    }

    /// Dispara el flujo para el intento actual de `job` y registra el
    /// resultado. Si entretanto el trabajo pasó a otro intento (cancelado y
    /// reintentado), el resultado de este disparo se descarta.
    async fn fire_trigger(&self, job: Job) -> Result<Job> {
        let payload = trigger_payload(&job.payload, job.id, job.attempt)?;
        let outcome = self.trigger.trigger(job.id, &payload).await;
        if let Err(e) = &outcome {
            log::warn!("job {}: fallo al disparar el flujo: {}", job.id, e);
        }
        let attempt = job.attempt;
        let now = Utc::now();
        let repo = self.repo.clone();
        let job_id = job.id;
        let t = on_store(move || {
                    repo.update(&job_id, &mut |current| {
                            let mut next = current.clone();
                            if current.attempt != attempt {
                                return Ok(next);
                            }
                            match &outcome {
                                Ok(()) => {
                                    next.mark_processing();
                                }
                                Err(e) => {
                                    next.mark_failed(&e.to_string(), now);
                                }
                            }
                            Ok(next)
                        })
                })
                .await?;
        if t.entered(JobStatus::Processing) {
            log::info!("job {} en proceso (intento {})", job.id, attempt);
        } else if t.after.attempt != attempt {
            log::debug!("job {}: resultado del disparo del intento {} descartado", job.id, attempt);
        }
        Ok(t.after)
    }
}
