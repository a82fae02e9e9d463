// Archivo: domain.rs
// Propósito: tipos del registro de trabajos (`Job`, `JobStatus`,
// `ArtifactKind`, `ArtifactSlot`) y las transiciones legales de la máquina
// de estados. Las transiciones mutan una copia del trabajo; la atomicidad
// la garantiza el `JobRepository` que ejecuta la mutación.
use crate::aggregate::{aggregate, next_status, ReadinessSummary};
use crate::errors::{JobError, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Artefactos que genera el flujo externo cuando no se configura otro
/// conjunto.
pub const DEFAULT_ARTIFACT_KINDS: [&str; 5] = ["cleanTranscript", "notes", "keywordStudy", "leadersGuide", "membersHandout"];

/// Estado agregado de un trabajo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Complete,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// `Complete`, `Failed` y `Cancelled` son terminales.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed | JobStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "complete" => Ok(JobStatus::Complete),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(JobError::Storage(format!("estado desconocido: {}", other))),
        }
    }
}

/// Nombre de un tipo de artefacto (por ejemplo `notes`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactKind(String);

impl ArtifactKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Conjunto por defecto (`DEFAULT_ARTIFACT_KINDS`).
    pub fn defaults() -> Vec<ArtifactKind> {
        DEFAULT_ARTIFACT_KINDS.iter().map(|k| ArtifactKind::new(*k)).collect()
    }
}

impl Borrow<str> for ArtifactKind {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ArtifactKind {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Estado de un artefacto dentro de un trabajo.
///
/// La bandera de disponibilidad y la ubicación se derivan de aquí, de modo
/// que no puede existir una ubicación sin bandera ni viceversa.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ArtifactSlot {
    Waiting,
    #[serde(rename_all = "camelCase")]
    Ready {
        location: String,
        generated_at: DateTime<Utc>,
    },
    Failed {
        error: String,
    },
}

impl ArtifactSlot {
    pub fn is_ready(&self) -> bool {
        matches!(self, ArtifactSlot::Ready { .. })
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            ArtifactSlot::Ready { location, .. } => Some(location),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ArtifactSlot::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Mapa ordenado tipo de artefacto → estado. Las claves se fijan al crear
/// el trabajo.
pub type ArtifactSlots = IndexMap<ArtifactKind, ArtifactSlot>;

/// Resultado reportado por el flujo externo para un artefacto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactOutcome {
    Ready { location: String },
    Failed { error: String },
}

/// Registro de un trabajo de generación multi-artefacto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub status: JobStatus,
    pub artifacts: ArtifactSlots,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_detail: Option<String>,
    /// Principal que envió el trabajo; la capa de autorización lo
    /// interpreta, el núcleo no.
    pub owner_ref: Option<String>,
    /// Número de intento de disparo (1 al enviar, +1 por cada reintento).
    pub attempt: u32,
    /// Documento opaco que se entrega al disparador del flujo.
    pub payload: JsonValue,
    /// Versión para concurrencia optimista; la incrementa el repositorio.
    pub version: i64,
}

impl Job {
    /// Crea un trabajo `Pending` con todos los artefactos en espera.
    pub fn new(name: impl Into<String>,
               kinds: &[ArtifactKind],
               owner_ref: Option<String>,
               payload: JsonValue)
               -> Result<Self> {
        if kinds.is_empty() {
            return Err(JobError::InvalidArtifactSet("el conjunto de artefactos está vacío".into()));
        }
        let mut seen = HashSet::new();
        let mut artifacts = ArtifactSlots::with_capacity(kinds.len());
        for kind in kinds {
            if !seen.insert(kind.as_str()) {
                return Err(JobError::InvalidArtifactSet(format!("artefacto duplicado: {}", kind)));
            }
            artifacts.insert(kind.clone(), ArtifactSlot::Waiting);
        }
        Ok(Self { id: Uuid::new_v4(),
                  name: name.into(),
                  status: JobStatus::Pending,
                  artifacts,
                  submitted_at: Utc::now(),
                  completed_at: None,
                  error_detail: None,
                  owner_ref,
                  attempt: 1,
                  payload,
                  version: 0 })
    }

    /// Mapa de disponibilidad (tipo → bandera) en el orden configurado.
    pub fn readiness(&self) -> IndexMap<ArtifactKind, bool> {
        self.artifacts.iter().map(|(k, s)| (k.clone(), s.is_ready())).collect()
    }

    /// Mapa de ubicaciones (tipo → ubicación si está listo).
    pub fn locations(&self) -> IndexMap<ArtifactKind, Option<String>> {
        self.artifacts
            .iter()
            .map(|(k, s)| (k.clone(), s.location().map(str::to_string)))
            .collect()
    }

    pub fn summary(&self) -> ReadinessSummary {
        aggregate(self.artifacts.values().map(ArtifactSlot::is_ready))
    }

    /// `Pending` → `Processing` tras un disparo exitoso. Devuelve `true` si
    /// hubo cambio; en cualquier otro estado no hace nada.
    pub fn mark_processing(&mut self) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.status = JobStatus::Processing;
        true
    }

    /// Marca el trabajo como fallido con `detail`. Sólo aplica a estados no
    /// terminales; `completed_at` no se sobreescribe si ya existía.
    pub fn mark_failed(&mut self, detail: &str, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Failed;
        self.error_detail = Some(detail.to_string());
        self.completed_at.get_or_insert(now);
        true
    }

    /// Cancela el trabajo. Un trabajo completo no se puede cancelar; uno ya
    /// cancelado queda igual.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        match self.status {
            JobStatus::Complete => Err(self.invalid_state("cancel")),
            JobStatus::Cancelled => Ok(()),
            _ => {
                self.status = JobStatus::Cancelled;
                self.error_detail = None;
                self.completed_at.get_or_insert(now);
                Ok(())
            }
        }
    }

    /// Prepara un nuevo intento: sólo desde `Failed` o `Cancelled`. Limpia
    /// artefactos, ubicaciones, `completed_at` y `error_detail`.
    pub fn reset_for_retry(&mut self) -> Result<()> {
        if !matches!(self.status, JobStatus::Failed | JobStatus::Cancelled) {
            return Err(self.invalid_state("retry"));
        }
        for slot in self.artifacts.values_mut() {
            *slot = ArtifactSlot::Waiting;
        }
        self.status = JobStatus::Pending;
        self.completed_at = None;
        self.error_detail = None;
        self.attempt = self.attempt.saturating_add(1);
        Ok(())
    }

    /// Aplica el resultado de un callback para `kind`.
    ///
    /// Reglas:
    /// - tipo fuera del conjunto → `UnknownArtifactKind`;
    /// - trabajo terminal → sin cambios;
    /// - el primer resultado de cada artefacto gana dentro de un intento
    ///   (un `Ready` repetido no mueve la ubicación, un `Failed` es
    ///   permanente hasta el reintento);
    /// - un fallo de artefacto fija `error_detail` pero no falla el trabajo
    ///   salvo que `fail_job` sea `true`;
    /// - con `fail_job` el artefacto no pasa a listo aunque el evento lo
    ///   diga: el trabajo falla y `Failed` nunca convive con todo listo.
    ///
    /// Devuelve `true` si el trabajo cambió.
    pub fn apply_outcome(&mut self,
                         kind: &str,
                         outcome: &ArtifactOutcome,
                         fail_job: bool,
                         now: DateTime<Utc>)
                         -> Result<bool> {
        let status = self.status;
        let slot = self.artifacts
                       .get_mut(kind)
                       .ok_or_else(|| JobError::UnknownArtifactKind(kind.to_string()))?;
        if status.is_terminal() {
            return Ok(false);
        }

        let mut changed = false;
        if *slot == ArtifactSlot::Waiting {
            match outcome {
                ArtifactOutcome::Ready { location } if !fail_job => {
                    *slot = ArtifactSlot::Ready { location: location.clone(),
                                                  generated_at: now };
                    changed = true;
                }
                ArtifactOutcome::Ready { .. } => {}
                ArtifactOutcome::Failed { error } => {
                    *slot = ArtifactSlot::Failed { error: error.clone() };
                    self.error_detail = Some(format!("{}: {}", kind, error));
                    changed = true;
                }
            }
        }

        if fail_job {
            let detail = match outcome {
                ArtifactOutcome::Failed { error } => error.clone(),
                ArtifactOutcome::Ready { .. } => format!("fallo reportado por el flujo en {}", kind),
            };
            return Ok(self.mark_failed(&detail, now) || changed);
        }

        if changed {
            self.status = next_status(self.status, self.summary(), true);
            if self.status == JobStatus::Complete {
                self.completed_at.get_or_insert(now);
            }
        }
        Ok(changed)
    }

    /// Comprueba los invariantes del registro:
    /// - `Complete` ⇔ todos los artefactos listos;
    /// - `completed_at` presente ⇔ estado terminal;
    /// - conjunto de artefactos no vacío.
    pub fn check_invariants(&self) -> Result<()> {
        if self.artifacts.is_empty() {
            return Err(JobError::InvariantViolation(format!("trabajo {} sin artefactos", self.id)));
        }
        let all_ready = self.summary().all_ready;
        if (self.status == JobStatus::Complete) != all_ready {
            return Err(JobError::InvariantViolation(format!("trabajo {}: estado {} con all_ready={}",
                                                            self.id, self.status, all_ready)));
        }
        if self.completed_at.is_some() != self.status.is_terminal() {
            return Err(JobError::InvariantViolation(format!("trabajo {}: completed_at inconsistente con estado {}",
                                                            self.id, self.status)));
        }
        Ok(())
    }

    /// Verifica que `self` sea un sucesor legal de `previous`: misma
    /// identidad, mismo conjunto de artefactos y `completed_at` intacto
    /// mientras el trabajo siga terminal.
    pub fn ensure_successor_of(&self, previous: &Job) -> Result<()> {
        if self.id != previous.id || self.submitted_at != previous.submitted_at {
            return Err(JobError::InvariantViolation(format!("la mutación cambió la identidad del trabajo {}",
                                                            previous.id)));
        }
        if !self.artifacts.keys().eq(previous.artifacts.keys()) {
            return Err(JobError::InvariantViolation(format!("la mutación cambió los artefactos del trabajo {}",
                                                            previous.id)));
        }
        if previous.completed_at.is_some() && self.completed_at.is_some() && self.completed_at != previous.completed_at
        {
            return Err(JobError::InvariantViolation(format!("completed_at del trabajo {} no puede sobreescribirse",
                                                            previous.id)));
        }
        self.check_invariants()
    }

    fn invalid_state(&self, operation: &'static str) -> JobError {
        JobError::InvalidState { job_id: self.id,
                                 status: self.status,
                                 operation }
    }
}
