// Archivo: repository.rs
// Propósito: contratos de almacenamiento (`JobRepository`, `ArtifactStore`)
// y tipos auxiliares de consulta.
use crate::domain::{Job, JobStatus};
use crate::errors::Result;
use uuid::Uuid;

/// Par antes/después devuelto por `JobRepository::update`.
#[derive(Debug, Clone)]
pub struct Transition {
    pub before: Job,
    pub after: Job,
}

impl Transition {
    /// `true` si esta actualización llevó el trabajo a `status` (no estaba
    /// antes y sí después). Con actualizaciones atómicas sólo una
    /// transición por intento puede cumplirlo.
    pub fn entered(&self, status: JobStatus) -> bool {
        self.before.status != status && self.after.status == status
    }

    pub fn changed(&self) -> bool {
        self.before != self.after
    }
}

/// Filtro de listado. Un campo vacío no filtra.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub owner_ref: Option<String>,
    pub statuses: Vec<JobStatus>,
}

impl JobFilter {
    /// Trabajos aún en curso (`pending` o `processing`).
    pub fn active() -> Self {
        Self { owner_ref: None,
               statuses: vec![JobStatus::Pending, JobStatus::Processing] }
    }

    pub fn for_owner(owner_ref: impl Into<String>) -> Self {
        Self { owner_ref: Some(owner_ref.into()),
               statuses: Vec::new() }
    }

    pub fn matches(&self, job: &Job) -> bool {
        if let Some(owner) = &self.owner_ref {
            if job.owner_ref.as_deref() != Some(owner.as_str()) {
                return false;
            }
        }
        self.statuses.is_empty() || self.statuses.contains(&job.status)
    }
}

/// Mutación aplicada por `JobRepository::update`. Recibe el registro actual
/// y devuelve el siguiente; un error aborta la actualización sin escribir.
pub type JobMutator<'a> = dyn FnMut(&Job) -> Result<Job> + 'a;

/// Almacén de registros de trabajos.
///
/// `update` es read-modify-write atómico por id: dos actualizaciones
/// concurrentes sobre el mismo trabajo nunca se intercalan y ninguna se
/// pierde. Las implementaciones pueden volver a invocar el mutador si
/// detectan un conflicto, por eso debe ser puro respecto del registro.
pub trait JobRepository: Send + Sync {
    /// Inserta un trabajo nuevo. `AlreadyExists` si el id ya existe.
    fn create(&self, job: Job) -> Result<Job>;

    /// `NotFound` si no existe.
    fn get(&self, id: &Uuid) -> Result<Job>;

    /// Aplica `mutator` atómicamente y devuelve el par antes/después. Si el
    /// mutador devuelve el registro sin cambios no se escribe nada.
    fn update(&self, id: &Uuid, mutator: &mut JobMutator<'_>) -> Result<Transition>;

    /// Elimina el trabajo y devuelve el registro eliminado, o `None` si no
    /// existía (operación idempotente).
    fn delete(&self, id: &Uuid) -> Result<Option<Job>>;

    /// Lista los trabajos que cumplen `filter`, más recientes primero.
    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>>;
}

/// Almacén de los ficheros generados (artefactos y transcripciones).
pub trait ArtifactStore: Send + Sync {
    /// Elimina la ubicación indicada. Una ubicación inexistente no es error.
    fn remove(&self, location: &str) -> Result<()>;
}

/// Ordena más recientes primero; a igual fecha, por id para que el orden
/// sea estable entre almacenes.
pub fn sort_newest_first(jobs: &mut [Job]) {
    jobs.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at).then_with(|| a.id.cmp(&b.id)));
}
