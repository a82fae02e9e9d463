// Archivo: stubs.rs
// Propósito: implementaciones en memoria para pruebas y wiring rápido.
//
// Incluye un repositorio en memoria (`InMemoryJobRepository`) respaldado por
// `DashMap` y un `ArtifactStore` que sólo registra las eliminaciones. No son
// durables; se usan en pruebas y en el binario de demostración.
use crate::domain::Job;
use crate::errors::{JobError, Result};
use crate::repository::{sort_newest_first, ArtifactStore, JobFilter, JobMutator, JobRepository, Transition};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Repositorio en memoria. Cada `update` se ejecuta con el shard del id
/// bloqueado, así que las actualizaciones de un mismo trabajo se serializan
/// sin bloquear las de otros trabajos.
#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    jobs: DashMap<Uuid, Job>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self { jobs: DashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl JobRepository for InMemoryJobRepository {
    fn create(&self, job: Job) -> Result<Job> {
        job.check_invariants()?;
        match self.jobs.entry(job.id) {
            Entry::Occupied(_) => Err(JobError::AlreadyExists(job.id)),
            Entry::Vacant(slot) => {
                slot.insert(job.clone());
                log::debug!("job creado: {} ({})", job.id, job.name);
                Ok(job)
            }
        }
    }

    fn get(&self, id: &Uuid) -> Result<Job> {
        self.jobs
            .get(id)
            .map(|j| j.value().clone())
            .ok_or(JobError::NotFound(*id))
    }

    fn update(&self, id: &Uuid, mutator: &mut JobMutator<'_>) -> Result<Transition> {
        let mut entry = self.jobs.get_mut(id).ok_or(JobError::NotFound(*id))?;
        let before = entry.value().clone();
        let mut after = mutator(&before)?;
        if after == before {
            return Ok(Transition { before, after });
        }
        after.ensure_successor_of(&before)?;
        after.version = before.version + 1;
        *entry.value_mut() = after.clone();
        Ok(Transition { before, after })
    }

    fn delete(&self, id: &Uuid) -> Result<Option<Job>> {
        Ok(self.jobs.remove(id).map(|(_, job)| job))
    }

    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let mut out: Vec<Job> = self.jobs
                                    .iter()
                                    .filter(|e| filter.matches(e.value()))
                                    .map(|e| e.value().clone())
                                    .collect();
        sort_newest_first(&mut out);
        Ok(out)
    }
}

/// `ArtifactStore` que registra las ubicaciones eliminadas sin tocar el
/// sistema de ficheros.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    removed: Mutex<Vec<String>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ubicaciones eliminadas, en orden de llamada.
    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn remove(&self, location: &str) -> Result<()> {
        self.removed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(location.to_string());
        Ok(())
    }
}
