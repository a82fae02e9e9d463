// Archivo: errors.rs
// Propósito: definir los errores del registro de trabajos y el alias
// Result<T> usado por las APIs del crate.
use crate::domain::JobStatus;
use thiserror::Error;
use uuid::Uuid;

/// Errores comunes del registro de trabajos.
///
/// - `NotFound`: no existe un trabajo con ese id.
/// - `AlreadyExists`: colisión de id al crear.
/// - `UnknownArtifactKind`: el artefacto no pertenece al conjunto del trabajo.
/// - `InvalidState`: la operación no es legal para el estado actual.
/// - `Conflict`: se agotaron los reintentos optimistas.
/// - `Storage`: error al acceder al almacenamiento.
#[derive(Error, Debug)]
pub enum JobError {
    /// Trabajo no encontrado.
    #[error("Trabajo no encontrado: {0}")]
    NotFound(Uuid),
    /// Ya existe un trabajo con el mismo id.
    #[error("El trabajo ya existe: {0}")]
    AlreadyExists(Uuid),
    /// El tipo de artefacto no está en el conjunto configurado del trabajo.
    #[error("Tipo de artefacto desconocido: {0}")]
    UnknownArtifactKind(String),
    /// Operación no permitida para el estado actual del trabajo.
    #[error("Operación '{operation}' no permitida en estado {status} (trabajo {job_id})")]
    InvalidState {
        job_id: Uuid,
        status: JobStatus,
        operation: &'static str,
    },
    /// Conjunto de artefactos vacío o con duplicados.
    #[error("Conjunto de artefactos inválido: {0}")]
    InvalidArtifactSet(String),
    /// Una mutación produjo un registro que rompe los invariantes.
    #[error("Invariante violado: {0}")]
    InvariantViolation(String),
    /// Conflicto optimista persistente (version mismatch tras reintentos).
    #[error("Conflicto: {0}")]
    Conflict(String),
    /// Error genérico de almacenamiento (BD, pool, serialización).
    #[error("Error de almacenamiento: {0}")]
    Storage(String),
}

/// Alias de resultado usado por las APIs del crate.
pub type Result<T> = std::result::Result<T, JobError>;
