use jobs::{JobError, JobStatus};
use thiserror::Error;
use uuid::Uuid;

// Errores del coordinador de trabajos.
//
// Los errores de validación, trabajo inexistente, artefacto desconocido y
// estado inválido se devuelven tal cual al llamador; los del almacén se
// envuelven en `Store`. Los fallos del disparador no aparecen aquí: se
// absorben en el estado del trabajo.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// Entrada inválida (envío o callback). Nada se persiste.
    #[error("Error de validacion: {0}")]
    Validation(String),

    #[error("Trabajo no encontrado: {0}")]
    NotFound(Uuid),

    #[error("Tipo de artefacto desconocido: {0}")]
    UnknownArtifactKind(String),

    /// Operación no permitida para el estado actual.
    #[error("Operacion '{operation}' no permitida en estado {status} (trabajo {job_id})")]
    InvalidState {
        job_id: Uuid,
        status: JobStatus,
        operation: &'static str,
    },

    /// Errores de serializacion/deserializacion JSON.
    #[error("Error de serializacion: {0}")]
    Serialization(String),

    /// Configuración inválida (conjunto de artefactos vacío o duplicado).
    #[error("Error de configuracion: {0}")]
    Config(String),

    /// Errores del almacén de trabajos.
    #[error("Error de persistencia: {0}")]
    Store(JobError),
}

impl From<JobError> for WorkflowError {
    fn from(e: JobError) -> Self {
        match e {
            JobError::NotFound(id) => WorkflowError::NotFound(id),
            JobError::UnknownArtifactKind(kind) => WorkflowError::UnknownArtifactKind(kind),
            JobError::InvalidState { job_id, status, operation } => {
                WorkflowError::InvalidState { job_id, status, operation }
            }
            JobError::InvalidArtifactSet(msg) => WorkflowError::Config(msg),
            other => WorkflowError::Store(other),
        }
    }
}

impl From<chronicle_domain::DomainError> for WorkflowError {
    fn from(e: chronicle_domain::DomainError) -> Self {
        match e {
            chronicle_domain::DomainError::ValidationError(msg) => WorkflowError::Validation(msg),
            chronicle_domain::DomainError::SerializationError(msg) => WorkflowError::Serialization(msg),
        }
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(e: serde_json::Error) -> Self {
        WorkflowError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
