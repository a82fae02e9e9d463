use async_trait::async_trait;
use jobs::Job;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

/// Fallo de un colaborador externo. El texto termina en `errorDetail`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct AdapterError(pub String);

impl AdapterError {
    pub fn new(reason: impl Into<String>) -> Self {
        AdapterError(reason.into())
    }
}

/// Arranca el flujo externo que genera los artefactos de un trabajo.
///
/// Una respuesta `Ok` significa que el flujo aceptó el trabajo, no que los
/// artefactos estén listos: esos llegan después como callbacks.
#[async_trait]
pub trait WorkflowTrigger: Send + Sync {
    async fn trigger(&self, job_id: Uuid, payload: &JsonValue) -> Result<(), AdapterError>;
}

/// Se invoca una vez cuando un trabajo pasa a `complete`, con el registro
/// ya confirmado.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, job_id: Uuid, job: &Job) -> Result<(), AdapterError>;
}
