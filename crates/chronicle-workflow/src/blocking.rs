use crate::errors::{Result, WorkflowError};
use jobs::JobError;

/// Ejecuta una llamada síncrona al almacén en el pool bloqueante de tokio.
pub(crate) async fn on_store<T, F>(f: F) -> Result<T>
    where F: FnOnce() -> jobs::Result<T> + Send + 'static,
          T: Send + 'static
{
    match tokio::task::spawn_blocking(f).await {
        Ok(res) => Ok(res?),
        Err(e) => Err(WorkflowError::Store(JobError::Storage(format!("tarea de almacén: {}", e)))),
    }
}
