//! Colaboradores en memoria para pruebas y para el binario de demostración.
use crate::adapters::{AdapterError, NotificationDispatcher, WorkflowTrigger};
use async_trait::async_trait;
use jobs::Job;
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// Disparador que registra cada llamada. Las respuestas se pueden programar
/// con `fail_next`; sin programar, responde `Ok`.
#[derive(Debug, Default)]
pub struct RecordingTrigger {
    calls: Mutex<Vec<(Uuid, JsonValue)>>,
    script: Mutex<VecDeque<Result<(), AdapterError>>>,
}

impl RecordingTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// La siguiente llamada falla con `reason`.
    pub fn fail_next(&self, reason: &str) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(AdapterError::new(reason)));
    }

    pub fn calls(&self) -> Vec<(Uuid, JsonValue)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl WorkflowTrigger for RecordingTrigger {
    async fn trigger(&self, job_id: Uuid, payload: &JsonValue) -> Result<(), AdapterError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((job_id, payload.clone()));
        let scripted = self.script.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        scripted.unwrap_or(Ok(()))
    }
}

/// Dispatcher que cuenta las notificaciones recibidas por trabajo.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    count: AtomicUsize,
    notified: Mutex<Vec<Uuid>>,
    failing: bool,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher que registra la llamada y luego devuelve error.
    pub fn failing() -> Self {
        Self { failing: true,
               ..Self::default() }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn notified(&self) -> Vec<Uuid> {
        self.notified.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn notify(&self, job_id: Uuid, _job: &Job) -> Result<(), AdapterError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.notified.lock().unwrap_or_else(|e| e.into_inner()).push(job_id);
        if self.failing {
            return Err(AdapterError::new("smtp no disponible"));
        }
        Ok(())
    }
}

/// Disparador que sólo escribe el payload en el log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingTrigger;

#[async_trait]
impl WorkflowTrigger for LoggingTrigger {
    async fn trigger(&self, job_id: Uuid, payload: &JsonValue) -> Result<(), AdapterError> {
        log::info!("disparo de flujo para job {}: {}", job_id, payload);
        Ok(())
    }
}

/// Dispatcher que sólo escribe en el log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDispatcher;

#[async_trait]
impl NotificationDispatcher for LoggingDispatcher {
    async fn notify(&self, job_id: Uuid, job: &Job) -> Result<(), AdapterError> {
        log::info!("job {} ({}) completo; {} artefactos listos", job_id, job.name, job.artifacts.len());
        Ok(())
    }
}
