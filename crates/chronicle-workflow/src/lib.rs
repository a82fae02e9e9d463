//! chronicle-workflow: coordinador de trabajos multi-artefacto
//!
//! Define el `JobLifecycleManager` (envío, disparo, cancelación, reintento,
//! borrado y consultas), el `CallbackHandler` que aplica los eventos del
//! flujo externo, los contratos de los colaboradores (`WorkflowTrigger`,
//! `NotificationDispatcher`) y la configuración. Opera sobre cualquier
//! `jobs::JobRepository`.

pub mod adapters;
mod blocking;
pub mod callback;
pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod reporting;
pub mod stubs;

pub use adapters::{AdapterError, NotificationDispatcher, WorkflowTrigger};
pub use callback::{CallbackEvent, CallbackHandler};
pub use config::WorkflowConfig;
pub use errors::WorkflowError;
pub use lifecycle::JobLifecycleManager;
pub use reporting::{ActivityEntry, ActivityKind, DashboardStats};
