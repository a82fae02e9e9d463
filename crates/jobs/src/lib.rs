//! Crate `jobs`: registro de trabajos multi-artefacto
//!
//! Define el modelo de trabajo (`Job`, `JobStatus`, `ArtifactSlot`), las
//! transiciones legales de la máquina de estados, el agregador de
//! disponibilidad y el contrato de persistencia `JobRepository`, junto con
//! una implementación en memoria útil para pruebas
//! (`InMemoryJobRepository`).
//!
//! Diseño resumido:
//! - Un trabajo fija su conjunto de artefactos al crearse; cada callback
//!   marca un artefacto y el estado agregado se recalcula.
//! - `Complete` se alcanza exactamente cuando todos los artefactos están
//!   listos; los estados terminales no aceptan más callbacks.
//! - `JobRepository::update` es read-modify-write atómico por id y devuelve
//!   el par antes/después para detectar la transición a `Complete` una sola
//!   vez.
//!
//! Ejemplo rápido:
//! ```rust
//! use jobs::{ArtifactKind, ArtifactOutcome, InMemoryJobRepository, Job, JobRepository, JobStatus};
//! use chrono::Utc;
//! let repo = InMemoryJobRepository::new();
//! let job = Job::new("demo", &[ArtifactKind::new("notes")], None, serde_json::json!({})).unwrap();
//! let id = repo.create(job).unwrap().id;
//! let outcome = ArtifactOutcome::Ready { location: "notes.md".into() };
//! let t = repo.update(&id, &mut |j| {
//!                 let mut next = j.clone();
//!                 next.apply_outcome("notes", &outcome, false, Utc::now())?;
//!                 Ok(next)
//!             })
//!             .unwrap();
//! assert!(t.entered(JobStatus::Complete));
//! ```
pub mod aggregate;
pub mod domain;
pub mod errors;
pub mod repository;
pub mod stubs;

pub use aggregate::*;
pub use domain::*;
pub use errors::*;
pub use repository::*;
pub use stubs::*;
