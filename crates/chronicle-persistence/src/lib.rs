//! Persistencia Diesel para el trait `JobRepository`.
//! Expone el módulo `schema`, el repositorio `DieselJobRepository` (SQLite
//! por defecto, Postgres con la feature `pg`) y `FsArtifactStore`, que
//! elimina artefactos generados del directorio de salida.

mod artifact_files;
mod job_persistence;
pub mod schema;

pub use artifact_files::FsArtifactStore;
pub use job_persistence::{new_from_env, DieselJobRepository, MAX_UPDATE_RETRIES, MIGRATIONS};
