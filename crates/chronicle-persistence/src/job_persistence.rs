use crate::schema;
use crate::schema::job_artifacts::dsl as art_dsl;
use crate::schema::jobs::dsl as jobs_dsl;
use chrono::{DateTime, SubsecRound, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use jobs::{sort_newest_first, ArtifactKind, ArtifactSlot, ArtifactSlots, Job, JobError, JobFilter, JobMutator,
           JobRepository, JobStatus, Result, Transition};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");
/// Reintentos de `update` ante una versión desactualizada antes de
/// devolver `Conflict`.
pub const MAX_UPDATE_RETRIES: usize = 32;
#[cfg(all(feature = "pg", not(test)))]
type DbConn = PgConnection;
#[cfg(any(test, not(feature = "pg")))]
type DbConn = SqliteConnection;
type DbPool = Pool<ConnectionManager<DbConn>>;
/// Ajustes por conexión para SQLite (cada conexión del pool los necesita).
#[cfg(any(test, not(feature = "pg")))]
#[derive(Debug)]
struct SqlitePragmas;
#[cfg(any(test, not(feature = "pg")))]
impl diesel::r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
  fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
    use diesel::connection::SimpleConnection;
    conn.batch_execute("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;")
        .map_err(diesel::r2d2::Error::QueryError)
  }
}
/// Repo Diesel que implementa `JobRepository`.
///
/// `update` usa concurrencia optimista: lee el trabajo, aplica el mutador y
/// escribe con `WHERE version = <leída>` dentro de una transacción. Si otra
/// escritura ganó la carrera se vuelve a leer y a aplicar el mutador.
pub struct DieselJobRepository {
  pool: Arc<DbPool>,
}
impl DieselJobRepository {
  pub fn new(database_url: &str) -> Result<Self> {
    let manager = ConnectionManager::<DbConn>::new(database_url);
    let builder = Pool::builder().max_size(8);
    #[cfg(any(test, not(feature = "pg")))]
    let builder = builder.connection_customizer(Box::new(SqlitePragmas));
    let pool = builder.build(manager).map_err(|e| JobError::Storage(format!("pool: {}", e)))?;
    let repo = DieselJobRepository { pool: Arc::new(pool) };
    let mut c = repo.conn()?;
    c.run_pending_migrations(MIGRATIONS)
     .map_err(|e| JobError::Storage(format!("migrations: {}", e)))?;
    Ok(repo)
  }
  fn conn(&self) -> Result<PooledConnection<ConnectionManager<DbConn>>> {
    self.pool.get().map_err(|e| JobError::Storage(format!("pool: {}", e)))
  }
}
#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::jobs)]
struct JobRow {
  pub id: String,
  pub name: String,
  pub status: String,
  pub owner_ref: Option<String>,
  pub attempt: i32,
  pub payload: String,
  pub error_detail: Option<String>,
  pub submitted_at_ts: i64,
  pub completed_at_ts: Option<i64>,
  pub version: i64,
}
#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::job_artifacts)]
struct ArtifactRow {
  pub job_id: String,
  pub position: i32,
  pub kind: String,
  pub state: String,
  pub location: Option<String>,
  pub error: Option<String>,
  pub generated_at_ts: Option<i64>,
}
#[derive(Debug, AsChangeset)]
#[diesel(table_name = schema::jobs, treat_none_as_null = true)]
struct JobChanges {
  pub name: String,
  pub owner_ref: Option<String>,
  pub payload: String,
  pub status: String,
  pub attempt: i32,
  pub error_detail: Option<String>,
  pub completed_at_ts: Option<i64>,
  pub version: i64,
}
#[derive(Debug, AsChangeset)]
#[diesel(table_name = schema::job_artifacts, treat_none_as_null = true)]
struct ArtifactChanges {
  pub state: String,
  pub location: Option<String>,
  pub error: Option<String>,
  pub generated_at_ts: Option<i64>,
}
fn map_db_err<T>(res: std::result::Result<T, DieselError>) -> Result<T> {
  res.map_err(|e| JobError::Storage(format!("db: {}", e)))
}
fn ts_to_datetime(ts: i64) -> Result<DateTime<Utc>> {
  DateTime::<Utc>::from_timestamp_micros(ts).ok_or_else(|| JobError::Storage(format!("timestamp inválido: {}", ts)))
}
/// Recorta los instantes a microsegundos, la precisión de las columnas
/// `*_ts`, para que el registro devuelto sea idéntico al almacenado.
fn at_storage_precision(job: &mut Job) {
  job.submitted_at = job.submitted_at.trunc_subsecs(6);
  job.completed_at = job.completed_at.map(|t| t.trunc_subsecs(6));
  for slot in job.artifacts.values_mut() {
    if let ArtifactSlot::Ready { generated_at, .. } = slot {
      *generated_at = generated_at.trunc_subsecs(6);
    }
  }
}
fn attempt_to_db(attempt: u32) -> Result<i32> {
  i32::try_from(attempt).map_err(|_| JobError::Storage(format!("attempt fuera de rango: {}", attempt)))
}
fn slot_columns(slot: &ArtifactSlot) -> ArtifactChanges {
  match slot {
    ArtifactSlot::Waiting => ArtifactChanges { state: "waiting".into(),
                                               location: None,
                                               error: None,
                                               generated_at_ts: None },
    ArtifactSlot::Ready { location, generated_at } => ArtifactChanges { state: "ready".into(),
                                                                        location: Some(location.clone()),
                                                                        error: None,
                                                                        generated_at_ts: Some(generated_at.timestamp_micros()) },
    ArtifactSlot::Failed { error } => ArtifactChanges { state: "failed".into(),
                                                        location: None,
                                                        error: Some(error.clone()),
                                                        generated_at_ts: None },
  }
}
fn row_to_slot(row: &ArtifactRow) -> Result<ArtifactSlot> {
  match row.state.as_str() {
    "waiting" => Ok(ArtifactSlot::Waiting),
    "ready" => {
      let location = row.location
                        .clone()
                        .ok_or_else(|| JobError::Storage(format!("artefacto {} listo sin ubicación", row.kind)))?;
      let generated_at = ts_to_datetime(row.generated_at_ts.unwrap_or_default())?;
      Ok(ArtifactSlot::Ready { location, generated_at })
    }
    "failed" => Ok(ArtifactSlot::Failed { error: row.error.clone().unwrap_or_default() }),
    other => Err(JobError::Storage(format!("estado de artefacto desconocido: {}", other))),
  }
}
fn job_to_rows(job: &Job) -> Result<(JobRow, Vec<ArtifactRow>)> {
  let id = job.id.to_string();
  let row = JobRow { id: id.clone(),
                     name: job.name.clone(),
                     status: job.status.as_str().to_string(),
                     owner_ref: job.owner_ref.clone(),
                     attempt: attempt_to_db(job.attempt)?,
                     payload: job.payload.to_string(),
                     error_detail: job.error_detail.clone(),
                     submitted_at_ts: job.submitted_at.timestamp_micros(),
                     completed_at_ts: job.completed_at.map(|t| t.timestamp_micros()),
                     version: job.version };
  let mut artifacts = Vec::with_capacity(job.artifacts.len());
  for (position, (kind, slot)) in job.artifacts.iter().enumerate() {
    let cols = slot_columns(slot);
    artifacts.push(ArtifactRow { job_id: id.clone(),
                                 position: position as i32,
                                 kind: kind.as_str().to_string(),
                                 state: cols.state,
                                 location: cols.location,
                                 error: cols.error,
                                 generated_at_ts: cols.generated_at_ts });
  }
  Ok((row, artifacts))
}
fn rows_to_job(row: JobRow, mut artifacts: Vec<ArtifactRow>) -> Result<Job> {
  artifacts.sort_by_key(|a| a.position);
  let mut slots = ArtifactSlots::with_capacity(artifacts.len());
  for a in &artifacts {
    slots.insert(ArtifactKind::new(a.kind.as_str()), row_to_slot(a)?);
  }
  let id = Uuid::parse_str(&row.id).map_err(|e| JobError::Storage(format!("invalid uuid: {}", e)))?;
  let status: JobStatus = row.status.parse()?;
  let payload = serde_json::from_str(&row.payload).map_err(|e| JobError::Storage(format!("payload: {}", e)))?;
  Ok(Job { id,
           name: row.name,
           status,
           artifacts: slots,
           submitted_at: ts_to_datetime(row.submitted_at_ts)?,
           completed_at: row.completed_at_ts.map(ts_to_datetime).transpose()?,
           error_detail: row.error_detail,
           owner_ref: row.owner_ref,
           attempt: u32::try_from(row.attempt).map_err(|_| JobError::Storage(format!("attempt inválido: {}", row.attempt)))?,
           payload,
           version: row.version })
}
fn load_job(conn: &mut DbConn, id: &Uuid) -> Result<Option<Job>> {
  let id_s = id.to_string();
  let row = map_db_err(jobs_dsl::jobs.filter(jobs_dsl::id.eq(&id_s)).first::<JobRow>(conn).optional())?;
  match row {
    Some(r) => {
      let arts = map_db_err(art_dsl::job_artifacts.filter(art_dsl::job_id.eq(&id_s))
                                                  .order(art_dsl::position.asc())
                                                  .load::<ArtifactRow>(conn))?;
      Ok(Some(rows_to_job(r, arts)?))
    }
    None => Ok(None),
  }
}
/// Escribe `after` si la fila sigue en `expected_version`. Devuelve `false`
/// si otra escritura se adelantó.
fn write_if_version(conn: &mut DbConn, after: &Job, expected_version: i64) -> std::result::Result<bool, DieselError> {
  let id_s = after.id.to_string();
  let changes = JobChanges { name: after.name.clone(),
                             owner_ref: after.owner_ref.clone(),
                             payload: after.payload.to_string(),
                             status: after.status.as_str().to_string(),
                             attempt: after.attempt as i32,
                             error_detail: after.error_detail.clone(),
                             completed_at_ts: after.completed_at.map(|t| t.timestamp_micros()),
                             version: after.version };
  conn.transaction::<bool, DieselError, _>(|c| {
        let n = diesel::update(jobs_dsl::jobs.filter(jobs_dsl::id.eq(&id_s)).filter(jobs_dsl::version.eq(expected_version)))
                  .set(&changes)
                  .execute(c)?;
        if n == 0 {
          return Ok(false);
        }
        for (kind, slot) in after.artifacts.iter() {
          diesel::update(art_dsl::job_artifacts.filter(art_dsl::job_id.eq(&id_s)).filter(art_dsl::kind.eq(kind.as_str())))
            .set(&slot_columns(slot))
            .execute(c)?;
        }
        Ok(true)
      })
}
impl JobRepository for DieselJobRepository {
  fn create(&self, job: Job) -> Result<Job> {
    job.check_invariants()?;
    let (row, arts) = job_to_rows(&job)?;
    let mut conn = self.conn()?;
    let res = conn.transaction::<_, DieselError, _>(|c| {
                    diesel::insert_into(schema::jobs::table).values(&row).execute(c)?;
                    diesel::insert_into(schema::job_artifacts::table).values(&arts).execute(c)?;
                    Ok(())
                  });
    match res {
      Ok(()) => {}
      Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => return Err(JobError::AlreadyExists(job.id)),
      Err(e) => return map_db_err(Err(e)),
    }
    log::debug!("job creado: {} ({})", job.id, job.name);
    load_job(&mut conn, &job.id)?.ok_or(JobError::NotFound(job.id))
  }
  fn get(&self, id: &Uuid) -> Result<Job> {
    let mut conn = self.conn()?;
    load_job(&mut conn, id)?.ok_or(JobError::NotFound(*id))
  }
  fn update(&self, id: &Uuid, mutator: &mut JobMutator<'_>) -> Result<Transition> {
    let mut conn = self.conn()?;
    for attempt in 0..MAX_UPDATE_RETRIES {
      let before = load_job(&mut conn, id)?.ok_or(JobError::NotFound(*id))?;
      let mut after = mutator(&before)?;
      if after == before {
        return Ok(Transition { before, after });
      }
      after.ensure_successor_of(&before)?;
      after.version = before.version + 1;
      at_storage_precision(&mut after);
      attempt_to_db(after.attempt)?;
      // se devuelve la imagen escrita, nunca una relectura posterior
      if map_db_err(write_if_version(&mut conn, &after, before.version))? {
        return Ok(Transition { before, after });
      }
      log::debug!("conflicto de versión en job {} (intento {}), reintentando", id, attempt + 1);
    }
    Err(JobError::Conflict(format!("job {}: versión desactualizada tras {} intentos", id, MAX_UPDATE_RETRIES)))
  }
  fn delete(&self, id: &Uuid) -> Result<Option<Job>> {
    let mut conn = self.conn()?;
    let id_s = id.to_string();
    for attempt in 0..MAX_UPDATE_RETRIES {
      let existing = match load_job(&mut conn, id)? {
        Some(job) => job,
        None => return Ok(None),
      };
      // las filas de job_artifacts caen por ON DELETE CASCADE
      let n = map_db_err(diesel::delete(jobs_dsl::jobs.filter(jobs_dsl::id.eq(&id_s))
                                                      .filter(jobs_dsl::version.eq(existing.version)))
                         .execute(&mut conn))?;
      if n > 0 {
        return Ok(Some(existing));
      }
      log::debug!("job {} cambió antes de borrarse (intento {}), releyendo", id, attempt + 1);
    }
    Err(JobError::Conflict(format!("job {}: versión desactualizada al borrar tras {} intentos", id, MAX_UPDATE_RETRIES)))
  }
  fn list(&self, filter: &JobFilter) -> Result<Vec<Job>> {
    let mut conn = self.conn()?;
    let mut query = jobs_dsl::jobs.into_boxed();
    if let Some(owner) = &filter.owner_ref {
      query = query.filter(jobs_dsl::owner_ref.eq(owner.clone()));
    }
    if !filter.statuses.is_empty() {
      let statuses: Vec<String> = filter.statuses.iter().map(|s| s.as_str().to_string()).collect();
      query = query.filter(jobs_dsl::status.eq_any(statuses));
    }
    let rows = map_db_err(query.order(jobs_dsl::submitted_at_ts.desc()).load::<JobRow>(&mut conn))?;
    if rows.is_empty() {
      return Ok(Vec::new());
    }
    let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
    let arts = map_db_err(art_dsl::job_artifacts.filter(art_dsl::job_id.eq_any(ids)).load::<ArtifactRow>(&mut conn))?;
    let mut by_job: HashMap<String, Vec<ArtifactRow>> = HashMap::new();
    for a in arts {
      by_job.entry(a.job_id.clone()).or_default().push(a);
    }
    let mut out = Vec::with_capacity(rows.len());
    for r in rows {
      let arts = by_job.remove(&r.id).unwrap_or_default();
      out.push(rows_to_job(r, arts)?);
    }
    sort_newest_first(&mut out);
    Ok(out)
  }
}
// `new_from_env` canónico: los binarios no deciden entre sqlite/postgres.
#[cfg(all(feature = "pg", not(test)))]
pub fn new_from_env() -> Result<DieselJobRepository> {
  dotenvy::dotenv().ok();
  let url = std::env::var("CHRONICLE_DB_URL").or_else(|_| std::env::var("DATABASE_URL"))
                                             .map_err(|_| JobError::Storage("CHRONICLE_DB_URL / DATABASE_URL not set".into()))?;
  if !(url.starts_with("postgres") || url.starts_with("postgresql://") || url.contains('@')) {
    return Err(JobError::Storage("chronicle-persistence: CHRONICLE_DB_URL does not look like Postgres URL".into()));
  }
  DieselJobRepository::new(&url)
}
#[cfg(any(test, not(feature = "pg")))]
pub fn new_from_env() -> Result<DieselJobRepository> {
  dotenvy::dotenv().ok();
  let url = std::env::var("CHRONICLE_DB_URL").or_else(|_| std::env::var("DATABASE_URL"))
                                             .unwrap_or_else(|_| "chronicle.db".into());
  let url_l = url.to_lowercase();
  if url_l.starts_with("postgres") {
    return Err(JobError::Storage("chronicle-persistence was compiled without 'pg' feature; enable the 'pg' feature to \
                                  use Postgres"
                                                .into()));
  }
  DieselJobRepository::new(&url)
}
