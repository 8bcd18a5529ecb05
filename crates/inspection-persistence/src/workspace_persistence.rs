use crate::schema::{activity_log, workspaces};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::result::Error as DieselError;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use inspection_store::{ActivityRecord, AuditSink, ModuleSnapshot, ModuleStates, PersistResult, Result, StoreError,
                       WorkspaceMeta, WorkspaceRepository};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");
/// URL por defecto cuando no hay `INSPECTION_DB_URL` ni `DATABASE_URL`.
pub const DEFAULT_SQLITE_URL: &str = "file:inspection?mode=memory&cache=shared";
#[cfg(feature = "pg")]
type DbConn = PgConnection;
#[cfg(not(feature = "pg"))]
type DbConn = SqliteConnection;
type DbPool = Pool<ConnectionManager<DbConn>>;
/// Errores propios del backend Diesel. Se convierten a `StoreError` en la
/// frontera del trait.
#[derive(Error, Debug)]
pub enum PersistenceError {
  #[error("db: {0}")]
  Db(#[from] DieselError),
  #[error("pool: {0}")]
  Pool(#[from] r2d2::Error),
  #[error("json: {0}")]
  Json(#[from] serde_json::Error),
  #[error("migraciones: {0}")]
  Migration(String),
  #[error("timestamp fuera de rango: {0}")]
  Timestamp(i64),
  #[error("No encontrado: {0}")]
  NotFound(String),
  #[error("Conflicto: {0}")]
  Conflict(String),
  #[error("configuración: {0}")]
  Config(String),
}
impl From<PersistenceError> for StoreError {
  fn from(e: PersistenceError) -> Self {
    match e {
      PersistenceError::NotFound(m) => StoreError::NotFound(m),
      PersistenceError::Conflict(m) => StoreError::Conflict(m),
      other => StoreError::Storage(other.to_string()),
    }
  }
}
fn map_db_err<T>(res: std::result::Result<T, DieselError>) -> Result<T> {
  res.map_err(|e| StoreError::Storage(format!("db: {}", e)))
}
fn to_micros(ts: DateTime<Utc>) -> i64 {
  ts.timestamp_micros()
}
fn from_micros(v: i64) -> std::result::Result<DateTime<Utc>, PersistenceError> {
  DateTime::from_timestamp_micros(v).ok_or(PersistenceError::Timestamp(v))
}
// Fila de workspace; `module_states` es el JSON de `ModuleStates`.
#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = workspaces)]
struct WorkspaceRow {
  pub id: String,
  pub module_states: String,
  pub version: i64,
  pub updated_by: Option<String>,
  pub updated_at_ts: Option<i64>,
  pub created_at_ts: i64,
}
impl WorkspaceRow {
  fn modules(&self) -> std::result::Result<ModuleStates, PersistenceError> {
    Ok(serde_json::from_str(&self.module_states)?)
  }
  fn updated_at(&self) -> std::result::Result<Option<DateTime<Utc>>, PersistenceError> {
    self.updated_at_ts.map(from_micros).transpose()
  }
  fn meta(&self) -> std::result::Result<WorkspaceMeta, PersistenceError> {
    Ok(WorkspaceMeta { id: self.id.clone(),
                       version: self.version,
                       modules: self.modules()?.keys().cloned().collect(),
                       created_at: from_micros(self.created_at_ts)?,
                       updated_at: self.updated_at()?,
                       updated_by: self.updated_by.clone() })
  }
}
#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = activity_log)]
struct ActivityRow {
  pub id: String,
  pub workspace_id: String,
  pub activity_type: String,
  pub performed_by: String,
  pub module: String,
  pub metadata: String,
  pub recorded_at_ts: i64,
}
impl ActivityRow {
  fn into_record(self) -> std::result::Result<ActivityRecord, PersistenceError> {
    Ok(ActivityRecord { workspace_id: self.workspace_id,
                        activity_type: self.activity_type,
                        performed_by: self.performed_by,
                        module: self.module,
                        metadata: serde_json::from_str(&self.metadata)?,
                        recorded_at: from_micros(self.recorded_at_ts)? })
  }
}
/// Repo Diesel que implementa `WorkspaceRepository`.
///
/// La versión del workspace se compara dentro de la misma transacción que
/// escribe (`UPDATE ... WHERE id = ? AND version = ?`), de modo que dos
/// escritores con la misma versión leída no pueden aplicar ambos.
pub struct DieselWorkspaceRepository {
  pool: Arc<DbPool>,
}
impl DieselWorkspaceRepository {
  pub fn new(database_url: &str) -> std::result::Result<Self, PersistenceError> {
    Self::with_pool_size(database_url, 4)
  }
  fn with_pool_size(database_url: &str, size: u32) -> std::result::Result<Self, PersistenceError> {
    let manager = ConnectionManager::<DbConn>::new(database_url);
    let pool = Pool::builder().max_size(size).build(manager)?;
    let repo = DieselWorkspaceRepository { pool: Arc::new(pool) };
    repo.prepare()?;
    Ok(repo)
  }
  fn prepare(&self) -> std::result::Result<(), PersistenceError> {
    let mut c = self.conn_raw()?;
    #[cfg(not(feature = "pg"))]
    {
      let _ = diesel::sql_query("PRAGMA journal_mode = WAL;").execute(&mut c);
      let _ = diesel::sql_query("PRAGMA busy_timeout = 5000;").execute(&mut c);
    }
    c.run_pending_migrations(MIGRATIONS).map_err(|e| PersistenceError::Migration(e.to_string()))?;
    Ok(())
  }
  fn conn_raw(&self) -> std::result::Result<PooledConnection<ConnectionManager<DbConn>>, PersistenceError> {
    Ok(self.pool.get()?)
  }
  fn conn(&self) -> Result<PooledConnection<ConnectionManager<DbConn>>> {
    self.conn_raw().map_err(|e| StoreError::Storage(e.to_string()))
  }
  /// Sink de auditoría que escribe en `activity_log` usando el mismo pool.
  pub fn audit_sink(&self) -> DieselAuditSink {
    DieselAuditSink { pool: self.pool.clone() }
  }
  fn find_row(c: &mut DbConn, workspace_id: &str) -> std::result::Result<WorkspaceRow, PersistenceError> {
    workspaces::table.find(workspace_id)
                     .first::<WorkspaceRow>(c)
                     .optional()?
                     .ok_or_else(|| PersistenceError::NotFound(format!("workspace {}", workspace_id)))
  }
}
impl WorkspaceRepository for DieselWorkspaceRepository {
  fn create_workspace(&self, workspace_id: &str) -> Result<WorkspaceMeta> {
    let mut conn = self.conn()?;
    let row = WorkspaceRow { id: workspace_id.to_string(),
                             module_states: "{}".to_string(),
                             version: 0,
                             updated_by: None,
                             updated_at_ts: None,
                             created_at_ts: to_micros(Utc::now()) };
    let meta = conn.transaction::<_, PersistenceError, _>(|c| {
                     let existing = workspaces::table.find(workspace_id).first::<WorkspaceRow>(c).optional()?;
                     if existing.is_some() {
                       return Err(PersistenceError::Conflict(format!("workspace {} ya existe", workspace_id)));
                     }
                     diesel::insert_into(workspaces::table).values(&row).execute(c)?;
                     row.meta()
                   })?;
    info!(workspace_id, "workspace creado");
    Ok(meta)
  }
  fn workspace_exists(&self, workspace_id: &str) -> Result<bool> {
    let mut conn = self.conn()?;
    let n = map_db_err(workspaces::table.filter(workspaces::id.eq(workspace_id)).count().get_result::<i64>(&mut conn))?;
    Ok(n > 0)
  }
  fn get_workspace_meta(&self, workspace_id: &str) -> Result<WorkspaceMeta> {
    let mut conn = self.conn()?;
    let row = Self::find_row(&mut conn, workspace_id)?;
    Ok(row.meta()?)
  }
  fn load_module(&self, workspace_id: &str, module: &str) -> Result<ModuleSnapshot> {
    let mut conn = self.conn()?;
    let row = Self::find_row(&mut conn, workspace_id)?;
    let state = row.modules()?.get(module).cloned().unwrap_or(JsonValue::Null);
    Ok(ModuleSnapshot { workspace_id: row.id.clone(),
                        module: module.to_string(),
                        state,
                        version: row.version,
                        updated_by: row.updated_by.clone(),
                        updated_at: row.updated_at()? })
  }
  fn save_module(&self,
                 workspace_id: &str,
                 module: &str,
                 state: &JsonValue,
                 updated_by: &str,
                 updated_at: DateTime<Utc>,
                 expected_version: Option<i64>)
                 -> Result<PersistResult> {
    let mut conn = self.conn()?;
    let outcome = conn.transaction::<_, PersistenceError, _>(|c| {
                        let row = Self::find_row(c, workspace_id)?;
                        if let Some(expected) = expected_version {
                          if row.version != expected {
                            debug!(workspace_id, expected, actual = row.version, "versión desactualizada");
                            return Ok(PersistResult::Conflict);
                          }
                        }
                        let mut modules = row.modules()?;
                        modules.insert(module.to_string(), state.clone());
                        let new_version = row.version + 1;
                        let target = workspaces::table.filter(workspaces::id.eq(workspace_id))
                                                      .filter(workspaces::version.eq(row.version));
                        let affected =
                          diesel::update(target).set((workspaces::module_states.eq(serde_json::to_string(&modules)?),
                                                      workspaces::version.eq(new_version),
                                                      workspaces::updated_by.eq(Some(updated_by)),
                                                      workspaces::updated_at_ts.eq(Some(to_micros(updated_at)))))
                                                .execute(c)?;
                        if affected == 0 {
                          debug!(workspace_id, version = row.version, "otro escritor se adelantó");
                          return Ok(PersistResult::Conflict);
                        }
                        Ok(PersistResult::Ok { new_version })
                      })?;
    Ok(outcome)
  }
  fn list_workspaces(&self) -> Result<Vec<WorkspaceMeta>> {
    let mut conn = self.conn()?;
    let rows = map_db_err(workspaces::table.order(workspaces::id.asc()).load::<WorkspaceRow>(&mut conn))?;
    let mut out = Vec::with_capacity(rows.len());
    for r in rows {
      out.push(r.meta()?);
    }
    Ok(out)
  }
}
/// Registro de actividad persistido en la tabla `activity_log`.
#[derive(Clone)]
pub struct DieselAuditSink {
  pool: Arc<DbPool>,
}
impl DieselAuditSink {
  /// Actividad de un workspace en orden de registro.
  pub fn list_activity(&self, workspace_id: &str) -> Result<Vec<ActivityRecord>> {
    let mut conn = self.pool.get().map_err(|e| StoreError::Storage(format!("pool: {}", e)))?;
    let rows = map_db_err(activity_log::table.filter(activity_log::workspace_id.eq(workspace_id))
                                             .order((activity_log::recorded_at_ts.asc(), activity_log::id.asc()))
                                             .load::<ActivityRow>(&mut conn))?;
    let mut out = Vec::with_capacity(rows.len());
    for r in rows {
      out.push(r.into_record()?);
    }
    Ok(out)
  }
}
impl AuditSink for DieselAuditSink {
  fn log_activity(&self, record: &ActivityRecord) -> Result<()> {
    let mut conn = self.pool.get().map_err(|e| StoreError::Storage(format!("pool: {}", e)))?;
    let row = ActivityRow { id: Uuid::now_v7().to_string(),
                            workspace_id: record.workspace_id.clone(),
                            activity_type: record.activity_type.clone(),
                            performed_by: record.performed_by.clone(),
                            module: record.module.clone(),
                            metadata: serde_json::to_string(&record.metadata)?,
                            recorded_at_ts: to_micros(record.recorded_at) };
    map_db_err(diesel::insert_into(activity_log::table).values(&row).execute(&mut conn))?;
    Ok(())
  }
}
fn env_url() -> Option<String> {
  dotenvy::dotenv().ok();
  std::env::var("INSPECTION_DB_URL").or_else(|_| std::env::var("DATABASE_URL")).ok()
}
/// Crear repo desde las variables de entorno (`INSPECTION_DB_URL`, con
/// `DATABASE_URL` como respaldo).
#[cfg(feature = "pg")]
pub fn new_from_env() -> std::result::Result<DieselWorkspaceRepository, PersistenceError> {
  let url = env_url().ok_or_else(|| PersistenceError::Config("INSPECTION_DB_URL / DATABASE_URL no definido".into()))?;
  let l = url.to_lowercase();
  if !(l.starts_with("postgres") || url.contains('@')) {
    return Err(PersistenceError::Config("INSPECTION_DB_URL no parece una URL de Postgres".into()));
  }
  DieselWorkspaceRepository::new(&url)
}
/// Crear repo desde las variables de entorno; sin variables se usa una base
/// SQLite en memoria compartida.
#[cfg(not(feature = "pg"))]
pub fn new_from_env() -> std::result::Result<DieselWorkspaceRepository, PersistenceError> {
  let url = env_url().unwrap_or_else(|| DEFAULT_SQLITE_URL.to_string());
  if url.to_lowercase().starts_with("postgres") {
    return Err(PersistenceError::Config("inspection-persistence se compiló sin la feature 'pg'".into()));
  }
  DieselWorkspaceRepository::new(&url)
}
// Helper de pruebas: una sola conexión, de modo que `:memory:` conserva la
// misma base durante toda la vida del repo.
#[cfg(not(feature = "pg"))]
pub fn new_sqlite_for_test(database_url: &str) -> std::result::Result<DieselWorkspaceRepository, PersistenceError> {
  DieselWorkspaceRepository::with_pool_size(database_url, 1)
}
