//! Postgres-backed incident table.

use std::fmt;

use async_trait::async_trait;
use beacon_model::{Incident, IncidentId};
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};

use super::IncidentStore;
use crate::{
    error::{ProvisionError, StoreError, StoreResult},
    provision::{Provisioning, is_valid_identifier},
};

/// Default table name for incident records.
pub const DEFAULT_INCIDENT_TABLE: &str = "incidents";

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, FromRow)]
struct IncidentRow {
    incident_id: String,
    title: String,
    description: String,
    status: String,
    creation_date: String,
}

impl From<IncidentRow> for Incident {
    fn from(row: IncidentRow) -> Self {
        Incident {
            incident_id: IncidentId::new(row.incident_id),
            title: row.title,
            description: row.description,
            status: row.status,
            creation_date: row.creation_date,
        }
    }
}

/// Incident store on a single Postgres table keyed by `incident_id`.
#[derive(Clone)]
pub struct PostgresIncidentStore {
    pool: PgPool,
    table: String,
}

impl fmt::Debug for PostgresIncidentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresIncidentStore")
            .field("table", &self.table)
            .field("pool_size", &self.pool.size())
            .field("idle_connections", &self.pool.num_idle())
            .finish()
    }
}

impl PostgresIncidentStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            table: DEFAULT_INCIDENT_TABLE.to_string(),
        }
    }

    /// Uses a custom table name. The name is spliced into SQL and therefore
    /// restricted to a plain identifier.
    pub fn with_table(
        pool: PgPool,
        table: impl Into<String>,
    ) -> Result<Self, ProvisionError> {
        let table = table.into();
        if !is_valid_identifier(&table) {
            return Err(ProvisionError::new(
                format!("incident table {table:?}"),
                "table name must be a plain SQL identifier",
            ));
        }
        Ok(Self { pool, table })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    async fn table_exists(&self) -> Result<bool, sqlx::Error> {
        let found: Option<String> =
            sqlx::query_scalar("SELECT to_regclass($1)::text")
                .bind(&self.table)
                .fetch_one(&self.pool)
                .await?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl IncidentStore for PostgresIncidentStore {
    async fn ensure_table(&self) -> Result<Provisioning, ProvisionError> {
        let resource = format!("incident table {}", self.table);

        if self
            .table_exists()
            .await
            .map_err(|e| ProvisionError::new(&resource, e))?
        {
            info!(table = %self.table, "incident table already exists");
            return Ok(Provisioning::Existing);
        }

        // IF NOT EXISTS covers a concurrent creator winning the race.
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                incident_id   TEXT PRIMARY KEY,
                title         TEXT NOT NULL,
                description   TEXT NOT NULL,
                status        TEXT NOT NULL,
                creation_date TEXT NOT NULL
            )
            "#,
            table = self.table
        );
        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| ProvisionError::new(&resource, e))?;

        info!(table = %self.table, "incident table created");
        Ok(Provisioning::Created)
    }

    async fn create(&self, incident: &Incident) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO {} (incident_id, title, description, status, creation_date) \
             VALUES ($1, $2, $3, $4, $5)",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(incident.incident_id.as_str())
            .bind(&incident.title)
            .bind(&incident.description)
            .bind(&incident.status)
            .bind(&incident.creation_date)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => {
                debug!(incident_id = %incident.incident_id, "incident row inserted");
                Ok(())
            }
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                Err(StoreError::DuplicateKey(incident.incident_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: &IncidentId) -> StoreResult<Incident> {
        let sql = format!(
            "SELECT incident_id, title, description, status, creation_date \
             FROM {} WHERE incident_id = $1",
            self.table
        );
        sqlx::query_as::<_, IncidentRow>(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Incident::from)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn update_status(
        &self,
        id: &IncidentId,
        status: &str,
    ) -> StoreResult<()> {
        let sql = format!(
            "UPDATE {} SET status = $2 WHERE incident_id = $1",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(id.as_str())
            .bind(status)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }

    async fn delete(&self, id: &IncidentId) -> StoreResult<()> {
        let sql = format!("DELETE FROM {} WHERE incident_id = $1", self.table);
        let result = sqlx::query(&sql)
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }
}
