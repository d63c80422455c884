//! Postgres-backed implementation of `qbfleet_core::InstanceStore`.

use async_trait::async_trait;
use qbfleet_core::{Instance, InstanceId, InstanceStore, InstanceStoreError};
use sqlx::{FromRow, PgPool};

use crate::error::DataError;

const SELECT_INSTANCE: &str = r"
    SELECT id, name, base_url, username, encrypted_password, password_nonce,
           basic_username, encrypted_basic_password, basic_password_nonce,
           is_active, has_local_filesystem_access, created_at, updated_at
    FROM fleet.instances
    WHERE id = $1
";

const SELECT_ACTIVE_IDS: &str = r"
    SELECT id FROM fleet.instances WHERE is_active ORDER BY id
";

/// `sqlx`-backed repository for the `fleet.instances` table.
#[derive(Clone)]
pub struct PgInstanceStore {
    pool: PgPool,
}

impl PgInstanceStore {
    /// Open the store, applying pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail or the database is unreachable.
    pub async fn new(pool: PgPool) -> crate::error::Result<Self> {
        let mut migrator = sqlx::migrate!("./migrations");
        migrator.set_ignore_missing(true);
        migrator
            .run(&pool)
            .await
            .map_err(|source| DataError::MigrationFailed { source })?;
        Ok(Self { pool })
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_instance(&self, id: InstanceId) -> crate::error::Result<Option<Instance>> {
        let row = sqlx::query(SELECT_INSTANCE)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|source| DataError::QueryFailed {
                operation: "fetch instance",
                source,
            })?;

        let Some(row) = row else { return Ok(None) };
        InstanceRow::from_row(&row)
            .map(|row| Some(Instance::from(row)))
            .map_err(DataError::from)
    }
}

#[async_trait]
impl InstanceStore for PgInstanceStore {
    async fn instance(&self, id: InstanceId) -> Result<Instance, InstanceStoreError> {
        match self.fetch_instance(id).await {
            Ok(Some(instance)) => Ok(instance),
            Ok(None) => Err(InstanceStoreError::NotFound { id }),
            Err(source) => Err(InstanceStoreError::QueryFailed {
                source: Box::new(source),
            }),
        }
    }

    async fn active_instance_ids(&self) -> Result<Vec<InstanceId>, InstanceStoreError> {
        sqlx::query_scalar::<_, InstanceId>(SELECT_ACTIVE_IDS)
            .fetch_all(&self.pool)
            .await
            .map_err(|source| InstanceStoreError::QueryFailed {
                source: Box::new(DataError::from(source)),
            })
    }
}

#[derive(Debug, Clone, FromRow)]
struct InstanceRow {
    id: InstanceId,
    name: String,
    base_url: String,
    username: String,
    encrypted_password: String,
    password_nonce: String,
    basic_username: Option<String>,
    encrypted_basic_password: Option<String>,
    basic_password_nonce: Option<String>,
    is_active: bool,
    has_local_filesystem_access: bool,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<InstanceRow> for Instance {
    fn from(row: InstanceRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            base_url: row.base_url,
            username: row.username,
            encrypted_password: row.encrypted_password,
            password_nonce: row.password_nonce,
            basic_username: row.basic_username,
            encrypted_basic_password: row.encrypted_basic_password,
            basic_password_nonce: row.basic_password_nonce,
            is_active: row.is_active,
            has_local_filesystem_access: row.has_local_filesystem_access,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
