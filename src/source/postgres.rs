use super::RecordSource;
use crate::error::IndexError;
use crate::importer::definition::{Crutch, IndexDefinition, Scope};
use sqlx::PgPool;
use sqlx::postgres::{PgPoolOptions, PgRow};
use std::marker::PhantomData;

/// Postgres-backed record source for one index definition.
pub struct PgSource<D> {
    pool: PgPool,
    _definition: PhantomData<fn() -> D>,
}

impl<D> Clone for PgSource<D> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _definition: PhantomData,
        }
    }
}

impl<D: IndexDefinition> PgSource<D> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _definition: PhantomData,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Connect a pool sized for `connections` concurrent holders.
pub async fn connect(database_url: &str, connections: u32) -> Result<PgPool, IndexError> {
    let pool = PgPoolOptions::new()
        .max_connections(connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

fn existence_sql<D: IndexDefinition>(primary_key: &str) -> String {
    match D::EXISTENCE_FILTER {
        Some(filter) => format!(
            "SELECT {pk} FROM {table} WHERE {pk} = ANY($1) AND ({filter})",
            pk = primary_key,
            table = D::TABLE,
        ),
        None => format!(
            "SELECT {pk} FROM {table} WHERE {pk} = ANY($1)",
            pk = primary_key,
            table = D::TABLE,
        ),
    }
}

impl<D> RecordSource<D> for PgSource<D>
where
    D: IndexDefinition,
    D::Record: for<'r> sqlx::FromRow<'r, PgRow> + Unpin,
{
    async fn fetch_page(
        &self,
        scope: &'static Scope,
        after: Option<D::Key>,
        limit: usize,
    ) -> Result<Vec<(D::Key, D::Key)>, IndexError> {
        let rows = sqlx::query_as::<_, (D::Key, D::Key)>(scope.sql)
            .bind(after)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn load_records(&self, keys: &[D::Key]) -> Result<Vec<D::Record>, IndexError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let records = sqlx::query_as::<_, D::Record>(D::RECORDS_SQL)
            .bind(keys.to_vec())
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn fetch_crutch(
        &self,
        crutch: &'static Crutch,
        keys: &[D::Key],
    ) -> Result<Vec<(D::Key, i64)>, IndexError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, (D::Key, i64)>(crutch.sql)
            .bind(keys.to_vec())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn existing_keys(
        &self,
        primary_key: &'static str,
        keys: &[D::Key],
    ) -> Result<Vec<D::Key>, IndexError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let sql = existence_sql::<D>(primary_key);
        let rows = sqlx::query_scalar::<_, D::Key>(&sql)
            .bind(keys.to_vec())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn count_estimate(&self) -> Result<u64, IndexError> {
        // reltuples is -1 for tables that were never analyzed
        let estimate: Option<i64> = sqlx::query_scalar(
            "SELECT reltuples::bigint FROM pg_class WHERE oid = to_regclass($1)",
        )
        .bind(D::TABLE)
        .fetch_optional(&self.pool)
        .await?;

        Ok(estimate.unwrap_or(0).max(0) as u64)
    }
}
