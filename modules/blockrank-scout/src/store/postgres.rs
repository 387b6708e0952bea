// Postgres-backed record store. Only rank, search_volume and updated_at are
// ever written to keyword_records; activity_logs is insert-only.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use blockrank_common::{
    ActivityLogEntry, BlockRankError, RankUpdate, Record, RecordFilter, RecordKey, Result,
};

use crate::traits::RecordStore;

const MAX_CONNECTIONS: u32 = 5;

pub struct PgRecordStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct RecordRow {
    id: String,
    keyword: String,
    link: Option<String>,
    title: Option<String>,
    author: Option<String>,
    linked_accounts: Vec<String>,
}

impl From<RecordRow> for Record {
    fn from(row: RecordRow) -> Self {
        Record {
            id: row.id,
            keyword: row.keyword,
            link: row.link,
            title: row.title,
            author: row.author,
            linked_accounts: row.linked_accounts,
        }
    }
}

fn persist(e: impl std::fmt::Display) -> BlockRankError {
    BlockRankError::Persist(e.to_string())
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(database_url)
            .await
            .map_err(persist)?;
        Ok(Self::new(pool))
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(persist)?;
        info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert or replace a tracked record. Rank state is left as is.
    pub async fn upsert_record(&self, record: &Record) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO keyword_records (id, keyword, link, title, author, linked_accounts)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id, keyword) DO UPDATE
                SET link = EXCLUDED.link,
                    title = EXCLUDED.title,
                    author = EXCLUDED.author,
                    linked_accounts = EXCLUDED.linked_accounts
            "#,
        )
        .bind(&record.id)
        .bind(&record.keyword)
        .bind(&record.link)
        .bind(&record.title)
        .bind(&record.author)
        .bind(&record.linked_accounts)
        .execute(&self.pool)
        .await
        .map_err(persist)?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn load_records(&self, filter: &RecordFilter) -> Result<Vec<Record>> {
        // Least recently refreshed first, so a limited run rotates through records.
        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT id, keyword, link, title, author, linked_accounts
            FROM keyword_records
            WHERE ($1::text IS NULL OR id = $1)
              AND ($2::text IS NULL OR keyword = $2)
            ORDER BY updated_at ASC NULLS FIRST, id, keyword
            LIMIT $3
            "#,
        )
        .bind(&filter.id)
        .bind(&filter.keyword)
        .bind(filter.limit.map(i64::from))
        .fetch_all(&self.pool)
        .await
        .map_err(persist)?;

        debug!(count = rows.len(), ?filter, "Loaded records");
        Ok(rows.into_iter().map(Record::from).collect())
    }

    async fn save_rank(&self, key: &RecordKey, update: &RankUpdate) -> Result<()> {
        let rank = update.rank.map(|r| r as i32);
        let volume = update.search_volume.map(|v| v as i64);

        let result = sqlx::query(
            r#"
            UPDATE keyword_records
            SET rank = $3,
                search_volume = COALESCE($4, search_volume),
                updated_at = $5
            WHERE id = $1 AND keyword = $2
            "#,
        )
        .bind(&key.id)
        .bind(&key.keyword)
        .bind(rank)
        .bind(volume)
        .bind(update.updated_at)
        .execute(&self.pool)
        .await
        .map_err(persist)?;

        if result.rows_affected() == 0 {
            return Err(BlockRankError::Persist(format!(
                "no record for id={} keyword={}",
                key.id, key.keyword
            )));
        }
        Ok(())
    }

    async fn append_activity(&self, entry: &ActivityLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO activity_logs
                (id, action, record_id, keyword, actor_id, actor_role, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&entry.action)
        .bind(&entry.record_id)
        .bind(&entry.keyword)
        .bind(&entry.actor_id)
        .bind(&entry.actor_role)
        .bind(&entry.metadata)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await
        .map_err(persist)?;
        Ok(())
    }
}
