//! SQLite backend for the family datastore and the document index.
//!
//! Tables:
//! - `profiles`, `babies`: caregiver and child records
//! - `conversations`: stored chat turns
//! - `baby_knowledge`: structured per-child facts
//! - `routines`, `routine_activities`: daily routines and their steps
//! - `documents` + `documents_fts`: reference chunks with an FTS5 index
//!   (BM25 ranking) acting as the similarity source
//!
//! Triggers keep the FTS index in sync on insert/delete.

use crate::text::{chunk_text, search_terms};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use lumi_core::error::{RetrievalError, StoreError};
use lumi_core::family::{
    ChildProfile, ConversationTurn, KnowledgeRecord, ParentProfile, RoutineActivity,
    RoutineProposal, SavedRoutine, StoredKnowledge, StoredRoutine,
};
use lumi_core::message::Role;
use lumi_core::retrieval::{DocumentChunk, SearchFilter, SimilaritySource};
use lumi_core::store::{ConversationStore, KnowledgeStore, ProfileStore, RoutineStore};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Target chunk size for ingested documents.
pub const DEFAULT_CHUNK_CHARS: usize = 1000;

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "profiles table",
        r#"
        CREATE TABLE IF NOT EXISTS profiles (
            id         TEXT PRIMARY KEY,
            user_id    TEXT NOT NULL,
            name       TEXT,
            birthdate  TEXT,
            feeding    TEXT
        )
        "#,
    ),
    (
        "babies table",
        r#"
        CREATE TABLE IF NOT EXISTS babies (
            iid          INTEGER PRIMARY KEY AUTOINCREMENT,
            id           TEXT UNIQUE NOT NULL,
            user_id      TEXT NOT NULL,
            name         TEXT NOT NULL,
            birthdate    TEXT NOT NULL,
            feeding_mode TEXT,
            weight_kg    REAL,
            height_cm    REAL
        )
        "#,
    ),
    (
        "conversations table",
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            iid        INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id    TEXT NOT NULL,
            role       TEXT NOT NULL,
            content    TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "conversations index",
        "CREATE INDEX IF NOT EXISTS idx_conversations_user_role ON conversations(user_id, role, created_at DESC)",
    ),
    (
        "baby_knowledge table",
        r#"
        CREATE TABLE IF NOT EXISTS baby_knowledge (
            iid              INTEGER PRIMARY KEY AUTOINCREMENT,
            id               TEXT UNIQUE NOT NULL,
            user_id          TEXT NOT NULL,
            baby_id          TEXT NOT NULL,
            category         TEXT NOT NULL,
            subcategory      TEXT,
            title            TEXT NOT NULL,
            description      TEXT NOT NULL,
            importance_level INTEGER NOT NULL DEFAULT 1,
            created_at       TEXT NOT NULL
        )
        "#,
    ),
    (
        "routines table",
        r#"
        CREATE TABLE IF NOT EXISTS routines (
            iid             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT UNIQUE NOT NULL,
            user_id         TEXT NOT NULL,
            baby_id         TEXT NOT NULL,
            routine_name    TEXT NOT NULL,
            context_summary TEXT NOT NULL,
            created_at      TEXT NOT NULL
        )
        "#,
    ),
    (
        "routine_activities table",
        r#"
        CREATE TABLE IF NOT EXISTS routine_activities (
            iid              INTEGER PRIMARY KEY AUTOINCREMENT,
            routine_id       TEXT NOT NULL REFERENCES routines(id) ON DELETE CASCADE,
            position         INTEGER NOT NULL,
            time             TEXT NOT NULL,
            activity         TEXT NOT NULL,
            duration_minutes INTEGER
        )
        "#,
    ),
    (
        "documents table",
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            iid        INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id  TEXT NOT NULL,
            content    TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    ),
    (
        "FTS5 table",
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
            content,
            content='documents',
            content_rowid='iid',
            tokenize='unicode61 remove_diacritics 2'
        )
        "#,
    ),
    (
        "insert trigger",
        r#"
        CREATE TRIGGER IF NOT EXISTS documents_ai AFTER INSERT ON documents BEGIN
            INSERT INTO documents_fts(rowid, content) VALUES (new.iid, new.content);
        END
        "#,
    ),
    (
        "delete trigger",
        r#"
        CREATE TRIGGER IF NOT EXISTS documents_ad AFTER DELETE ON documents BEGIN
            INSERT INTO documents_fts(documents_fts, rowid, content)
            VALUES ('delete', old.iid, old.content);
        END
        "#,
    ),
];

/// A SQLite-backed datastore and FTS5 document index.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // Every in-memory connection is its own database.
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        for (name, sql) in MIGRATIONS {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{name}: {e}")))?;
        }
        debug!("SQLite migrations complete");
        Ok(())
    }

    pub async fn insert_profile(
        &self,
        user_id: &str,
        profile: &ParentProfile,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO profiles (id, user_id, name, birthdate, feeding)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                birthdate = excluded.birthdate,
                feeding = excluded.feeding
            "#,
        )
        .bind(&profile.id)
        .bind(user_id)
        .bind(&profile.name)
        .bind(&profile.birthdate)
        .bind(&profile.feeding)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("profile insert: {e}")))?;
        Ok(())
    }

    pub async fn insert_baby(&self, baby: &ChildProfile) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO babies (id, user_id, name, birthdate, feeding_mode, weight_kg, height_cm)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&baby.id)
        .bind(&baby.user_id)
        .bind(&baby.name)
        .bind(baby.birthdate.format("%Y-%m-%d").to_string())
        .bind(&baby.feeding_mode)
        .bind(baby.weight_kg)
        .bind(baby.height_cm)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("baby insert: {e}")))?;
        Ok(())
    }

    pub async fn insert_turn(
        &self,
        user_id: &str,
        role: Role,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO conversations (user_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(user_id)
        .bind(role.as_str())
        .bind(content)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("conversation insert: {e}")))?;
        Ok(())
    }

    /// Split `text` into chunks and index them under `source_id`.
    ///
    /// Returns the number of chunks stored.
    pub async fn ingest_document(&self, source_id: &str, text: &str) -> Result<usize, StoreError> {
        let chunks = chunk_text(text, DEFAULT_CHUNK_CHARS);
        let now = Utc::now().to_rfc3339();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin: {e}")))?;
        for chunk in &chunks {
            sqlx::query("INSERT INTO documents (source_id, content, created_at) VALUES (?1, ?2, ?3)")
                .bind(source_id)
                .bind(chunk)
                .bind(&now)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Storage(format!("document insert: {e}")))?;
        }
        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit: {e}")))?;

        info!(source = %source_id, chunks = chunks.len(), "Document ingested");
        Ok(chunks.len())
    }

    /// Build an FTS5 query from user text.
    ///
    /// Each word is stripped to alphanumerics and quoted to prevent
    /// injection; words are OR-ed so BM25 ranks partial matches.
    fn sanitize_fts_query(text: &str) -> String {
        search_terms(text)
            .into_iter()
            .map(|w| format!("\"{w}\""))
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StoreError::QueryFailed(format!("bad timestamp {raw:?}: {e}")))
    }

    fn row_to_baby(row: &sqlx::sqlite::SqliteRow) -> Result<ChildProfile, StoreError> {
        let col = |e: sqlx::Error| StoreError::QueryFailed(format!("babies row: {e}"));
        let birthdate: String = row.try_get("birthdate").map_err(col)?;
        let birthdate = NaiveDate::parse_from_str(&birthdate, "%Y-%m-%d")
            .map_err(|e| StoreError::QueryFailed(format!("bad birthdate {birthdate:?}: {e}")))?;

        Ok(ChildProfile {
            id: row.try_get("id").map_err(col)?,
            user_id: row.try_get("user_id").map_err(col)?,
            name: row.try_get("name").map_err(col)?,
            birthdate,
            feeding_mode: row.try_get("feeding_mode").map_err(col)?,
            weight_kg: row.try_get("weight_kg").map_err(col)?,
            height_cm: row.try_get("height_cm").map_err(col)?,
        })
    }

    fn row_to_knowledge(row: &sqlx::sqlite::SqliteRow) -> Result<StoredKnowledge, StoreError> {
        let col = |e: sqlx::Error| StoreError::QueryFailed(format!("baby_knowledge row: {e}"));
        let created_at: String = row.try_get("created_at").map_err(col)?;
        let importance: i64 = row.try_get("importance_level").map_err(col)?;

        Ok(StoredKnowledge {
            id: row.try_get("id").map_err(col)?,
            baby_id: row.try_get("baby_id").map_err(col)?,
            record: KnowledgeRecord {
                category: row.try_get("category").map_err(col)?,
                subcategory: row.try_get("subcategory").map_err(col)?,
                title: row.try_get("title").map_err(col)?,
                description: row.try_get("description").map_err(col)?,
                importance_level: importance.clamp(0, u8::MAX as i64) as u8,
            },
            created_at: Self::parse_timestamp(&created_at)?,
        })
    }
}

#[async_trait]
impl ProfileStore for SqliteStore {
    async fn profiles_for_user(&self, user_id: &str) -> Result<Vec<ParentProfile>, StoreError> {
        let rows = sqlx::query("SELECT * FROM profiles WHERE user_id = ?1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("profiles: {e}")))?;

        rows.iter()
            .map(|row| {
                let col = |e: sqlx::Error| StoreError::QueryFailed(format!("profiles row: {e}"));
                Ok(ParentProfile {
                    id: row.try_get("id").map_err(col)?,
                    name: row.try_get("name").map_err(col)?,
                    birthdate: row.try_get("birthdate").map_err(col)?,
                    feeding: row.try_get("feeding").map_err(col)?,
                })
            })
            .collect()
    }

    async fn babies_for_user(&self, user_id: &str) -> Result<Vec<ChildProfile>, StoreError> {
        let rows = sqlx::query("SELECT * FROM babies WHERE user_id = ?1 ORDER BY iid")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("babies: {e}")))?;

        rows.iter().map(Self::row_to_baby).collect()
    }

    async fn find_baby_by_name(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<Option<String>, StoreError> {
        // SQLite's lower() only folds ASCII, so compare in Rust.
        let wanted = name.trim().to_lowercase();
        let babies = self.babies_for_user(user_id).await?;
        Ok(babies
            .into_iter()
            .find(|b| b.name.trim().to_lowercase() == wanted)
            .map(|b| b.id))
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn recent_turns(
        &self,
        user_id: &str,
        role: Role,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT role, content, created_at FROM conversations
            WHERE user_id = ?1 AND role = ?2
            ORDER BY created_at DESC, iid DESC
            LIMIT ?3
            "#,
        )
        .bind(user_id)
        .bind(role.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("conversations: {e}")))?;

        rows.iter()
            .map(|row| {
                let col =
                    |e: sqlx::Error| StoreError::QueryFailed(format!("conversations row: {e}"));
                let role: String = row.try_get("role").map_err(col)?;
                let created_at: String = row.try_get("created_at").map_err(col)?;
                Ok(ConversationTurn {
                    role: role.parse().map_err(StoreError::QueryFailed)?,
                    content: row.try_get("content").map_err(col)?,
                    created_at: Self::parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl KnowledgeStore for SqliteStore {
    async fn knowledge_for_user(&self, user_id: &str) -> Result<Vec<StoredKnowledge>, StoreError> {
        let rows = sqlx::query("SELECT * FROM baby_knowledge WHERE user_id = ?1 ORDER BY iid")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("baby_knowledge: {e}")))?;

        rows.iter().map(Self::row_to_knowledge).collect()
    }

    async fn save_knowledge(
        &self,
        user_id: &str,
        baby_id: &str,
        record: KnowledgeRecord,
    ) -> Result<StoredKnowledge, StoreError> {
        let stored = StoredKnowledge {
            id: Uuid::new_v4().to_string(),
            baby_id: baby_id.to_string(),
            record,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO baby_knowledge
                (id, user_id, baby_id, category, subcategory, title, description, importance_level, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&stored.id)
        .bind(user_id)
        .bind(baby_id)
        .bind(&stored.record.category)
        .bind(&stored.record.subcategory)
        .bind(&stored.record.title)
        .bind(&stored.record.description)
        .bind(stored.record.importance_level as i64)
        .bind(stored.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("baby_knowledge insert: {e}")))?;

        debug!(id = %stored.id, baby_id, "Stored knowledge");
        Ok(stored)
    }
}

#[async_trait]
impl RoutineStore for SqliteStore {
    async fn routines_for_user(&self, user_id: &str) -> Result<Vec<StoredRoutine>, StoreError> {
        let routine_rows = sqlx::query("SELECT * FROM routines WHERE user_id = ?1 ORDER BY iid")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("routines: {e}")))?;

        let activity_rows = sqlx::query(
            r#"
            SELECT a.* FROM routine_activities a
            JOIN routines r ON r.id = a.routine_id
            WHERE r.user_id = ?1
            ORDER BY a.routine_id, a.position
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("routine_activities: {e}")))?;

        let mut activities: HashMap<String, Vec<RoutineActivity>> = HashMap::new();
        for row in &activity_rows {
            let col =
                |e: sqlx::Error| StoreError::QueryFailed(format!("routine_activities row: {e}"));
            let routine_id: String = row.try_get("routine_id").map_err(col)?;
            let duration: Option<i64> = row.try_get("duration_minutes").map_err(col)?;
            activities.entry(routine_id).or_default().push(RoutineActivity {
                time: row.try_get("time").map_err(col)?,
                activity: row.try_get("activity").map_err(col)?,
                duration_minutes: duration.map(|d| d.max(0) as u32),
            });
        }

        routine_rows
            .iter()
            .map(|row| {
                let col = |e: sqlx::Error| StoreError::QueryFailed(format!("routines row: {e}"));
                let id: String = row.try_get("id").map_err(col)?;
                let created_at: String = row.try_get("created_at").map_err(col)?;
                Ok(StoredRoutine {
                    activities: activities.remove(&id).unwrap_or_default(),
                    id,
                    baby_id: row.try_get("baby_id").map_err(col)?,
                    routine_name: row.try_get("routine_name").map_err(col)?,
                    context_summary: row.try_get("context_summary").map_err(col)?,
                    created_at: Self::parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }

    async fn save_routine(
        &self,
        user_id: &str,
        baby_id: &str,
        routine: &RoutineProposal,
    ) -> Result<SavedRoutine, StoreError> {
        let routine_id = Uuid::new_v4().to_string();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO routines (id, user_id, baby_id, routine_name, context_summary, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&routine_id)
        .bind(user_id)
        .bind(baby_id)
        .bind(&routine.routine_name)
        .bind(&routine.context_summary)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("routine insert: {e}")))?;

        for (position, activity) in routine.activities.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO routine_activities (routine_id, position, time, activity, duration_minutes)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(&routine_id)
            .bind(position as i64)
            .bind(&activity.time)
            .bind(&activity.activity)
            .bind(activity.duration_minutes.map(i64::from))
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("routine activity insert: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit: {e}")))?;

        debug!(routine_id = %routine_id, baby_id, "Stored routine");
        Ok(SavedRoutine {
            routine_id,
            activities_count: routine.activities.len(),
        })
    }
}

#[async_trait]
impl SimilaritySource for SqliteStore {
    fn name(&self) -> &str {
        "sqlite_fts"
    }

    async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<DocumentChunk>, RetrievalError> {
        let fts_query = Self::sanitize_fts_query(query);
        if fts_query.is_empty() || k == 0 {
            return Ok(vec![]);
        }

        let source = filter.and_then(|f| f.source_id.as_deref());
        let sql = r#"
            SELECT d.source_id, d.content, bm25(documents_fts) AS rank
            FROM documents_fts f
            JOIN documents d ON d.iid = f.rowid
            WHERE documents_fts MATCH ?1
              AND (?3 IS NULL OR d.source_id = ?3)
            ORDER BY rank
            LIMIT ?2
        "#;

        let rows = sqlx::query(sql)
            .bind(&fts_query)
            .bind(k as i64)
            .bind(source)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RetrievalError::SearchFailed(format!("FTS5 search: {e}")))?;

        rows.iter()
            .map(|row| {
                let col = |e: sqlx::Error| RetrievalError::SearchFailed(format!("row: {e}"));
                // bm25() is negative, lower is better
                let rank: f64 = row.try_get("rank").map_err(col)?;
                Ok(DocumentChunk::new(
                    row.try_get::<String, _>("content").map_err(col)?,
                    row.try_get::<String, _>("source_id").map_err(col)?,
                )
                .with_score((-rank) as f32))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    fn baby(id: &str, name: &str) -> ChildProfile {
        ChildProfile {
            id: id.into(),
            user_id: "u1".into(),
            name: name.into(),
            birthdate: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            feeding_mode: Some("lactancia materna".into()),
            weight_kg: Some(8.2),
            height_cm: None,
        }
    }

    #[tokio::test]
    async fn sanitize_fts_query_quotes_and_ors() {
        assert_eq!(
            SqliteStore::sanitize_fts_query("¿sueño del bebé?"),
            "\"sueño\" OR \"del\" OR \"bebé\""
        );
        assert_eq!(SqliteStore::sanitize_fts_query("a ? !"), "");
    }

    #[tokio::test]
    async fn babies_round_trip() {
        let db = test_store().await;
        db.insert_baby(&baby("b1", "Ana")).await.unwrap();
        db.insert_baby(&baby("b2", "Lucía")).await.unwrap();

        let babies = db.babies_for_user("u1").await.unwrap();
        assert_eq!(babies.len(), 2);
        assert_eq!(babies[0].name, "Ana");
        assert_eq!(babies[0].weight_kg, Some(8.2));
        assert!(babies[0].height_cm.is_none());
        assert_eq!(babies[0].birthdate, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());

        assert_eq!(
            db.find_baby_by_name("u1", "LUCÍA").await.unwrap().as_deref(),
            Some("b2")
        );
        assert!(db.find_baby_by_name("u2", "Ana").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn profiles_are_scoped_to_user() {
        let db = test_store().await;
        db.insert_profile(
            "u1",
            &ParentProfile {
                id: "u1".into(),
                name: Some("María".into()),
                birthdate: Some("1990-05-01".into()),
                feeding: None,
            },
        )
        .await
        .unwrap();

        let profiles = db.profiles_for_user("u1").await.unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].name.as_deref(), Some("María"));
        assert!(db.profiles_for_user("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recent_turns_per_role_newest_first() {
        let db = test_store().await;
        let base = Utc::now() - Duration::hours(2);
        for i in 0..8 {
            db.insert_turn("u1", Role::User, &format!("u{i}"), base + Duration::minutes(i))
                .await
                .unwrap();
        }
        db.insert_turn("u1", Role::Assistant, "a0", base).await.unwrap();

        let turns = db.recent_turns("u1", Role::User, 5).await.unwrap();
        assert_eq!(turns.len(), 5);
        assert_eq!(turns[0].content, "u7");
        assert_eq!(turns[4].content, "u3");
        assert!(turns.iter().all(|t| t.role == Role::User));

        let assistant = db.recent_turns("u1", Role::Assistant, 5).await.unwrap();
        assert_eq!(assistant.len(), 1);
    }

    #[tokio::test]
    async fn knowledge_round_trip() {
        let db = test_store().await;
        let saved = db
            .save_knowledge(
                "u1",
                "b1",
                KnowledgeRecord {
                    category: "salud".into(),
                    subcategory: Some("alergias".into()),
                    title: "Alergia al huevo".into(),
                    description: "Reacción leve al huevo".into(),
                    importance_level: 3,
                },
            )
            .await
            .unwrap();

        let all = db.knowledge_for_user("u1").await.unwrap();
        assert_eq!(all, vec![saved]);
        assert!(db.knowledge_for_user("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn routine_round_trip_keeps_activity_order() {
        let db = test_store().await;
        let proposal = RoutineProposal {
            baby_name: "Ana".into(),
            routine_name: "Mañana".into(),
            context_summary: "Rutina de la mañana".into(),
            activities: vec![
                RoutineActivity {
                    time: "07:00".into(),
                    activity: "despertar".into(),
                    duration_minutes: None,
                },
                RoutineActivity {
                    time: "07:30".into(),
                    activity: "desayuno".into(),
                    duration_minutes: Some(30),
                },
            ],
        };
        let saved = db.save_routine("u1", "b1", &proposal).await.unwrap();
        assert_eq!(saved.activities_count, 2);

        let routines = db.routines_for_user("u1").await.unwrap();
        assert_eq!(routines.len(), 1);
        assert_eq!(routines[0].activities, proposal.activities);
        assert_eq!(routines[0].routine_name, "Mañana");
    }

    #[tokio::test]
    async fn fts_search_ranks_and_filters_by_source() {
        let db = test_store().await;
        db.ingest_document("sueno.pdf", "El sueño del bebé cambia mucho.\n\nLas siestas se acortan.")
            .await
            .unwrap();
        db.ingest_document("lactancia.pdf", "La lactancia nocturna ayuda al sueño.")
            .await
            .unwrap();

        let results = db.search("sueño bebé", 10, None).await.unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].source_id, "sueno.pdf");
        assert!(results.iter().all(|r| r.relevance_score.is_some()));

        let filtered = db
            .search("sueño", 10, Some(&SearchFilter::source("lactancia.pdf")))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].source_id, "lactancia.pdf");
    }

    #[tokio::test]
    async fn fts_search_without_matches_is_empty() {
        let db = test_store().await;
        db.ingest_document("a.pdf", "Juegos al aire libre").await.unwrap();
        assert!(db.search("dormir", 5, None).await.unwrap().is_empty());
        assert!(db.search("?!", 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lumi.db");
        let url = format!("sqlite://{}", path.display());
        {
            let db = SqliteStore::new(&url).await.unwrap();
            db.insert_baby(&baby("b1", "Ana")).await.unwrap();
        }
        let db = SqliteStore::new(&url).await.unwrap();
        assert_eq!(db.babies_for_user("u1").await.unwrap().len(), 1);
    }
}
