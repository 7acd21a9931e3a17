use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use shared::domain::{QuestionId, QuestionStatus, SessionId};

const SESSIONS_CREATED: &str = "sessions_created";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub session_id: SessionId,
    pub slug: String,
    pub title: String,
    pub speaker: String,
    pub speaker_image: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredQuestion {
    pub question_id: QuestionId,
    pub session_id: SessionId,
    pub text: String,
    pub nickname: String,
    pub visitor_id: Option<String>,
    pub upvotes: i64,
    pub status: QuestionStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSession<'a> {
    pub slug: &'a str,
    pub title: &'a str,
    pub speaker: &'a str,
    pub speaker_image: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct NewQuestion<'a> {
    pub session_id: SessionId,
    pub text: &'a str,
    pub nickname: &'a str,
    pub visitor_id: Option<&'a str>,
}

/// Result of a conditional vote insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// The vote row was inserted and the counter bumped to `upvotes`.
    Recorded { upvotes: i64 },
    AlreadyVoted,
    QuestionMissing,
}

/// Rows removed by one expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpiredSessions {
    pub slugs: Vec<String>,
    pub questions: u64,
    pub votes: u64,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let in_memory = sqlite_path(database_url).is_none();
        let mut connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }

        // Every in-memory connection is its own database, so tests pin one.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(connect_options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Installs the historical baseline for the all-time session counter.
    /// Has no effect once the counter exists.
    pub async fn seed_session_counter(&self, baseline: i64) -> Result<()> {
        sqlx::query("INSERT INTO counters (name, value) VALUES (?, ?) ON CONFLICT(name) DO NOTHING")
            .bind(SESSIONS_CREATED)
            .bind(baseline)
            .execute(&self.pool)
            .await
            .context("failed to seed session counter")?;
        Ok(())
    }

    pub async fn total_sessions_created(&self) -> Result<i64> {
        let value: Option<i64> = sqlx::query_scalar("SELECT value FROM counters WHERE name = ?")
            .bind(SESSIONS_CREATED)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value.unwrap_or_default())
    }

    /// Inserts the session and bumps the all-time counter in one transaction.
    pub async fn create_session(&self, new: NewSession<'_>) -> Result<StoredSession> {
        let created_at = Utc::now();
        let mut tx = self.pool.begin().await?;

        let session_id: i64 = sqlx::query_scalar(
            "INSERT INTO sessions (slug, title, speaker, speaker_image, created_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(new.slug)
        .bind(new.title)
        .bind(new.speaker)
        .bind(new.speaker_image)
        .bind(created_at)
        .fetch_one(&mut *tx)
        .await
        .with_context(|| format!("failed to insert session '{}'", new.slug))?;

        sqlx::query(
            "INSERT INTO counters (name, value) VALUES (?, 1)
             ON CONFLICT(name) DO UPDATE SET value = value + 1",
        )
        .bind(SESSIONS_CREATED)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(StoredSession {
            session_id: SessionId(session_id),
            slug: new.slug.to_string(),
            title: new.title.to_string(),
            speaker: new.speaker.to_string(),
            speaker_image: new.speaker_image.map(str::to_string),
            created_at,
        })
    }

    pub async fn session_by_slug(&self, slug: &str) -> Result<Option<StoredSession>> {
        let row = sqlx::query(
            "SELECT id, slug, title, speaker, speaker_image, created_at FROM sessions WHERE slug = ?",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(session_from_row).transpose()
    }

    pub async fn create_question(&self, new: NewQuestion<'_>) -> Result<QuestionId> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO questions (session_id, text, nickname, visitor_id, created_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(new.session_id.0)
        .bind(new.text)
        .bind(new.nickname)
        .bind(new.visitor_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .context("failed to insert question")?;
        Ok(QuestionId(id))
    }

    pub async fn question(&self, question_id: QuestionId) -> Result<Option<StoredQuestion>> {
        let row = sqlx::query(
            "SELECT id, session_id, text, nickname, visitor_id, upvotes, status, created_at
             FROM questions WHERE id = ?",
        )
        .bind(question_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(question_from_row).transpose()
    }

    /// Every question of a session in insertion order. Display ordering is
    /// applied by the caller.
    pub async fn list_questions(&self, session_id: SessionId) -> Result<Vec<StoredQuestion>> {
        let rows = sqlx::query(
            "SELECT id, session_id, text, nickname, visitor_id, upvotes, status, created_at
             FROM questions
             WHERE session_id = ?
             ORDER BY id ASC",
        )
        .bind(session_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(question_from_row).collect()
    }

    /// Nickname most recently used by a visitor in a session, if any.
    pub async fn nickname_for_visitor(
        &self,
        session_id: SessionId,
        visitor_id: &str,
    ) -> Result<Option<String>> {
        let nickname = sqlx::query_scalar(
            "SELECT nickname FROM questions
             WHERE session_id = ? AND visitor_id = ?
             ORDER BY id DESC
             LIMIT 1",
        )
        .bind(session_id.0)
        .bind(visitor_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(nickname)
    }

    pub async fn set_question_status(
        &self,
        question_id: QuestionId,
        status: QuestionStatus,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE questions SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(question_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Moves every other focused question of the session back to active and
    /// focuses `question_id`. Returns `false` (and changes nothing) when the
    /// question is not part of the session.
    pub async fn focus_question(
        &self,
        session_id: SessionId,
        question_id: QuestionId,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE questions SET status = 'active'
             WHERE session_id = ? AND status = 'focused' AND id != ?",
        )
        .bind(session_id.0)
        .bind(question_id.0)
        .execute(&mut *tx)
        .await?;

        let focused = sqlx::query(
            "UPDATE questions SET status = 'focused' WHERE id = ? AND session_id = ?",
        )
        .bind(question_id.0)
        .bind(session_id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if focused == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    /// Replaces the text, resets the counter and purges the vote rows together.
    pub async fn update_question_text(&self, question_id: QuestionId, text: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE questions SET text = ?, upvotes = 0 WHERE id = ?")
            .bind(text)
            .bind(question_id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM votes WHERE question_id = ?")
            .bind(question_id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    pub async fn delete_question(&self, question_id: QuestionId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM votes WHERE question_id = ?")
            .bind(question_id.0)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM questions WHERE id = ?")
            .bind(question_id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted > 0)
    }

    /// Inserts the (question, visitor) vote if absent and bumps the counter
    /// only when a row was actually inserted.
    pub async fn record_vote(
        &self,
        question_id: QuestionId,
        visitor_id: &str,
    ) -> Result<VoteOutcome> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO votes (question_id, visitor_id)
             SELECT id, ? FROM questions WHERE id = ?
             ON CONFLICT(question_id, visitor_id) DO NOTHING",
        )
        .bind(visitor_id)
        .bind(question_id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            let question_exists = sqlx::query("SELECT 1 FROM questions WHERE id = ?")
                .bind(question_id.0)
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
            tx.rollback().await?;
            return Ok(if question_exists {
                VoteOutcome::AlreadyVoted
            } else {
                VoteOutcome::QuestionMissing
            });
        }

        let upvotes: i64 = sqlx::query_scalar(
            "UPDATE questions SET upvotes = upvotes + 1 WHERE id = ? RETURNING upvotes",
        )
        .bind(question_id.0)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(VoteOutcome::Recorded { upvotes })
    }

    /// Deletes every session created before `cutoff` together with its
    /// questions and votes. The session counter is left untouched.
    pub async fn expire_sessions_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<ExpiredSessions> {
        let mut tx = self.pool.begin().await?;

        let votes = sqlx::query(
            "DELETE FROM votes WHERE question_id IN (
                SELECT q.id FROM questions q
                INNER JOIN sessions s ON s.id = q.session_id
                WHERE s.created_at < ?
             )",
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await
        .context("failed to delete votes of expired sessions")?
        .rows_affected();

        let questions = sqlx::query(
            "DELETE FROM questions WHERE session_id IN (
                SELECT id FROM sessions WHERE created_at < ?
             )",
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await
        .context("failed to delete questions of expired sessions")?
        .rows_affected();

        let slugs: Vec<String> =
            sqlx::query_scalar("DELETE FROM sessions WHERE created_at < ? RETURNING slug")
                .bind(cutoff)
                .fetch_all(&mut *tx)
                .await
                .context("failed to delete expired sessions")?;

        tx.commit().await?;
        Ok(ExpiredSessions {
            slugs,
            questions,
            votes,
        })
    }
}

fn session_from_row(row: &SqliteRow) -> Result<StoredSession> {
    Ok(StoredSession {
        session_id: SessionId(row.try_get("id")?),
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        speaker: row.try_get("speaker")?,
        speaker_image: row.try_get("speaker_image")?,
        created_at: row.try_get("created_at")?,
    })
}

fn question_from_row(row: &SqliteRow) -> Result<StoredQuestion> {
    let status: String = row.try_get("status")?;
    Ok(StoredQuestion {
        question_id: QuestionId(row.try_get("id")?),
        session_id: SessionId(row.try_get("session_id")?),
        text: row.try_get("text")?,
        nickname: row.try_get("nickname")?,
        visitor_id: row.try_get("visitor_id")?,
        upvotes: row.try_get("upvotes")?,
        status: status.parse()?,
        created_at: row.try_get("created_at")?,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(parent) = sqlite_path(database_url)
        .as_deref()
        .and_then(Path::parent)
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
    else {
        return Ok(());
    };

    fs::create_dir_all(&parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })
}

/// On-disk path of a sqlite url, `None` for in-memory databases.
fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if !database_url.starts_with("sqlite:")
        || database_url.contains(":memory:")
        || database_url.contains("mode=memory")
    {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(PathBuf::from(path))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
