use chrono::{DateTime, Duration, Utc};
use shared::protocol::{CreateSessionRequest, SessionStats, SessionSummary};
use storage::{ExpiredSessions, NewSession, StoredSession};
use tracing::info;

use crate::{
    error::CoreError,
    slug::session_slug,
    validation::{required_field, validate_speaker_image},
    ApiContext,
};

pub const SESSION_RETENTION_HOURS: i64 = 24;

pub async fn create_session(
    ctx: &ApiContext,
    request: &CreateSessionRequest,
) -> Result<SessionSummary, CoreError> {
    let title = required_field(&request.title, "title")?;
    let speaker = required_field(&request.speaker, "speaker")?;
    let speaker_image = request
        .speaker_image
        .as_deref()
        .map(str::trim)
        .filter(|image| !image.is_empty());
    if let Some(image) = speaker_image {
        validate_speaker_image(image)?;
    }

    let slug = session_slug(title);
    let session = ctx
        .storage
        .create_session(NewSession {
            slug: &slug,
            title,
            speaker,
            speaker_image,
        })
        .await?;

    info!(slug = %session.slug, session_id = session.session_id.0, "session created");
    Ok(session_summary(session))
}

pub async fn get_session(ctx: &ApiContext, slug: &str) -> Result<SessionSummary, CoreError> {
    ctx.storage
        .session_by_slug(slug)
        .await?
        .map(session_summary)
        .ok_or(CoreError::NotFound("session"))
}

pub async fn session_stats(ctx: &ApiContext) -> Result<SessionStats, CoreError> {
    Ok(SessionStats {
        total_sessions: ctx.storage.total_sessions_created().await?,
    })
}

/// Removes every session created more than `retention` before `now`,
/// including its questions and votes.
pub async fn expire_sessions(
    ctx: &ApiContext,
    now: DateTime<Utc>,
    retention: Duration,
) -> Result<ExpiredSessions, CoreError> {
    let expired = ctx
        .storage
        .expire_sessions_created_before(now - retention)
        .await?;
    if !expired.slugs.is_empty() {
        info!(
            sessions = expired.slugs.len(),
            questions = expired.questions,
            votes = expired.votes,
            "expired sessions removed"
        );
    }
    Ok(expired)
}

fn session_summary(session: StoredSession) -> SessionSummary {
    SessionSummary {
        id: session.session_id,
        slug: session.slug,
        title: session.title,
        speaker: session.speaker,
        speaker_image: session.speaker_image,
        created_at: session.created_at,
    }
}
