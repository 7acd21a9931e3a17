//! Question lifecycle engine for live audience Q&A sessions.
//!
//! Every mutating operation validates its input, applies the change to the
//! store atomically and returns a [`Dispatch`]: the events to publish to all
//! viewers of the session and the events meant for the caller only. Failures
//! are reported as [`CoreError`] and are never broadcast.

use std::sync::Arc;

use shared::{domain::QuestionId, protocol::ServerEvent};
use storage::{Storage, StoredQuestion, StoredSession};

pub mod error;
pub mod moderation;
pub mod nickname;
pub mod profanity;
pub mod questions;
pub mod sessions;
pub mod slug;
pub mod validation;
pub mod views;

pub use error::CoreError;
pub use moderation::{answer, focus, hide, moderate, restore, unfocus, ModerationAction};
pub use nickname::generate_nickname;
pub use profanity::{ContentFilter, WordListFilter};
pub use questions::{delete_question, edit_question, join_session, submit_question, upvote};
pub use sessions::{
    create_session, expire_sessions, get_session, session_stats, SESSION_RETENTION_HOURS,
};

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub filter: Arc<dyn ContentFilter>,
}

impl ApiContext {
    pub fn new(storage: Storage, filter: impl ContentFilter + 'static) -> Self {
        Self {
            storage,
            filter: Arc::new(filter),
        }
    }
}

/// Events produced by a successful operation on one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dispatch {
    pub slug: String,
    /// For every viewer of `slug`, in order.
    pub broadcast: Vec<ServerEvent>,
    /// For the caller only.
    pub reply: Vec<ServerEvent>,
}

async fn session_for(ctx: &ApiContext, slug: &str) -> Result<StoredSession, CoreError> {
    ctx.storage
        .session_by_slug(slug)
        .await?
        .ok_or(CoreError::NotFound("session"))
}

/// Loads a question and checks that it belongs to the session named by `slug`.
async fn question_in_session(
    ctx: &ApiContext,
    slug: &str,
    question_id: QuestionId,
) -> Result<(StoredSession, StoredQuestion), CoreError> {
    let session = session_for(ctx, slug).await?;
    let question = ctx
        .storage
        .question(question_id)
        .await?
        .filter(|question| question.session_id == session.session_id)
        .ok_or(CoreError::NotFound("question"))?;
    Ok((session, question))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
