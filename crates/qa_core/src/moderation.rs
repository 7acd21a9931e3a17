use shared::{
    domain::{QuestionId, QuestionStatus},
    protocol::ServerEvent,
};
use tracing::debug;

use crate::{
    error::CoreError,
    question_in_session,
    views::{focused_event, questions_updated},
    ApiContext, Dispatch,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationAction {
    Focus,
    Unfocus,
    Answer,
    Hide,
    Restore,
}

impl ModerationAction {
    pub fn target(self) -> QuestionStatus {
        match self {
            ModerationAction::Focus => QuestionStatus::Focused,
            ModerationAction::Unfocus | ModerationAction::Restore => QuestionStatus::Active,
            ModerationAction::Answer => QuestionStatus::Answered,
            ModerationAction::Hide => QuestionStatus::Hidden,
        }
    }

    /// Whether the focus display must be cleared after the action, given the
    /// status the question had before it.
    fn clears_focus(self, previous: QuestionStatus) -> bool {
        match self {
            ModerationAction::Unfocus | ModerationAction::Answer => true,
            ModerationAction::Hide | ModerationAction::Restore => {
                previous == QuestionStatus::Focused
            }
            ModerationAction::Focus => false,
        }
    }
}

/// Applies a speaker action to one question of the session.
///
/// Focusing demotes any other focused question of the same session in the
/// same transaction, so a session never has more than one.
pub async fn moderate(
    ctx: &ApiContext,
    slug: &str,
    question_id: QuestionId,
    action: ModerationAction,
) -> Result<Dispatch, CoreError> {
    let (session, question) = question_in_session(ctx, slug, question_id).await?;
    let target = action.target();
    if !question.status.can_transition_to(target) {
        return Err(CoreError::InvalidTransition {
            from: question.status,
            to: target,
        });
    }

    let applied = match action {
        ModerationAction::Focus => {
            ctx.storage
                .focus_question(session.session_id, question_id)
                .await?
        }
        _ => ctx.storage.set_question_status(question_id, target).await?,
    };
    if !applied {
        return Err(CoreError::NotFound("question"));
    }
    debug!(
        slug = %session.slug,
        question_id = question_id.0,
        from = %question.status,
        to = %target,
        "question moderated"
    );

    let mut broadcast = vec![questions_updated(ctx, session.session_id).await?];
    if action == ModerationAction::Focus {
        let focused = ctx
            .storage
            .question(question_id)
            .await?
            .ok_or(CoreError::NotFound("question"))?;
        broadcast.push(focused_event(&focused));
    } else if action.clears_focus(question.status) {
        broadcast.push(ServerEvent::QuestionUnfocused);
    }

    Ok(Dispatch {
        broadcast,
        reply: Vec::new(),
        slug: session.slug,
    })
}

pub async fn focus(
    ctx: &ApiContext,
    slug: &str,
    question_id: QuestionId,
) -> Result<Dispatch, CoreError> {
    moderate(ctx, slug, question_id, ModerationAction::Focus).await
}

pub async fn unfocus(
    ctx: &ApiContext,
    slug: &str,
    question_id: QuestionId,
) -> Result<Dispatch, CoreError> {
    moderate(ctx, slug, question_id, ModerationAction::Unfocus).await
}

pub async fn answer(
    ctx: &ApiContext,
    slug: &str,
    question_id: QuestionId,
) -> Result<Dispatch, CoreError> {
    moderate(ctx, slug, question_id, ModerationAction::Answer).await
}

pub async fn hide(
    ctx: &ApiContext,
    slug: &str,
    question_id: QuestionId,
) -> Result<Dispatch, CoreError> {
    moderate(ctx, slug, question_id, ModerationAction::Hide).await
}

pub async fn restore(
    ctx: &ApiContext,
    slug: &str,
    question_id: QuestionId,
) -> Result<Dispatch, CoreError> {
    moderate(ctx, slug, question_id, ModerationAction::Restore).await
}
