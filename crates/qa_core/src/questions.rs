use shared::{
    domain::{QuestionId, QuestionStatus},
    protocol::ServerEvent,
};
use storage::{NewQuestion, VoteOutcome};
use tracing::debug;

use crate::{
    error::CoreError,
    nickname::generate_nickname,
    question_in_session, session_for,
    validation::validate_question_text,
    views::{focused_event, questions_updated},
    ApiContext, Dispatch,
};

/// Current lists for a viewer entering a session. Nothing is broadcast.
pub async fn join_session(ctx: &ApiContext, slug: &str) -> Result<Dispatch, CoreError> {
    let session = session_for(ctx, slug).await?;
    let lists = questions_updated(ctx, session.session_id).await?;
    Ok(Dispatch {
        slug: session.slug,
        broadcast: Vec::new(),
        reply: vec![lists],
    })
}

/// Stores a new active question. The asker gets back the nickname that was
/// used: the one supplied, else the one this visitor used earlier in the
/// session, else a freshly generated one.
pub async fn submit_question(
    ctx: &ApiContext,
    slug: &str,
    text: &str,
    visitor_id: &str,
    nickname: Option<&str>,
) -> Result<Dispatch, CoreError> {
    let session = session_for(ctx, slug).await?;
    let text = validate_question_text(text, ctx.filter.as_ref())?;
    let visitor_id = Some(visitor_id.trim()).filter(|id| !id.is_empty());

    let nickname = match nickname.map(str::trim).filter(|n| !n.is_empty()) {
        Some(nickname) => nickname.to_string(),
        None => {
            let previous = match visitor_id {
                Some(visitor_id) => {
                    ctx.storage
                        .nickname_for_visitor(session.session_id, visitor_id)
                        .await?
                }
                None => None,
            };
            previous.unwrap_or_else(generate_nickname)
        }
    };

    let question_id = ctx
        .storage
        .create_question(NewQuestion {
            session_id: session.session_id,
            text,
            nickname: &nickname,
            visitor_id,
        })
        .await?;
    debug!(slug = %session.slug, question_id = question_id.0, "question submitted");

    Ok(Dispatch {
        broadcast: vec![questions_updated(ctx, session.session_id).await?],
        reply: vec![ServerEvent::NicknameAssigned { nickname }],
        slug: session.slug,
    })
}

pub async fn upvote(
    ctx: &ApiContext,
    slug: &str,
    question_id: QuestionId,
    visitor_id: &str,
) -> Result<Dispatch, CoreError> {
    let visitor_id = visitor_id.trim();
    if visitor_id.is_empty() {
        return Err(CoreError::validation("missing visitor token"));
    }
    let (session, _) = question_in_session(ctx, slug, question_id).await?;

    match ctx.storage.record_vote(question_id, visitor_id).await? {
        VoteOutcome::Recorded { upvotes } => {
            debug!(slug = %session.slug, question_id = question_id.0, upvotes, "vote recorded");
        }
        VoteOutcome::AlreadyVoted => return Err(CoreError::AlreadyVoted),
        VoteOutcome::QuestionMissing => return Err(CoreError::NotFound("question")),
    }

    Ok(Dispatch {
        broadcast: vec![questions_updated(ctx, session.session_id).await?],
        reply: Vec::new(),
        slug: session.slug,
    })
}

/// Author-only edit. Accumulated votes are forfeited so earlier voters can
/// vote again on the new wording.
pub async fn edit_question(
    ctx: &ApiContext,
    slug: &str,
    question_id: QuestionId,
    new_text: &str,
    nickname: &str,
) -> Result<Dispatch, CoreError> {
    let (session, question) = question_in_session(ctx, slug, question_id).await?;
    if question.nickname != nickname {
        return Err(CoreError::Unauthorized("you can only edit your own questions"));
    }
    let new_text = validate_question_text(new_text, ctx.filter.as_ref())?;

    if !ctx.storage.update_question_text(question_id, new_text).await? {
        return Err(CoreError::NotFound("question"));
    }

    let mut broadcast = vec![questions_updated(ctx, session.session_id).await?];
    if question.status == QuestionStatus::Focused {
        if let Some(edited) = ctx.storage.question(question_id).await? {
            broadcast.push(focused_event(&edited));
        }
    }

    Ok(Dispatch {
        broadcast,
        reply: Vec::new(),
        slug: session.slug,
    })
}

/// Moderator delete when `nickname` is `None`, self-delete otherwise.
pub async fn delete_question(
    ctx: &ApiContext,
    slug: &str,
    question_id: QuestionId,
    nickname: Option<&str>,
) -> Result<Dispatch, CoreError> {
    let (session, question) = question_in_session(ctx, slug, question_id).await?;
    if let Some(nickname) = nickname {
        if question.nickname != nickname {
            return Err(CoreError::Unauthorized("you can only delete your own questions"));
        }
    }

    if !ctx.storage.delete_question(question_id).await? {
        return Err(CoreError::NotFound("question"));
    }

    let mut broadcast = vec![questions_updated(ctx, session.session_id).await?];
    if question.status == QuestionStatus::Focused {
        broadcast.push(ServerEvent::QuestionUnfocused);
    }

    Ok(Dispatch {
        broadcast,
        reply: Vec::new(),
        slug: session.slug,
    })
}
