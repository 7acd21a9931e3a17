use std::cmp::Ordering;

use shared::{
    domain::{QuestionStatus, SessionId},
    protocol::{FocusedQuestion, QuestionSummary, ServerEvent},
};
use storage::StoredQuestion;

use crate::{error::CoreError, ApiContext};

/// Display order shared by every projection: status rank, then votes
/// (descending), then newest first, then the later insertion id.
pub fn display_order(a: &StoredQuestion, b: &StoredQuestion) -> Ordering {
    a.status
        .rank()
        .cmp(&b.status.rank())
        .then_with(|| b.upvotes.cmp(&a.upvotes))
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| b.question_id.cmp(&a.question_id))
}

/// Everything but hidden questions.
pub fn audience_view(questions: &[StoredQuestion]) -> Vec<QuestionSummary> {
    project(questions, QuestionStatus::is_public)
}

pub fn moderator_view(questions: &[StoredQuestion]) -> Vec<QuestionSummary> {
    project(questions, |_| true)
}

fn project(
    questions: &[StoredQuestion],
    include: impl Fn(QuestionStatus) -> bool,
) -> Vec<QuestionSummary> {
    let mut selected: Vec<&StoredQuestion> =
        questions.iter().filter(|q| include(q.status)).collect();
    selected.sort_by(|a, b| display_order(a, b));
    selected.into_iter().map(summary).collect()
}

fn summary(question: &StoredQuestion) -> QuestionSummary {
    QuestionSummary {
        id: question.question_id,
        text: question.text.clone(),
        nickname: question.nickname.clone(),
        upvotes: question.upvotes,
        status: question.status,
        created_at: question.created_at,
    }
}

pub fn focused_event(question: &StoredQuestion) -> ServerEvent {
    ServerEvent::QuestionFocused {
        question: FocusedQuestion {
            question_id: question.question_id,
            text: question.text.clone(),
            nickname: question.nickname.clone(),
            upvotes: question.upvotes,
        },
    }
}

/// Recomputes both canonical lists of a session.
pub async fn questions_updated(
    ctx: &ApiContext,
    session_id: SessionId,
) -> Result<ServerEvent, CoreError> {
    let questions = ctx.storage.list_questions(session_id).await?;
    Ok(ServerEvent::QuestionsUpdated {
        questions: audience_view(&questions),
        all_questions: moderator_view(&questions),
    })
}
