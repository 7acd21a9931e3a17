use chrono::{Duration, Utc};
use shared::{
    domain::QuestionStatus,
    error::{ApiError, ErrorCode},
    protocol::{CreateSessionRequest, QuestionSummary, ServerEvent, SessionSummary},
};

use super::*;

async fn setup() -> (ApiContext, SessionSummary) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let ctx = ApiContext::new(storage, WordListFilter::new());
    let session = create_session(
        &ctx,
        &CreateSessionRequest {
            title: "Fearless Concurrency".into(),
            speaker: "Ingrid".into(),
            speaker_image: None,
        },
    )
    .await
    .expect("session");
    (ctx, session)
}

async fn ask(ctx: &ApiContext, slug: &str, text: &str, visitor: &str) -> QuestionId {
    submit_question(ctx, slug, text, visitor, Some(visitor))
        .await
        .expect("submit");
    newest_question(ctx, slug).await.id
}

async fn newest_question(ctx: &ApiContext, slug: &str) -> QuestionSummary {
    moderator_list(ctx, slug)
        .await
        .into_iter()
        .max_by_key(|q| q.id)
        .expect("at least one question")
}

async fn moderator_list(ctx: &ApiContext, slug: &str) -> Vec<QuestionSummary> {
    let (_, all) = lists(ctx, slug).await;
    all
}

async fn lists(ctx: &ApiContext, slug: &str) -> (Vec<QuestionSummary>, Vec<QuestionSummary>) {
    let joined = join_session(ctx, slug).await.expect("join");
    match joined.reply.into_iter().next() {
        Some(ServerEvent::QuestionsUpdated {
            questions,
            all_questions,
        }) => (questions, all_questions),
        other => panic!("expected question lists, got {other:?}"),
    }
}

async fn status_of(ctx: &ApiContext, id: QuestionId) -> QuestionStatus {
    ctx.storage
        .question(id)
        .await
        .expect("load")
        .expect("exists")
        .status
}

async fn focused_count(ctx: &ApiContext, slug: &str) -> usize {
    moderator_list(ctx, slug)
        .await
        .iter()
        .filter(|q| q.status == QuestionStatus::Focused)
        .count()
}

#[tokio::test]
async fn create_session_requires_title_and_speaker() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let ctx = ApiContext::new(storage, WordListFilter::new());
    let err = create_session(
        &ctx,
        &CreateSessionRequest {
            title: "   ".into(),
            speaker: "Ingrid".into(),
            speaker_image: None,
        },
    )
    .await
    .expect_err("blank title");
    assert!(matches!(err, CoreError::Validation(_)));
    assert_eq!(session_stats(&ctx).await.expect("stats").total_sessions, 0);
}

#[tokio::test]
async fn created_session_is_found_by_slug_and_counted() {
    let (ctx, session) = setup().await;
    assert!(session.slug.starts_with("fearless-concurrency-"));
    let loaded = get_session(&ctx, &session.slug).await.expect("get");
    assert_eq!(loaded.id, session.id);
    assert_eq!(loaded.title, "Fearless Concurrency");
    assert_eq!(loaded.speaker, "Ingrid");
    assert_eq!(session_stats(&ctx).await.expect("stats").total_sessions, 1);
    assert!(matches!(
        get_session(&ctx, "nope").await,
        Err(CoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn submit_broadcasts_lists_and_replies_with_nickname() {
    let (ctx, session) = setup().await;
    let dispatch = submit_question(
        &ctx,
        &session.slug,
        "  What about async?  ",
        "device-1",
        None,
    )
    .await
    .expect("submit");

    assert_eq!(dispatch.slug, session.slug);
    let Some(ServerEvent::NicknameAssigned { nickname }) = dispatch.reply.first() else {
        panic!("expected nickname reply, got {:?}", dispatch.reply);
    };
    match dispatch.broadcast.as_slice() {
        [ServerEvent::QuestionsUpdated { questions, .. }] => {
            assert_eq!(questions.len(), 1);
            assert_eq!(questions[0].text, "What about async?");
            assert_eq!(&questions[0].nickname, nickname);
            assert_eq!(questions[0].status, QuestionStatus::Active);
            assert_eq!(questions[0].upvotes, 0);
        }
        other => panic!("unexpected broadcast {other:?}"),
    }
}

#[tokio::test]
async fn visitor_keeps_their_nickname_within_a_session() {
    let (ctx, session) = setup().await;
    let first = submit_question(&ctx, &session.slug, "First?", "device-9", None)
        .await
        .expect("submit");
    let second = submit_question(&ctx, &session.slug, "Second?", "device-9", None)
        .await
        .expect("submit");
    assert_eq!(first.reply, second.reply);
}

#[tokio::test]
async fn question_length_limit_is_inclusive() {
    let (ctx, session) = setup().await;
    let ok = "a".repeat(500);
    submit_question(&ctx, &session.slug, &ok, "d", None)
        .await
        .expect("500 characters");

    let too_long = "a".repeat(501);
    let err = submit_question(&ctx, &session.slug, &too_long, "d", None)
        .await
        .expect_err("501 characters");
    assert_eq!(err.code(), ErrorCode::Validation);
    assert_eq!(moderator_list(&ctx, &session.slug).await.len(), 1);
}

#[tokio::test]
async fn profane_question_is_rejected_without_a_row() {
    let (ctx, session) = setup().await;
    let err = submit_question(&ctx, &session.slug, "this talk is shit", "d", None)
        .await
        .expect_err("blocked");
    assert!(matches!(err, CoreError::Validation(_)));
    assert!(moderator_list(&ctx, &session.slug).await.is_empty());
}

#[tokio::test]
async fn submit_to_unknown_session_is_silently_dropped() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let ctx = ApiContext::new(storage, WordListFilter::new());
    let err = submit_question(&ctx, "ghost-000000", "Hello?", "d", None)
        .await
        .expect_err("no session");
    assert!(err.is_silent());
}

#[tokio::test]
async fn second_vote_is_rejected_and_count_unchanged() {
    let (ctx, session) = setup().await;
    let id = ask(&ctx, &session.slug, "Borrow checker tips?", "author").await;

    let first = upvote(&ctx, &session.slug, id, "voter").await.expect("vote");
    assert_eq!(first.broadcast.len(), 1);

    let err = upvote(&ctx, &session.slug, id, "voter")
        .await
        .expect_err("second vote");
    assert!(matches!(err, CoreError::AlreadyVoted));
    assert_eq!(ApiError::from(err).code, ErrorCode::AlreadyVoted);

    let question = ctx.storage.question(id).await.expect("load").expect("exists");
    assert_eq!(question.upvotes, 1);
}

#[tokio::test]
async fn vote_requires_visitor_token() {
    let (ctx, session) = setup().await;
    let id = ask(&ctx, &session.slug, "Token?", "author").await;
    let err = upvote(&ctx, &session.slug, id, "  ").await.expect_err("blank");
    assert!(matches!(err, CoreError::Validation(_)));
}

#[tokio::test]
async fn vote_on_question_from_another_session_is_not_found() {
    let (ctx, session) = setup().await;
    let other = create_session(
        &ctx,
        &CreateSessionRequest {
            title: "Other talk".into(),
            speaker: "Per".into(),
            speaker_image: None,
        },
    )
    .await
    .expect("other session");
    let id = ask(&ctx, &other.slug, "Elsewhere?", "author").await;

    let err = upvote(&ctx, &session.slug, id, "voter")
        .await
        .expect_err("wrong session");
    assert!(err.is_silent());
    let question = ctx.storage.question(id).await.expect("load").expect("exists");
    assert_eq!(question.upvotes, 0);
}

#[tokio::test]
async fn audience_order_is_focused_then_votes_then_newest() {
    let (ctx, session) = setup().await;
    let a = ask(&ctx, &session.slug, "A", "author-a").await;
    let b = ask(&ctx, &session.slug, "B", "author-b").await;
    let c = ask(&ctx, &session.slug, "C", "author-c").await;

    for n in 0..5 {
        upvote(&ctx, &session.slug, a, &format!("a-voter-{n}"))
            .await
            .expect("vote a");
    }
    for n in 0..10 {
        upvote(&ctx, &session.slug, b, &format!("b-voter-{n}"))
            .await
            .expect("vote b");
        upvote(&ctx, &session.slug, c, &format!("c-voter-{n}"))
            .await
            .expect("vote c");
    }
    focus(&ctx, &session.slug, a).await.expect("focus a");

    let (audience, _) = lists(&ctx, &session.slug).await;
    let order: Vec<_> = audience.iter().map(|q| q.id).collect();
    assert_eq!(order, vec![a, c, b]);
}

#[tokio::test]
async fn focus_emits_focused_event_and_keeps_single_focus() {
    let (ctx, session) = setup().await;
    let first = ask(&ctx, &session.slug, "First", "x").await;
    let second = ask(&ctx, &session.slug, "Second", "y").await;
    upvote(&ctx, &session.slug, second, "fan").await.expect("vote");

    focus(&ctx, &session.slug, first).await.expect("focus first");
    let dispatch = focus(&ctx, &session.slug, second).await.expect("focus second");

    match dispatch.broadcast.as_slice() {
        [ServerEvent::QuestionsUpdated { .. }, ServerEvent::QuestionFocused { question }] => {
            assert_eq!(question.question_id, second);
            assert_eq!(question.text, "Second");
            assert_eq!(question.nickname, "y");
            assert_eq!(question.upvotes, 1);
        }
        other => panic!("unexpected broadcast {other:?}"),
    }
    assert_eq!(status_of(&ctx, first).await, QuestionStatus::Active);
    assert_eq!(focused_count(&ctx, &session.slug).await, 1);
}

#[tokio::test]
async fn single_focus_holds_across_moderation_sequences() {
    let (ctx, session) = setup().await;
    let ids = [
        ask(&ctx, &session.slug, "one", "a").await,
        ask(&ctx, &session.slug, "two", "b").await,
        ask(&ctx, &session.slug, "three", "c").await,
    ];

    let steps: [(usize, ModerationAction); 9] = [
        (0, ModerationAction::Focus),
        (1, ModerationAction::Focus),
        (1, ModerationAction::Answer),
        (2, ModerationAction::Focus),
        (0, ModerationAction::Focus),
        (0, ModerationAction::Hide),
        (0, ModerationAction::Restore),
        (2, ModerationAction::Focus),
        (2, ModerationAction::Unfocus),
    ];
    for (index, action) in steps {
        moderate(&ctx, &session.slug, ids[index], action)
            .await
            .unwrap_or_else(|e| panic!("{action:?} on {index}: {e}"));
        assert!(focused_count(&ctx, &session.slug).await <= 1);
    }
    delete_question(&ctx, &session.slug, ids[1], None)
        .await
        .expect("delete");
    assert!(focused_count(&ctx, &session.slug).await <= 1);
}

#[tokio::test]
async fn answer_always_clears_focus_display() {
    let (ctx, session) = setup().await;
    let id = ask(&ctx, &session.slug, "Never focused", "a").await;
    let dispatch = answer(&ctx, &session.slug, id).await.expect("answer");
    assert_eq!(dispatch.broadcast.last(), Some(&ServerEvent::QuestionUnfocused));
    assert_eq!(status_of(&ctx, id).await, QuestionStatus::Answered);

    let (audience, _) = lists(&ctx, &session.slug).await;
    assert_eq!(audience.len(), 1, "answered questions stay visible");
}

#[tokio::test]
async fn unfocus_returns_question_to_active() {
    let (ctx, session) = setup().await;
    let id = ask(&ctx, &session.slug, "Focus me", "a").await;
    focus(&ctx, &session.slug, id).await.expect("focus");
    let dispatch = unfocus(&ctx, &session.slug, id).await.expect("unfocus");
    assert_eq!(dispatch.broadcast.last(), Some(&ServerEvent::QuestionUnfocused));
    assert_eq!(status_of(&ctx, id).await, QuestionStatus::Active);
}

#[tokio::test]
async fn hidden_questions_are_moderator_only_until_restored() {
    let (ctx, session) = setup().await;
    let id = ask(&ctx, &session.slug, "Off topic", "a").await;

    let dispatch = hide(&ctx, &session.slug, id).await.expect("hide");
    assert_eq!(dispatch.broadcast.len(), 1, "hiding an active question keeps the banner");
    let (audience, moderator) = lists(&ctx, &session.slug).await;
    assert!(audience.is_empty());
    assert_eq!(moderator[0].status, QuestionStatus::Hidden);

    restore(&ctx, &session.slug, id).await.expect("restore");
    let (audience, _) = lists(&ctx, &session.slug).await;
    assert_eq!(audience.len(), 1);
}

#[tokio::test]
async fn hiding_focused_question_clears_focus_display() {
    let (ctx, session) = setup().await;
    let id = ask(&ctx, &session.slug, "On stage", "a").await;
    focus(&ctx, &session.slug, id).await.expect("focus");
    let dispatch = hide(&ctx, &session.slug, id).await.expect("hide");
    assert_eq!(dispatch.broadcast.last(), Some(&ServerEvent::QuestionUnfocused));
}

#[tokio::test]
async fn restoring_focused_question_clears_focus_display() {
    let (ctx, session) = setup().await;
    let id = ask(&ctx, &session.slug, "Back to the list", "a").await;
    focus(&ctx, &session.slug, id).await.expect("focus");

    let dispatch = restore(&ctx, &session.slug, id).await.expect("restore");
    assert_eq!(status_of(&ctx, id).await, QuestionStatus::Active);
    assert_eq!(dispatch.broadcast.last(), Some(&ServerEvent::QuestionUnfocused));

    let again = restore(&ctx, &session.slug, id).await.expect("restore active");
    assert_eq!(again.broadcast.len(), 1, "no banner change for an active question");
}

#[tokio::test]
async fn answered_and_hidden_questions_cannot_jump_to_focus() {
    let (ctx, session) = setup().await;
    let answered = ask(&ctx, &session.slug, "Done", "a").await;
    let hidden = ask(&ctx, &session.slug, "Gone", "b").await;
    answer(&ctx, &session.slug, answered).await.expect("answer");
    hide(&ctx, &session.slug, hidden).await.expect("hide");

    for id in [answered, hidden] {
        let err = focus(&ctx, &session.slug, id).await.expect_err("invalid");
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert_eq!(err.code(), ErrorCode::Validation);
    }
    assert!(matches!(
        answer(&ctx, &session.slug, hidden).await,
        Err(CoreError::InvalidTransition { .. })
    ));

    unfocus(&ctx, &session.slug, answered).await.expect("back to active");
    focus(&ctx, &session.slug, answered).await.expect("focus via active");
}

#[tokio::test]
async fn edit_resets_votes_and_allows_revoting() {
    let (ctx, session) = setup().await;
    let id = ask(&ctx, &session.slug, "Original wording", "author").await;
    for voter in ["v1", "v2", "v3"] {
        upvote(&ctx, &session.slug, id, voter).await.expect("vote");
    }

    edit_question(&ctx, &session.slug, id, "  Better wording ", "author")
        .await
        .expect("edit");

    let question = ctx.storage.question(id).await.expect("load").expect("exists");
    assert_eq!(question.text, "Better wording");
    assert_eq!(question.upvotes, 0);

    upvote(&ctx, &session.slug, id, "v1").await.expect("revote");
    assert_eq!(
        ctx.storage.question(id).await.expect("load").expect("exists").upvotes,
        1
    );
}

#[tokio::test]
async fn editing_focused_question_refreshes_focus_display() {
    let (ctx, session) = setup().await;
    let id = ask(&ctx, &session.slug, "Typo heer", "author").await;
    focus(&ctx, &session.slug, id).await.expect("focus");
    let dispatch = edit_question(&ctx, &session.slug, id, "Typo here", "author")
        .await
        .expect("edit");
    match dispatch.broadcast.last() {
        Some(ServerEvent::QuestionFocused { question }) => {
            assert_eq!(question.text, "Typo here");
            assert_eq!(question.upvotes, 0);
        }
        other => panic!("expected focused event, got {other:?}"),
    }
}

#[tokio::test]
async fn edit_by_someone_else_is_unauthorized_and_changes_nothing() {
    let (ctx, session) = setup().await;
    let id = ask(&ctx, &session.slug, "Mine", "author").await;
    upvote(&ctx, &session.slug, id, "fan").await.expect("vote");

    let err = edit_question(&ctx, &session.slug, id, "Hijacked", "intruder")
        .await
        .expect_err("not the author");
    assert!(matches!(err, CoreError::Unauthorized(_)));
    assert_eq!(ApiError::from(err).code, ErrorCode::Unauthorized);

    let question = ctx.storage.question(id).await.expect("load").expect("exists");
    assert_eq!(question.text, "Mine");
    assert_eq!(question.upvotes, 1);
}

#[tokio::test]
async fn edit_applies_creation_validation() {
    let (ctx, session) = setup().await;
    let id = ask(&ctx, &session.slug, "Fine", "author").await;
    let err = edit_question(&ctx, &session.slug, id, &"x".repeat(501), "author")
        .await
        .expect_err("too long");
    assert!(matches!(err, CoreError::Validation(_)));
    let err = edit_question(&ctx, &session.slug, id, "faen", "author")
        .await
        .expect_err("profane");
    assert!(matches!(err, CoreError::Validation(_)));
}

#[tokio::test]
async fn self_delete_requires_matching_nickname() {
    let (ctx, session) = setup().await;
    let id = ask(&ctx, &session.slug, "Delete me later", "author").await;

    let err = delete_question(&ctx, &session.slug, id, Some("intruder"))
        .await
        .expect_err("not the author");
    assert!(matches!(err, CoreError::Unauthorized(_)));
    assert!(ctx.storage.question(id).await.expect("load").is_some());

    delete_question(&ctx, &session.slug, id, Some("author"))
        .await
        .expect("self delete");
    assert!(ctx.storage.question(id).await.expect("load").is_none());
}

#[tokio::test]
async fn moderator_delete_removes_question_and_votes() {
    let (ctx, session) = setup().await;
    let id = ask(&ctx, &session.slug, "Spam", "author").await;
    upvote(&ctx, &session.slug, id, "v1").await.expect("vote");
    upvote(&ctx, &session.slug, id, "v2").await.expect("vote");
    focus(&ctx, &session.slug, id).await.expect("focus");

    let dispatch = delete_question(&ctx, &session.slug, id, None)
        .await
        .expect("delete");
    assert_eq!(dispatch.broadcast.last(), Some(&ServerEvent::QuestionUnfocused));
    assert_eq!(
        ctx.storage.record_vote(id, "v3").await.expect("vote"),
        storage::VoteOutcome::QuestionMissing
    );
    assert!(moderator_list(&ctx, &session.slug).await.is_empty());

    let err = delete_question(&ctx, &session.slug, id, None)
        .await
        .expect_err("already gone");
    assert!(err.is_silent());
}

#[tokio::test]
async fn expired_sessions_disappear_but_counter_stays() {
    let (ctx, session) = setup().await;
    let id = ask(&ctx, &session.slug, "Still here tomorrow?", "author").await;
    upvote(&ctx, &session.slug, id, "voter").await.expect("vote");
    let before = session_stats(&ctx).await.expect("stats").total_sessions;

    let retention = Duration::hours(SESSION_RETENTION_HOURS);
    let kept = expire_sessions(&ctx, Utc::now(), retention)
        .await
        .expect("sweep now");
    assert!(kept.slugs.is_empty());

    let expired = expire_sessions(&ctx, session.created_at + Duration::hours(25), retention)
        .await
        .expect("sweep later");
    assert_eq!(expired.slugs, vec![session.slug.clone()]);
    assert_eq!((expired.questions, expired.votes), (1, 1));

    assert!(get_session(&ctx, &session.slug).await.is_err());
    assert!(ctx.storage.question(id).await.expect("load").is_none());
    assert_eq!(session_stats(&ctx).await.expect("stats").total_sessions, before);
}

#[tokio::test]
async fn persistence_errors_reach_caller_as_generic_message() {
    let err = CoreError::from(anyhow::anyhow!("UNIQUE constraint failed: sessions.slug"));
    let api: ApiError = err.into();
    assert_eq!(api.code, ErrorCode::Internal);
    assert!(!api.message.contains("UNIQUE"));
}
