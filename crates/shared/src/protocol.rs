use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{QuestionId, QuestionStatus, SessionId},
    error::ApiError,
};

/// Frames sent by audience and speaker clients over the websocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientRequest {
    JoinSession {
        slug: String,
    },
    NewQuestion {
        slug: String,
        text: String,
        visitor_id: String,
        #[serde(default)]
        nickname: Option<String>,
    },
    Upvote {
        slug: String,
        question_id: QuestionId,
        visitor_id: String,
    },
    FocusQuestion {
        slug: String,
        question_id: QuestionId,
    },
    UnfocusQuestion {
        slug: String,
        question_id: QuestionId,
    },
    AnswerQuestion {
        slug: String,
        question_id: QuestionId,
    },
    HideQuestion {
        slug: String,
        question_id: QuestionId,
    },
    RestoreQuestion {
        slug: String,
        question_id: QuestionId,
    },
    EditQuestion {
        slug: String,
        question_id: QuestionId,
        new_text: String,
        nickname: String,
    },
    /// Without a nickname this is a moderator delete.
    DeleteQuestion {
        slug: String,
        question_id: QuestionId,
        #[serde(default)]
        nickname: Option<String>,
    },
}

impl ClientRequest {
    /// The session every request is addressed to.
    pub fn slug(&self) -> &str {
        match self {
            ClientRequest::JoinSession { slug }
            | ClientRequest::NewQuestion { slug, .. }
            | ClientRequest::Upvote { slug, .. }
            | ClientRequest::FocusQuestion { slug, .. }
            | ClientRequest::UnfocusQuestion { slug, .. }
            | ClientRequest::AnswerQuestion { slug, .. }
            | ClientRequest::HideQuestion { slug, .. }
            | ClientRequest::RestoreQuestion { slug, .. }
            | ClientRequest::EditQuestion { slug, .. }
            | ClientRequest::DeleteQuestion { slug, .. } => slug,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub slug: String,
    pub title: String,
    pub speaker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_image: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub title: String,
    pub speaker: String,
    #[serde(default)]
    pub speaker_image: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_sessions: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NicknameResponse {
    pub nickname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSummary {
    pub id: QuestionId,
    pub text: String,
    pub nickname: String,
    pub upvotes: i64,
    pub status: QuestionStatus,
    pub created_at: DateTime<Utc>,
}

/// Payload for the stage display and the audience banner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusedQuestion {
    pub question_id: QuestionId,
    pub text: String,
    pub nickname: String,
    pub upvotes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Canonical lists for a session: `questions` is the audience projection,
    /// `all_questions` the moderator projection.
    QuestionsUpdated {
        questions: Vec<QuestionSummary>,
        all_questions: Vec<QuestionSummary>,
    },
    QuestionFocused {
        question: FocusedQuestion,
    },
    QuestionUnfocused,
    NicknameAssigned {
        nickname: String,
    },
    Error(ApiError),
}
