use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(SessionId);
id_newtype!(QuestionId);

/// Moderation status of a question.
///
/// A question starts out `Active`. The speaker moves it through the table in
/// [`QuestionStatus::can_transition_to`]; deletion is terminal and handled
/// outside of this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Active,
    Focused,
    Answered,
    Hidden,
}

impl QuestionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionStatus::Active => "active",
            QuestionStatus::Focused => "focused",
            QuestionStatus::Answered => "answered",
            QuestionStatus::Hidden => "hidden",
        }
    }

    /// Sort rank shared by every list projection. Lower ranks are shown first.
    pub fn rank(self) -> u8 {
        match self {
            QuestionStatus::Focused => 0,
            QuestionStatus::Active => 1,
            QuestionStatus::Answered => 2,
            QuestionStatus::Hidden => 3,
        }
    }

    /// Whether the audience projection includes questions in this status.
    pub fn is_public(self) -> bool {
        !matches!(self, QuestionStatus::Hidden)
    }

    /// Re-applying the current status is always allowed.
    /// `Answered` and `Hidden` never jump straight to `Focused`.
    pub fn can_transition_to(self, next: QuestionStatus) -> bool {
        use QuestionStatus::{Active, Answered, Focused, Hidden};

        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Active, Focused)
                | (Active, Answered)
                | (Active, Hidden)
                | (Focused, Active)
                | (Focused, Answered)
                | (Focused, Hidden)
                | (Answered, Active)
                | (Answered, Hidden)
                | (Hidden, Active)
        )
    }
}

impl fmt::Display for QuestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown question status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for QuestionStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(QuestionStatus::Active),
            "focused" => Ok(QuestionStatus::Focused),
            "answered" => Ok(QuestionStatus::Answered),
            "hidden" => Ok(QuestionStatus::Hidden),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::QuestionStatus::{self, Active, Answered, Focused, Hidden};

    #[test]
    fn rank_puts_focus_first_and_hidden_last() {
        let mut statuses = vec![Hidden, Answered, Active, Focused];
        statuses.sort_by_key(|s| s.rank());
        assert_eq!(statuses, vec![Focused, Active, Answered, Hidden]);
    }

    #[test]
    fn restore_paths_go_through_active() {
        assert!(!Answered.can_transition_to(Focused));
        assert!(!Hidden.can_transition_to(Focused));
        assert!(!Hidden.can_transition_to(Answered));
        assert!(Answered.can_transition_to(Active));
        assert!(Hidden.can_transition_to(Active));
        assert!(Active.can_transition_to(Focused));
    }

    #[test]
    fn every_status_can_be_reapplied() {
        for status in [Active, Focused, Answered, Hidden] {
            assert!(status.can_transition_to(status));
        }
    }

    #[test]
    fn parses_stored_representation() {
        for status in [Active, Focused, Answered, Hidden] {
            assert_eq!(status.as_str().parse::<QuestionStatus>(), Ok(status));
        }
        assert!("archived".parse::<QuestionStatus>().is_err());
    }
}
