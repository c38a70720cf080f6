use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a candidate's application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub u64);

/// Identifier of a selection (rank) record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

macro_rules! display_id {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        })*
    };
}

display_id!(ApplicationId, SelectionId, CommentId, UserId);

/// Course code such as `COSC2758`. Always trimmed and non-empty once constructed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseCode(String);

impl CourseCode {
    /// Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CourseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role the candidate applied for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationKind {
    Tutor,
    #[serde(rename = "Lab Assistant", alias = "LabAssistant")]
    LabAssistant,
}

impl ApplicationKind {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationKind::Tutor => "Tutor",
            ApplicationKind::LabAssistant => "Lab Assistant",
        }
    }
}

/// A candidate's application to tutor a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub application_id: ApplicationId,
    pub course_code: CourseCode,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: ApplicationKind,
    pub availability: String,
    pub academic_credentials: String,
    pub previous_roles: String,
    pub skills: String,
    pub selected: bool,
    pub created_at: DateTime<Utc>,
}

/// Rank record marking an application as chosen for its course. Rank 1 is most preferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub id: SelectionId,
    pub application_id: ApplicationId,
    pub user_id: UserId,
    pub rank: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lecturer feedback attached to a selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub comment_id: CommentId,
    pub selected_application_id: SelectionId,
    pub author_user_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Input for [`CommentStore::create_comment`](super::store::CommentStore::create_comment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub selected_application_id: SelectionId,
    pub author_user_id: UserId,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    Lecturer,
    Candidate,
    Admin,
}

/// Directory entry for a user; owned by the authentication service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: UserRole,
}

impl User {
    pub fn is_lecturer(&self) -> bool {
        self.role == UserRole::Lecturer
    }
}

/// Which end of a course ranking to look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankBoundary {
    /// Minimum rank (most preferred).
    Top,
    /// Maximum rank (least preferred).
    Bottom,
}

/// Rank of one selection after a swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankChange {
    pub application_id: ApplicationId,
    pub new_rank: u32,
    pub user_id: UserId,
}

impl RankChange {
    fn of(selection: &Selection) -> Self {
        Self {
            application_id: selection.application_id,
            new_rank: selection.rank,
            user_id: selection.user_id,
        }
    }
}

/// Outcome of a promote or demote: the moved selection and the neighbour it displaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankSwap {
    pub promoted: RankChange,
    pub demoted: RankChange,
}

impl RankSwap {
    pub(crate) fn new(promoted: &Selection, demoted: &Selection) -> Self {
        Self {
            promoted: RankChange::of(promoted),
            demoted: RankChange::of(demoted),
        }
    }
}

/// Summary of an unselect, including how much the cascade touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnselectOutcome {
    pub application_id: ApplicationId,
    pub selection_id: SelectionId,
    pub removed_rank: u32,
    pub comments_removed: usize,
    pub reranked: usize,
}

/// Ranked selection with its application and candidate embedded for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionView {
    #[serde(flatten)]
    pub selection: Selection,
    pub application: ApplicationView,
}

/// Application with its candidate embedded. `user` is absent when the directory has no entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationView {
    #[serde(flatten)]
    pub application: Application,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}
