//! Storage boundary for the selection engine.
//!
//! Every read and write made on behalf of one engine operation goes through a single
//! [`UnitOfWork`]: the stores it exposes see that operation's own uncommitted writes, and nothing
//! becomes visible to other callers until [`UnitOfWork::commit`] succeeds. Dropping a unit of
//! work without committing rolls it back.

use super::domain::{
    Application, ApplicationId, Comment, CourseCode, NewComment, RankBoundary, Selection,
    SelectionId, User, UserId,
};

/// Candidate applications. Rows are created by the intake service, never by the engine.
pub trait ApplicationStore {
    fn find_by_course_and_id(
        &self,
        course: &CourseCode,
        application_id: ApplicationId,
    ) -> Result<Option<Application>, StoreError>;

    fn find_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Option<Application>, StoreError>;

    fn list_applications_for_course(
        &self,
        course: &CourseCode,
    ) -> Result<Vec<Application>, StoreError>;

    fn list_applications(&self) -> Result<Vec<Application>, StoreError>;

    /// Returns `false` when the application does not exist.
    fn set_selected_flag(
        &mut self,
        application_id: ApplicationId,
        selected: bool,
    ) -> Result<bool, StoreError>;
}

/// Rank records. Course membership is resolved through the owning application.
pub trait SelectionStore {
    fn count_for_course(&self, course: &CourseCode) -> Result<usize, StoreError>;

    fn find_by_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Option<Selection>, StoreError>;

    fn find_by_application_and_course(
        &self,
        application_id: ApplicationId,
        course: &CourseCode,
    ) -> Result<Option<Selection>, StoreError>;

    fn find_by_id_and_course(
        &self,
        selection_id: SelectionId,
        course: &CourseCode,
    ) -> Result<Option<Selection>, StoreError>;

    fn find_boundary(
        &self,
        course: &CourseCode,
        boundary: RankBoundary,
    ) -> Result<Option<Selection>, StoreError>;

    fn find_by_rank(&self, course: &CourseCode, rank: u32)
        -> Result<Option<Selection>, StoreError>;

    fn list_by_course_ordered_by_rank(
        &self,
        course: &CourseCode,
    ) -> Result<Vec<Selection>, StoreError>;

    /// No ordering guarantee.
    fn list_with_rank_greater_than(
        &self,
        course: &CourseCode,
        rank: u32,
    ) -> Result<Vec<Selection>, StoreError>;

    fn create_selection(
        &mut self,
        user_id: UserId,
        application_id: ApplicationId,
        rank: u32,
    ) -> Result<Selection, StoreError>;

    /// Writes every selection in `batch` as one step of the unit of work.
    fn save_selections(&mut self, batch: &[Selection]) -> Result<(), StoreError>;

    fn remove_selection(&mut self, selection: &Selection) -> Result<(), StoreError>;
}

/// Lecturer comments, owned by the selection they are attached to.
pub trait CommentStore {
    fn create_comment(&mut self, comment: NewComment) -> Result<Comment, StoreError>;

    /// Comments in insertion order.
    fn find_by_selection(&self, selection_id: SelectionId) -> Result<Vec<Comment>, StoreError>;

    /// Returns the number of comments removed.
    fn delete_by_selection(&mut self, selection_id: SelectionId) -> Result<usize, StoreError>;
}

/// Scoped transaction spanning all three stores.
pub trait UnitOfWork: ApplicationStore + SelectionStore + CommentStore {
    fn commit(self) -> Result<(), StoreError>;
}

/// Backend able to open units of work.
pub trait SelectionDatabase: Send + Sync {
    type UnitOfWork<'a>: UnitOfWork
    where
        Self: 'a;

    fn begin(&self) -> Result<Self::UnitOfWork<'_>, StoreError>;
}

/// Read-only view of the user accounts managed by the authentication service.
pub trait UserDirectory: Send + Sync {
    fn find_user(&self, user_id: UserId) -> Result<Option<User>, StoreError>;
}

/// Error enumeration for storage failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint `{constraint}` violated")]
    UniqueViolation { constraint: &'static str },
    #[error("foreign key constraint `{constraint}` violated")]
    ForeignKeyViolation { constraint: &'static str },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub(crate) fn poisoned(what: &str) -> Self {
        Self::Unavailable(format!("{what} lock poisoned"))
    }
}
