use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::EngineConfig;

use super::domain::{
    Application, ApplicationId, ApplicationView, Comment, CourseCode, NewComment, RankBoundary,
    RankSwap, Selection, SelectionId, SelectionView, UnselectOutcome, UserId,
};
use super::locks::{CourseGuard, CourseLocks, LockError};
use super::store::{
    ApplicationStore, CommentStore, SelectionDatabase, SelectionStore, StoreError, UnitOfWork,
    UserDirectory,
};

/// Orchestrates selection, ranking, and comments across the stores.
///
/// Mutating calls take the course lock first, then run one synchronous unit of work. There is no
/// `.await` between `begin` and `commit`, so a cancelled request either never started its unit
/// of work or already finished it.
pub struct SelectionEngine<D, U> {
    database: Arc<D>,
    users: Arc<U>,
    locks: CourseLocks,
    config: EngineConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shift {
    Up,
    Down,
}

impl Shift {
    fn boundary(self) -> RankBoundary {
        match self {
            Shift::Up => RankBoundary::Top,
            Shift::Down => RankBoundary::Bottom,
        }
    }

    fn target(self, rank: u32) -> u32 {
        match self {
            Shift::Up => rank - 1,
            Shift::Down => rank.saturating_add(1),
        }
    }
}

impl<D, U> SelectionEngine<D, U>
where
    D: SelectionDatabase + 'static,
    U: UserDirectory + 'static,
{
    pub fn new(database: Arc<D>, users: Arc<U>, config: EngineConfig) -> Self {
        Self {
            database,
            users,
            locks: CourseLocks::default(),
            config,
        }
    }

    async fn lock(&self, course: &CourseCode) -> Result<CourseGuard, SelectionError> {
        self.locks
            .acquire(course, self.config.lock_timeout)
            .await
            .map_err(|err| match err {
                LockError::Timeout => {
                    warn!(%course, timeout = ?self.config.lock_timeout, "course lock wait timed out");
                    SelectionError::LockTimeout {
                        course: course.clone(),
                    }
                }
                LockError::Poisoned => {
                    SelectionError::Store(StoreError::poisoned("course lock registry"))
                }
            })
    }

    /// Append the application to the bottom of its course ranking.
    pub async fn select(
        &self,
        course: &CourseCode,
        application_id: ApplicationId,
    ) -> Result<Selection, SelectionError> {
        let _guard = self.lock(course).await?;
        self.select_locked(course, application_id)
    }

    fn select_locked(
        &self,
        course: &CourseCode,
        application_id: ApplicationId,
    ) -> Result<Selection, SelectionError> {
        let already_selected = |err: StoreError| match err {
            StoreError::UniqueViolation { .. } => SelectionError::AlreadySelected { application_id },
            other => SelectionError::Store(other),
        };

        let mut uow = self.database.begin()?;
        let application = uow
            .find_by_course_and_id(course, application_id)?
            .ok_or_else(|| SelectionError::ApplicationNotFound {
                course: course.clone(),
                application_id,
            })?;

        if uow.find_by_application(application_id)?.is_some() {
            return Err(SelectionError::AlreadySelected { application_id });
        }

        let next_rank = u32::try_from(uow.count_for_course(course)? + 1).map_err(|_| {
            SelectionError::Store(StoreError::Unavailable(format!(
                "course {course} has more selections than a rank can hold"
            )))
        })?;

        uow.set_selected_flag(application_id, true)?;
        let selection = uow
            .create_selection(application.user_id, application_id, next_rank)
            .map_err(already_selected)?;
        uow.commit().map_err(already_selected)?;

        info!(%course, %application_id, rank = selection.rank, "application selected");
        Ok(selection)
    }

    /// Remove the selection, its comments, and close the gap it leaves in the ranking.
    pub async fn unselect(
        &self,
        course: &CourseCode,
        application_id: ApplicationId,
    ) -> Result<UnselectOutcome, SelectionError> {
        let _guard = self.lock(course).await?;
        self.unselect_locked(course, application_id)
    }

    fn unselect_locked(
        &self,
        course: &CourseCode,
        application_id: ApplicationId,
    ) -> Result<UnselectOutcome, SelectionError> {
        let mut uow = self.database.begin()?;
        let selection = uow
            .find_by_application_and_course(application_id, course)?
            .ok_or_else(|| SelectionError::SelectionNotFound {
                course: course.clone(),
                reference: SelectionRef::Application(application_id),
            })?;
        let removed_rank = selection.rank;

        let comments_removed = uow.delete_by_selection(selection.id)?;
        uow.remove_selection(&selection)?;

        if !uow.set_selected_flag(application_id, false)? {
            warn!(
                %course,
                %application_id,
                selection_id = %selection.id,
                "application record missing during unselect; selected flag left untouched"
            );
        }

        let mut shifted = uow.list_with_rank_greater_than(course, removed_rank)?;
        for entry in &mut shifted {
            entry.rank -= 1;
        }
        if !shifted.is_empty() {
            uow.save_selections(&shifted)?;
        }
        uow.commit()?;

        info!(
            %course,
            %application_id,
            removed_rank,
            comments_removed,
            reranked = shifted.len(),
            "application unselected"
        );
        Ok(UnselectOutcome {
            application_id,
            selection_id: selection.id,
            removed_rank,
            comments_removed,
            reranked: shifted.len(),
        })
    }

    /// Move one step toward rank 1.
    pub async fn promote(
        &self,
        course: &CourseCode,
        application_id: ApplicationId,
    ) -> Result<RankSwap, SelectionError> {
        let _guard = self.lock(course).await?;
        self.shift_locked(course, application_id, Shift::Up)
    }

    /// Move one step away from rank 1.
    pub async fn demote(
        &self,
        course: &CourseCode,
        application_id: ApplicationId,
    ) -> Result<RankSwap, SelectionError> {
        let _guard = self.lock(course).await?;
        self.shift_locked(course, application_id, Shift::Down)
    }

    fn shift_locked(
        &self,
        course: &CourseCode,
        application_id: ApplicationId,
        shift: Shift,
    ) -> Result<RankSwap, SelectionError> {
        let mut uow = self.database.begin()?;
        let mut moving = uow
            .find_by_application_and_course(application_id, course)?
            .ok_or_else(|| SelectionError::SelectionNotFound {
                course: course.clone(),
                reference: SelectionRef::Application(application_id),
            })?;
        let current = moving.rank;

        let edge = uow.find_boundary(course, shift.boundary())?;
        let at_edge = match (shift, edge) {
            (_, None) => true,
            (Shift::Up, Some(top)) => current <= top.rank,
            (Shift::Down, Some(bottom)) => current >= bottom.rank,
        };
        if at_edge {
            let course = course.clone();
            return Err(match shift {
                Shift::Up => SelectionError::AlreadyAtTop {
                    course,
                    application_id,
                },
                Shift::Down => SelectionError::AlreadyAtBottom {
                    course,
                    application_id,
                },
            });
        }

        let target = shift.target(current);
        let mut neighbour = uow.find_by_rank(course, target)?.ok_or_else(|| {
            error!(
                %course,
                %application_id,
                current_rank = current,
                missing_rank = target,
                "rank density violated: no selection at adjacent rank"
            );
            SelectionError::RankGap {
                course: course.clone(),
                missing_rank: target,
            }
        })?;

        moving.rank = target;
        neighbour.rank = current;
        uow.save_selections(&[moving.clone(), neighbour.clone()])?;
        uow.commit()?;

        info!(
            %course,
            %application_id,
            from = current,
            to = target,
            displaced = %neighbour.application_id,
            "selection rank swapped"
        );
        Ok(match shift {
            Shift::Up => RankSwap::new(&moving, &neighbour),
            Shift::Down => RankSwap::new(&neighbour, &moving),
        })
    }

    /// Attach lecturer feedback to a selection within `course`.
    pub async fn add_comment(
        &self,
        course: &CourseCode,
        selection_id: SelectionId,
        content: &str,
        author_user_id: UserId,
    ) -> Result<Comment, SelectionError> {
        let is_lecturer = self
            .users
            .find_user(author_user_id)?
            .is_some_and(|user| user.is_lecturer());
        if !is_lecturer {
            return Err(SelectionError::Forbidden {
                user_id: author_user_id,
            });
        }

        let content = content.trim();
        if content.is_empty() {
            return Err(SelectionError::Validation(
                "comment cannot be empty".to_string(),
            ));
        }

        let _guard = self.lock(course).await?;
        self.add_comment_locked(course, selection_id, content, author_user_id)
    }

    fn add_comment_locked(
        &self,
        course: &CourseCode,
        selection_id: SelectionId,
        content: &str,
        author_user_id: UserId,
    ) -> Result<Comment, SelectionError> {
        let mut uow = self.database.begin()?;
        let selection = uow
            .find_by_id_and_course(selection_id, course)?
            .ok_or_else(|| SelectionError::SelectionNotFound {
                course: course.clone(),
                reference: SelectionRef::Selection(selection_id),
            })?;

        let comment = uow.create_comment(NewComment {
            selected_application_id: selection.id,
            author_user_id,
            content: content.to_string(),
        })?;
        uow.commit()?;

        info!(%course, %selection_id, author = %author_user_id, "comment added");
        Ok(comment)
    }

    /// Comments for a selection in insertion order; empty once the selection is gone.
    pub fn list_comments_for_selection(
        &self,
        selection_id: SelectionId,
    ) -> Result<Vec<Comment>, SelectionError> {
        let uow = self.database.begin()?;
        Ok(uow.find_by_selection(selection_id)?)
    }

    /// The course ranking, rank 1 first, with application and candidate embedded.
    pub fn list_selected_for_course(
        &self,
        course: &CourseCode,
    ) -> Result<Vec<SelectionView>, SelectionError> {
        let uow = self.database.begin()?;
        let mut views = Vec::new();
        for selection in uow.list_by_course_ordered_by_rank(course)? {
            match uow.find_application(selection.application_id)? {
                Some(application) => views.push(SelectionView {
                    selection,
                    application: self.application_view(application)?,
                }),
                None => warn!(
                    %course,
                    selection_id = %selection.id,
                    application_id = %selection.application_id,
                    rank = selection.rank,
                    "selection has no application record; omitted from ranking"
                ),
            }
        }
        Ok(views)
    }

    pub fn list_applications_for_course(
        &self,
        course: &CourseCode,
    ) -> Result<Vec<ApplicationView>, SelectionError> {
        let uow = self.database.begin()?;
        uow.list_applications_for_course(course)?
            .into_iter()
            .map(|application| self.application_view(application))
            .collect()
    }

    pub fn list_applications(&self) -> Result<Vec<ApplicationView>, SelectionError> {
        let uow = self.database.begin()?;
        uow.list_applications()?
            .into_iter()
            .map(|application| self.application_view(application))
            .collect()
    }

    fn application_view(&self, application: Application) -> Result<ApplicationView, SelectionError> {
        let user = self.users.find_user(application.user_id)?;
        Ok(ApplicationView { application, user })
    }
}

/// How a missing selection was looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionRef {
    Application(ApplicationId),
    Selection(SelectionId),
}

impl fmt::Display for SelectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionRef::Application(id) => write!(f, "application {id}"),
            SelectionRef::Selection(id) => write!(f, "selection {id}"),
        }
    }
}

/// Error raised by the selection engine.
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("{0}")]
    Validation(String),
    #[error("application {application_id} not found for course {course}")]
    ApplicationNotFound {
        course: CourseCode,
        application_id: ApplicationId,
    },
    #[error("selected application not found for course {course} ({reference})")]
    SelectionNotFound {
        course: CourseCode,
        reference: SelectionRef,
    },
    #[error("application {application_id} is already selected")]
    AlreadySelected { application_id: ApplicationId },
    #[error("cannot promote application {application_id}: already at the top rank for {course}")]
    AlreadyAtTop {
        course: CourseCode,
        application_id: ApplicationId,
    },
    #[error(
        "cannot demote application {application_id}: already at the lowest rank for {course}"
    )]
    AlreadyAtBottom {
        course: CourseCode,
        application_id: ApplicationId,
    },
    #[error("user {user_id} is not a lecturer; only lecturers can comment on selections")]
    Forbidden { user_id: UserId },
    #[error("ranking for {course} has no selection at rank {missing_rank}")]
    RankGap { course: CourseCode, missing_rank: u32 },
    #[error("timed out waiting for the ranking lock on {course}")]
    LockTimeout { course: CourseCode },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Transport-neutral classification of [`SelectionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Boundary,
    Forbidden,
    InternalConsistency,
    Infrastructure,
}

impl ErrorKind {
    pub const fn label(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Boundary => "boundary",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::InternalConsistency => "internal_consistency",
            ErrorKind::Infrastructure => "infrastructure",
        }
    }
}

impl SelectionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SelectionError::Validation(_) => ErrorKind::Validation,
            SelectionError::ApplicationNotFound { .. }
            | SelectionError::SelectionNotFound { .. } => ErrorKind::NotFound,
            SelectionError::AlreadySelected { .. } => ErrorKind::Conflict,
            SelectionError::AlreadyAtTop { .. } | SelectionError::AlreadyAtBottom { .. } => {
                ErrorKind::Boundary
            }
            SelectionError::Forbidden { .. } => ErrorKind::Forbidden,
            SelectionError::RankGap { .. } => ErrorKind::InternalConsistency,
            SelectionError::LockTimeout { .. } | SelectionError::Store(_) => {
                ErrorKind::Infrastructure
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::workflows::selection::memory::{MemoryDatabase, MemoryUserDirectory};

    #[tokio::test]
    async fn busy_course_lock_times_out() {
        let engine = SelectionEngine::new(
            Arc::new(MemoryDatabase::new()),
            Arc::new(MemoryUserDirectory::default()),
            EngineConfig {
                lock_timeout: Duration::from_millis(20),
            },
        );
        let course = CourseCode::parse("COSC0003").expect("valid course code");
        let _held = engine
            .locks
            .acquire(&course, Duration::from_millis(50))
            .await
            .expect("lock free");

        let err = engine
            .select(&course, ApplicationId(1))
            .await
            .expect_err("lock is held");
        assert!(matches!(err, SelectionError::LockTimeout { .. }));
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
    }

    #[tokio::test]
    async fn failed_requests_for_unknown_courses_leave_no_locks() {
        let engine = SelectionEngine::new(
            Arc::new(MemoryDatabase::new()),
            Arc::new(MemoryUserDirectory::default()),
            EngineConfig::default(),
        );

        for index in 0..1_000u64 {
            let course = CourseCode::parse(&format!("BOGUS{index}")).expect("valid course code");
            let err = engine
                .select(&course, ApplicationId(index))
                .await
                .expect_err("no such application");
            assert_eq!(err.kind(), ErrorKind::NotFound);
        }
        assert_eq!(engine.locks.len(), 0);
    }
}
