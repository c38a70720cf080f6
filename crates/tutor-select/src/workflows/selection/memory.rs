use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::debug;

use super::domain::{
    Application, ApplicationId, Comment, CommentId, CourseCode, NewComment, RankBoundary,
    Selection, SelectionId, User, UserId,
};
use super::store::{
    ApplicationStore, CommentStore, SelectionDatabase, SelectionStore, StoreError, UnitOfWork,
    UserDirectory,
};

pub const APPLICATION_PRIMARY_KEY: &str = "application_pkey";
pub const SELECTION_APPLICATION_UNIQUE: &str = "selected_application_application_id_key";
pub const COMMENT_SELECTION_FOREIGN_KEY: &str = "comment_selected_application_id_fkey";

#[derive(Debug, Clone, Default)]
struct Tables {
    applications: BTreeMap<ApplicationId, Application>,
    selections: BTreeMap<SelectionId, Selection>,
    comments: BTreeMap<CommentId, Comment>,
}

impl Tables {
    fn in_course(&self, selection: &Selection, course: &CourseCode) -> bool {
        self.applications
            .get(&selection.application_id)
            .is_some_and(|application| &application.course_code == course)
    }

    fn course_selections<'a>(
        &'a self,
        course: &'a CourseCode,
    ) -> impl Iterator<Item = &'a Selection> + 'a {
        self.selections
            .values()
            .filter(move |selection| self.in_course(selection, course))
    }

    fn selection_for_application(&self, application_id: ApplicationId) -> Option<&Selection> {
        self.selections
            .values()
            .find(|selection| selection.application_id == application_id)
    }

    fn has_comments(&self, selection_id: SelectionId) -> bool {
        self.comments
            .values()
            .any(|comment| comment.selected_application_id == selection_id)
    }

    fn check_constraints(&self, writes: &WriteSet) -> Result<(), StoreError> {
        for id in &writes.selections {
            match self.selections.get(id) {
                Some(selection) => {
                    let duplicate = self.selections.values().any(|other| {
                        other.id != selection.id && other.application_id == selection.application_id
                    });
                    if duplicate {
                        return Err(StoreError::UniqueViolation {
                            constraint: SELECTION_APPLICATION_UNIQUE,
                        });
                    }
                }
                None if self.has_comments(*id) => {
                    return Err(StoreError::ForeignKeyViolation {
                        constraint: COMMENT_SELECTION_FOREIGN_KEY,
                    });
                }
                None => {}
            }
        }

        for id in &writes.comments {
            if let Some(comment) = self.comments.get(id) {
                if !self.selections.contains_key(&comment.selected_application_id) {
                    return Err(StoreError::ForeignKeyViolation {
                        constraint: COMMENT_SELECTION_FOREIGN_KEY,
                    });
                }
            }
        }

        Ok(())
    }
}

/// Keys touched by a unit of work; only these are merged into the committed tables.
#[derive(Debug, Default)]
struct WriteSet {
    applications: BTreeSet<ApplicationId>,
    selections: BTreeSet<SelectionId>,
    comments: BTreeSet<CommentId>,
}

impl WriteSet {
    fn is_empty(&self) -> bool {
        self.applications.is_empty() && self.selections.is_empty() && self.comments.is_empty()
    }
}

fn merge_row<K: Ord + Copy, V: Clone>(
    target: &mut BTreeMap<K, V>,
    source: &BTreeMap<K, V>,
    key: K,
) {
    match source.get(&key) {
        Some(row) => {
            target.insert(key, row.clone());
        }
        None => {
            target.remove(&key);
        }
    }
}

/// In-process database with snapshot reads and write-set commits.
///
/// Committed state is an immutable `Arc<Tables>`. A unit of work copies the snapshot it starts
/// from, mutates the copy, and on commit merges only the rows it touched into whatever is
/// committed at that moment. Concurrent units of work on different courses therefore never
/// clobber each other; same-course exclusion is the engine's job.
#[derive(Debug)]
pub struct MemoryDatabase {
    committed: RwLock<Arc<Tables>>,
    selection_ids: AtomicU64,
    comment_ids: AtomicU64,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self {
            committed: RwLock::new(Arc::new(Tables::default())),
            selection_ids: AtomicU64::new(1),
            comment_ids: AtomicU64::new(1),
        }
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intake path used by seeding and tests; the engine itself never creates applications.
    pub fn insert_application(&self, application: Application) -> Result<(), StoreError> {
        let mut committed = self
            .committed
            .write()
            .map_err(|_| StoreError::poisoned("committed tables"))?;
        if committed
            .applications
            .contains_key(&application.application_id)
        {
            return Err(StoreError::UniqueViolation {
                constraint: APPLICATION_PRIMARY_KEY,
            });
        }
        Arc::make_mut(&mut *committed)
            .applications
            .insert(application.application_id, application);
        Ok(())
    }

    fn snapshot(&self) -> Result<Arc<Tables>, StoreError> {
        self.committed
            .read()
            .map(|tables| Arc::clone(&tables))
            .map_err(|_| StoreError::poisoned("committed tables"))
    }
}

impl SelectionDatabase for MemoryDatabase {
    type UnitOfWork<'a> = MemoryUnitOfWork<'a>;

    fn begin(&self) -> Result<MemoryUnitOfWork<'_>, StoreError> {
        let snapshot = self.snapshot()?;
        Ok(MemoryUnitOfWork {
            database: self,
            working: Tables::clone(&snapshot),
            writes: WriteSet::default(),
            committed: false,
        })
    }
}

/// Unit of work over [`MemoryDatabase`]. Rolls back when dropped uncommitted.
#[derive(Debug)]
pub struct MemoryUnitOfWork<'a> {
    database: &'a MemoryDatabase,
    working: Tables,
    writes: WriteSet,
    committed: bool,
}

impl ApplicationStore for MemoryUnitOfWork<'_> {
    fn find_by_course_and_id(
        &self,
        course: &CourseCode,
        application_id: ApplicationId,
    ) -> Result<Option<Application>, StoreError> {
        Ok(self
            .working
            .applications
            .get(&application_id)
            .filter(|application| &application.course_code == course)
            .cloned())
    }

    fn find_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Option<Application>, StoreError> {
        Ok(self.working.applications.get(&application_id).cloned())
    }

    fn list_applications_for_course(
        &self,
        course: &CourseCode,
    ) -> Result<Vec<Application>, StoreError> {
        Ok(self
            .working
            .applications
            .values()
            .filter(|application| &application.course_code == course)
            .cloned()
            .collect())
    }

    fn list_applications(&self) -> Result<Vec<Application>, StoreError> {
        Ok(self.working.applications.values().cloned().collect())
    }

    fn set_selected_flag(
        &mut self,
        application_id: ApplicationId,
        selected: bool,
    ) -> Result<bool, StoreError> {
        match self.working.applications.get_mut(&application_id) {
            Some(application) => {
                application.selected = selected;
                self.writes.applications.insert(application_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl SelectionStore for MemoryUnitOfWork<'_> {
    fn count_for_course(&self, course: &CourseCode) -> Result<usize, StoreError> {
        Ok(self.working.course_selections(course).count())
    }

    fn find_by_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Option<Selection>, StoreError> {
        Ok(self
            .working
            .selection_for_application(application_id)
            .cloned())
    }

    fn find_by_application_and_course(
        &self,
        application_id: ApplicationId,
        course: &CourseCode,
    ) -> Result<Option<Selection>, StoreError> {
        Ok(self
            .working
            .selection_for_application(application_id)
            .filter(|selection| self.working.in_course(selection, course))
            .cloned())
    }

    fn find_by_id_and_course(
        &self,
        selection_id: SelectionId,
        course: &CourseCode,
    ) -> Result<Option<Selection>, StoreError> {
        Ok(self
            .working
            .selections
            .get(&selection_id)
            .filter(|selection| self.working.in_course(selection, course))
            .cloned())
    }

    fn find_boundary(
        &self,
        course: &CourseCode,
        boundary: RankBoundary,
    ) -> Result<Option<Selection>, StoreError> {
        let selections = self.working.course_selections(course);
        let found = match boundary {
            RankBoundary::Top => selections.min_by_key(|selection| selection.rank),
            RankBoundary::Bottom => selections.max_by_key(|selection| selection.rank),
        };
        Ok(found.cloned())
    }

    fn find_by_rank(
        &self,
        course: &CourseCode,
        rank: u32,
    ) -> Result<Option<Selection>, StoreError> {
        Ok(self
            .working
            .course_selections(course)
            .find(|selection| selection.rank == rank)
            .cloned())
    }

    fn list_by_course_ordered_by_rank(
        &self,
        course: &CourseCode,
    ) -> Result<Vec<Selection>, StoreError> {
        let mut selections: Vec<Selection> =
            self.working.course_selections(course).cloned().collect();
        selections.sort_by_key(|selection| (selection.rank, selection.id));
        Ok(selections)
    }

    fn list_with_rank_greater_than(
        &self,
        course: &CourseCode,
        rank: u32,
    ) -> Result<Vec<Selection>, StoreError> {
        Ok(self
            .working
            .course_selections(course)
            .filter(|selection| selection.rank > rank)
            .cloned()
            .collect())
    }

    fn create_selection(
        &mut self,
        user_id: UserId,
        application_id: ApplicationId,
        rank: u32,
    ) -> Result<Selection, StoreError> {
        if self
            .working
            .selection_for_application(application_id)
            .is_some()
        {
            return Err(StoreError::UniqueViolation {
                constraint: SELECTION_APPLICATION_UNIQUE,
            });
        }

        let now = Utc::now();
        let selection = Selection {
            id: SelectionId(self.database.selection_ids.fetch_add(1, Ordering::Relaxed)),
            application_id,
            user_id,
            rank,
            created_at: now,
            updated_at: now,
        };
        self.working
            .selections
            .insert(selection.id, selection.clone());
        self.writes.selections.insert(selection.id);
        Ok(selection)
    }

    fn save_selections(&mut self, batch: &[Selection]) -> Result<(), StoreError> {
        let now = Utc::now();
        for selection in batch {
            let mut row = selection.clone();
            row.updated_at = now;
            self.working.selections.insert(row.id, row);
            self.writes.selections.insert(selection.id);
        }
        Ok(())
    }

    fn remove_selection(&mut self, selection: &Selection) -> Result<(), StoreError> {
        if self.working.has_comments(selection.id) {
            return Err(StoreError::ForeignKeyViolation {
                constraint: COMMENT_SELECTION_FOREIGN_KEY,
            });
        }
        self.working.selections.remove(&selection.id);
        self.writes.selections.insert(selection.id);
        Ok(())
    }
}

impl CommentStore for MemoryUnitOfWork<'_> {
    fn create_comment(&mut self, comment: NewComment) -> Result<Comment, StoreError> {
        if !self
            .working
            .selections
            .contains_key(&comment.selected_application_id)
        {
            return Err(StoreError::ForeignKeyViolation {
                constraint: COMMENT_SELECTION_FOREIGN_KEY,
            });
        }

        let comment = Comment {
            comment_id: CommentId(self.database.comment_ids.fetch_add(1, Ordering::Relaxed)),
            selected_application_id: comment.selected_application_id,
            author_user_id: comment.author_user_id,
            content: comment.content,
            created_at: Utc::now(),
        };
        self.working
            .comments
            .insert(comment.comment_id, comment.clone());
        self.writes.comments.insert(comment.comment_id);
        Ok(comment)
    }

    fn find_by_selection(&self, selection_id: SelectionId) -> Result<Vec<Comment>, StoreError> {
        Ok(self
            .working
            .comments
            .values()
            .filter(|comment| comment.selected_application_id == selection_id)
            .cloned()
            .collect())
    }

    fn delete_by_selection(&mut self, selection_id: SelectionId) -> Result<usize, StoreError> {
        let doomed: Vec<CommentId> = self
            .working
            .comments
            .values()
            .filter(|comment| comment.selected_application_id == selection_id)
            .map(|comment| comment.comment_id)
            .collect();
        for id in &doomed {
            self.working.comments.remove(id);
            self.writes.comments.insert(*id);
        }
        Ok(doomed.len())
    }
}

impl UnitOfWork for MemoryUnitOfWork<'_> {
    fn commit(mut self) -> Result<(), StoreError> {
        if self.writes.is_empty() {
            self.committed = true;
            return Ok(());
        }

        let mut committed = self
            .database
            .committed
            .write()
            .map_err(|_| StoreError::poisoned("committed tables"))?;

        let mut next = Tables::clone(&committed);
        for id in &self.writes.applications {
            merge_row(&mut next.applications, &self.working.applications, *id);
        }
        for id in &self.writes.selections {
            merge_row(&mut next.selections, &self.working.selections, *id);
        }
        for id in &self.writes.comments {
            merge_row(&mut next.comments, &self.working.comments, *id);
        }
        next.check_constraints(&self.writes)?;

        *committed = Arc::new(next);
        self.committed = true;
        Ok(())
    }
}

impl Drop for MemoryUnitOfWork<'_> {
    fn drop(&mut self) {
        if !self.committed && !self.writes.is_empty() {
            debug!(
                applications = self.writes.applications.len(),
                selections = self.writes.selections.len(),
                comments = self.writes.comments.len(),
                "rolled back uncommitted unit of work"
            );
        }
    }
}

/// User directory backed by a map; stands in for the authentication service.
#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<UserId, User>>,
}

impl MemoryUserDirectory {
    pub fn insert(&self, user: User) -> Result<(), StoreError> {
        self.users
            .write()
            .map_err(|_| StoreError::poisoned("user directory"))?
            .insert(user.id, user);
        Ok(())
    }
}

impl UserDirectory for MemoryUserDirectory {
    fn find_user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        let users = self
            .users
            .read()
            .map_err(|_| StoreError::poisoned("user directory"))?;
        Ok(users.get(&user_id).cloned())
    }
}
