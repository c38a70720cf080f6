use std::sync::Arc;

use axum::response::Response;
use chrono::Utc;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::workflows::selection::domain::{
    Application, ApplicationId, ApplicationKind, Comment, CourseCode, NewComment, RankBoundary,
    Selection, SelectionId, User, UserId, UserRole,
};
use crate::workflows::selection::memory::{
    MemoryDatabase, MemoryUnitOfWork, MemoryUserDirectory,
};
use crate::workflows::selection::store::{
    ApplicationStore, CommentStore, SelectionDatabase, SelectionStore, StoreError, UnitOfWork,
};
use crate::workflows::selection::{selection_router, SelectionEngine};

pub(super) type MemoryEngine = SelectionEngine<MemoryDatabase, MemoryUserDirectory>;

pub(super) const LECTURER: UserId = UserId(1);
pub(super) const CANDIDATE: UserId = UserId(2);

pub(super) fn course() -> CourseCode {
    CourseCode::parse("COSC0001").expect("valid course code")
}

pub(super) fn other_course() -> CourseCode {
    CourseCode::parse("COSC0002").expect("valid course code")
}

pub(super) fn application(id: u64, course: &CourseCode) -> Application {
    Application {
        application_id: ApplicationId(id),
        course_code: course.clone(),
        user_id: CANDIDATE,
        kind: if id % 2 == 0 {
            ApplicationKind::Tutor
        } else {
            ApplicationKind::LabAssistant
        },
        availability: "Part time".to_string(),
        academic_credentials: "Bachelor of Computer Science".to_string(),
        previous_roles: "Peer mentor".to_string(),
        skills: "Rust, SQL".to_string(),
        selected: false,
        created_at: Utc::now(),
    }
}

fn user(id: UserId, role: UserRole) -> User {
    User {
        id,
        first_name: "Sam".to_string(),
        last_name: format!("User{}", id.0),
        email: format!("user{}@example.edu", id.0),
        role,
    }
}

/// Course COSC0001 holds applications 10..=15, COSC0002 holds 20..=21.
pub(super) fn seeded_stores() -> (Arc<MemoryDatabase>, Arc<MemoryUserDirectory>) {
    let database = Arc::new(MemoryDatabase::new());
    for id in 10..=15 {
        database
            .insert_application(application(id, &course()))
            .expect("seed application");
    }
    for id in 20..=21 {
        database
            .insert_application(application(id, &other_course()))
            .expect("seed application");
    }

    let users = Arc::new(MemoryUserDirectory::default());
    users
        .insert(user(LECTURER, UserRole::Lecturer))
        .expect("seed lecturer");
    users
        .insert(user(CANDIDATE, UserRole::Candidate))
        .expect("seed candidate");
    (database, users)
}

pub(super) fn build_engine() -> (MemoryEngine, Arc<MemoryDatabase>) {
    let (database, users) = seeded_stores();
    let engine = SelectionEngine::new(database.clone(), users, EngineConfig::default());
    (engine, database)
}

pub(super) async fn select_all(engine: &MemoryEngine, course: &CourseCode, ids: &[u64]) {
    for id in ids {
        engine
            .select(course, ApplicationId(*id))
            .await
            .expect("select succeeds");
    }
}

/// `(application id, rank)` pairs in rank order.
pub(super) fn ranks(engine: &MemoryEngine, course: &CourseCode) -> Vec<(u64, u32)> {
    engine
        .list_selected_for_course(course)
        .expect("ranking readable")
        .into_iter()
        .map(|view| (view.selection.application_id.0, view.selection.rank))
        .collect()
}

pub(super) fn assert_dense(engine: &MemoryEngine, course: &CourseCode) {
    let observed: Vec<u32> = ranks(engine, course).into_iter().map(|(_, rank)| rank).collect();
    let expected: Vec<u32> = (1..=observed.len() as u32).collect();
    assert_eq!(observed, expected, "ranks for {course} are not dense");
}

pub(super) struct UnavailableDatabase;

impl SelectionDatabase for UnavailableDatabase {
    type UnitOfWork<'a> = MemoryUnitOfWork<'a>;

    fn begin(&self) -> Result<MemoryUnitOfWork<'_>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }
}

pub(super) fn unavailable_engine() -> SelectionEngine<UnavailableDatabase, MemoryUserDirectory> {
    let (_, users) = seeded_stores();
    SelectionEngine::new(
        Arc::new(UnavailableDatabase),
        users,
        EngineConfig::default(),
    )
}

/// Backend whose application rows have gone missing while their selections remain.
pub(super) struct DetachedApplicationDatabase(pub(super) Arc<MemoryDatabase>);

impl SelectionDatabase for DetachedApplicationDatabase {
    type UnitOfWork<'a> = DetachedUnitOfWork<'a>;

    fn begin(&self) -> Result<DetachedUnitOfWork<'_>, StoreError> {
        Ok(DetachedUnitOfWork(self.0.begin()?))
    }
}

pub(super) struct DetachedUnitOfWork<'a>(MemoryUnitOfWork<'a>);

impl ApplicationStore for DetachedUnitOfWork<'_> {
    fn find_by_course_and_id(
        &self,
        course: &CourseCode,
        application_id: ApplicationId,
    ) -> Result<Option<Application>, StoreError> {
        self.0.find_by_course_and_id(course, application_id)
    }

    fn find_application(
        &self,
        _application_id: ApplicationId,
    ) -> Result<Option<Application>, StoreError> {
        Ok(None)
    }

    fn list_applications_for_course(
        &self,
        course: &CourseCode,
    ) -> Result<Vec<Application>, StoreError> {
        self.0.list_applications_for_course(course)
    }

    fn list_applications(&self) -> Result<Vec<Application>, StoreError> {
        self.0.list_applications()
    }

    fn set_selected_flag(
        &mut self,
        _application_id: ApplicationId,
        _selected: bool,
    ) -> Result<bool, StoreError> {
        Ok(false)
    }
}

impl SelectionStore for DetachedUnitOfWork<'_> {
    fn count_for_course(&self, course: &CourseCode) -> Result<usize, StoreError> {
        self.0.count_for_course(course)
    }

    fn find_by_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Option<Selection>, StoreError> {
        self.0.find_by_application(application_id)
    }

    fn find_by_application_and_course(
        &self,
        application_id: ApplicationId,
        course: &CourseCode,
    ) -> Result<Option<Selection>, StoreError> {
        self.0.find_by_application_and_course(application_id, course)
    }

    fn find_by_id_and_course(
        &self,
        selection_id: SelectionId,
        course: &CourseCode,
    ) -> Result<Option<Selection>, StoreError> {
        self.0.find_by_id_and_course(selection_id, course)
    }

    fn find_boundary(
        &self,
        course: &CourseCode,
        boundary: RankBoundary,
    ) -> Result<Option<Selection>, StoreError> {
        self.0.find_boundary(course, boundary)
    }

    fn find_by_rank(
        &self,
        course: &CourseCode,
        rank: u32,
    ) -> Result<Option<Selection>, StoreError> {
        self.0.find_by_rank(course, rank)
    }

    fn list_by_course_ordered_by_rank(
        &self,
        course: &CourseCode,
    ) -> Result<Vec<Selection>, StoreError> {
        self.0.list_by_course_ordered_by_rank(course)
    }

    fn list_with_rank_greater_than(
        &self,
        course: &CourseCode,
        rank: u32,
    ) -> Result<Vec<Selection>, StoreError> {
        self.0.list_with_rank_greater_than(course, rank)
    }

    fn create_selection(
        &mut self,
        user_id: UserId,
        application_id: ApplicationId,
        rank: u32,
    ) -> Result<Selection, StoreError> {
        self.0.create_selection(user_id, application_id, rank)
    }

    fn save_selections(&mut self, batch: &[Selection]) -> Result<(), StoreError> {
        self.0.save_selections(batch)
    }

    fn remove_selection(&mut self, selection: &Selection) -> Result<(), StoreError> {
        self.0.remove_selection(selection)
    }
}

impl CommentStore for DetachedUnitOfWork<'_> {
    fn create_comment(&mut self, comment: NewComment) -> Result<Comment, StoreError> {
        self.0.create_comment(comment)
    }

    fn find_by_selection(&self, selection_id: SelectionId) -> Result<Vec<Comment>, StoreError> {
        self.0.find_by_selection(selection_id)
    }

    fn delete_by_selection(&mut self, selection_id: SelectionId) -> Result<usize, StoreError> {
        self.0.delete_by_selection(selection_id)
    }
}

impl UnitOfWork for DetachedUnitOfWork<'_> {
    fn commit(self) -> Result<(), StoreError> {
        self.0.commit()
    }
}

/// Engine over `database` that cannot see any application rows.
pub(super) fn detached_engine(
    database: Arc<MemoryDatabase>,
) -> SelectionEngine<DetachedApplicationDatabase, MemoryUserDirectory> {
    let (_, users) = seeded_stores();
    SelectionEngine::new(
        Arc::new(DetachedApplicationDatabase(database)),
        users,
        EngineConfig::default(),
    )
}

pub(super) fn router_for(engine: MemoryEngine) -> axum::Router {
    selection_router(Arc::new(engine))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
