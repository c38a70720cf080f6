use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::domain::{ApplicationId, CourseCode, SelectionId, UserId};
use super::engine::{ErrorKind, SelectionEngine, SelectionError};
use super::store::{SelectionDatabase, UserDirectory};

type EngineState<D, U> = State<Arc<SelectionEngine<D, U>>>;

/// Router builder exposing the lecturer selection endpoints.
pub fn selection_router<D, U>(engine: Arc<SelectionEngine<D, U>>) -> Router
where
    D: SelectionDatabase + 'static,
    U: UserDirectory + 'static,
{
    Router::new()
        .route("/api/v1/applications", get(list_applications_handler::<D, U>))
        .route(
            "/api/v1/courses/:code/applications",
            get(course_applications_handler::<D, U>),
        )
        .route(
            "/api/v1/courses/:code/selected",
            post(select_handler::<D, U>).get(list_selected_handler::<D, U>),
        )
        .route(
            "/api/v1/courses/:code/unselect",
            delete(unselect_handler::<D, U>),
        )
        .route(
            "/api/v1/courses/:code/promote",
            patch(promote_handler::<D, U>),
        )
        .route("/api/v1/courses/:code/demote", patch(demote_handler::<D, U>))
        .route(
            "/api/v1/courses/:code/selected/comments",
            post(add_comment_handler::<D, U>),
        )
        .route(
            "/api/v1/courses/:code/selected/:selected_application_id/comments",
            get(list_comments_handler::<D, U>),
        )
        .with_state(engine)
}

/// Body for select, unselect, promote, and demote.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRequest {
    pub application_id: Option<ApplicationId>,
}

/// Body for adding a lecturer comment.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRequest {
    pub selected_application_id: Option<SelectionId>,
    pub comment: Option<String>,
    pub user_id: Option<UserId>,
}

#[derive(Debug, Serialize)]
struct Envelope<T> {
    success: bool,
    data: T,
    message: &'static str,
}

fn envelope<T: Serialize>(status: StatusCode, data: T, message: &'static str) -> Response {
    let body = Envelope {
        success: true,
        data,
        message,
    };
    (status, Json(body)).into_response()
}

/// HTTP status for an engine error; lock timeouts are retryable, other infrastructure faults are not.
pub(crate) fn status_for(error: &SelectionError) -> StatusCode {
    match error {
        SelectionError::LockTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
        other => match other.kind() {
            ErrorKind::Validation | ErrorKind::Boundary => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::InternalConsistency | ErrorKind::Infrastructure => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
    }
}

impl IntoResponse for SelectionError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        if kind == ErrorKind::Infrastructure {
            error!(error = %self, "selection request failed");
        }
        let payload = json!({
            "success": false,
            "error": kind.label(),
            "message": self.to_string(),
        });
        (status_for(&self), Json(payload)).into_response()
    }
}

fn course_code(raw: &str) -> Result<CourseCode, SelectionError> {
    CourseCode::parse(raw)
        .ok_or_else(|| SelectionError::Validation("course code is required".to_string()))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, SelectionError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| SelectionError::Validation(rejection.body_text()))
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, SelectionError> {
    value.ok_or_else(|| SelectionError::Validation(format!("{field} is required")))
}

fn application_target(
    code: &str,
    payload: Result<Json<ApplicationRequest>, JsonRejection>,
) -> Result<(CourseCode, ApplicationId), SelectionError> {
    let course = course_code(code)?;
    let request = body(payload)?;
    let application_id = required(request.application_id, "applicationId")?;
    Ok((course, application_id))
}

pub(crate) async fn list_applications_handler<D, U>(
    State(engine): EngineState<D, U>,
) -> Result<Response, SelectionError>
where
    D: SelectionDatabase + 'static,
    U: UserDirectory + 'static,
{
    let applications = engine.list_applications()?;
    Ok(Json(applications).into_response())
}

pub(crate) async fn course_applications_handler<D, U>(
    State(engine): EngineState<D, U>,
    Path(code): Path<String>,
) -> Result<Response, SelectionError>
where
    D: SelectionDatabase + 'static,
    U: UserDirectory + 'static,
{
    let course = course_code(&code)?;
    let applications = engine.list_applications_for_course(&course)?;
    Ok(Json(applications).into_response())
}

pub(crate) async fn select_handler<D, U>(
    State(engine): EngineState<D, U>,
    Path(code): Path<String>,
    payload: Result<Json<ApplicationRequest>, JsonRejection>,
) -> Result<Response, SelectionError>
where
    D: SelectionDatabase + 'static,
    U: UserDirectory + 'static,
{
    let (course, application_id) = application_target(&code, payload)?;
    let selection = engine.select(&course, application_id).await?;
    Ok(envelope(
        StatusCode::CREATED,
        selection,
        "Applicant selected successfully",
    ))
}

pub(crate) async fn list_selected_handler<D, U>(
    State(engine): EngineState<D, U>,
    Path(code): Path<String>,
) -> Result<Response, SelectionError>
where
    D: SelectionDatabase + 'static,
    U: UserDirectory + 'static,
{
    let course = course_code(&code)?;
    let ranking = engine.list_selected_for_course(&course)?;
    Ok(Json(ranking).into_response())
}

pub(crate) async fn unselect_handler<D, U>(
    State(engine): EngineState<D, U>,
    Path(code): Path<String>,
    payload: Result<Json<ApplicationRequest>, JsonRejection>,
) -> Result<Response, SelectionError>
where
    D: SelectionDatabase + 'static,
    U: UserDirectory + 'static,
{
    let (course, application_id) = application_target(&code, payload)?;
    let outcome = engine.unselect(&course, application_id).await?;
    Ok(envelope(
        StatusCode::OK,
        outcome,
        "Application unselected successfully",
    ))
}

pub(crate) async fn promote_handler<D, U>(
    State(engine): EngineState<D, U>,
    Path(code): Path<String>,
    payload: Result<Json<ApplicationRequest>, JsonRejection>,
) -> Result<Response, SelectionError>
where
    D: SelectionDatabase + 'static,
    U: UserDirectory + 'static,
{
    let (course, application_id) = application_target(&code, payload)?;
    let swap = engine.promote(&course, application_id).await?;
    Ok(envelope(StatusCode::OK, swap, "Rank promoted successfully"))
}

pub(crate) async fn demote_handler<D, U>(
    State(engine): EngineState<D, U>,
    Path(code): Path<String>,
    payload: Result<Json<ApplicationRequest>, JsonRejection>,
) -> Result<Response, SelectionError>
where
    D: SelectionDatabase + 'static,
    U: UserDirectory + 'static,
{
    let (course, application_id) = application_target(&code, payload)?;
    let swap = engine.demote(&course, application_id).await?;
    Ok(envelope(StatusCode::OK, swap, "Rank demoted successfully"))
}

pub(crate) async fn add_comment_handler<D, U>(
    State(engine): EngineState<D, U>,
    Path(code): Path<String>,
    payload: Result<Json<CommentRequest>, JsonRejection>,
) -> Result<Response, SelectionError>
where
    D: SelectionDatabase + 'static,
    U: UserDirectory + 'static,
{
    let course = course_code(&code)?;
    let request = body(payload)?;
    let selection_id = required(request.selected_application_id, "selectedApplicationId")?;
    let content = required(request.comment, "comment")?;
    let author = required(request.user_id, "userId")?;

    let comment = engine
        .add_comment(&course, selection_id, &content, author)
        .await?;
    Ok(envelope(
        StatusCode::CREATED,
        comment,
        "Comment added successfully",
    ))
}

pub(crate) async fn list_comments_handler<D, U>(
    State(engine): EngineState<D, U>,
    Path((code, raw_id)): Path<(String, String)>,
) -> Result<Response, SelectionError>
where
    D: SelectionDatabase + 'static,
    U: UserDirectory + 'static,
{
    course_code(&code)?;
    let selection_id = raw_id.trim().parse::<u64>().map(SelectionId).map_err(|_| {
        SelectionError::Validation("valid selected application id is required".to_string())
    })?;
    let comments = engine.list_comments_for_selection(selection_id)?;
    Ok(Json(comments).into_response())
}
