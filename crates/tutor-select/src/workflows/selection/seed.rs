//! CSV hydration for the in-memory stores.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Deserializer};
use tracing::info;

use super::domain::{
    Application, ApplicationId, ApplicationKind, CourseCode, User, UserId, UserRole,
};
use super::memory::{MemoryDatabase, MemoryUserDirectory};
use super::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("unable to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed seed row: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: course code must not be blank")]
    BlankCourse { row: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Deserialize)]
struct UserRow {
    id: u64,
    first_name: String,
    last_name: String,
    email: String,
    role: UserRole,
}

#[derive(Debug, Deserialize)]
struct ApplicationRow {
    application_id: u64,
    course_code: String,
    user_id: u64,
    #[serde(rename = "type")]
    kind: ApplicationKind,
    #[serde(default, deserialize_with = "empty_as_default")]
    availability: String,
    #[serde(default, deserialize_with = "empty_as_default")]
    academic_credentials: String,
    #[serde(default, deserialize_with = "empty_as_default")]
    previous_roles: String,
    #[serde(default, deserialize_with = "empty_as_default")]
    skills: String,
}

fn empty_as_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

fn reader<R: Read>(source: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(source)
}

pub fn parse_users<R: Read>(source: R) -> Result<Vec<User>, SeedError> {
    let mut users = Vec::new();
    for row in reader(source).deserialize::<UserRow>() {
        let row = row?;
        users.push(User {
            id: UserId(row.id),
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            role: row.role,
        });
    }
    Ok(users)
}

/// Seeded applications always start unselected; selections only come from the engine.
pub fn parse_applications<R: Read>(source: R) -> Result<Vec<Application>, SeedError> {
    let created_at = Utc::now();
    let mut applications = Vec::new();
    for (index, row) in reader(source).deserialize::<ApplicationRow>().enumerate() {
        let row = row?;
        let course_code =
            CourseCode::parse(&row.course_code).ok_or(SeedError::BlankCourse { row: index + 1 })?;
        applications.push(Application {
            application_id: ApplicationId(row.application_id),
            course_code,
            user_id: UserId(row.user_id),
            kind: row.kind,
            availability: row.availability,
            academic_credentials: row.academic_credentials,
            previous_roles: row.previous_roles,
            skills: row.skills,
            selected: false,
            created_at,
        });
    }
    Ok(applications)
}

fn open(path: &Path) -> Result<File, SeedError> {
    File::open(path).map_err(|source| SeedError::Open {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads whichever seed files are given into the stores.
pub fn load(
    database: &MemoryDatabase,
    users: &MemoryUserDirectory,
    applications_csv: Option<&Path>,
    users_csv: Option<&Path>,
) -> Result<(), SeedError> {
    if let Some(path) = users_csv {
        let parsed = parse_users(open(path)?)?;
        let count = parsed.len();
        for user in parsed {
            users.insert(user)?;
        }
        info!(path = %path.display(), count, "seeded users");
    }

    if let Some(path) = applications_csv {
        let parsed = parse_applications(open(path)?)?;
        let count = parsed.len();
        for application in parsed {
            database.insert_application(application)?;
        }
        info!(path = %path.display(), count, "seeded applications");
    }

    Ok(())
}
