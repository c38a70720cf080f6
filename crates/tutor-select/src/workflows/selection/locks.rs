use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::domain::CourseCode;

type Registry = Arc<Mutex<HashMap<CourseCode, Arc<AsyncMutex<()>>>>>;

/// Registry of per-course async mutexes serializing rank mutations within a course.
///
/// An entry lives only while some caller holds or waits on it; the last one out removes it, so
/// course codes taken from request paths never accumulate.
#[derive(Debug, Default)]
pub(crate) struct CourseLocks {
    courses: Registry,
}

/// Claim on a course entry. Dropping it prunes the entry if nobody else references it.
#[derive(Debug)]
struct LockHandle {
    courses: Registry,
    course: CourseCode,
    mutex: Option<Arc<AsyncMutex<()>>>,
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        drop(self.mutex.take());
        if let Ok(mut courses) = self.courses.lock() {
            let idle = courses
                .get(&self.course)
                .is_some_and(|mutex| Arc::strong_count(mutex) == 1);
            if idle {
                courses.remove(&self.course);
            }
        }
    }
}

/// Held for the duration of one engine operation on a course.
#[derive(Debug)]
pub(crate) struct CourseGuard {
    // Field order matters: the mutex guard must release before the handle prunes.
    _guard: OwnedMutexGuard<()>,
    _handle: LockHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LockError {
    Timeout,
    Poisoned,
}

impl CourseLocks {
    fn handle(&self, course: &CourseCode) -> Result<LockHandle, LockError> {
        let mut courses = self.courses.lock().map_err(|_| LockError::Poisoned)?;
        let mutex = Arc::clone(courses.entry(course.clone()).or_default());
        Ok(LockHandle {
            courses: Arc::clone(&self.courses),
            course: course.clone(),
            mutex: Some(mutex),
        })
    }

    /// Waits at most `timeout` for exclusive access to `course`.
    pub(crate) async fn acquire(
        &self,
        course: &CourseCode,
        timeout: Duration,
    ) -> Result<CourseGuard, LockError> {
        let handle = self.handle(course)?;
        let mutex = handle.mutex.clone().ok_or(LockError::Poisoned)?;
        let guard = tokio::time::timeout(timeout, mutex.lock_owned())
            .await
            .map_err(|_| LockError::Timeout)?;
        Ok(CourseGuard {
            _guard: guard,
            _handle: handle,
        })
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.courses.lock().map(|courses| courses.len()).unwrap_or(0)
    }
}
