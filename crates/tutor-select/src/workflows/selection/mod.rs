//! Tutor selection: per-course dense rankings of selected applications and the lecturer
//! comments attached to them.

pub mod domain;
pub mod engine;
mod locks;
pub mod memory;
pub mod router;
pub mod seed;
pub mod store;

#[cfg(test)]
mod tests;

pub use domain::{
    Application, ApplicationId, ApplicationKind, ApplicationView, Comment, CommentId, CourseCode,
    NewComment, RankBoundary, RankChange, RankSwap, Selection, SelectionId, SelectionView,
    UnselectOutcome, User, UserId, UserRole,
};
pub use engine::{ErrorKind, SelectionEngine, SelectionError, SelectionRef};
pub use memory::{MemoryDatabase, MemoryUnitOfWork, MemoryUserDirectory};
pub use router::selection_router;
pub use seed::SeedError;
pub use store::{
    ApplicationStore, CommentStore, SelectionDatabase, SelectionStore, StoreError, UnitOfWork,
    UserDirectory,
};
