//! Property tests for per-course rank density.
//!
//! Random select/unselect/promote/demote sequences are replayed against the engine and a plain
//! `Vec` model of the ranking; after every step the two must agree and ranks must be `1..=n`.

use std::sync::Arc;

use chrono::Utc;
use proptest::prelude::*;
use tutor_select::config::EngineConfig;
use tutor_select::workflows::selection::{
    Application, ApplicationId, ApplicationKind, CourseCode, ErrorKind, MemoryDatabase,
    MemoryUserDirectory, SelectionEngine, UserId,
};

const POOL: u64 = 6;

#[derive(Clone, Copy, Debug)]
enum Op {
    Select(u64),
    Unselect(u64),
    Promote(u64),
    Demote(u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    (0u8..4, 1u64..=POOL).prop_map(|(which, id)| match which {
        0 => Op::Select(id),
        1 => Op::Unselect(id),
        2 => Op::Promote(id),
        _ => Op::Demote(id),
    })
}

fn course() -> CourseCode {
    CourseCode::parse("COSC9999").unwrap_or_else(|| panic!("course code rejected"))
}

fn engine() -> SelectionEngine<MemoryDatabase, MemoryUserDirectory> {
    let database = Arc::new(MemoryDatabase::new());
    for id in 1..=POOL {
        database
            .insert_application(Application {
                application_id: ApplicationId(id),
                course_code: course(),
                user_id: UserId(100 + id),
                kind: ApplicationKind::Tutor,
                availability: String::new(),
                academic_credentials: String::new(),
                previous_roles: String::new(),
                skills: String::new(),
                selected: false,
                created_at: Utc::now(),
            })
            .unwrap_or_else(|e| panic!("seed application {id}: {e}"));
    }
    SelectionEngine::new(
        database,
        Arc::new(MemoryUserDirectory::default()),
        EngineConfig::default(),
    )
}

/// Applies `op` to the model, returning the error kind the engine should report, if any.
fn apply_to_model(model: &mut Vec<u64>, op: Op) -> Option<ErrorKind> {
    let position = |model: &Vec<u64>, id: u64| model.iter().position(|entry| *entry == id);
    match op {
        Op::Select(id) => {
            if position(model, id).is_some() {
                return Some(ErrorKind::Conflict);
            }
            model.push(id);
            None
        }
        Op::Unselect(id) => match position(model, id) {
            None => Some(ErrorKind::NotFound),
            Some(index) => {
                model.remove(index);
                None
            }
        },
        Op::Promote(id) => match position(model, id) {
            None => Some(ErrorKind::NotFound),
            Some(0) => Some(ErrorKind::Boundary),
            Some(index) => {
                model.swap(index, index - 1);
                None
            }
        },
        Op::Demote(id) => match position(model, id) {
            None => Some(ErrorKind::NotFound),
            Some(index) if index + 1 == model.len() => Some(ErrorKind::Boundary),
            Some(index) => {
                model.swap(index, index + 1);
                None
            }
        },
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn ranks_stay_dense_under_any_operation_sequence(
        ops in proptest::collection::vec(op_strategy(), 1..40)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap_or_else(|e| panic!("runtime: {e}"));
        let engine = engine();
        let course = course();
        let mut model: Vec<u64> = Vec::new();

        for op in ops {
            let expected = apply_to_model(&mut model, op);

            let outcome = runtime.block_on(async {
                match op {
                    Op::Select(id) => engine.select(&course, ApplicationId(id)).await.map(|_| ()),
                    Op::Unselect(id) => engine.unselect(&course, ApplicationId(id)).await.map(|_| ()),
                    Op::Promote(id) => engine.promote(&course, ApplicationId(id)).await.map(|_| ()),
                    Op::Demote(id) => engine.demote(&course, ApplicationId(id)).await.map(|_| ()),
                }
            });
            prop_assert_eq!(outcome.err().map(|err| err.kind()), expected, "op {:?}", op);

            let listing = engine
                .list_selected_for_course(&course)
                .unwrap_or_else(|e| panic!("listing failed: {e}"));
            let observed: Vec<u64> = listing
                .iter()
                .map(|view| view.selection.application_id.0)
                .collect();
            let ranks: Vec<u32> = listing.iter().map(|view| view.selection.rank).collect();
            let dense: Vec<u32> = (1..=listing.len() as u32).collect();

            prop_assert_eq!(&observed, &model);
            prop_assert_eq!(ranks, dense);
        }
    }
}
