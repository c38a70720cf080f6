use crate::infra::{seeded_engine, Engine};
use clap::Args;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tutor_select::config::EngineConfig;
use tutor_select::error::AppError;
use tutor_select::workflows::selection::{
    seed, ApplicationId, CourseCode, MemoryDatabase, MemoryUserDirectory, SelectionEngine,
    SelectionError, UserId,
};

const SAMPLE_APPLICATIONS: &str =
    include_str!("../../../crates/tutor-select/fixtures/applications.csv");
const SAMPLE_USERS: &str = include_str!("../../../crates/tutor-select/fixtures/users.csv");

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Course whose ranking the demo manipulates
    #[arg(long, default_value = "COSC2758")]
    pub(crate) course: String,
    /// Lecturer user id used to author the demo comment
    #[arg(long, default_value_t = 1)]
    pub(crate) lecturer_id: u64,
    /// Applications CSV to use instead of the bundled sample
    #[arg(long)]
    pub(crate) applications: Option<PathBuf>,
    /// Users CSV to use instead of the bundled sample
    #[arg(long)]
    pub(crate) users: Option<PathBuf>,
}

fn sample_engine() -> Result<Arc<Engine>, AppError> {
    let database = Arc::new(MemoryDatabase::new());
    let users = Arc::new(MemoryUserDirectory::default());
    for user in seed::parse_users(Cursor::new(SAMPLE_USERS))? {
        users.insert(user).map_err(seed::SeedError::from)?;
    }
    for application in seed::parse_applications(Cursor::new(SAMPLE_APPLICATIONS))? {
        database
            .insert_application(application)
            .map_err(seed::SeedError::from)?;
    }
    Ok(Arc::new(SelectionEngine::new(
        database,
        users,
        EngineConfig::default(),
    )))
}

fn print_ranking(engine: &Engine, course: &CourseCode) -> Result<(), SelectionError> {
    let ranking = engine.list_selected_for_course(course)?;
    if ranking.is_empty() {
        println!("  (no selections)");
    }
    for view in ranking {
        let candidate = view
            .application
            .user
            .as_ref()
            .map(|user| format!("{} {}", user.first_name, user.last_name))
            .unwrap_or_else(|| format!("user {}", view.selection.user_id));
        println!(
            "  #{} application {} | {} | {}",
            view.selection.rank,
            view.selection.application_id,
            candidate,
            view.application.application.kind.label()
        );
    }
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        course,
        lecturer_id,
        applications,
        users,
    } = args;

    let engine = if applications.is_some() || users.is_some() {
        seeded_engine(
            EngineConfig::default(),
            applications.as_deref(),
            users.as_deref(),
        )?
    } else {
        sample_engine()?
    };

    let Some(course) = CourseCode::parse(&course) else {
        println!("Course code must not be blank");
        return Ok(());
    };

    println!("Tutor selection demo for {course}");
    if let Err(err) = walkthrough(&engine, &course, UserId(lecturer_id)).await {
        println!("  Demo stopped: {err}");
    }
    Ok(())
}

async fn walkthrough(
    engine: &Engine,
    course: &CourseCode,
    lecturer: UserId,
) -> Result<(), SelectionError> {
    let candidates: Vec<ApplicationId> = engine
        .list_applications_for_course(course)?
        .into_iter()
        .map(|view| view.application.application_id)
        .collect();
    if candidates.is_empty() {
        println!("  No applications found for {course}");
        return Ok(());
    }

    println!("\nSelecting {} applications", candidates.len());
    for application_id in &candidates {
        let selection = engine.select(course, *application_id).await?;
        println!(
            "- Selected application {} at rank {}",
            application_id, selection.rank
        );
    }
    print_ranking(engine, course)?;

    if let Some(last) = candidates.last() {
        println!("\nPromoting application {last}");
        match engine.promote(course, *last).await {
            Ok(swap) => println!(
                "- {} now rank {}, {} moved to rank {}",
                swap.promoted.application_id,
                swap.promoted.new_rank,
                swap.demoted.application_id,
                swap.demoted.new_rank
            ),
            Err(err) => println!("- Promote rejected: {err}"),
        }
    }

    let first = candidates[0];
    println!("\nDemoting application {first}");
    match engine.demote(course, first).await {
        Ok(swap) => println!(
            "- {} now rank {}, {} moved up to rank {}",
            swap.demoted.application_id,
            swap.demoted.new_rank,
            swap.promoted.application_id,
            swap.promoted.new_rank
        ),
        Err(err) => println!("- Demote rejected: {err}"),
    }
    print_ranking(engine, course)?;

    let ranking = engine.list_selected_for_course(course)?;
    if let Some(top) = ranking.first() {
        let application_id = top.selection.application_id;
        println!("\nPromoting application {application_id} to show the top boundary");
        if let Err(err) = engine.promote(course, application_id).await {
            println!("- Promote rejected: {err}");
        }
    }

    let ranking = engine.list_selected_for_course(course)?;
    if let Some(top) = ranking.first() {
        println!(
            "\nLecturer {lecturer} comments on selection {}",
            top.selection.id
        );
        match engine
            .add_comment(
                course,
                top.selection.id,
                "Strong communicator; schedule for first-year labs.",
                lecturer,
            )
            .await
        {
            Ok(comment) => println!("- Comment {} stored", comment.comment_id),
            Err(err) => println!("- Comment rejected: {err}"),
        }
        for comment in engine.list_comments_for_selection(top.selection.id)? {
            println!("  \"{}\" by user {}", comment.content, comment.author_user_id);
        }

        println!("\nUnselecting application {}", top.selection.application_id);
        let outcome = engine
            .unselect(course, top.selection.application_id)
            .await?;
        println!(
            "- Removed rank {} | {} comments deleted | {} selections re-ranked",
            outcome.removed_rank, outcome.comments_removed, outcome.reranked
        );
    }

    println!("\nFinal ranking");
    print_ranking(engine, course)?;
    Ok(())
}
