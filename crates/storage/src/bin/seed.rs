use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Parser;
use course_core::model::{
    ChapterDef, ChapterId, ChapterType, CourseId, CourseStructure, ProgressRecord, SectionDef,
    SectionId, UserId,
};
use storage::repository::Storage;

/// Load a course structure into a SQLite database for local runs.
#[derive(Debug, Parser)]
#[command(name = "seed")]
struct Args {
    /// SQLite URL.
    #[arg(long = "db", env = "LEARN_DB_URL", default_value = "sqlite:dev.sqlite3?mode=rwc")]
    db_url: String,

    /// JSON file holding a course structure; a demo course is used when omitted.
    #[arg(long, env = "LEARN_COURSE_FILE")]
    course_file: Option<PathBuf>,

    /// Also create a progress record for this user in the seeded course.
    #[arg(long)]
    enroll: Option<String>,

    /// Fixed current time (RFC3339) for deterministic seeding.
    #[arg(long)]
    now: Option<DateTime<Utc>>,
}

fn demo_course() -> Result<CourseStructure, Box<dyn std::error::Error>> {
    let chapter = |id: &str, title: &str, ty: ChapterType| -> Result<ChapterDef, Box<dyn std::error::Error>> {
        Ok(ChapterDef::new(ChapterId::parse(id)?, title, ty))
    };
    let course = CourseStructure::new(
        CourseId::parse("rust-fundamentals")?,
        vec![
            SectionDef::new(
                SectionId::parse("getting-started")?,
                "Getting Started",
                vec![
                    chapter("welcome", "Welcome", ChapterType::Video)?,
                    chapter("install", "Installing the toolchain", ChapterType::Text)?,
                    chapter("hello-world", "Hello, world", ChapterType::Video)?,
                ],
            ),
            SectionDef::new(
                SectionId::parse("ownership")?,
                "Ownership",
                vec![
                    chapter("moves", "Moves and copies", ChapterType::Text)?,
                    chapter("ownership-quiz", "Check your understanding", ChapterType::Quiz)?,
                ],
            ),
        ],
    )?;
    Ok(course)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let course = match &args.course_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str::<CourseStructure>(&raw)?
        }
        None => demo_course()?,
    };

    let storage = Storage::sqlite(&args.db_url).await?;
    storage.courses.upsert_course_structure(&course).await?;

    if let Some(user) = &args.enroll {
        let now = args.now.unwrap_or_else(Utc::now);
        let record = ProgressRecord::seeded(UserId::parse(user.as_str())?, &course, now);
        storage.progress.insert_progress(&record).await?;
    }

    println!(
        "Seeded course {} ({} sections, {} chapters) into {}",
        course.course_id(),
        course.sections().len(),
        course.total_chapters(),
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
