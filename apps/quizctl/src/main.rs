use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quiz_store::{NewQuiz, QuizStore};
use shared::domain::QuizId;

#[derive(Parser, Debug)]
#[command(about = "Manage stored quiz definitions")]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/quiz.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a quiz from a TOML file.
    Import { path: PathBuf },
    List,
    /// Print a stored quiz as JSON, answers included.
    Show { quiz_id: i64 },
    Delete { quiz_id: i64 },
}

fn read_quiz(path: &PathBuf) -> Result<NewQuiz> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("'{}' is not a valid quiz file", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let store = QuizStore::new(&cli.database_url).await?;

    match cli.command {
        Command::Import { path } => {
            let quiz = read_quiz(&path)?;
            let quiz_id = store.create_quiz(&quiz).await?;
            println!(
                "created quiz_id={} questions={}",
                quiz_id.0,
                quiz.questions.len()
            );
        }
        Command::List => {
            for quiz in store.list_quizzes().await? {
                println!("{}\t{}\t{} questions", quiz.quiz_id, quiz.title, quiz.question_count);
            }
        }
        Command::Show { quiz_id } => {
            let quiz = store
                .fetch_quiz(QuizId(quiz_id))
                .await?
                .with_context(|| format!("quiz {quiz_id} does not exist"))?;
            println!("{}", serde_json::to_string_pretty(&quiz)?);
        }
        Command::Delete { quiz_id } => {
            if store.delete_quiz(QuizId(quiz_id)).await? {
                println!("deleted quiz_id={quiz_id}");
            } else {
                anyhow::bail!("quiz {quiz_id} does not exist");
            }
        }
    }

    Ok(())
}
