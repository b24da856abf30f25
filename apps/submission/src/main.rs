use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    config::{load_settings, normalize_api_url},
    download_submission, sign_in, sign_out, DraftField, FileSelection, JournalClient,
    SessionContext, SubmissionWorkflow, WorkflowError,
};
use shared::{
    domain::{AuthorField, DeclarationKind, Draft, Requirement},
    protocol::SubmissionStatus,
};
use storage::{Storage, StorageScope};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Prepare and submit a manuscript to the journal")]
struct Cli {
    /// Overrides `api_url` from journal.toml / APP__API_URL.
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    /// Lists the topics a manuscript can be filed under.
    Topics,
    /// Shows the current draft and wizard step.
    Status,
    Set {
        #[arg(value_enum)]
        field: FieldArg,
        value: String,
    },
    Author {
        #[command(subcommand)]
        action: AuthorCommand,
    },
    /// Queues files under a requirement ("Manuscript File", "Cover Letter",
    /// "Ethics Documentation").
    Attach {
        #[arg(long)]
        requirement: Requirement,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Removes every file queued under a requirement.
    Detach {
        #[arg(long)]
        requirement: Requirement,
    },
    /// Checks (or with --unset clears) ethics, conflicts or copyright.
    Declare {
        declaration: DeclarationKind,
        #[arg(long)]
        unset: bool,
    },
    Next,
    Back,
    Submit,
    /// Lists submissions with their status and files.
    Submissions,
    /// Moves a submission to another editorial status.
    SetStatus {
        submission_id: String,
        status: SubmissionStatus,
    },
    /// Downloads files of a submission; several files are bundled into a ZIP.
    Download {
        submission_id: String,
        /// File ids; every file of the submission when omitted.
        #[arg(long, value_delimiter = ',')]
        files: Vec<String>,
        #[arg(long, default_value = ".")]
        output: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum AuthorCommand {
    Add,
    /// Authors are numbered from 1; author 1 is the corresponding author.
    Set {
        number: usize,
        field: AuthorField,
        value: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FieldArg {
    Title,
    Topic,
    Abstract,
    Keywords,
}

impl From<FieldArg> for DraftField {
    fn from(value: FieldArg) -> Self {
        match value {
            FieldArg::Title => DraftField::ManuscriptTitle,
            FieldArg::Topic => DraftField::Topic,
            FieldArg::Abstract => DraftField::Abstract,
            FieldArg::Keywords => DraftField::Keywords,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings()?;
    if let Some(api_url) = cli.api_url {
        settings.api_url = normalize_api_url(&api_url)?;
    }
    if let Some(database_url) = cli.database_url {
        settings.database_url = database_url;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&settings.log_filter))
        .with_writer(std::io::stderr)
        .init();

    debug!(api_url = %settings.api_url, database_url = %settings.database_url, "settings loaded");

    let storage = Storage::new(&settings.database_url)
        .await
        .context("failed to open local storage")?;
    storage.health_check().await?;
    let session_store = storage.session();
    let session = Arc::new(SessionContext::from_store(&session_store).await?);
    let client = Arc::new(JournalClient::new(settings.api_url.clone()));

    match cli.command {
        Command::Login { email, password } => {
            sign_in(&client, &session_store, &session, &email, &password).await?;
            println!("Logged in as {email}.");
        }
        Command::Logout => {
            sign_out(&client, &session_store, &session).await?;
            let cleared = storage.clear_scope(StorageScope::Session).await?;
            debug!(cleared, "session storage wiped");
            println!("Logged out.");
        }
        Command::Download {
            submission_id,
            files,
            output,
        } => {
            download(&client, &session, &submission_id, files, &output).await?;
        }
        command => {
            let workflow =
                SubmissionWorkflow::new(Arc::new(storage.local()), client.clone(), session.clone());
            workflow.restore().await;
            run_wizard(&workflow, &client, command).await?;
        }
    }

    Ok(())
}

async fn run_wizard(
    workflow: &SubmissionWorkflow,
    client: &JournalClient,
    command: Command,
) -> Result<()> {
    if let Command::Topics = command {
        let topics = workflow.load_topics().await;
        if topics.is_empty() {
            println!("No topics available.");
        }
        for topic in topics {
            println!("{topic}");
        }
        return Ok(());
    }

    if !workflow.session().is_authenticated().await {
        bail!("You must login first: run `journal-submit login --email <email> --password <password>`");
    }

    match command {
        Command::Submissions => {
            let token = workflow.session().credential().await;
            let submissions = client.list_submissions(token.as_deref()).await?;
            if submissions.is_empty() {
                println!("No submissions.");
            }
            for submission in submissions {
                println!(
                    "{}  {:<18}  {}",
                    submission.id,
                    submission.status.as_str(),
                    submission.manuscript_title
                );
                for file in submission.files {
                    println!("    {}  {} ({} bytes)", file.id, file.file_name, file.file_size);
                }
            }
        }
        Command::SetStatus {
            submission_id,
            status,
        } => {
            let Some(token) = workflow.session().credential().await else {
                bail!("{}", WorkflowError::MissingCredential);
            };
            client.update_status(&token, &submission_id, status).await?;
            println!("Status updated to {status}.");
        }
        Command::Status => print_status(&workflow.draft().await, workflow.can_submit().await),
        Command::Set { field, value } => {
            workflow.set_field(field.into(), value).await?;
            println!("Saved.");
        }
        Command::Author { action } => match action {
            AuthorCommand::Add => {
                let count = workflow.add_author().await?;
                println!("Author {count} added.");
            }
            AuthorCommand::Set {
                number,
                field,
                value,
            } => {
                let Some(index) = number.checked_sub(1) else {
                    bail!("authors are numbered from 1");
                };
                workflow.update_author(index, field, value).await?;
                println!("Saved.");
            }
        },
        Command::Attach { requirement, paths } => {
            let mut selections = Vec::with_capacity(paths.len());
            for path in paths {
                selections.push(FileSelection::from_path(&path).await?);
            }
            let count = workflow.attach_files(requirement, selections).await?;
            println!("{count} file(s) added");
        }
        Command::Detach { requirement } => {
            let removed = workflow.detach_files(requirement).await?;
            println!("{removed} file(s) removed");
        }
        Command::Declare {
            declaration,
            unset,
        } => {
            workflow.set_declaration(declaration, !unset).await?;
            println!("Saved.");
        }
        Command::Next => {
            let step = workflow.advance().await?;
            println!("Step {step}");
        }
        Command::Back => {
            let step = workflow.retreat().await?;
            println!("Step {step}");
        }
        Command::Submit => match workflow.submit().await {
            Ok(receipt) => {
                println!(
                    "{}",
                    receipt
                        .message
                        .as_deref()
                        .unwrap_or("Submission successful!")
                );
            }
            Err(err @ WorkflowError::NotReady) => {
                bail!("{err}; run `status` to see what is missing")
            }
            Err(err @ WorkflowError::UnreadableAttachments { .. }) => {
                bail!("{err}; re-attach them or run `detach`")
            }
            Err(err) => return Err(err.into()),
        },
        Command::Login { .. }
        | Command::Logout
        | Command::Topics
        | Command::Download { .. } => {}
    }

    Ok(())
}

async fn download(
    client: &JournalClient,
    session: &SessionContext,
    submission_id: &str,
    mut files: Vec<String>,
    output: &Path,
) -> Result<()> {
    let token = session.credential().await;
    let submission = client
        .list_submissions(token.as_deref())
        .await?
        .into_iter()
        .find(|s| s.id == submission_id);
    if files.is_empty() {
        let Some(submission) = &submission else {
            bail!("submission {submission_id} not found");
        };
        files = submission.files.iter().map(|f| f.id.clone()).collect();
    }
    let title = submission.as_ref().map(|s| s.manuscript_title.as_str());

    let report = download_submission(client, submission_id, &files, title, output).await?;
    println!(
        "Saved {} file(s) to {}",
        report.files_written,
        report.path.display()
    );
    if !report.skipped.is_empty() {
        println!("Skipped: {}", report.skipped.join(", "));
    }
    Ok(())
}

fn print_status(draft: &Draft, can_submit: bool) {
    println!("Step {}", draft.current_step);
    println!("Title:    {}", draft.manuscript_title);
    println!("Topic:    {}", draft.topic);
    println!("Keywords: {}", draft.keyword_list().join(", "));
    println!("Abstract: {} characters", draft.abstract_text.chars().count());

    println!("Authors:");
    for (index, author) in draft.authors.iter().enumerate() {
        let marker = if index == 0 { " (corresponding)" } else { "" };
        println!(
            "  {}. {} <{}>, {}{marker}",
            index + 1,
            author.full_name,
            author.email,
            author.affiliation
        );
    }

    println!("Files:");
    for requirement in Requirement::ALL {
        let required = if requirement.is_required() {
            "required"
        } else {
            "optional"
        };
        println!(
            "  {requirement} ({required}): {}",
            draft.file_status(requirement)
        );
        println!("    {}", requirement.description());
        for file in draft.files.iter().filter(|f| f.requirement == requirement) {
            println!(
                "    - {} ({}, {} bytes)",
                file.file_name, file.mime_type, file.file_size
            );
        }
    }

    println!("Declarations:");
    for kind in DeclarationKind::ALL {
        let mark = if draft.declaration(kind) { "x" } else { " " };
        println!("  [{mark}] {}", kind.describe());
    }

    println!(
        "Ready to submit: {}",
        if can_submit { "yes" } else { "no" }
    );
}
