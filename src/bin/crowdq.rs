//! crowdq CLI: operator interface to the job engine.

use crowdq::config::Config;
use crowdq::db::{Db, PgmqQueue};
use crowdq::engine::{Engine, TaskWorker, WorkerConfig};
use crowdq::job_type::JobTypeRegistry;
use crowdq::marketplace;
use crowdq::model::{AssignmentId, JOB_MACHINE, JobId, JobState, NewJob};
use crowdq::queue::{Task, TaskQueue};
use crowdq::telemetry::{TelemetryConfig, init_telemetry};
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Seconds a received task stays hidden from other workers.
const VISIBILITY_TIMEOUT: i32 = 60;

#[derive(Parser)]
#[command(name = "crowdq", about = "Crowdsourcing job lifecycle engine")]
struct Cli {
    /// Directory containing job type TOML configs
    #[arg(long, global = true, default_value = "job-types")]
    job_types: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run task workers
    Serve {
        /// Number of concurrent task workers
        #[arg(long, default_value_t = 4)]
        workers: usize,
    },
    /// Job operations
    Job {
        #[command(subcommand)]
        action: JobAction,
    },
    /// Assignment operations
    Assignment {
        #[command(subcommand)]
        action: AssignmentAction,
    },
}

#[derive(Subcommand)]
enum JobAction {
    /// Create a job and launch it
    Create {
        /// Job type (selects defaults and hooks)
        job_type: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// JSON question payload
        #[arg(long)]
        question: String,
        /// Assignment slots to request
        #[arg(long)]
        target: Option<u32>,
        /// Approvals required before the job may finish
        #[arg(long)]
        required: Option<u32>,
        #[arg(long)]
        reward_cents: Option<u32>,
        #[arg(long = "keyword")]
        keywords: Vec<String>,
    },
    /// List jobs
    List {
        /// Filter by state
        #[arg(long)]
        state: Option<String>,
        /// Maximum jobs to show
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show a job and its assignments
    Show {
        /// Job ID (full UUID or prefix)
        id: String,
    },
    /// Schedule a marketplace sync and progress check
    Check {
        /// Job ID (full UUID or prefix)
        id: String,
    },
}

#[derive(Subcommand)]
enum AssignmentAction {
    /// Schedule approval of a submitted assignment
    Approve {
        /// Assignment ID
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Serve { workers } => cmd_serve(config, &cli.job_types, workers).await,
        Command::Job { action } => {
            let engine = build_engine(&config, &cli.job_types).await?;
            match action {
                JobAction::Create {
                    job_type,
                    title,
                    description,
                    question,
                    target,
                    required,
                    reward_cents,
                    keywords,
                } => {
                    let mut new = NewJob::new(job_type, serde_json::from_str(&question)?);
                    if let Some(title) = title {
                        new = new.title(title);
                    }
                    if let Some(description) = description {
                        new = new.description(description);
                    }
                    if let Some(n) = target {
                        new = new.target_assignments(n);
                    }
                    if let Some(n) = required {
                        new = new.required_approved(n);
                    }
                    if let Some(cents) = reward_cents {
                        new = new.reward_cents(cents);
                    }
                    if !keywords.is_empty() {
                        new = new.keywords(keywords);
                    }
                    let job = engine.create_job(new).await?;
                    println!("Created: {} (state: {})", job.id, job.state);
                    Ok(())
                }
                JobAction::List { state, limit } => cmd_job_list(&engine, state, limit).await,
                JobAction::Show { id } => cmd_job_show(&engine, &id).await,
                JobAction::Check { id } => {
                    let job_id = resolve_job_id(&engine, &id).await?;
                    engine.queue().enqueue(&Task::SyncJobTask { job_id }).await?;
                    println!("Scheduled sync for {job_id}");
                    Ok(())
                }
            }
        }
        Command::Assignment { action } => {
            let engine = build_engine(&config, &cli.job_types).await?;
            match action {
                AssignmentAction::Approve { id } => {
                    let assignment_id = AssignmentId(uuid::Uuid::parse_str(&id)?);
                    let assignment = engine.get_assignment(assignment_id).await?;
                    engine
                        .queue()
                        .enqueue(&Task::ApproveTask { assignment_id })
                        .await?;
                    println!(
                        "Scheduled approval of {} (state: {})",
                        assignment.id.0, assignment.state
                    );
                    Ok(())
                }
            }
        }
    }
}

async fn build_engine(config: &Config, job_types: &Path) -> anyhow::Result<Arc<Engine>> {
    let db = Arc::new(Db::connect(config.database_url.expose_secret()).await?);
    db.migrate().await?;
    db.create_queue(&config.queue_name).await?;

    let registry = if job_types.is_dir() {
        JobTypeRegistry::load_from_dir(job_types)?
    } else {
        JobTypeRegistry::empty()
    };

    let queue = PgmqQueue::new(Arc::clone(&db), config.queue_name.clone(), VISIBILITY_TIMEOUT);
    Ok(Arc::new(Engine::new(
        db,
        Arc::new(queue),
        marketplace::from_config(config)?,
        Arc::new(registry),
    )))
}

async fn cmd_serve(config: Config, job_types: &Path, workers: usize) -> anyhow::Result<()> {
    let guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "crowdq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let engine = build_engine(&config, job_types).await?;
    tracing::info!(
        workers,
        queue = %config.queue_name,
        job_types = ?engine.job_types().names(),
        otlp = guard.is_exporting(),
        "starting task workers"
    );

    let workers: Vec<Arc<TaskWorker>> = (0..workers.max(1))
        .map(|_| {
            Arc::new(TaskWorker::new(
                Arc::clone(&engine),
                WorkerConfig::default(),
            ))
        })
        .collect();

    let stop = workers.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        for worker in &stop {
            worker.shutdown();
        }
    });

    let handles: Vec<_> = workers
        .into_iter()
        .map(|worker| tokio::spawn(async move { worker.run().await }))
        .collect();
    for handle in handles {
        handle.await??;
    }
    Ok(())
}

async fn cmd_job_list(engine: &Engine, state: Option<String>, limit: i64) -> anyhow::Result<()> {
    let state_filter: Option<JobState> = match state {
        Some(s) => Some(
            s.parse()
                .map_err(|_| anyhow::anyhow!("invalid state: {s}"))?,
        ),
        None => None,
    };

    let jobs = engine.list_jobs(state_filter, limit).await?;

    if jobs.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }

    println!(
        "{:<8}  {:<14}  {:<10}  {:<7}  {:<30}  CREATED",
        "ID", "TYPE", "STATE", "SLOTS", "TITLE"
    );
    println!("{}", "-".repeat(100));

    for job in &jobs {
        let short_id = &job.id.to_string()[..8];
        let title: String = job.title.chars().take(30).collect();
        let slots = format!(
            "{}/{}",
            job.required_approved_count, job.target_assignment_count
        );
        println!(
            "{:<8}  {:<14}  {:<10}  {:<7}  {:<30}  {}",
            short_id,
            job.job_type,
            job.state,
            slots,
            title,
            job.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!("\n{} job(s)", jobs.len());
    Ok(())
}

async fn resolve_job_id(engine: &Engine, id_str: &str) -> anyhow::Result<JobId> {
    if id_str.len() >= 36 {
        return Ok(JobId(uuid::Uuid::parse_str(id_str)?));
    }
    // Prefix search over recent jobs
    let jobs = engine.list_jobs(None, 100).await?;
    let matches: Vec<_> = jobs
        .iter()
        .filter(|job| job.id.to_string().starts_with(id_str))
        .collect();
    match matches.as_slice() {
        [] => anyhow::bail!("no job matching prefix '{id_str}'"),
        [job] => Ok(job.id),
        many => anyhow::bail!(
            "{} jobs match prefix '{id_str}', be more specific",
            many.len()
        ),
    }
}

async fn cmd_job_show(engine: &Engine, id_str: &str) -> anyhow::Result<()> {
    let id = resolve_job_id(engine, id_str).await?;
    let job = engine.get_job(id).await?;
    let counts = engine.assignment_counts(id).await?;

    println!("ID:          {}", job.id);
    println!("Type:        {}", job.job_type);
    println!("State:       {}", job.state);
    println!("Title:       {}", job.title);
    println!("Remote Task: {}", job.remote_task_id.as_deref().unwrap_or("-"));
    println!("Remote URL:  {}", job.remote_url.as_deref().unwrap_or("-"));
    println!("Target:      {}", job.target_assignment_count);
    println!("Required:    {}", job.required_approved_count);
    println!("Reward:      {} cents", job.reward_cents);
    println!(
        "Question:    {}",
        serde_json::to_string_pretty(&job.question)?
    );
    let events: Vec<String> = JOB_MACHINE
        .events_from(job.state)
        .iter()
        .map(ToString::to_string)
        .collect();
    println!(
        "Events:      {}",
        if events.is_empty() {
            "-".to_string()
        } else {
            events.join(", ")
        }
    );
    println!("Created:     {}", job.created_at);
    println!("Updated:     {}", job.updated_at);
    if let Some(finished) = job.finished_at {
        println!("Finished:    {finished}");
    }

    println!("---");
    println!(
        "Assignments: {} submitted, {} approved, {} rejected, {} error",
        counts.submitted, counts.approved, counts.rejected, counts.errored
    );
    for assignment in engine.list_assignments(id).await? {
        println!(
            "  {}  {:<10}  {:<12}  worker {}",
            assignment.id.0, assignment.state, assignment.remote_assignment_id, assignment.worker_id
        );
    }

    Ok(())
}
