// ABOUTME: CLI entry point for the app builder client
// ABOUTME: Parses commands, sets up logging and drives submissions, polls and downloads

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use app_builder_client::remote::models::parse_field;
use app_builder_client::{
    render_status_line, ArchiveInfo, BuilderClient, ClientConfig, Framework, JobForm, JobState,
    PollHandle, PollOutcome, PollPolicy, Session, TerminalView,
};

#[derive(Parser)]
#[command(name = "app-builder")]
#[command(about = "Submit app builds to an AI App Builder service and follow them to completion", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Service base URL (overrides config and APP_BUILDER_URL)
    #[arg(long, global = true)]
    url: Option<String>,

    /// More log output (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue a build and follow it until it finishes
    Build {
        #[command(flatten)]
        form: FormArgs,
        /// Download the archive here once the build succeeds
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        poll: PollArgs,
    },
    /// Print the current status of a job once
    Status { job_id: String },
    /// Follow an existing job until it finishes
    Watch {
        job_id: String,
        #[command(flatten)]
        poll: PollArgs,
    },
    /// Download a finished job's archive
    Download {
        job_id: String,
        /// Defaults to <job_id>.zip
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Build synchronously through /generate and save the archive
    Generate {
        #[command(flatten)]
        form: FormArgs,
        /// Defaults to the name the server suggests
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct FormArgs {
    /// What the generated app should do
    #[arg(short, long)]
    prompt: String,
    /// streamlit, gradio or python
    #[arg(short, long, default_value = "streamlit")]
    framework: Framework,
    /// Extra form field, key=value (repeatable)
    #[arg(long = "field", value_name = "KEY=VALUE")]
    fields: Vec<String>,
}

impl FormArgs {
    fn to_form(&self) -> Result<JobForm> {
        let mut form = JobForm::new(self.prompt.clone(), self.framework);
        for raw in &self.fields {
            let (key, value) = parse_field(raw)?;
            form = form.field(key, value);
        }
        form.validate()?;
        Ok(form)
    }
}

#[derive(Args)]
struct PollArgs {
    /// Milliseconds between status checks
    #[arg(long)]
    interval_ms: Option<u64>,
    /// Grow the delay by this factor after every check
    #[arg(long)]
    backoff: Option<f64>,
    /// Randomize each delay by up to this fraction
    #[arg(long)]
    jitter: Option<f64>,
    /// Stop after this many status checks
    #[arg(long)]
    max_attempts: Option<u32>,
    /// Stop after this many seconds (0 waits forever)
    #[arg(long)]
    timeout_secs: Option<u64>,
}

impl PollArgs {
    fn apply(&self, policy: &mut PollPolicy) -> Result<()> {
        if let Some(ms) = self.interval_ms {
            policy.interval = Duration::from_millis(ms);
            policy.max_interval = policy.max_interval.max(policy.interval);
        }
        if let Some(m) = self.backoff {
            policy.multiplier = m;
        }
        if let Some(j) = self.jitter {
            policy.jitter = j;
        }
        if self.max_attempts.is_some() {
            policy.max_attempts = self.max_attempts;
        }
        if let Some(secs) = self.timeout_secs {
            policy.max_duration = (secs > 0).then(|| Duration::from_secs(secs));
        }
        policy.validate()?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.url {
        config.base_url = url;
        config.validate()?;
    }
    tracing::debug!(base_url = %config.base_url, "using job service");

    let client = BuilderClient::new(&config)?;

    match cli.command {
        Commands::Build { form, output, poll } => {
            let form = form.to_form()?;
            let mut policy = config.poll.clone();
            poll.apply(&mut policy)?;

            let view = Arc::new(TerminalView::new());
            let mut session = Session::new(client.clone(), policy, view.clone());
            let job_id = match session.submit(&form).await {
                Ok(id) => id,
                Err(_) => {
                    // Already alerted, details logged.
                    view.finish();
                    return Ok(ExitCode::FAILURE);
                }
            };
            eprintln!("Queued job {}", job_id);

            let handle = session
                .take_active()
                .context("Submission did not start a poll")?;
            let outcome = follow(handle, &view).await?;
            finish_build(&client, &job_id, outcome, output.as_deref()).await
        }

        Commands::Status { job_id } => {
            let snapshot = client.get_job_status(&job_id).await?;
            println!("{}", render_status_line(&snapshot));
            if snapshot.state() == JobState::Succeeded {
                println!("{}", client.download_url(&job_id));
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Watch { job_id, poll } => {
            let mut policy = config.poll.clone();
            poll.apply(&mut policy)?;

            let view = Arc::new(TerminalView::new());
            let mut session = Session::new(client.clone(), policy, view.clone());
            session.watch(&job_id);
            let handle = session
                .take_active()
                .context("Watch did not start a poll")?;
            let outcome = follow(handle, &view).await?;
            finish_build(&client, &job_id, outcome, None).await
        }

        Commands::Download { job_id, output } => {
            let dest = output.unwrap_or_else(|| PathBuf::from(format!("{}.zip", job_id)));
            let info = client.download_archive(&job_id, &dest).await?;
            print_archive(&info);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Generate { form, output } => {
            let form = form.to_form()?;
            let spinner = ProgressBar::new_spinner();
            spinner.set_message("Generating…");
            spinner.enable_steady_tick(Duration::from_millis(120));

            let result = client.generate(&form, output.as_deref(), Path::new(".")).await;
            spinner.finish_and_clear();

            let info = result?;
            print_archive(&info);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Waits for the poll loop, cancelling it on Ctrl-C.
async fn follow(mut handle: PollHandle, view: &TerminalView) -> Result<PollOutcome> {
    let interrupted = tokio::select! {
        outcome = handle.wait() => Some(outcome?),
        _ = tokio::signal::ctrl_c() => None,
    };

    let outcome = match interrupted {
        Some(outcome) => outcome,
        None => {
            handle.cancel();
            handle.wait().await?
        }
    };
    view.finish();
    Ok(outcome)
}

async fn finish_build(
    client: &BuilderClient,
    job_id: &str,
    outcome: PollOutcome,
    output: Option<&Path>,
) -> Result<ExitCode> {
    match outcome {
        PollOutcome::Succeeded { download_url } => {
            println!("{}", download_url);
            if let Some(dest) = output {
                let info = client.download_archive(job_id, dest).await?;
                print_archive(&info);
            }
            Ok(ExitCode::SUCCESS)
        }
        PollOutcome::Cancelled => {
            eprintln!("Stopped following job {}; it may still be running", job_id);
            Ok(ExitCode::FAILURE)
        }
        // The view has already shown the failure.
        _ => Ok(ExitCode::FAILURE),
    }
}

fn print_archive(info: &ArchiveInfo) {
    println!(
        "{} ({} bytes, sha256 {})",
        info.path.display(),
        info.bytes,
        info.sha256
    );
}
