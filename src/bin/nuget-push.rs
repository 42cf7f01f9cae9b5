//! nuget-push CLI
//!
//! Pushes the packages a project has packed when they are newer than the feed

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use nuget_push::core::logging::{build_dispatch, console_dispatch};
use nuget_push::{
    ConfigLoadOptions, ConfigLoader, CsprojReader, GitBranchResolver, GroupOutcome,
    NoRepositoryPolicy, NuGetFeed, PackagePublisher, PublishError, PublishOptions, PublishReport,
    PushConfig, PushSettings,
};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::instrument::WithSubscriber;
use tracing::{error, info};

/// Push newer NuGet packages to a feed
#[derive(Parser)]
#[command(name = "nuget-push")]
#[command(version)]
#[command(about = "Push newer NuGet packages to a feed", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Push packages that are newer than the feed, then delete them
    Push(PushArgs),

    /// Show what would be pushed without pushing or deleting anything
    Check(PushArgs),
}

#[derive(Args)]
struct PushArgs {
    /// Project directory or .csproj file (defaults to current directory)
    #[arg(value_name = "PROJECT_PATH")]
    project_path: Option<PathBuf>,

    /// Feed API key
    #[arg(long)]
    api_key: Option<String>,

    /// NuGet v3 service index URL
    #[arg(long)]
    feed_url: Option<String>,

    /// Service index URL for symbol packages
    #[arg(long)]
    symbol_feed_url: Option<String>,

    /// Directory for the monthly log file
    #[arg(long)]
    log_path: Option<PathBuf>,

    /// Only push from this git branch
    #[arg(long)]
    branch: Option<String>,

    /// What to do when --branch is set but no git repository is found (allow|block)
    #[arg(long = "no-repository", value_name = "POLICY", value_parser = parse_policy)]
    no_repository: Option<NoRepositoryPolicy>,

    /// Build configuration used for the default output path
    #[arg(short, long, default_value = "Debug")]
    configuration: String,

    /// Give up on feed requests after this many seconds in total
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl PushArgs {
    fn to_config(&self) -> PushConfig {
        PushConfig {
            api_key: self.api_key.clone(),
            feed_url: self.feed_url.clone(),
            symbol_feed_url: self.symbol_feed_url.clone(),
            log_path: self.log_path.clone(),
            push_from_branch: self.branch.clone(),
            no_repository_policy: self.no_repository,
            timeout_seconds: None,
        }
    }
}

fn parse_policy(value: &str) -> Result<NoRepositoryPolicy, String> {
    NoRepositoryPolicy::parse(value)
        .ok_or_else(|| format!("expected 'allow' or 'block', got '{}'", value))
}

#[tokio::main]
async fn main() {
    let result = run().await;

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("\n❌ Error");
            eprintln!("{:#}", e);
            process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Push(args) => push_command(args, false).await,
        Commands::Check(args) => push_command(args, true).await,
    }
}

async fn push_command(args: PushArgs, dry_run: bool) -> Result<i32> {
    let project_path = args
        .project_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));

    let options = ConfigLoadOptions {
        project_path: project_path.clone(),
        cli_args: Some(args.to_config()),
        env: std::env::vars().collect(),
        require_api_key: !dry_run,
    };

    let settings = match ConfigLoader::load(options).await {
        Ok(settings) => settings,
        Err(e) if e.is_configuration_error() => {
            print_error(&e);
            return Ok(1);
        }
        Err(e) => return Err(e.into()),
    };

    let dispatch = build_dispatch(&settings.log_path, args.verbose).unwrap_or_else(|e| {
        eprintln!("⚠️  File logging disabled: {}", e);
        console_dispatch(args.verbose)
    });

    let deadline = args
        .timeout
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    let run = execute(settings, project_path, args.configuration, dry_run, deadline)
        .with_subscriber(dispatch);

    tokio::select! {
        result = run => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n⚠️  Interrupted, no further packages pushed");
            Ok(1)
        }
    }
}

async fn execute(
    settings: PushSettings,
    project_path: PathBuf,
    configuration: String,
    dry_run: bool,
    deadline: Option<Instant>,
) -> Result<i32> {
    if dry_run {
        println!("\n🔍 nuget-push check\n");
    } else {
        println!("\n📦 nuget-push\n");
    }

    if let Some(file) = &settings.config_file {
        info!("Using configuration from {}", file.display());
    }
    info!("Feed: {}", settings.feed_url);

    let feed = NuGetFeed::from_settings(&settings)?;
    let publisher = PackagePublisher::new(
        Arc::new(CsprojReader::new(configuration)),
        Arc::new(feed),
        Arc::new(GitBranchResolver::new()),
    );

    let options = PublishOptions {
        required_branch: settings.required_branch().map(str::to_string),
        no_repository_policy: settings.no_repository_policy,
        dry_run,
        deadline,
    };

    match publisher.publish(&project_path, &options).await {
        Ok(report) => {
            print_report(&report);
            Ok(if report.success() { 0 } else { 1 })
        }
        Err(e) => {
            error!("{}", e);
            print_error(&e);
            Ok(1)
        }
    }
}

fn print_error(error: &PublishError) {
    eprintln!("\n❌ {}", error);
    for action in error.suggested_actions() {
        eprintln!("  💡 {}", action);
    }
}

fn print_report(report: &PublishReport) {
    println!();
    for group in &report.groups {
        let remote = group
            .remote_version
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "?".to_string());

        match &group.outcome {
            GroupOutcome::Published { symbols_pushed } => println!(
                "  ✅ {} {} pushed{}",
                group.package_id,
                group.version,
                if *symbols_pushed { " with symbols" } else { "" }
            ),
            GroupOutcome::WouldPublish => println!(
                "  📤 {} {} would be pushed (feed has {})",
                group.package_id, group.version, remote
            ),
            GroupOutcome::Skipped(reason) => println!(
                "  ⏭️  {} {} skipped: {} (feed has {})",
                group.package_id, group.version, reason, remote
            ),
            GroupOutcome::Failed(message) => {
                println!("  ❌ {} {}: {}", group.package_id, group.version, message)
            }
        }
    }

    if report.success() {
        println!(
            "\n✅ {}: {} package(s) pushed in {}ms",
            report.package_id,
            report.published_count(),
            report.duration_ms
        );
    } else {
        println!("\n❌ {}: completed with errors", report.package_id);
    }
}
