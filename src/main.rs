//! peer-harvester - Main entry point
//!
//! Resolves targets into torrents and harvests the peers of their swarms.

use std::fs::OpenOptions;
use std::future;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use peer_harvester::target::LoadedTargets;
use peer_harvester::{
    CliArgs, Command, Config, Pipeline, ReportDisplay, RunReport, SearchApi, SearchClient, Target, TargetLoader,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

/// Exit code for process-fatal errors
const EXIT_FATAL: u8 = 2;

/// Set up panic handler for unexpected errors
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();
        match panic_info.location() {
            Some(location) => error!(
                "PANIC occurred at {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            ),
            None => error!("PANIC occurred at an unknown location"),
        }
        let payload = panic_info.payload();
        if let Some(s) = payload.downcast_ref::<&str>() {
            error!("Panic message: {}", s);
        } else if let Some(s) = payload.downcast_ref::<String>() {
            error!("Panic message: {}", s);
        } else {
            error!("Panic message: unknown");
        }
        error!("Backtrace:\n{:?}", backtrace);
    }));
}

#[tokio::main]
async fn main() -> ExitCode {
    setup_panic_handler();

    let args = CliArgs::parse_args();
    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(args: CliArgs) -> Result<ExitCode> {
    check_platform()?;

    let mut config = Config::load(&args.config).context("Failed to load configuration")?;
    config.apply_args(&args);
    init_logging(&args, &config)?;
    debug!("CLI arguments: {:?}", args);
    config.validate().context("Invalid configuration")?;

    if args.save_config {
        config.save(&args.config).context("Failed to save configuration")?;
    }

    let display = ReportDisplay::new(args.quiet);
    match &args.command {
        Some(command) => run_command(command, &config, &display).await,
        None => run_pipeline(&args, &config, &display).await,
    }
}

/// Only hosts with a native tokio socket backend are supported
fn check_platform() -> Result<()> {
    if cfg!(any(unix, windows)) {
        Ok(())
    } else {
        Err(anyhow::anyhow!("{} is not a supported platform", std::env::consts::OS))
    }
}

/// Initialize logging based on verbosity settings and the configured log file
fn init_logging(args: &CliArgs, config: &Config) -> Result<()> {
    let level = args.log_level(&config.log_level);

    let writer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(std::io::stderr.and(Mutex::new(file)))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(config.log_file.is_none())
        .with_writer(writer);

    if args.verbose {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }

    debug!("Logging initialized with level {:?}", level);
    Ok(())
}

async fn run_command(command: &Command, config: &Config, display: &ReportDisplay) -> Result<ExitCode> {
    let api = || -> Result<SearchClient> {
        SearchClient::new(
            &config.api_url,
            &config.user_agent,
            config.request_timeout(),
            config.http_proxy()?,
        )
    };

    match command {
        Command::Describe { hash } => {
            let description = api()?.description(hash).await?;
            display.print_message(&description)?;
        }
        Command::Top { category, subcategory } => {
            let torrents = api()?.top(category, subcategory.as_deref()).await?;
            display.print_torrents(&format!("Top torrents in {}:", category), &torrents)?;
        }
        Command::Count => {
            let count = api()?.count_total().await?;
            display.print_message(&format!("{} torrents", count))?;
        }
        Command::NewTarget {
            name,
            query,
            hash,
            category,
            subcategory,
        } => {
            let target = match (query, hash) {
                (_, Some(hash)) => Target::from_hash(name.as_str(), hash.as_str()),
                (Some(query), None) => Target::from_query(name.as_str(), query.as_str()),
                (None, None) => return Err(anyhow::anyhow!("new-target needs --query or --hash")),
            }
            .with_category(category.as_deref(), subcategory.as_deref());

            let path = TargetLoader::new(config.targets_dir.clone()).save(&target).await?;
            display.print_message(&format!("Wrote {}", path.display()))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn collect_targets(args: &CliArgs, config: &Config) -> Result<LoadedTargets> {
    let loader = TargetLoader::new(config.targets_dir.clone());

    let mut loaded = if args.all_targets {
        loader.load_all().await?
    } else {
        LoadedTargets::default()
    };
    loaded.extend(loader.load_many(&args.targets).await);
    loaded.targets.extend(args.queries.iter().map(|q| Target::ad_hoc_query(q)));
    loaded.targets.extend(args.hashes.iter().map(|h| Target::ad_hoc_hash(h)));
    Ok(loaded)
}

async fn run_pipeline(args: &CliArgs, config: &Config, display: &ReportDisplay) -> Result<ExitCode> {
    if !args.has_targets() {
        return Err(anyhow::anyhow!(
            "you must provide at least one --target, --all-targets, --query or --hash"
        ));
    }

    let LoadedTargets { targets, rejected } = collect_targets(args, config).await?;
    if targets.is_empty() {
        if rejected.is_empty() {
            return Err(anyhow::anyhow!("no targets found in {}", config.targets_dir.display()));
        }
        let report = RunReport {
            rejected,
            ..RunReport::default()
        };
        display.print_summary(&report)?;
        return Ok(ExitCode::FAILURE);
    }

    let pipeline = Pipeline::from_config(config, args.resolve_only)?;
    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupted"),
            Err(e) => {
                warn!("Cannot listen for Ctrl-C: {}", e);
                future::pending::<()>().await;
            }
        }
    };

    let mut report = pipeline.run_until(targets, shutdown).await;
    report.rejected = rejected;
    display.print_summary(&report)?;

    if report.has_failures() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
