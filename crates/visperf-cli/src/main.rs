//! Visperf CLI: visual regression testing from the command line
//!
//! ## Usage
//!
//! ```bash
//! visperf serve --cors                      # HTTP API for the story panel
//! visperf test example-button--primary      # Capture and compare one subject
//! visperf accept card --image card.png      # Promote an image to baseline
//! visperf list                              # Subjects with a baseline
//! ```

use clap::Parser;
use std::process::ExitCode;
use visperf::{BaselineStatus, Subject, TestOrchestrator, TestStatus};
use visperf_cli::{
    build_orchestrator, default_launcher, init_tracing, serve, write_artifacts, AcceptArgs,
    AppConfig, BaselineArgs, Cli, CliError, CliResult, Commands, Reporter, TestArgs,
    Verbosity,
};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let verbosity = Verbosity::from_flags(cli.quiet, cli.verbose);
    init_tracing(verbosity, cli.log_format);

    let mut config = AppConfig::resolve(&cli)?;
    let reporter = Reporter::new(console::Term::stdout().is_term(), verbosity.is_quiet());

    match cli.command {
        Commands::Serve(ref args) => {
            config.apply_serve(args);
            run_serve(config)
        }
        Commands::Test(ref args) => run_test(config, args, reporter),
        Commands::Accept(ref args) => run_accept(config, args, &reporter),
        Commands::Baseline(ref args) => run_baseline(config, args, &reporter),
        Commands::List => run_list(&config, &reporter),
    }
}

fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CliError::server(format!("Failed to create runtime: {e}")))
}

fn orchestrator(config: AppConfig) -> CliResult<TestOrchestrator> {
    build_orchestrator(default_launcher(), config.engine)
}

fn run_serve(config: AppConfig) -> CliResult<()> {
    let server = config.server.clone();
    let rt = runtime()?;
    rt.block_on(async {
        let orchestrator = orchestrator(config)?;
        serve(orchestrator, &server).await
    })
}

fn run_test(config: AppConfig, args: &TestArgs, mut reporter: Reporter) -> CliResult<()> {
    let subject = Subject::new(args.subject.as_str())?;
    let rt = runtime()?;

    reporter.start_spinner(&format!("capturing {subject}"));
    let result = rt.block_on(async {
        let orchestrator = orchestrator(config)?;
        CliResult::Ok(orchestrator.run_test(&subject).await)
    });
    reporter.finish();
    let result = result?;

    reporter.result(&subject, &result, args.format);
    if let Some(ref dir) = args.output {
        for path in write_artifacts(dir, &subject, &result)? {
            reporter.info(&format!("wrote {}", path.display()));
        }
    }

    match result.status {
        TestStatus::Success | TestStatus::New => Ok(()),
        status @ (TestStatus::Failed | TestStatus::Error) => Err(CliError::TestFailed {
            subject: subject.to_string(),
            status,
        }),
    }
}

fn run_accept(config: AppConfig, args: &AcceptArgs, reporter: &Reporter) -> CliResult<()> {
    let subject = Subject::new(args.subject.as_str())?;
    let image = std::fs::read(&args.image).map_err(|e| {
        CliError::invalid_argument(format!("cannot read {}: {e}", args.image.display()))
    })?;

    let rt = runtime()?;
    let result = rt.block_on(async {
        let orchestrator = orchestrator(config)?;
        CliResult::Ok(orchestrator.try_accept(&subject, image).await?)
    })?;
    reporter.info(&format!("{subject}: {}", result.message));
    Ok(())
}

fn run_baseline(config: AppConfig, args: &BaselineArgs, reporter: &Reporter) -> CliResult<()> {
    let subject = Subject::new(args.subject.as_str())?;
    let rt = runtime()?;
    let status = rt.block_on(async {
        let orchestrator = orchestrator(config)?;
        CliResult::Ok(orchestrator.baseline(&subject).await?)
    })?;

    match status {
        BaselineStatus::Exists(png) => {
            reporter.line(&format!("{subject}: baseline_exists ({} bytes)", png.len()));
            if let Some(ref path) = args.output {
                std::fs::write(path, &png)?;
                reporter.info(&format!("wrote {}", path.display()));
            }
        }
        BaselineStatus::Missing => reporter.line(&format!("{subject}: no_baseline")),
    }
    Ok(())
}

fn run_list(config: &AppConfig, reporter: &Reporter) -> CliResult<()> {
    let store = visperf::BaselineStore::open(&config.engine.baselines_dir)?;
    for subject in store.list()? {
        reporter.line(subject.as_str());
    }
    Ok(())
}
