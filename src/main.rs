//! Headless front end
//!
//! Runs one testing session from the command line and prints the summary as
//! JSON. The GUI shell consumes the same library API; this binary is the
//! wiring, not the engine.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use arbiter::{
    EngineConfig, Runner, SourceFile, SourceRole, TestingMode, ToolchainConfig, TracingSink,
    Workspace,
};

struct Args {
    mode: TestingMode,
    sources: Vec<SourceFile>,
    test_count: usize,
    workspace: String,
}

fn usage() -> ! {
    eprintln!(
        "Usage: arbiter <benchmark|comparison|validation> \
         --generator <file> --candidate <file> \
         [--reference <file>] [--validator <file>] \
         [--tests <n>] [--workspace <dir>]"
    );
    std::process::exit(2);
}

fn parse_args() -> Result<Args> {
    let mut argv = std::env::args().skip(1);

    let mode = match argv.next().as_deref() {
        Some("benchmark") => TestingMode::Benchmark,
        Some("comparison") => TestingMode::Comparison,
        Some("validation") => TestingMode::Validation,
        _ => usage(),
    };

    let mut sources = Vec::new();
    let mut test_count = 10usize;
    let mut workspace = "./workspace".to_string();

    let mut push_source = |role: SourceRole, path: Option<String>| -> Result<()> {
        let path = path.with_context(|| format!("--{} needs a file argument", role))?;
        sources.push(SourceFile::new(role, path)?);
        Ok(())
    };

    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--generator" => push_source(SourceRole::Generator, argv.next())?,
            "--candidate" => push_source(SourceRole::Candidate, argv.next())?,
            "--reference" => push_source(SourceRole::Reference, argv.next())?,
            "--validator" => push_source(SourceRole::Validator, argv.next())?,
            "--tests" => {
                test_count = argv
                    .next()
                    .and_then(|v| v.parse().ok())
                    .context("--tests needs a number")?;
            }
            "--workspace" => {
                workspace = argv.next().context("--workspace needs a directory")?;
            }
            other => bail!("Unknown argument: {}", other),
        }
    }

    Ok(Args {
        mode,
        sources,
        test_count,
        workspace,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("arbiter=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    let args = parse_args()?;

    // Toolchain settings, with built-in defaults when the file is absent
    let toolchains_path =
        std::env::var("LANGUAGES_CONFIG").unwrap_or_else(|_| "./files/languages.toml".into());
    let toolchains = if Path::new(&toolchains_path).exists() {
        let config = ToolchainConfig::load(Path::new(&toolchains_path))?;
        info!("Loaded toolchain config from {}", toolchains_path);
        config
    } else {
        warn!(
            "Toolchain config {} not found, using defaults",
            toolchains_path
        );
        ToolchainConfig::default()
    };

    let config = EngineConfig::from_env();
    info!(
        "Starting {} run: {} tests, time limit {:?}, {} workers",
        args.mode, args.test_count, config.time_limit, config.test_workers
    );

    let runner = Runner::new(
        args.mode,
        config,
        Arc::new(toolchains),
        Workspace::new(&args.workspace),
        Arc::new(TracingSink),
    );

    let summary = runner.run(args.sources, args.test_count).await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);

    if let Some(failure) = &summary.build_failure {
        eprintln!("{}", failure);
        std::process::exit(1);
    }
    std::process::exit(if summary.overall_passed { 0 } else { 1 });
}
