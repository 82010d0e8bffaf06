use clap::{value_parser, Arg, ArgAction, ArgMatches, Command as ClapCommand};
use console::{style, Term};
use eyre::{OptionExt, WrapErr};
use futures::future::join_all;
use itertools::Itertools;
use spectest_core::{
    format, get_config, normalize, validate, Engine, ListReporter, MemoryStore, Reporter,
    Service, Store, ValidatedSpec,
};
use std::{
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use tracing::*;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Build the CLI with clap's builder pattern
fn build_cli() -> ClapCommand {
    let files = Arg::new("files")
        .help("Specification files in JSON, YAML or XML")
        .required(true)
        .num_args(1..)
        .value_parser(value_parser!(PathBuf));

    ClapCommand::new("spectest")
        .about("spectest CLI validates, normalizes and runs declarative HTTP test specifications")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg(Arg::new("log-level")
            .long("log-level")
            .help("Log level filter used when RUST_LOG is not set")
            .global(true)
            .default_value("warn"))
        .arg(Arg::new("color")
            .long("color")
            .help("Produce color output. Default is \"auto\" [env: SPECTEST_COLOR]")
            .global(true)
            .value_parser(["auto", "always", "never"]))
        .subcommand(
            ClapCommand::new("validate")
                .about("Check that specifications are well-formed without sending any request")
                .arg(files.clone())
        )
        .subcommand(
            ClapCommand::new("normalize")
                .about("Print the canonical tree of a specification as JSON")
                .arg(Arg::new("file")
                    .help("Specification file in JSON, YAML or XML")
                    .required(true)
                    .value_parser(value_parser!(PathBuf)))
        )
        .subcommand(
            ClapCommand::new("run")
                .about("Send the requests and check the responses")
                .arg(files)
                .arg(Arg::new("show-log")
                    .long("show-log")
                    .help("Print the result log of every run")
                    .action(ArgAction::SetTrue))
        )
}

/// spectest CLI.
#[derive(Default)]
pub struct App;

impl App {
    pub fn new() -> App {
        App
    }

    /// Parse command-line args and run the sub command.
    pub async fn run(self) -> eyre::Result<()> {
        let matches = build_cli().get_matches();
        color_eyre::install()?;

        let log_level = matches
            .get_one::<String>("log-level")
            .map(String::as_str)
            .unwrap_or("warn");
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();

        let color_command = matches
            .get_one::<String>("color")
            .and_then(|s| Color::from_str(s).ok());
        let color_env = std::env::var("SPECTEST_COLOR");
        let color = match (color_command, color_env) {
            (color @ Some(_), _) => color,
            (None, Ok(color)) => Color::from_str(&color).ok(),
            _ => None,
        };
        match color {
            Some(Color::Always) => {
                console::set_colors_enabled(true);
                console::set_colors_enabled_stderr(true);
            }
            Some(Color::Never) => {
                console::set_colors_enabled(false);
                console::set_colors_enabled_stderr(false);
            }
            _ => {}
        }

        match matches.subcommand() {
            Some(("validate", validate_matches)) => {
                validate_files(&files(validate_matches)).await
            }
            Some(("normalize", normalize_matches)) => {
                let path = normalize_matches
                    .get_one::<PathBuf>("file")
                    .ok_or_eyre("specification file is required")?;
                normalize_file(path).await
            }
            Some(("run", run_matches)) => {
                run_files(&files(run_matches), run_matches.get_flag("show-log")).await
            }
            _ => unreachable!("Subcommand required is set to true"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Color {
    #[default]
    Auto,
    Always,
    Never,
}

fn files(matches: &ArgMatches) -> Vec<PathBuf> {
    matches
        .get_many::<PathBuf>("files")
        .map(|vals| vals.cloned().collect())
        .unwrap_or_default()
}

async fn read_spec(path: &Path) -> eyre::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .wrap_err_with(|| format!("failed to read {}", path.display()))
}

/// Specifications are registered under their file stem.
fn spec_name(path: &Path) -> eyre::Result<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_eyre(format!("cannot derive a name from {}", path.display()))
}

fn check_spec(raw: &str) -> spectest_core::Result<ValidatedSpec> {
    let format = format::resolve(raw)?;
    validate::validate(normalize::normalize(raw, format)?)
}

async fn validate_files(files: &[PathBuf]) -> eyre::Result<()> {
    let term = Term::stdout();
    let mut invalid = 0;
    for path in files {
        let raw = read_spec(path).await?;
        match check_spec(&raw) {
            Ok(validated) => {
                let status = style("✓").green();
                term.write_line(&format!(
                    "{status} {} {} {}",
                    path.display(),
                    validated.method,
                    validated.url
                ))?;
            }
            Err(e) => {
                invalid += 1;
                let status = style("✘").red();
                term.write_line(&format!("{status} {}: {e}", path.display()))?;
            }
        }
    }

    if invalid > 0 {
        eyre::bail!("{invalid} of {} specifications are invalid", files.len());
    }
    Ok(())
}

async fn normalize_file(path: &Path) -> eyre::Result<()> {
    let raw = read_spec(path).await?;
    let format = format::resolve(&raw)?;
    let tree = normalize::normalize(&raw, format)?;
    let pretty = serde_json::to_string_pretty(&tree).wrap_err("failed to render canonical tree")?;
    Term::stdout().write_line(&pretty)?;
    Ok(())
}

async fn run_files(files: &[PathBuf], show_log: bool) -> eyre::Result<()> {
    let cfg = get_config();
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let engine = Arc::new(Engine::from_config(store, &cfg.engine)?);
    let service = Service::new(engine.clone());

    let mut names = Vec::with_capacity(files.len());
    for path in files {
        let raw = read_spec(path).await?;
        let name = spec_name(path)?;
        service
            .create_spec(&name, &raw)
            .await
            .wrap_err_with(|| format!("failed to register {}", path.display()))?;
        names.push(name);
    }
    info!("registered {}", names.iter().join(", "));

    let rx = engine.subscribe()?;
    let reporter = tokio::spawn(async move {
        let mut reporter = ListReporter::new(show_log);
        reporter.run(rx).await.map(|_| reporter.summary())
    });

    let term = Term::stdout();
    let mut pending = Vec::new();
    let mut rejected = 0;
    for entry in service.run_all().await? {
        match entry.outcome {
            Ok(outcome) => pending.push(outcome.into_record()),
            Err(e) => {
                rejected += 1;
                let status = style("✘").red();
                term.write_line(&format!("{status} [{}] not run: {e}", entry.spec.name))?;
            }
        }
    }

    let records = join_all(pending)
        .await
        .into_iter()
        .collect::<spectest_core::Result<Vec<_>>>()?;
    engine.close_channel()?;
    let summary = reporter.await??;

    term.write_line(&format!(
        "{} passed, {} failed, {} errored, {rejected} not run",
        summary.passed, summary.failed, summary.errored
    ))?;

    let not_passed = records
        .iter()
        .filter(|record| !record.status.is_pass())
        .count()
        + rejected;
    if not_passed > 0 {
        eyre::bail!("{not_passed} of {} specifications did not pass", files.len());
    }
    Ok(())
}
