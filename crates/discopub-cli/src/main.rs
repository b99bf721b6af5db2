use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use discopub_core::config_file::{self, ConfigFile};
use discopub_core::{BatchRunner, Config, ProgressEvent};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod output;

use output::ColorMode;

/// PubMed article downloader - resolve PMIDs to publisher PDFs
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the PDFs for a list of PubMed identifiers
    Fetch {
        /// PubMed identifiers
        pmids: Vec<String>,

        /// Comma-separated list of PubMed identifiers
        #[arg(long)]
        ids: Option<String>,

        /// File of identifiers, one per line or comma-separated
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Write PDFs and the unfetched list into this directory
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Path of the zip archive (default: ./<results-name>.zip)
        #[arg(short, long)]
        archive: Option<PathBuf>,

        /// Base name of the results archive
        #[arg(long)]
        results_name: Option<String>,

        /// Lookup attempts per identifier
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=10))]
        max_attempts: Option<u32>,

        /// Number of identifiers processed concurrently
        #[arg(short, long)]
        workers: Option<usize>,

        /// Per-request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "discopub=debug,discopub_core=debug,warn"
    } else {
        "discopub=info,discopub_core=info,warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Command::Fetch {
            pmids,
            ids,
            file,
            out_dir,
            archive,
            results_name,
            max_attempts,
            workers,
            timeout,
            no_color,
        } => {
            fetch(FetchArgs {
                pmids,
                ids,
                file,
                out_dir,
                archive,
                results_name,
                max_attempts,
                workers,
                timeout,
                no_color,
            })
            .await
        }
    }
}

#[derive(Debug, Default)]
struct FetchArgs {
    pmids: Vec<String>,
    ids: Option<String>,
    file: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    archive: Option<PathBuf>,
    results_name: Option<String>,
    max_attempts: Option<u32>,
    workers: Option<usize>,
    timeout: Option<u64>,
    no_color: bool,
}

fn env_parse<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    env(key).and_then(|v| v.trim().parse().ok())
}

/// Resolve configuration: CLI flags > env vars > config file > defaults
///
/// `env` looks up a variable by name; `main` passes the process environment.
fn resolve_config(
    args: &FetchArgs,
    file: &ConfigFile,
    env: impl Fn(&str) -> Option<String>,
) -> Config {
    let mut config = Config::default();
    file.apply_to(&mut config);

    if let Some(v) = env("DISCOPUB_LOOKUP_URL") {
        config.lookup_url = v;
    }
    if let Some(v) = env("DISCOPUB_REPOSITORY_URL") {
        config.repository_base_url = v;
    }
    if let Some(v) = env("DISCOPUB_USER_AGENT") {
        config.user_agent = v;
    }
    if let Some(v) = env_parse(&env, "DISCOPUB_MAX_ATTEMPTS") {
        config.max_attempts = v;
    }
    if let Some(v) = env_parse(&env, "DISCOPUB_WORKERS") {
        config.num_workers = v;
    }
    if let Some(v) = env_parse(&env, "DISCOPUB_TIMEOUT") {
        config.request_timeout_secs = v;
    }
    if let Some(v) = env_parse(&env, "DISCOPUB_REQUESTS_PER_SECOND") {
        config.lookup_requests_per_second = v;
    }

    if let Some(v) = args.max_attempts {
        config.max_attempts = v;
    }
    if let Some(v) = args.workers {
        config.num_workers = v;
    }
    if let Some(v) = args.timeout {
        config.request_timeout_secs = v;
    }

    config.max_attempts = config.max_attempts.clamp(1, 10);
    config.num_workers = config.num_workers.max(1);
    config
}

fn collect_identifiers(args: &FetchArgs) -> anyhow::Result<Vec<String>> {
    let mut raw: Vec<String> = args.pmids.clone();
    if let Some(ref ids) = args.ids {
        raw.extend(ids.split(',').map(str::to_string));
    }
    if let Some(ref path) = args.file {
        if !path.exists() {
            anyhow::bail!("File not found: {}", path.display());
        }
        let text = std::fs::read_to_string(path)?;
        raw.extend(discopub_core::parse_identifier_text(&text));
    }
    Ok(discopub_core::normalize_identifiers(raw)
        .into_iter()
        .map(|p| p.to_string())
        .collect())
}

async fn fetch(args: FetchArgs) -> anyhow::Result<()> {
    let color = ColorMode(!args.no_color);
    let mut stdout = std::io::stdout();

    let identifiers = collect_identifiers(&args)?;
    if identifiers.is_empty() {
        let msg = "No PubMed identifiers given. Pass them as arguments, with --ids, or with --file.";
        if color.enabled() {
            use owo_colors::OwoColorize;
            writeln!(stdout, "{}", msg.yellow())?;
        } else {
            writeln!(stdout, "{}", msg)?;
        }
        return Ok(());
    }

    let file_config = config_file::load_config();
    let config = resolve_config(&args, &file_config, |key| std::env::var(key).ok());
    tracing::debug!(?config, "resolved configuration");

    let results_name = args
        .results_name
        .clone()
        .or_else(|| std::env::var("DISCOPUB_RESULTS_NAME").ok())
        .or_else(|| file_config.output.as_ref().and_then(|o| o.results_name.clone()))
        .unwrap_or_else(|| discopub_core::DEFAULT_RESULTS_NAME.to_string());
    let out_dir = args.out_dir.clone().or_else(|| {
        file_config
            .output
            .as_ref()
            .and_then(|o| o.out_dir.clone())
            .map(PathBuf::from)
    });

    output::print_batch_header(
        &mut stdout,
        identifiers.len(),
        config.max_attempts,
        config.num_workers,
        color,
    )?;

    let bar = ProgressBar::new(identifiers.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{bar:40.cyan/dim}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    let progress_cb = {
        let bar = bar.clone();
        move |event: ProgressEvent| {
            if matches!(event, ProgressEvent::Result { .. }) {
                bar.inc(1);
            }
            bar.suspend(|| {
                let mut out = std::io::stdout().lock();
                let _ = output::print_progress(&mut out, &event, color);
                let _ = out.flush();
            });
        }
    };

    let cancel = CancellationToken::new();

    // Set up Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, skipping the remaining identifiers");
            cancel_clone.cancel();
        }
    });

    let max_attempts = config.max_attempts;
    let (report, archive_path) = match out_dir {
        Some(ref dir) => {
            let runner = BatchRunner::new(&config, dir)?;
            let report = runner
                .run(identifiers, max_attempts, Arc::new(progress_cb), cancel)
                .await?;
            let archive_path = match args.archive {
                Some(ref path) => {
                    let bytes = discopub_core::archive::package_directory(dir)?;
                    write_archive(path, &bytes)?;
                    Some(path.clone())
                }
                None => None,
            };
            (report, archive_path)
        }
        None => {
            let outcome = discopub_core::submit_batch(
                identifiers,
                max_attempts,
                config,
                progress_cb,
                cancel,
            )
            .await?;
            let path = args
                .archive
                .clone()
                .unwrap_or_else(|| PathBuf::from(format!("{}.zip", results_name)));
            write_archive(&path, &outcome.archive)?;
            (outcome.report, Some(path))
        }
    };
    bar.finish_and_clear();

    output::print_unfetched(&mut stdout, &report, color)?;
    output::print_summary(
        &mut stdout,
        &report,
        out_dir.as_deref(),
        archive_path.as_deref(),
        color,
    )?;

    Ok(())
}

fn write_archive(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "wrote archive");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use discopub_core::config_file::{ConcurrencyConfig, NetworkConfig, RetryConfig};
    use std::collections::HashMap;

    fn env_of(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn file_with(max_attempts: u32, workers: usize, timeout: u64) -> ConfigFile {
        ConfigFile {
            network: Some(NetworkConfig {
                lookup_url: Some("https://file.example/elink".into()),
                request_timeout_secs: Some(timeout),
                ..Default::default()
            }),
            retry: Some(RetryConfig {
                max_attempts: Some(max_attempts),
                ..Default::default()
            }),
            concurrency: Some(ConcurrencyConfig {
                num_workers: Some(workers),
            }),
            output: None,
        }
    }

    #[test]
    fn defaults_without_any_source() {
        let config = resolve_config(&FetchArgs::default(), &ConfigFile::default(), env_of(&[]));
        let defaults = Config::default();
        assert_eq!(config.max_attempts, defaults.max_attempts);
        assert_eq!(config.num_workers, defaults.num_workers);
        assert_eq!(config.lookup_url, defaults.lookup_url);
    }

    #[test]
    fn file_overrides_defaults() {
        let config = resolve_config(&FetchArgs::default(), &file_with(5, 2, 11), env_of(&[]));
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.num_workers, 2);
        assert_eq!(config.request_timeout_secs, 11);
        assert_eq!(config.lookup_url, "https://file.example/elink");
    }

    #[test]
    fn env_overrides_file() {
        let env = env_of(&[
            ("DISCOPUB_MAX_ATTEMPTS", " 7 "),
            ("DISCOPUB_WORKERS", "6"),
            ("DISCOPUB_LOOKUP_URL", "https://env.example/elink"),
            ("DISCOPUB_REQUESTS_PER_SECOND", "9"),
        ]);
        let config = resolve_config(&FetchArgs::default(), &file_with(5, 2, 11), env);
        assert_eq!(config.max_attempts, 7);
        assert_eq!(config.num_workers, 6);
        assert_eq!(config.lookup_url, "https://env.example/elink");
        assert_eq!(config.lookup_requests_per_second, 9);
        // Not set in the environment, so the file value stays.
        assert_eq!(config.request_timeout_secs, 11);
    }

    #[test]
    fn unparsable_env_value_is_ignored() {
        let env = env_of(&[("DISCOPUB_MAX_ATTEMPTS", "many")]);
        let config = resolve_config(&FetchArgs::default(), &file_with(5, 2, 11), env);
        assert_eq!(config.max_attempts, 5);
    }

    #[test]
    fn flags_override_env_and_file() {
        let args = FetchArgs {
            max_attempts: Some(2),
            workers: Some(8),
            timeout: Some(3),
            ..Default::default()
        };
        let env = env_of(&[
            ("DISCOPUB_MAX_ATTEMPTS", "7"),
            ("DISCOPUB_WORKERS", "6"),
            ("DISCOPUB_TIMEOUT", "40"),
        ]);
        let config = resolve_config(&args, &file_with(5, 2, 11), env);
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.num_workers, 8);
        assert_eq!(config.request_timeout_secs, 3);
    }

    #[test]
    fn attempts_and_workers_are_clamped() {
        let high = resolve_config(&FetchArgs::default(), &file_with(50, 0, 11), env_of(&[]));
        assert_eq!(high.max_attempts, 10);
        assert_eq!(high.num_workers, 1);

        let low = resolve_config(
            &FetchArgs::default(),
            &ConfigFile::default(),
            env_of(&[("DISCOPUB_MAX_ATTEMPTS", "0")]),
        );
        assert_eq!(low.max_attempts, 1);
    }

    #[test]
    fn identifiers_merge_args_ids_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.txt");
        std::fs::write(&path, "300\r\n400, 500\n\n").unwrap();
        let args = FetchArgs {
            pmids: vec!["100".into(), " ".into()],
            ids: Some("200,,201 ".into()),
            file: Some(path),
            ..Default::default()
        };

        let ids = collect_identifiers(&args).unwrap();
        assert_eq!(ids, vec!["100", "200", "201", "300", "400", "500"]);
    }

    #[test]
    fn identifiers_keep_repeats_in_order() {
        let args = FetchArgs {
            pmids: vec!["9".into()],
            ids: Some("9,1".into()),
            ..Default::default()
        };
        assert_eq!(collect_identifiers(&args).unwrap(), vec!["9", "9", "1"]);
    }

    #[test]
    fn missing_identifier_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let args = FetchArgs {
            file: Some(dir.path().join("absent.txt")),
            ..Default::default()
        };
        let err = collect_identifiers(&args).unwrap_err();
        assert!(err.to_string().contains("File not found"));
    }
}
