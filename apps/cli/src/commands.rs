//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use modexport_core::assembler::validate_export;
use modexport_core::pipeline::{ExportConfig, ExportOutcome, ProgressReporter, export_module};
use modexport_filestore::FileStore;
use modexport_shared::{AppConfig, TraversalConfig, default_container_name, init_config, load_config};
use tracing::{debug, info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// modexport: dump a module and its linked modules to JSON.
#[derive(Parser)]
#[command(
    name = "modexport",
    version,
    about = "Export a requirements module, its object hierarchy and linked modules as one JSON document.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Export a module and every module linked within the depth bound.
    Export {
        /// Full path of the root module, e.g. /Project/SRS.
        module: String,

        /// Maximum traversal depth (root counts as the first level).
        #[arg(short, long)]
        depth: Option<u32>,

        /// Directory holding the module files.
        #[arg(long, env = "MODEXPORT_STORE")]
        store: Option<PathBuf>,

        /// Output file (defaults to <output_dir>/<module>.export.json).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Write compact JSON instead of pretty-printed.
        #[arg(long)]
        compact: bool,

        /// Only follow links into modules matching this glob (repeatable).
        #[arg(long)]
        include: Vec<String>,

        /// Never follow links into modules matching this glob (repeatable).
        #[arg(long)]
        exclude: Vec<String>,
    },

    /// Check that a file is a well-formed export document.
    Validate {
        /// Export file to check.
        file: PathBuf,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so stdout stays
/// free for command output.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "modexport=info",
        1 => "modexport=debug",
        _ => "modexport=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Export {
            module,
            depth,
            store,
            out,
            compact,
            include,
            exclude,
        } => {
            let args = ExportArgs {
                module,
                depth,
                store,
                out,
                compact,
                include,
                exclude,
            };
            cmd_export(args).await
        }
        Command::Validate { file } => cmd_validate(&file).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Flags of `modexport export`.
struct ExportArgs {
    module: String,
    depth: Option<u32>,
    store: Option<PathBuf>,
    out: Option<PathBuf>,
    compact: bool,
    include: Vec<String>,
    exclude: Vec<String>,
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_export(args: ExportArgs) -> Result<()> {
    let config = load_config()?;

    let mut traversal = TraversalConfig::from(&config);
    if let Some(depth) = args.depth {
        traversal.max_depth = depth;
    }
    traversal.include_patterns.extend(args.include);
    traversal.exclude_patterns.extend(args.exclude);

    let store_root = args
        .store
        .unwrap_or_else(|| PathBuf::from(&config.store.root));
    let out_path = args
        .out
        .unwrap_or_else(|| default_output_path(&config, &args.module));

    let export_config = ExportConfig {
        root_module: args.module,
        traversal,
        pretty: config.defaults.pretty && !args.compact,
        generated_at: None,
    };

    info!(
        module = %export_config.root_module,
        max_depth = export_config.traversal.max_depth,
        store = %store_root.display(),
        "exporting module"
    );

    // Ctrl-C stops the traversal at the next module boundary.
    let cancel = Arc::new(AtomicBool::new(false));
    let signal_flag = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing current module");
            signal_flag.store(true, Ordering::SeqCst);
        }
    });

    let outcome = tokio::task::spawn_blocking(move || {
        let mut store = FileStore::new(store_root);
        debug!(root = %store.root().display(), "module store ready");
        let reporter = CliProgress::new();
        export_module(&export_config, &mut store, &reporter, Some(cancel))
    })
    .await
    .wrap_err("export task panicked")??;
    signal_task.abort();

    write_atomically(&out_path, &outcome.bytes)?;
    print_summary(&outcome, &out_path);

    Ok(())
}

/// `<output_dir>/<last path segment>.export.json`
fn default_output_path(config: &AppConfig, module: &str) -> PathBuf {
    PathBuf::from(&config.defaults.output_dir)
        .join(format!("{}.export.json", default_container_name(module)))
}

/// Write `bytes` to a sibling temp file, then rename it over `path`.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)
        .wrap_err_with(|| format!("cannot create output directory {}", dir.display()))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("output path '{}' has no file name", path.display()))?;
    let tmp = dir.join(format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        Uuid::now_v7()
    ));

    std::fs::write(&tmp, bytes).wrap_err_with(|| format!("cannot write {}", tmp.display()))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(eyre!("cannot move export into place at {}: {e}", path.display()));
    }
    Ok(())
}

fn print_summary(outcome: &ExportOutcome, out_path: &Path) {
    let report = &outcome.report;

    println!();
    if report.cancelled {
        println!("  Export cancelled, partial document written.");
    } else {
        println!("  Export complete.");
    }
    println!("  Root:     {}", outcome.document.root_container);
    println!("  Modules:  {}", outcome.document.containers.len());
    println!("  Objects:  {}", outcome.object_count);
    println!("  Links:    {}", outcome.link_count);
    println!("  Output:   {} ({} bytes)", out_path.display(), outcome.bytes.len());
    println!("  SHA-256:  {}", outcome.sha256);
    println!("  Time:     {:.1}s", outcome.elapsed.as_secs_f64());

    if !report.skipped.is_empty() {
        println!();
        println!("  Skipped modules:");
        for err in &report.skipped {
            println!("    - {err}");
        }
    }
    if !report.link_warnings.is_empty() {
        println!("  Unresolved links: {}", report.link_warnings.len());
    }
    if !report.beyond_depth.is_empty() {
        println!(
            "  Referenced beyond depth {}: {}",
            outcome.document.max_depth,
            report.beyond_depth.join(", ")
        );
    }
    if !report.out_of_scope.is_empty() {
        println!("  Excluded by pattern: {}", report.out_of_scope.join(", "));
    }
    if report.cancelled {
        println!("  Abandoned queue entries: {}", report.abandoned);
    }
    println!();
}

async fn cmd_validate(file: &Path) -> Result<()> {
    let bytes = std::fs::read(file).wrap_err_with(|| format!("cannot read {}", file.display()))?;
    let stats = validate_export(&bytes)?;

    info!(file = %file.display(), "export validated");
    println!(
        "{}: ok ({} modules, {} objects, {} links)",
        file.display(),
        stats.modules,
        stats.objects,
        stats.links
    );
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn module_exported(&self, path: &str, current: usize, queued: usize) {
        self.spinner
            .set_message(format!("Exported [{current}, {queued} queued] {path}"));
    }

    fn module_skipped(&self, path: &str, reason: &str) {
        self.spinner.println(format!("  skipped {path}: {reason}"));
    }

    fn done(&self, _outcome: &ExportOutcome) {
        self.spinner.finish_and_clear();
    }
}
