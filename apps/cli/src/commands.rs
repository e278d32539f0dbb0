//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use contextpack_core::{HttpReply, ScanOrchestrator, ScanPhase, ScanProgress};
use contextpack_llm::{LlmBackend, OpenRouterBackend};
use contextpack_shared::{
    AppConfig, ContextPackError, ScanConfig, ScrapedPage, db_path, init_config, load_config,
};
use contextpack_storage::{PackStore, Storage, UnavailableStore};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ContextPack: turn a company website into a draft context pack.
#[derive(Parser)]
#[command(
    name = "contextpack",
    version,
    about = "Scan a company's public pages into a versioned context pack.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Pack database path (defaults to the configured path).
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

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
    /// Scan a company website and print the response envelope.
    Scan {
        /// Company website URL.
        url: Option<String>,

        /// Company name (defaults to one derived from the URL).
        #[arg(short, long)]
        name: Option<String>,

        /// Use canned demo data instead of fetching and prompting.
        #[arg(long)]
        demo: bool,

        /// OpenRouter model ID (defaults to the configured model).
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Run a raw JSON scan request from a file, or `-` for stdin.
    Request {
        /// Path to the request JSON.
        input: String,

        /// OpenRouter model ID (defaults to the configured model).
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Inspect stored packs.
    Pack {
        #[command(subcommand)]
        action: PackAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Pack subcommands.
#[derive(Subcommand)]
pub(crate) enum PackAction {
    /// List stored packs, newest first.
    List,
    /// Print a stored pack as JSON.
    Show {
        id: String,

        /// Print a confidence table instead of the JSON document.
        #[arg(long)]
        fields: bool,
    },
    /// Delete a stored pack.
    Delete { id: String },
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

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "contextpack=info",
        1 => "contextpack=debug",
        _ => "contextpack=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
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
    let db = cli.db;
    match cli.command {
        Command::Scan {
            url,
            name,
            demo,
            model,
        } => {
            let mut body = serde_json::Map::new();
            if let Some(url) = url {
                body.insert("companyUrl".into(), url.into());
            }
            if let Some(name) = name {
                body.insert("companyName".into(), name.into());
            }
            body.insert("demoMode".into(), demo.into());
            cmd_scan(serde_json::Value::Object(body), db.as_deref(), model.as_deref()).await
        }
        Command::Request { input, model } => {
            let raw = read_input(&input)?;
            let body: serde_json::Value = serde_json::from_str(&raw)
                .wrap_err_with(|| format!("request in '{input}' is not valid JSON"))?;
            cmd_scan(body, db.as_deref(), model.as_deref()).await
        }
        Command::Pack { action } => match action {
            PackAction::List => cmd_pack_list(db.as_deref()).await,
            PackAction::Show { id, fields } => cmd_pack_show(db.as_deref(), &id, fields).await,
            PackAction::Delete { id } => cmd_pack_delete(db.as_deref(), &id).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        return std::io::read_to_string(std::io::stdin()).wrap_err("failed to read stdin");
    }
    std::fs::read_to_string(input).wrap_err_with(|| format!("failed to read '{input}'"))
}

fn resolve_db_path(config: &AppConfig, db: Option<&Path>) -> Result<PathBuf> {
    match db {
        Some(p) => Ok(p.to_path_buf()),
        None => Ok(db_path(config)?),
    }
}

async fn open_storage(config: &AppConfig, db: Option<&Path>) -> Result<Storage> {
    let path = resolve_db_path(config, db)?;
    Ok(Storage::open(&path).await?)
}

/// Open the store a scan persists into. An unusable database only costs the
/// save, so the scan still runs and prints its envelope.
async fn scan_store(config: &AppConfig, db: Option<&Path>) -> Arc<dyn PackStore> {
    match open_storage(config, db).await {
        Ok(storage) => Arc::new(storage),
        Err(e) => {
            warn!(error = %e, "pack database unavailable, the scan result will not be saved");
            Arc::new(UnavailableStore::new(e))
        }
    }
}

/// Open the database for reading. `None` if it has not been created yet.
async fn open_storage_readonly(
    config: &AppConfig,
    db: Option<&Path>,
) -> Result<Option<Storage>> {
    let path = resolve_db_path(config, db)?;
    match Storage::open_readonly(&path).await {
        Ok(storage) => Ok(Some(storage)),
        Err(ContextPackError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Scan
// ---------------------------------------------------------------------------

async fn cmd_scan(body: serde_json::Value, db: Option<&Path>, model: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let store = scan_store(&config, db).await;

    let backend = OpenRouterBackend::from_config(&config).map(|backend| {
        let backend = match model {
            Some(m) => backend.with_model(m),
            None => backend,
        };
        Arc::new(backend) as Arc<dyn LlmBackend>
    });

    let orchestrator =
        ScanOrchestrator::new(ScanConfig::from(&config), store).with_backend_result(backend);

    info!(
        url = body.get("companyUrl").and_then(|v| v.as_str()).unwrap_or(""),
        "starting scan"
    );

    let reporter = CliProgress::new();
    let reply = orchestrator.handle(&body, &reporter).await.settle().await;
    reporter.finish();

    emit(&reply)
}

/// Print the reply envelope; non-200 replies become a non-zero exit.
fn emit(reply: &HttpReply) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(reply)?);
    if !reply.is_success() {
        let message = reply.body["error"].as_str().unwrap_or("scan failed");
        return Err(eyre!("scan returned status {}: {message}", reply.status));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner on stderr.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ScanProgress for CliProgress {
    fn phase(&self, phase: ScanPhase) {
        match phase {
            ScanPhase::Done | ScanPhase::Failed => self.spinner.finish_and_clear(),
            _ => self.spinner.set_message(phase.label()),
        }
    }

    fn page_fetched(&self, page: &ScrapedPage, current: usize, total: usize) {
        let status = if page.success { "ok" } else { "failed" };
        self.spinner
            .set_message(format!("Fetched [{current}/{total}] {} ({status})", page.url));
    }

    fn field_extracted(&self, field: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Extracting [{current}/{total}] {field}"));
    }
}

// ---------------------------------------------------------------------------
// Packs
// ---------------------------------------------------------------------------

async fn cmd_pack_list(db: Option<&Path>) -> Result<()> {
    let config = load_config()?;
    let packs = match open_storage_readonly(&config, db).await? {
        Some(storage) => storage.list_context_packs().await?,
        None => Vec::new(),
    };

    if packs.is_empty() {
        println!("No packs stored yet. Run `contextpack scan <URL>` to create one.");
        return Ok(());
    }

    for pack in packs {
        println!(
            "{:<48} {:<24} {:<4} {}",
            pack.id, pack.company_name, pack.version, pack.created_at
        );
    }
    Ok(())
}

async fn cmd_pack_show(db: Option<&Path>, id: &str, fields: bool) -> Result<()> {
    let config = load_config()?;
    let pack = match open_storage_readonly(&config, db).await? {
        Some(storage) => storage.get_context_pack(id).await?,
        None => None,
    }
    .ok_or_else(|| eyre!("no pack with id '{id}'"))?;

    if !fields {
        println!("{}", serde_json::to_string_pretty(&pack)?);
        return Ok(());
    }

    println!("{:<44} {:>10}  {:>9}  reason", "field", "confidence", "citations");
    for field in pack.confident_fields() {
        println!(
            "{:<44} {:>10.2}  {:>9}  {}",
            field.path,
            field.confidence.value,
            field.citations.len(),
            field.confidence.reason
        );
    }
    Ok(())
}

async fn cmd_pack_delete(db: Option<&Path>, id: &str) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config, db).await?;
    storage.delete_context_pack(id).await?;
    println!("Deleted pack {id}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

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

#[cfg(test)]
mod tests {
    use super::*;
    use contextpack_core::SilentProgress;
    use serde_json::json;

    fn blocked_db_path() -> PathBuf {
        // A regular file where a directory is expected.
        let file = std::env::temp_dir().join(format!("cp_cli_test_{}", std::process::id()));
        std::fs::write(&file, b"not a directory").unwrap();
        file.join("nested").join("packs.db")
    }

    #[tokio::test]
    async fn unusable_database_still_returns_scan_envelope() {
        let config = AppConfig::default();
        let store = scan_store(&config, Some(&blocked_db_path())).await;

        let reply = ScanOrchestrator::new(ScanConfig::from(&config), store)
            .handle(
                &json!({"companyUrl": "https://acmesaas.example.com", "demoMode": true}),
                &SilentProgress,
            )
            .await
            .settle()
            .await;

        assert_eq!(reply.status, 200);
        assert_eq!(reply.body["draftPack"]["version"], "v0");
    }

    #[tokio::test]
    async fn listing_before_first_scan_is_empty() {
        let config = AppConfig::default();
        let path = std::env::temp_dir().join(format!("cp_cli_missing_{}.db", std::process::id()));
        assert!(open_storage_readonly(&config, Some(&path)).await.unwrap().is_none());
    }
}
