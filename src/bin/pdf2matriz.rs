//! CLI binary for pdf2matriz.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ProcessConfig`, runs one of the workflow steps, and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf2matriz::server::{create_router, AppState};
use pdf2matriz::{
    process_document, render_html, render_str, upload_document, KeyStatus, LlmClient,
    LocalFileStore, ModelPolicy, OpenAiClient, ProcessConfig, ProcessProgressCallback,
    ProcessStage, ProgressCallback, PromptCatalog, RequestContext, UploadRequest,
};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal spinner that shows the current processing stage.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Instant,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            started: Instant::now(),
        })
    }
}

impl ProcessProgressCallback for CliProgressCallback {
    fn on_process_start(&self, file_name: &str) {
        self.bar.set_prefix(file_name.to_string());
    }

    fn on_stage(&self, stage: ProcessStage) {
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_process_complete(&self, element_count: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} Matriz element(s) extracted  {}",
            green("✔"),
            bold(&element_count.to_string()),
            dim(&format!("{:.1}s", self.started.elapsed().as_secs_f64())),
        );
    }

    fn on_process_error(&self, error: &str) {
        self.bar.finish_and_clear();
        let msg: String = error.chars().take(120).collect();
        eprintln!("{} {}", red("✘"), red(&msg));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Upload a PDF into the storage root and process it (canonical JSON on stdout)
  pdf2matriz process ficha.pdf

  # Pick a prompt and request a model
  pdf2matriz process --prompt ficha_tecnica --model gpt-5.1 ficha.pdf -o ficha.json

  # Render a stored result as HTML tables
  pdf2matriz render --html storage/ficha/ficha.pdf.result.json > ficha.html

  # Run the HTTP front doors
  pdf2matriz serve --addr 0.0.0.0:8080

  # List prompts, check the API key
  pdf2matriz prompts --catalog prompts.json
  pdf2matriz check-key

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY               Provider API key
  PDF2MATRIZ_API_BASE_URL      OpenAI-compatible base URL
  PDF2MATRIZ_STORAGE_ROOT      Storage root for uploads and artifacts
  PDF2MATRIZ_PROMPTS           Prompt catalog JSON file
  PDF2MATRIZ_MODEL             Default model
  PDF2MATRIZ_ALLOWED_MODELS    Comma-separated list of allowed models
  PDF2MATRIZ_API_TIMEOUT       Per-call provider timeout in seconds
"#;

/// Analyse PDFs with an LLM and render the extracted Matriz as tables.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2matriz",
    version,
    about = "Analyse PDFs with an LLM and render the extracted Matriz JSON as tables",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Provider API key.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// OpenAI-compatible API base URL.
    #[arg(long, env = "PDF2MATRIZ_API_BASE_URL", global = true)]
    api_base_url: Option<String>,

    /// Directory holding uploads and their artifacts.
    #[arg(long, env = "PDF2MATRIZ_STORAGE_ROOT", default_value = "storage", global = true)]
    storage_root: PathBuf,

    /// Prompt catalog JSON file (built-in catalog when absent).
    #[arg(long, env = "PDF2MATRIZ_PROMPTS", global = true)]
    catalog: Option<PathBuf>,

    /// Model used when a request names none.
    #[arg(long, env = "PDF2MATRIZ_MODEL", global = true)]
    default_model: Option<String>,

    /// Models a request may ask for; others are coerced.
    #[arg(long, env = "PDF2MATRIZ_ALLOWED_MODELS", value_delimiter = ',', global = true)]
    allowed_models: Vec<String>,

    /// Per-call provider timeout in seconds (none by default).
    #[arg(long, env = "PDF2MATRIZ_API_TIMEOUT", global = true)]
    api_timeout: Option<u64>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2MATRIZ_VERBOSE", global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2MATRIZ_QUIET", global = true)]
    quiet: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "PDF2MATRIZ_NO_PROGRESS", global = true)]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a PDF into the storage root and run the full processing step.
    Process {
        /// PDF to analyse.
        file: PathBuf,

        /// Prompt key from the catalog (first entry when absent).
        #[arg(short, long)]
        prompt: Option<String>,

        /// Requested model.
        #[arg(short, long)]
        model: Option<String>,

        /// Write the canonical JSON here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the full ProcessOutput as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Render JSON (file or `-` for stdin) as tables.
    Render {
        input: PathBuf,

        /// Emit HTML sections instead of a JSON table list.
        #[arg(long)]
        html: bool,
    },

    /// Run the HTTP front doors.
    Serve {
        #[arg(long, env = "PDF2MATRIZ_ADDR", default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
    },

    /// List the prompt catalog.
    Prompts,

    /// Check that the API key is accepted by the provider.
    CheckKey,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let common = &cli.common;

    // ── Logging setup ────────────────────────────────────────────────────
    let is_process = matches!(cli.command, Command::Process { .. });
    let show_progress = is_process && !common.quiet && !common.no_progress;
    let filter = if common.verbose {
        "debug"
    } else if common.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let catalog = load_catalog(common)?;

    match &cli.command {
        Command::Process {
            file,
            prompt,
            model,
            output,
            json,
        } => {
            let progress: Option<ProgressCallback> = if show_progress {
                Some(CliProgressCallback::new() as Arc<dyn ProcessProgressCallback>)
            } else {
                None
            };
            let config = build_config(common, progress)?;
            let client = OpenAiClient::new(&config).context("Failed to create API client")?;

            let bytes = tokio::fs::read(file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let store = LocalFileStore::new(config.storage_root.clone());
            let receipt = upload_document(
                &store,
                UploadRequest {
                    file_name: file.to_string_lossy().into_owned(),
                    bytes,
                    prompt_key: prompt.clone(),
                },
            )
            .await
            .context("Upload failed")?;

            let mut ctx = RequestContext::new(receipt.path.to_string_lossy());
            ctx.prompt_key = receipt.prompt_key.clone();
            ctx.requested_model = model.clone();

            let result = process_document(&ctx, &config, &client, &catalog)
                .await
                .context("Processing failed")?;

            let text = if *json {
                serde_json::to_string_pretty(&result).context("Failed to serialise output")?
            } else {
                result.canonical_json.clone()
            };

            match output {
                Some(path) => {
                    tokio::fs::write(path, &text)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    if !common.quiet {
                        eprintln!(
                            "{}  {}  →  {}",
                            green("✔"),
                            dim(&result.model),
                            bold(&path.display().to_string())
                        );
                    }
                }
                None => write_stdout(&text)?,
            }
        }

        Command::Render { input, html } => {
            let text = if input.as_os_str() == "-" {
                let mut buf = String::new();
                io::stdin()
                    .read_to_string(&mut buf)
                    .context("Failed to read stdin")?;
                buf
            } else {
                tokio::fs::read_to_string(input)
                    .await
                    .with_context(|| format!("Failed to read {}", input.display()))?
            };
            let tables = render_str(&text).context("Failed to render JSON")?;
            let out = if *html {
                render_html(&tables)
            } else {
                serde_json::to_string_pretty(&tables).context("Failed to serialise tables")?
            };
            write_stdout(&out)?;
        }

        Command::Serve { addr } => {
            let config = build_config(common, None)?;
            tokio::fs::create_dir_all(&config.storage_root)
                .await
                .with_context(|| {
                    format!("Failed to create storage root {}", config.storage_root.display())
                })?;
            let client: Arc<dyn LlmClient> =
                Arc::new(OpenAiClient::new(&config).context("Failed to create API client")?);
            let app = create_router(AppState::new(config, client, catalog));

            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind {addr}"))?;
            tracing::info!("Listening on http://{}", listener.local_addr()?);
            axum::serve(listener, app).await.context("Server error")?;
        }

        Command::Prompts => {
            for entry in catalog.entries() {
                println!(
                    "{}  {}",
                    bold(&entry.key),
                    entry.name.as_deref().unwrap_or(&entry.key)
                );
                if !entry.description.is_empty() {
                    println!("    {}", dim(&entry.description));
                }
                for p in &entry.parameters {
                    let options = if p.options.is_empty() {
                        String::new()
                    } else {
                        format!(" [{}]", p.options.join(", "))
                    };
                    println!("    - {}: {}{}", p.key, p.display_label(), options);
                }
            }
        }

        Command::CheckKey => {
            let config = build_config(common, None)?;
            if config.api_key.is_none() {
                anyhow::bail!("No API key configured (set OPENAI_API_KEY or --api-key)");
            }
            let client = OpenAiClient::new(&config).context("Failed to create API client")?;
            let status = client.check_key().await.context("Key check failed")?;
            match status {
                KeyStatus::Valid => println!("{} API key is valid", green("✔")),
                KeyStatus::Unauthorized => {
                    anyhow::bail!("API key is invalid or revoked (HTTP 401)")
                }
                KeyStatus::RateLimited => println!(
                    "{} API key is valid but rate-limited or out of credit (HTTP 429)",
                    red("⚠")
                ),
                KeyStatus::Unexpected { status, body } => {
                    anyhow::bail!("Unexpected answer from the provider (HTTP {status}): {body}")
                }
            }
        }
    }

    Ok(())
}

/// Map CLI args to `ProcessConfig`.
fn build_config(common: &CommonArgs, progress: Option<ProgressCallback>) -> Result<ProcessConfig> {
    let mut builder = ProcessConfig::builder().storage_root(&common.storage_root);

    if let Some(ref key) = common.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref url) = common.api_base_url {
        builder = builder.api_base_url(url);
    }
    if let Some(secs) = common.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if common.default_model.is_some() || !common.allowed_models.is_empty() {
        let defaults = ModelPolicy::default();
        let default_model = common
            .default_model
            .clone()
            .unwrap_or(defaults.default_model);
        let allowed = if common.allowed_models.is_empty() {
            vec![default_model.clone()]
        } else {
            common.allowed_models.clone()
        };
        builder = builder.model_policy(ModelPolicy::new(default_model, allowed));
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn load_catalog(common: &CommonArgs) -> Result<PromptCatalog> {
    match common.catalog {
        Some(ref path) => PromptCatalog::load(path).context("Failed to load prompt catalog"),
        None => Ok(PromptCatalog::builtin()),
    }
}

fn write_stdout(text: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(text.as_bytes())
        .context("Failed to write to stdout")?;
    // Ensure a trailing newline on stdout.
    if !text.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}
