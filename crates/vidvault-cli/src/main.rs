//! vidvault: encrypted media container CLI
//!
//! Commands:
//!   encrypt <input>            - seal a file into a framed container
//!   decrypt <input>            - stream a container (framed or legacy) back to plaintext
//!   inspect <input>            - show container layout without a key
//!   vault ingest <name>...     - seal uploads from the vault temp dir
//!   vault export <name>        - decrypt a stored container
//!   config show               - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use vidvault_core::config::VaultConfig;
use vidvault_core::KeyRecord;
use vidvault_crypto::{ContainerFormat, DecodeOptions, EncodeOptions};
use vidvault_storage::Vault;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "vidvault",
    version,
    about = "Encrypted media container tool",
    long_about = "vidvault: seal media files into streaming-decryptable XChaCha20-Poly1305 containers"
)]
struct Cli {
    /// Path to vidvault.toml configuration file
    #[arg(long, short = 'c', env = "VIDVAULT_CONFIG", default_value = "vidvault.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "VIDVAULT_LOG")]
    log: Option<String>,

    /// Log format; overrides the config file
    #[arg(long, env = "VIDVAULT_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file into a framed container
    Encrypt {
        /// Plaintext input file
        input: PathBuf,
        /// Output container (default: <input>.enc)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Write the key record JSON here instead of stdout
        #[arg(long)]
        record: Option<PathBuf>,
        /// Plaintext bytes per frame (default: from config)
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Decrypt a container
    Decrypt {
        /// Container file
        input: PathBuf,
        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Key record JSON file
        #[arg(long, conflicts_with_all = ["key", "header"])]
        record: Option<PathBuf>,
        /// Hex-encoded key
        #[arg(long, requires = "header")]
        key: Option<String>,
        /// Hex-encoded stream header
        #[arg(long, requires = "key")]
        header: Option<String>,
        /// Container layout
        #[arg(long, default_value = "auto")]
        format: FormatArg,
    },

    /// Show container layout (no key needed)
    Inspect {
        input: PathBuf,
        /// Emit JSON
        #[arg(long)]
        json: bool,
    },

    /// Vault directory operations
    Vault {
        #[command(subcommand)]
        action: VaultAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum VaultAction {
    /// Encrypt uploads from the temp dir into the encrypted dir
    Ingest {
        /// Upload file names (inside storage.temp_dir)
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Decrypt a stored container
    Export {
        /// Container file name (inside storage.encrypted_dir)
        name: String,
        /// Key record JSON file
        #[arg(long)]
        record: PathBuf,
        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    /// Detect from the first frame
    Auto,
    Framed,
    Legacy,
}

impl FormatArg {
    fn to_format(self) -> Option<ContainerFormat> {
        match self {
            FormatArg::Auto => None,
            FormatArg::Framed => Some(ContainerFormat::Framed),
            FormatArg::Legacy => Some(ContainerFormat::Legacy),
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, from_file) = load_config(&cli.config)?;

    let level = cli.log.clone().unwrap_or_else(|| config.logging.level.clone());
    let format = match &cli.log_format {
        Some(f) => f.clone(),
        None if config.logging.format == "json" => LogFormat::Json,
        None => LogFormat::Text,
    };
    init_logging(&level, &format);
    if !from_file {
        warn!("config file not found: {}  (using defaults)", cli.config.display());
    }

    match cli.command {
        Commands::Encrypt { input, output, record, chunk_size } => {
            let opts = match chunk_size {
                Some(n) => EncodeOptions::with_chunk_size(n)?,
                None => config.codec.encode_options()?,
            };
            blocking(move || cmd_encrypt(&input, output.as_deref(), record.as_deref(), &opts)).await
        }
        Commands::Decrypt { input, output, record, key, header, format } => {
            let record = resolve_record(record.as_deref(), key, header)?;
            let mut opts = config.codec.decode_options()?;
            opts.format = format.to_format();
            blocking(move || cmd_decrypt(&input, output.as_deref(), &record, &opts)).await
        }
        Commands::Inspect { input, json } => blocking(move || cmd_inspect(&input, json)).await,
        Commands::Vault { action: VaultAction::Ingest { names } } => {
            cmd_vault_ingest(&config, names).await
        }
        Commands::Vault { action: VaultAction::Export { name, record, output } } => {
            let record = read_record(&record)?;
            let vault = Vault::from_config(&config)?;
            blocking(move || cmd_vault_export(&vault, &name, &record, output.as_deref())).await
        }
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
    }
}

async fn blocking<F>(f: F) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("worker task failed")?
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout may carry plaintext; logs always go to stderr
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stderr))
                .init();
        }
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

fn load_config(path: &Path) -> Result<(VaultConfig, bool)> {
    if path.exists() {
        let config = VaultConfig::load(path)
            .with_context(|| format!("loading config: {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((VaultConfig::default(), false))
    }
}

// ── Key records ───────────────────────────────────────────────────────────────

fn read_record(path: &Path) -> Result<KeyRecord> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading key record: {}", path.display()))?;
    KeyRecord::from_json(&json).with_context(|| format!("parsing key record: {}", path.display()))
}

fn resolve_record(
    record: Option<&Path>,
    key: Option<String>,
    header: Option<String>,
) -> Result<KeyRecord> {
    match (record, key, header) {
        (Some(path), _, _) => read_record(path),
        (None, Some(key_hex), Some(header_hex)) => Ok(KeyRecord { key_hex, header_hex }),
        _ => anyhow::bail!("decrypt needs --record, or both --key and --header"),
    }
}

/// Write a key record readable only by the owner.
fn write_record(path: &Path, record: &KeyRecord) -> Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("creating key record: {}", path.display()))?;
    file.write_all(record.to_json()?.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(())
}

// ── Output helpers ────────────────────────────────────────────────────────────

/// Temp file next to `path`, persisted over it only once fully written.
fn staged_output(path: &Path) -> Result<tempfile::NamedTempFile> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))
}

fn make_progress_bar(total: u64, prefix: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {binary_bytes_per_sec}",
        )?
        .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

// ── `vidvault encrypt` ────────────────────────────────────────────────────────

fn cmd_encrypt(
    input: &Path,
    output: Option<&Path>,
    record_path: Option<&Path>,
    opts: &EncodeOptions,
) -> Result<()> {
    let output = output.map(Path::to_path_buf).unwrap_or_else(|| {
        let mut name = input.as_os_str().to_owned();
        name.push(".enc");
        PathBuf::from(name)
    });

    let source = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    let total = source.metadata()?.len();
    let pb = make_progress_bar(total, "encrypt")?;

    let staged = staged_output(&output)?;
    let mut writer = BufWriter::new(staged);
    let sealed = vidvault_crypto::encrypt(pb.wrap_read(BufReader::new(source)), &mut writer, opts)
        .with_context(|| format!("encrypting {}", input.display()))?;
    let staged = writer.into_inner().map_err(|e| e.into_error())?;
    staged
        .persist(&output)
        .map_err(|e| e.error)
        .with_context(|| format!("writing {}", output.display()))?;
    pb.finish_and_clear();

    let record = KeyRecord::new(&sealed.key, &sealed.header);
    match record_path {
        Some(path) => write_record(path, &record)?,
        None => println!("{}", record.to_json()?),
    }

    info!(
        input = %input.display(),
        output = %output.display(),
        frames = sealed.summary.message_frames,
        "encrypted"
    );
    eprintln!(
        "Encrypted: {} → {} ({} → {})",
        input.display(),
        output.display(),
        fmt_bytes(sealed.summary.plaintext_bytes),
        fmt_bytes(sealed.summary.container_bytes),
    );
    Ok(())
}

// ── `vidvault decrypt` ────────────────────────────────────────────────────────

fn cmd_decrypt(
    input: &Path,
    output: Option<&Path>,
    record: &KeyRecord,
    opts: &DecodeOptions,
) -> Result<()> {
    let key = record.secret_key()?;
    let header = record.public_header()?;
    let file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    let total = file.metadata()?.len();

    match output {
        Some(path) => {
            let pb = make_progress_bar(total, "decrypt")?;
            let staged = staged_output(path)?;
            let mut writer = BufWriter::new(staged);
            let summary = vidvault_crypto::decode(
                pb.wrap_read(BufReader::new(file)),
                total,
                &key,
                &header,
                &mut writer,
                opts,
            )
            .with_context(|| format!("decrypting {}", input.display()))?;
            let staged = writer.into_inner().map_err(|e| e.into_error())?;
            staged
                .persist(path)
                .map_err(|e| e.error)
                .with_context(|| format!("writing {}", path.display()))?;
            pb.finish_and_clear();
            eprintln!(
                "Decrypted: {} → {} ({}, {} frames, {})",
                input.display(),
                path.display(),
                summary.format,
                summary.frames,
                fmt_bytes(summary.plaintext_bytes),
            );
        }
        None => {
            let stdout = io::stdout();
            let summary = vidvault_crypto::decode(
                BufReader::new(file),
                total,
                &key,
                &header,
                BufWriter::new(stdout.lock()),
                opts,
            )
            .with_context(|| format!("decrypting {}", input.display()))?;
            info!(format = %summary.format, bytes = summary.plaintext_bytes, "decrypted to stdout");
        }
    }
    Ok(())
}

// ── `vidvault inspect` ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct InspectReport {
    path: String,
    container_bytes: u64,
    format: String,
    frames: u64,
    payload_bytes: u64,
    trailing_bytes: u64,
    terminated: bool,
}

fn cmd_inspect(input: &Path, json: bool) -> Result<()> {
    let file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    let total = file.metadata()?.len();
    let summary = vidvault_crypto::inspect(BufReader::new(file), total)
        .with_context(|| format!("inspecting {}", input.display()))?;

    let report = InspectReport {
        path: input.display().to_string(),
        container_bytes: total,
        format: summary.format.to_string(),
        frames: summary.frames,
        payload_bytes: summary.payload_bytes,
        trailing_bytes: summary.trailing_bytes,
        terminated: summary.terminated,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Container: {}", report.path);
    println!("  size:      {}", fmt_bytes(report.container_bytes));
    println!("  format:    {}", report.format);
    println!("  frames:    {}", report.frames);
    println!("  payload:   {}", fmt_bytes(report.payload_bytes));
    if summary.format == ContainerFormat::Framed {
        let terminated = if report.terminated {
            "yes (by frame length)"
        } else {
            "missing"
        };
        println!("  final:     {terminated}");
        if report.trailing_bytes > 0 {
            println!("  trailing:  {} (ignored)", fmt_bytes(report.trailing_bytes));
        }
    }
    Ok(())
}

// ── `vidvault vault` ──────────────────────────────────────────────────────────

async fn cmd_vault_ingest(config: &VaultConfig, names: Vec<String>) -> Result<()> {
    let vault = Vault::from_config(config)?;
    vault.ensure_dirs().context("creating vault directories")?;

    let results = vault.ingest_many(names).await;
    let mut stored = Vec::new();
    let mut failed = 0usize;
    for (name, result) in results {
        match result {
            Ok(object) => stored.push(object),
            Err(e) => {
                failed += 1;
                eprintln!("ingest {name}: {e}");
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&stored)?);
    if failed > 0 {
        anyhow::bail!("{failed} of {} uploads failed", failed + stored.len());
    }
    Ok(())
}

fn cmd_vault_export(
    vault: &Vault,
    name: &str,
    record: &KeyRecord,
    output: Option<&Path>,
) -> Result<()> {
    match output {
        Some(path) => {
            let staged = staged_output(path)?;
            let mut writer = BufWriter::new(staged);
            vault
                .export(name, record, &mut writer)
                .with_context(|| format!("exporting {name}"))?;
            let staged = writer.into_inner().map_err(|e| e.into_error())?;
            staged
                .persist(path)
                .map_err(|e| e.error)
                .with_context(|| format!("writing {}", path.display()))?;
        }
        None => {
            let stdout = io::stdout();
            vault
                .export(name, record, BufWriter::new(stdout.lock()))
                .with_context(|| format!("exporting {name}"))?;
        }
    }
    Ok(())
}

// ── `vidvault config show` ────────────────────────────────────────────────────

fn cmd_config_show(config: &VaultConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
