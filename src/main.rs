//! Command-line front end for the OmniRead library.
//!
//! Loads `conf/config.toml` (or `$OMNIREAD_CONFIG_PATH`), builds a reader host
//! over the configured data directory and runs one subcommand against it.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use omniread_core::config::{AppConfig, config_path, load_config, serialize_config};
use omniread_core::host::{ReaderHost, ingest_paths, open_book};
use omniread_core::input::{InputScope, KeyPress};
use omniread_core::session::SessionSnapshot;
use omniread_core::{ColorScheme, LayoutMode, ThemePatch};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

#[derive(Debug, Parser)]
#[command(name = "omniread", version, about = "E-book library and reader")]
struct Cli {
    /// Config file to load instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Add EPUB files to the library.
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// List the library, oldest first.
    List,
    /// Remove every book from the library.
    Clear,
    /// Open a book by hash (or unique hash prefix) and read interactively.
    Read {
        hash: String,
        #[arg(long)]
        mode: Option<LayoutMode>,
    },
    /// Print the effective configuration as TOML.
    Config,
    /// Show the saved reading theme, updating it when any option is given.
    Theme {
        #[arg(long)]
        scheme: Option<ColorScheme>,
        #[arg(long)]
        scale: Option<u16>,
        #[arg(long)]
        font: Option<String>,
    },
}

fn main() {
    let reload_handle = init_tracing();
    if let Err(err) = run(&reload_handle) {
        error!("{err:?}");
        std::process::exit(1);
    }
}

fn run(reload_handle: &ReloadHandle) -> Result<()> {
    let cli = Cli::parse();
    let path = cli.config.unwrap_or_else(config_path);
    let config = load_config(&path);
    set_log_level(reload_handle, config.log_level.as_filter_str());
    info!(
        config = %path.display(),
        data_dir = %config.data_dir,
        level = %config.log_level,
        "Starting OmniRead"
    );

    let host = ReaderHost::from_config(config.clone()).context("Failed to open library")?;
    let host = Arc::new(Mutex::new(host));
    install_shutdown_handler(&host);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let result = match cli.command {
        Command::Add { paths } => runtime.block_on(add_books(&host, paths)),
        Command::List => list_books(&host),
        Command::Clear => clear_library(&host),
        Command::Config => print_config(&config),
        Command::Read { hash, mode } => {
            runtime.block_on(read_book(&host, &config, &hash, mode))
        }
        Command::Theme {
            scheme,
            scale,
            font,
        } => update_theme(
            &host,
            ThemePatch {
                color_scheme: scheme,
                font_scale_percent: scale,
                font_family: font,
            },
        ),
    };
    finalize_shutdown(&host);
    result
}

fn with_host<T>(
    host: &Mutex<ReaderHost>,
    f: impl FnOnce(&mut ReaderHost) -> Result<T>,
) -> Result<T> {
    let mut guard = host.lock().map_err(|_| anyhow!("reader host lock poisoned"))?;
    f(&mut guard)
}

async fn add_books(host: &Mutex<ReaderHost>, paths: Vec<PathBuf>) -> Result<()> {
    let report = ingest_paths(host, paths).await?;
    for (path, outcome) in &report.outcomes {
        match outcome {
            Ok(book) => println!("added   {}  {}", book.entry.hash.short(), book.entry.title),
            Err(err) if err.is_informational() => println!("skipped {}: {err}", path.display()),
            Err(err) => println!("failed  {}: {err}", path.display()),
        }
    }
    println!("{}", report.summary());
    Ok(())
}

fn list_books(host: &Mutex<ReaderHost>) -> Result<()> {
    let books = with_host(host, |host| Ok(host.list_books()?))?;
    if books.is_empty() {
        println!("Library is empty");
    }
    for book in books {
        let location = book
            .last_location
            .as_ref()
            .map(|bookmark| format!("  @ {}", bookmark.as_str()))
            .unwrap_or_default();
        println!(
            "{}  {} ({}){location}",
            book.hash.short(),
            book.title,
            book.author
        );
    }
    Ok(())
}

fn clear_library(host: &Mutex<ReaderHost>) -> Result<()> {
    let removed = with_host(host, |host| Ok(host.clear_library()?))?;
    println!("Removed {removed} book(s)");
    Ok(())
}

fn print_config(config: &AppConfig) -> Result<()> {
    let text = serialize_config(config).context("Failed to serialize config")?;
    print!("{text}");
    Ok(())
}

fn update_theme(host: &Mutex<ReaderHost>, patch: ThemePatch) -> Result<()> {
    let theme = with_host(host, |host| {
        Ok(if patch.is_empty() {
            host.theme().clone()
        } else {
            host.apply_theme(patch)
        })
    })?;
    println!(
        "{} scheme, {}% {}",
        theme.color_scheme, theme.font_scale_percent, theme.font_family
    );
    println!("{}", theme.rules().to_css());
    Ok(())
}

async fn read_book(
    host: &Mutex<ReaderHost>,
    config: &AppConfig,
    hash: &str,
    mode: Option<LayoutMode>,
) -> Result<()> {
    if let Some(mode) = mode {
        with_host(host, |host| Ok(host.change_layout_mode(mode)?))?;
    }
    let snapshot = open_book(host, hash).await?;
    print_snapshot(&snapshot, false);
    println!(
        "keys: {} next, {} prev, {} contents, {} layout, {} close; `:toc N` jumps",
        config.key_next_page,
        config.key_prev_page,
        config.key_toggle_toc,
        config.key_cycle_layout,
        config.key_close
    );

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush().ok();
        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("Failed to read from stdin")?;
        let line = line.trim();
        // A bare Enter pages forward.
        let input = if line.is_empty() { "right" } else { line };

        let outcome = with_host(host, |host| {
            if let Some(index) = input.strip_prefix(":toc") {
                let index: usize = index.trim().parse().context("expected `:toc <index>`")?;
                host.jump_to_toc(index)?;
            } else {
                let press = KeyPress::parse(input).ok_or_else(|| anyhow!("unrecognized key"))?;
                if host.handle_key(InputScope::Window, &press, Instant::now())?.is_none() {
                    warn!(key = %input, "Key is not bound to an action");
                }
            }
            Ok((host.snapshot(), host.panels().show_toc))
        });
        match outcome {
            Ok((Some(snapshot), show_toc)) => print_snapshot(&snapshot, show_toc),
            Ok((None, _)) => break,
            Err(err) => println!("error: {err:#}"),
        }
    }
    Ok(())
}

fn print_snapshot(snapshot: &SessionSnapshot, show_toc: bool) {
    println!();
    println!(
        "{} by {}  [{}]  {}/{}",
        snapshot.title,
        snapshot.author,
        snapshot.layout_mode,
        snapshot.view.position + 1,
        snapshot.view.total.max(1)
    );
    if show_toc {
        for (index, entry) in snapshot.table_of_contents.iter().enumerate() {
            println!("{index:>3}  {}{}", "  ".repeat(entry.depth), entry.label);
        }
        return;
    }
    for (index, page) in snapshot.view.pages.iter().enumerate() {
        if index > 0 {
            println!("{}", "-".repeat(24));
        }
        println!("{page}");
    }
    if let Some(err) = &snapshot.error {
        println!("error: {err}");
    }
}

fn install_shutdown_handler(host: &Arc<Mutex<ReaderHost>>) {
    let host = Arc::clone(host);
    if let Err(err) = ctrlc::set_handler(move || {
        info!("Received Ctrl+C; running safe shutdown housekeeping");
        finalize_shutdown(&host);
        std::process::exit(130);
    }) {
        warn!("Failed to install Ctrl+C signal handler: {err}");
    }
}

fn finalize_shutdown(host: &Mutex<ReaderHost>) {
    match host.lock() {
        Ok(mut guard) => guard.shutdown(),
        Err(_) => warn!("Reader host lock poisoned; skipping shutdown housekeeping"),
    }
}

fn init_tracing() -> ReloadHandle {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let (filter_layer, handle) = reload::Layer::new(env_filter);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter_layer),
        )
        .init();
    warn!("Logging initialized; override level with config.log_level or RUST_LOG");
    handle
}

fn set_log_level(handle: &ReloadHandle, level: &str) {
    let parsed = EnvFilter::builder()
        .parse(level)
        .unwrap_or_else(|_| EnvFilter::new("debug"));
    if let Err(err) = handle.modify(|filter| *filter = parsed.clone()) {
        warn!(%level, "Failed to update log level from config: {err}");
    } else {
        info!(%level, "Applied log level from config");
    }
}
