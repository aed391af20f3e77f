use clap::{Parser, Subcommand};
use scribeshelf::config::{self, Config};
use scribeshelf::extract::SpenExtractor;
use scribeshelf::metadata::MetadataTree;
use scribeshelf::pass::{PassKind, render_only, run_pass};
use scribeshelf::repaginate::LibraryBackend;
use scribeshelf::watch::{WatchSession, install_interrupt_handler};
use scribeshelf::{logging, output};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::info;

#[derive(Parser)]
#[command(name = "scribeshelf")]
#[command(about = "Repaginate note-tablet scans into a static document library")]
#[command(long_about = "\
Repaginate note-tablet scans into a static document library

Scans dropped into the source tree are re-cut into pages of a fixed height,
filed under the matching category of the target tree, recorded in
metadata.json and listed on generated index.html pages.

Library structure (from [[layouts]] in config.toml):

  inbox/                             # directories.source
  └── math/algebra/
      └── Groups_240115_093000.pdf   # <title>_<yyMMdd>_<HHmmss>.pdf

  library/                           # directories.target
  ├── index.html
  ├── metadata.json
  └── math/algebra/
      ├── index.html
      ├── groups.pdf                 # repaginated
      └── groups.sdocx               # embedded Samsung Notes data, if any

Run 'scribeshelf gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Path to the library config file
    #[arg(long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Log debug output (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one full pass and exit
    Process,
    /// Run a full pass, then keep processing as files change
    Watch,
    /// Re-render the index pages from metadata.json
    Render,
    /// Print the library in display order
    Tree,
    /// Validate the config and print the layout
    Check,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn open_backend(config: &Config) -> Result<LibraryBackend, Box<dyn std::error::Error>> {
    let library = config.conversion.pdfium_library.as_deref();
    Ok(LibraryBackend::open(library, config.conversion.repaginate)?)
}

fn load(path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    let config = config::load_config(path)?;
    info!(config = %path.display(), "config loaded");
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose)?;

    match cli.command {
        Command::Process => {
            let config = load(&cli.config)?;
            config::init_thread_pool(&config.processing);
            let backend = open_backend(&config)?;
            let report = run_pass(&config, &backend, &SpenExtractor, PassKind::Full)?;
            output::print_pass_report(&report);
        }
        Command::Watch => {
            let config = load(&cli.config)?;
            config::init_thread_pool(&config.processing);
            let backend = open_backend(&config)?;
            let cancel = Arc::new(AtomicBool::new(false));
            install_interrupt_handler(Arc::clone(&cancel))?;

            let report = run_pass(&config, &backend, &SpenExtractor, PassKind::Full)?;
            output::print_pass_report(&report);

            let mut session = WatchSession {
                config_path: cli.config.clone(),
                config,
                backend: &backend,
                extractor: &SpenExtractor,
                cancel,
            };
            session.run_loop()?;
        }
        Command::Render => {
            let config = load(&cli.config)?;
            let summary = render_only(&config)?;
            println!(
                "Rendered {} pages, removed {} stale",
                summary.written.len(),
                summary.removed.len()
            );
        }
        Command::Tree => {
            let config = load(&cli.config)?;
            let tree = MetadataTree::load(config.target_root())?;
            output::print_tree(&tree);
        }
        Command::Check => {
            println!("==> Checking {}", cli.config.display());
            let config = load(&cli.config)?;
            println!("Source: {}", config.source_root().display());
            println!("Target: {}", config.target_root().display());
            output::print_layout(&config.layouts);
            println!("==> Config is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}
