//! fcrepo_wrapper CLI
//!
//! Downloads, installs and runs a local Fedora repository until Ctrl-C.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;

use fcrepo_wrapper::core::downloader::{DownloadProgress, ProgressObserver};
use fcrepo_wrapper::{ConfigLoader, ManagedInstance, Options, WrapperError, WrapperResult};

#[derive(Debug, Parser)]
#[command(name = "fcrepo_wrapper", about = "Run a local Fedora Commons repository")]
struct Cli {
    /// YAML config file; may be repeated, later files win
    #[arg(short, long = "config")]
    config: Vec<PathBuf>,

    /// Show service output and debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Fedora version to download and install
    #[arg(long = "fcrepo-version")]
    version: Option<String>,

    /// Port to run Fedora on
    #[arg(short, long, conflicts_with = "random_port")]
    port: Option<String>,

    /// Pick a free port at startup
    #[arg(long)]
    random_port: bool,

    /// Directory to install Fedora into
    #[arg(short, long)]
    instance_dir: Option<PathBuf>,

    /// Directory to keep the downloaded jar and its checksum in
    #[arg(short, long)]
    download_dir: Option<PathBuf>,

    /// Skip checksum validation of the download
    #[arg(long)]
    no_checksum: bool,

    /// Use the download even when its checksum does not match
    #[arg(long)]
    ignore_checksum: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Remove the installed instance, downloads and version marker
    Clean,
}

impl Cli {
    fn options(&self) -> Options {
        let mut options = Options::new();
        if !self.config.is_empty() {
            let paths = self
                .config
                .iter()
                .map(|p| Value::from(p.to_string_lossy().into_owned()))
                .collect::<Vec<_>>();
            options.insert("config", paths);
        }
        if self.verbose {
            options.insert("verbose", true);
        }
        if let Some(version) = &self.version {
            options.insert("version", version.clone());
        }
        if let Some(port) = &self.port {
            options.insert("port", port.clone());
        }
        if self.random_port {
            options.insert("port", Value::Null);
        }
        if let Some(dir) = &self.instance_dir {
            options.insert("instance_dir", dir.to_string_lossy().into_owned());
        }
        if let Some(dir) = &self.download_dir {
            options.insert("download_dir", dir.to_string_lossy().into_owned());
        }
        if self.no_checksum {
            options.insert("validate", false);
        }
        if self.ignore_checksum {
            options.insert("ignore_md5sum", true);
        }
        options
    }
}

/// Renders downloads as a terminal progress bar.
#[derive(Default)]
struct BarProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl BarProgress {
    fn slot(&self) -> std::sync::MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ProgressObserver for BarProgress {
    fn started(&self, progress: &DownloadProgress) {
        let bar = match progress.total_bytes {
            Some(total) if total > 0 => {
                let bar = ProgressBar::new(total);
                if let Ok(style) = ProgressStyle::with_template(
                    "{msg}: |{bar:40}| {bytes}/{total_bytes} ({eta})",
                ) {
                    bar.set_style(style);
                }
                bar
            }
            _ => ProgressBar::new_spinner(),
        };
        bar.set_message(progress.file_name.clone());
        *self.slot() = Some(bar);
    }

    fn advanced(&self, progress: &DownloadProgress) {
        if let Some(bar) = self.slot().as_ref() {
            bar.set_position(progress.bytes_downloaded);
        }
    }

    fn finished(&self, _progress: &DownloadProgress) {
        if let Some(bar) = self.slot().take() {
            bar.finish_and_clear();
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    fcrepo_wrapper::init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> WrapperResult<()> {
    let options = ConfigLoader::new().load(cli.options())?;
    let mut instance = ManagedInstance::builder(options)
        .progress(Arc::new(BarProgress::default()))
        .build()?;

    match cli.command {
        Some(Command::Clean) => {
            instance.clean().await;
            println!("Cleaned up fcrepo files for version {}", instance.version());
            Ok(())
        }
        None => {
            println!("Starting fcrepo {} on port {}", instance.version(), instance.port());
            instance
                .wrap(|handle| async move {
                    println!("{} is running at {}", handle.version, handle.url);
                    println!("Press Ctrl-C to stop");
                    tokio::signal::ctrl_c()
                        .await
                        .map_err(|e| WrapperError::Other(format!("Signal handler failed: {e}")))?;
                    println!("Stopping fcrepo...");
                    Ok(())
                })
                .await
        }
    }
}
