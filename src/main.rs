use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod extract;
mod image;
mod pull;
mod registry;
mod report;
#[cfg(test)]
mod testing;
mod whiteout;

use extract::ExtractOptions;
use image::Platform;
use pull::PullOptions;
use registry::RegistryOptions;
use report::Reporter;

#[derive(Parser)]
#[command(name = "layerpull")]
#[command(about = "Fetch a container image for a platform, print its metadata and extract its layers")]
#[command(version)]
struct Cli {
    /// Image reference to fetch
    #[arg(long, default_value = "alpine:latest")]
    image: String,

    /// Destination directory for extracted files
    #[arg(long, default_value = "./extracted_files")]
    dest: PathBuf,

    /// Image architecture to fetch
    #[arg(long, default_value = "amd64")]
    arch: String,

    /// Image OS to fetch
    #[arg(long, default_value = "linux")]
    os: String,

    /// Architecture variant to fetch (e.g. v7, v8)
    #[arg(long)]
    variant: Option<String>,

    /// Registry username
    #[arg(long, requires = "password")]
    username: Option<String>,

    /// Registry password
    #[arg(long, env = "LAYERPULL_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Talk plain HTTP to the registry
    #[arg(long)]
    insecure: bool,

    /// Honour whiteout markers instead of writing them out as files
    #[arg(long)]
    apply_whiteouts: bool,

    /// When to colorize output
    #[arg(long, value_enum, default_value_t = ColorMode::Auto)]
    color: ColorMode,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl Cli {
    fn pull_options(&self) -> PullOptions {
        PullOptions {
            image: self.image.clone(),
            platform: Platform {
                os: self.os.clone(),
                architecture: self.arch.clone(),
                variant: self.variant.clone(),
            },
            dest: self.dest.clone(),
            registry: RegistryOptions {
                username: self.username.clone(),
                password: self.password.clone(),
                insecure: self.insecure,
            },
            extract: ExtractOptions {
                apply_whiteouts: self.apply_whiteouts,
            },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.debug {
        "layerpull=debug"
    } else {
        "layerpull=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Determine if we should use color
    let use_color = match cli.color {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => atty::is(atty::Stream::Stdout),
    };

    let options = cli.pull_options();
    let mut reporter = Reporter::stdout(use_color);

    match pull::pull(&options, &mut reporter).await {
        Ok(stats) => {
            info!(
                files = stats.files,
                bytes = stats.bytes,
                skipped = stats.skipped,
                dest = %options.dest.display(),
                "Pull finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{}", err);
            ExitCode::from(err.exit_code())
        }
    }
}
