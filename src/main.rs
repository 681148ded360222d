use clap::{Parser, Subcommand};
use cms_rebuild::config::{self, Config};
use cms_rebuild::coordinator::BuildCoordinator;
use cms_rebuild::pipeline::{Pipeline, PipelineSettings};
use cms_rebuild::runner::ShellRunner;
use cms_rebuild::types::CmsData;
use cms_rebuild::{export, output, server};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Shared flag for commands that take CMS data from a file.
#[derive(clap::Args, Clone)]
struct DataArgs {
    /// JSON file with CMS data (pages, blogArticles, catRows, settings,
    /// uploads). Omitted categories come from the snapshot.
    #[arg(long)]
    data: Option<PathBuf>,
}

#[derive(Parser)]
#[command(name = "cms-rebuild")]
#[command(about = "Export CMS data and rebuild the static site")]
#[command(long_about = "\
Export CMS data and rebuild the static site

The HTTP service accepts build requests from the CMS editor, writes the
posted data as JSON artifacts, rebuilds the site project, and publishes
its output. One build runs at a time.

Layout (defaults, relative to the config file):

  cms-rebuild.toml
  data/cms-snapshot.json       # Last full payload
  site/                        # Static-site project
  ├── package.json
  ├── node_modules/            # Installed on demand
  ├── src/data/                # Exported artifacts
  │   ├── pages.json
  │   ├── blog-articles.json
  │   ├── cat-rows.json
  │   └── settings.json
  └── dist/                    # Build output
  public/                      # Published site

Run 'cms-rebuild gen-config' to generate a documented config file.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = "cms-rebuild.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP build service
    Serve {
        /// Override server.bind
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Run one full build in the foreground
    Build(DataArgs),
    /// Write artifacts and snapshot without building
    Export(DataArgs),
    /// Validate the config and show resolved paths
    Check,
    /// Print a stock config with all options documented
    GenConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind } => {
            let config = config::load_config(&cli.config)?;
            let addr = match bind {
                Some(addr) => addr,
                None => config.server.bind.parse()?,
            };
            let site_dir = config
                .server
                .serve_site
                .then(|| config.paths.publish_dir.clone());
            let coordinator = BuildCoordinator::new(
                pipeline(&config),
                config.build.queue_policy,
                config.build.requeue_delay(),
            );
            server::serve(addr, coordinator, site_dir).await?;
        }
        Command::Build(data_args) => {
            let config = config::load_config(&cli.config)?;
            let data = read_data(data_args.data.as_deref())?;
            let base = config_base(&cli.config);
            println!("==> Building {}", config.paths.site_dir.display());
            let report = pipeline(&config).run(data).await?;
            output::print_build_output(&report, base.as_deref());
        }
        Command::Export(data_args) => {
            let config = config::load_config(&cli.config)?;
            let data = read_data(data_args.data.as_deref())?;
            let base = config_base(&cli.config);
            let settings = PipelineSettings::from_config(&config);
            let summary = export::export(data, &settings.export)?;
            output::print_export_output(&summary, base.as_deref());
        }
        Command::Check => {
            let config = config::load_config(&cli.config)?;
            print_check(&cli.config, &config);
            println!("==> Config is valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn pipeline(config: &Config) -> Pipeline {
    Pipeline::new(
        PipelineSettings::from_config(config),
        Arc::new(ShellRunner::new()),
    )
}

/// Read a CMS data file, or start empty so everything comes from the
/// snapshot.
fn read_data(path: Option<&Path>) -> Result<CmsData, Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            let content = std::fs::read_to_string(p)?;
            Ok(serde_json::from_str(&content)?)
        }
        None => Ok(CmsData::default()),
    }
}

/// Directory paths are displayed relative to.
fn config_base(config_path: &Path) -> Option<PathBuf> {
    match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => Some(dir.to_path_buf()),
        _ => std::env::current_dir().ok(),
    }
}

fn print_check(config_path: &Path, config: &Config) {
    let source = if config_path.exists() {
        config_path.display().to_string()
    } else {
        format!("{} (not found, using defaults)", config_path.display())
    };
    let settings = PipelineSettings::from_config(config);
    println!("Config: {source}");
    println!("    Bind: {}", config.server.bind);
    println!("    Queue policy: {:?}", config.build.queue_policy);
    println!("    Export: {}", settings.export.export_dir.display());
    println!("    Snapshot: {}", settings.export.snapshot_file.display());
    println!("    Site: {}", settings.site_dir.display());
    println!("    Output: {}", settings.build_output.display());
    println!("    Publish: {}", settings.publish_dir.display());
    println!("    Install: {}", settings.install_command);
    println!("    Build: {}", settings.build_command);
}
