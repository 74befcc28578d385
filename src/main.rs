//! mrz-bench - benchmark MRZ recognition engines against labeled images
//!
//! Projects, images, ground truth and detection results live in a local
//! key-value database; statistics are recomputed from it on demand.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use mrz_benchmark::app::BenchmarkApp;
use mrz_benchmark::config::{self, AppConfig, ReportFormat};
use mrz_benchmark::report;
use mrz_benchmark::storage::projects::{self, MoveDirection};
use mrz_benchmark::storage::{self, SqliteStore};

/// mrz-bench - MRZ recognition benchmark
#[derive(Parser, Debug)]
#[command(name = "mrz-bench")]
#[command(about = "Benchmark MRZ recognition engines against labeled images")]
struct Args {
    /// Configuration file (defaults to config.toml in the config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding the configured one
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage benchmark projects
    Project {
        #[command(subcommand)]
        action: ProjectCommand,
    },
    /// List registered engines and their settings
    Engines,
    /// Manage per-project engine settings
    Settings {
        #[command(subcommand)]
        action: SettingsCommand,
    },
    /// Run engines over every image of a project
    Detect {
        project: String,
        /// Engine to run (repeatable; defaults to the project's engines)
        #[arg(short, long = "engine")]
        engines: Vec<String>,
    },
    /// Derive missing ground truth from an engine's results
    Label {
        project: String,
        #[arg(short, long)]
        engine: String,
        /// Replace existing ground truth too
        #[arg(long)]
        overwrite: bool,
    },
    /// Show accuracy statistics
    Stats {
        project: String,
        /// Engine to report (repeatable; defaults to the project's engines)
        #[arg(short, long = "engine")]
        engines: Vec<String>,
        /// Only score images in this category
        #[arg(long)]
        category: Option<String>,
        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<ReportFormat>,
        /// Omit per-image rows
        #[arg(long)]
        no_rows: bool,
    },
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ProjectCommand {
    /// Create an empty project
    Create { name: String },
    /// List projects
    List,
    /// Show a project's images and labels
    Show { name: String },
    /// Import images and ground truth from a directory
    Import { name: String, dir: PathBuf },
    /// Remove all images, labels and results but keep the project
    Clear { name: String },
    /// Delete a project and everything stored for it
    Delete { name: String },
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Show the project's engine configurations
    Show { project: String },
    /// Set one engine setting
    Set {
        project: String,
        engine: String,
        name: String,
        value: String,
    },
    /// Reorder an engine within the project's configurations
    Move {
        project: String,
        engine: String,
        #[arg(value_enum)]
        direction: Direction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Direction {
    Up,
    Down,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose {
        "debug"
    } else if args.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_or_create_config(args.config.as_deref())?;

    if let Command::Config { action } = &args.command {
        return run_config_command(action, &config, args.config.as_deref());
    }

    let database = match args.database.clone().or_else(|| config.storage.database_path.clone()) {
        Some(path) => path,
        None => storage::get_data_dir()?.join("benchmark.sqlite3"),
    };
    let store = SqliteStore::open(&database)
        .with_context(|| format!("Failed to open database {}", database.display()))?;
    let app = BenchmarkApp::new(Box::new(store), config);

    match args.command {
        Command::Project { action } => run_project_command(&app, action),
        Command::Engines => {
            print_engines(&app);
            Ok(())
        }
        Command::Settings { action } => run_settings_command(&app, action),
        Command::Detect { project, engines } => {
            let project = projects::load_project(app.store(), &project)?;
            for engine in app.resolve_engines(&project.name, &engines)? {
                let summary = app
                    .run_detection(&project, &engine)
                    .await
                    .with_context(|| format!("Detection with {engine} failed"))?;
                println!(
                    "{engine}: {} processed, {} failed, {} skipped",
                    summary.processed, summary.failed, summary.skipped
                );
            }
            Ok(())
        }
        Command::Label {
            project,
            engine,
            overwrite,
        } => {
            let project = projects::load_project(app.store(), &project)?;
            let labeled = app.label_from_engine(&project, &engine, overwrite)?;
            println!("Labeled {labeled} images from {engine}");
            Ok(())
        }
        Command::Stats {
            project,
            engines,
            category,
            format,
            no_rows,
        } => {
            let project = projects::load_project(app.store(), &project)?;
            let engines = app.resolve_engines(&project.name, &engines)?;
            let stats = app.statistics(&project, &engines, category.as_deref())?;

            let format = format.unwrap_or(app.config().report.format);
            let show_rows = app.config().report.show_rows && !no_rows;
            print!("{}", report::render(&stats, format, show_rows)?);
            if format == ReportFormat::Json {
                println!();
            }
            Ok(())
        }
        Command::Config { action } => run_config_command(&action, app.config(), args.config.as_deref()),
    }
}

/// Default location of the configuration file
fn default_config_path() -> Result<PathBuf> {
    Ok(storage::get_config_dir()?.join("config.toml"))
}

/// Load configuration from file or fall back to defaults.
///
/// An explicitly given file must exist and parse.
fn load_or_create_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        let config = config::load_config(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    if let Ok(config_path) = default_config_path() {
        if config_path.exists() {
            if let Ok(config) = config::load_config(&config_path) {
                info!("Loaded configuration from {:?}", config_path);
                return Ok(config);
            }
        }
    }
    info!("Using default configuration");
    Ok(AppConfig::default())
}

fn run_config_command(action: &ConfigCommand, config: &AppConfig, explicit: Option<&Path>) -> Result<()> {
    match action {
        ConfigCommand::Init { force } => {
            let path = match explicit {
                Some(path) => path.to_path_buf(),
                None => default_config_path()?,
            };
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            config::save_config(&AppConfig::default(), &path)?;
            println!("Wrote {}", path.display());
        }
        ConfigCommand::Show => print!("{}", toml::to_string_pretty(config)?),
    }
    Ok(())
}

fn run_project_command(app: &BenchmarkApp, action: ProjectCommand) -> Result<()> {
    let store = app.store();
    match action {
        ProjectCommand::Create { name } => {
            projects::create_project(store, &name)?;
            println!("Created project {name}");
        }
        ProjectCommand::List => {
            for name in projects::list_projects(store)? {
                let images = projects::load_project(store, &name)
                    .map(|p| p.images.len())
                    .unwrap_or(0);
                println!("{name} ({images} images)");
            }
        }
        ProjectCommand::Show { name } => print_project(app, &name)?,
        ProjectCommand::Import { name, dir } => {
            let mut project = projects::load_project(store, &name)?;
            let summary = projects::import_directory(store, &mut project, &dir)
                .with_context(|| format!("Failed to import {}", dir.display()))?;
            println!(
                "Imported {} images and {} ground truth files",
                summary.images, summary.ground_truths
            );
        }
        ProjectCommand::Clear { name } => {
            let mut project = projects::load_project(store, &name)?;
            projects::remove_project_files(store, &mut project)?;
            println!("Removed all files of {name}");
        }
        ProjectCommand::Delete { name } => {
            projects::delete_project(store, &name)?;
            println!("Deleted project {name}");
        }
    }
    Ok(())
}

fn print_project(app: &BenchmarkApp, name: &str) -> Result<()> {
    let store = app.store();
    let project = projects::load_project(store, name)?;
    let recorded = projects::recorded_detection_results(store, name)?;

    // Configured engines first, then any other registered ones
    let mut known = app.resolve_engines(name, &[])?;
    for engine in app.registry().engines() {
        if !known.iter().any(|e| e == engine) {
            known.push(engine.to_string());
        }
    }

    println!("{} ({} images)", project.name, project.images.len());
    for (index, image) in project.images.iter().enumerate() {
        let labeled = projects::ground_truth(store, name, image)?.is_some();
        let engines = projects::engines_with_result(&recorded, image, &known);
        println!(
            "  {:>4}  {}  {}  {}",
            index + 1,
            image,
            if labeled { "labeled" } else { "unlabeled" },
            engines.join(",")
        );
    }
    Ok(())
}

fn print_engines(app: &BenchmarkApp) {
    let registry = app.registry();
    for name in registry.engines() {
        println!("{name}");
        let Ok(factory) = registry.factory(name) else {
            continue;
        };
        let defaults = factory.default_settings();
        for def in factory.supported_settings() {
            let default = defaults
                .iter()
                .find(|s| s.name == def.name)
                .map(|s| s.value.as_str())
                .unwrap_or("");
            let options = factory.setting_options(def.name, &defaults);
            if options.is_empty() {
                println!("  {} ({:?}) default={:?}", def.name, def.kind, default);
            } else {
                println!(
                    "  {} ({:?}) default={:?} options={}",
                    def.name,
                    def.kind,
                    default,
                    options.join("|")
                );
            }
        }
    }
}

fn run_settings_command(app: &BenchmarkApp, action: SettingsCommand) -> Result<()> {
    let store = app.store();
    let registry = app.registry();
    match action {
        SettingsCommand::Show { project } => {
            projects::load_project(store, &project)?;
            for config in projects::load_project_reader_configs(store, &project, registry)? {
                println!("{} ({})", config.display_name, config.engine);
                for setting in &config.settings {
                    println!("  {} = {:?}", setting.name, setting.value);
                }
            }
        }
        SettingsCommand::Set {
            project,
            engine,
            name,
            value,
        } => {
            projects::load_project(store, &project)?;
            let mut configs = projects::load_project_reader_configs(store, &project, registry)?;
            projects::update_reader_setting(&mut configs, registry, &engine, &name, &value)?;
            projects::save_project_reader_configs(store, &project, &configs)?;
            println!("{engine}: {name} = {value:?}");
        }
        SettingsCommand::Move {
            project,
            engine,
            direction,
        } => {
            projects::load_project(store, &project)?;
            let mut configs = projects::load_project_reader_configs(store, &project, registry)?;
            let direction = match direction {
                Direction::Up => MoveDirection::Up,
                Direction::Down => MoveDirection::Down,
            };
            if projects::move_reader_config(&mut configs, &engine, direction)? {
                projects::save_project_reader_configs(store, &project, &configs)?;
            }
            let order: Vec<&str> = configs.iter().map(|c| c.engine.as_str()).collect();
            println!("{}", order.join(", "));
        }
    }
    Ok(())
}
