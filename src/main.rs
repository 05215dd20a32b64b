// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Lepidoptera: butterfly-farm dashboard
//!
//! Command-line access to the reference catalog, farm records, sales and
//! image classifiers, plus the web dashboard server.

use chrono::Local;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use lepidoptera::auth::{self, LOGIN_RECORDS_FILE};
use lepidoptera::catalog::{self, ReferenceCatalog};
use lepidoptera::classify::{self, ClassificationLog, ClassifierKind, ModelRegistry};
use lepidoptera::config::AppConfig;
use lepidoptera::db::Database;
use lepidoptera::sales::{self, Order, SaleForm, ITEMS, PURCHASES_FILE, SALES_FILE};
use lepidoptera::store;
use lepidoptera::tasks::{
    parse_day, CareBook, CareForm, Schedule, TaskBook, TaskForm, CARE_FILE, SCHEDULE_FILE,
    TASKS_FILE,
};
use lepidoptera::{LepiError, Result};

/// Lepidoptera CLI - butterfly-farm dashboard
#[derive(Parser, Debug)]
#[command(name = "lepidoptera")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version = "1.0.0")]
#[command(about = "Butterfly-farm records, sales and image classifiers", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the web dashboard
    Serve {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Classify one or more images
    Classify {
        /// Classifier: species, life_stages, pupae_defects or larval_diseases
        #[arg(short, long, default_value = "species")]
        kind: String,

        /// Images to classify
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Store the images and append results to the classification log
        #[arg(long)]
        log: bool,
    },

    /// Reference catalog lookups
    Catalog {
        #[command(subcommand)]
        action: CatalogCommands,
    },

    /// Daily farm tasks
    Tasks {
        #[command(subcommand)]
        action: TaskCommands,
    },

    /// Butterfly care records
    Care {
        #[command(subcommand)]
        action: CareCommands,
    },

    /// Daily change schedule
    Schedule {
        #[command(subcommand)]
        action: ScheduleCommands,
    },

    /// Pupae sales ledger
    Sales {
        #[command(subcommand)]
        action: SalesCommands,
    },

    /// Point of sale
    Pos {
        #[command(subcommand)]
        action: PosCommands,
    },

    /// User accounts and login records
    Users {
        #[command(subcommand)]
        action: UserCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Initialize a new farm directory
    Init {
        /// Directory to initialize (default: current)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Show classifier and data status
    Status,
}

#[derive(Subcommand, Debug)]
enum CatalogCommands {
    /// List species with their scientific names
    Species,

    /// Host plants of a species
    HostPlants {
        /// Species name, e.g. "Butterfly-Clippers"
        species: String,
    },

    /// Class labels and catalog attributes of a classifier, in model output order
    Classes {
        kind: String,
    },
}

#[derive(Subcommand, Debug)]
enum TaskCommands {
    /// List registered tasks
    List,

    /// Register a task
    Add {
        /// Day (YYYY-MM-DD), default today
        #[arg(long)]
        day: Option<String>,

        /// Hour (HH:MM or HH:MM:SS)
        #[arg(long)]
        hour: String,

        #[arg(long)]
        activity: String,

        #[arg(long)]
        species: String,

        #[arg(long, default_value = "")]
        details: String,
    },

    /// Task counts per activity and per species
    Distribution,
}

#[derive(Subcommand, Debug)]
enum CareCommands {
    /// List care records
    List,

    /// Record a care activity
    Add {
        /// Day (YYYY-MM-DD), default today
        #[arg(long)]
        day: Option<String>,

        #[arg(long)]
        hour: String,

        #[arg(long)]
        species: String,

        #[arg(long)]
        activity: String,
    },
}

#[derive(Subcommand, Debug)]
enum ScheduleCommands {
    /// List scheduled changes
    List,

    /// Schedule a change for today or later
    Add {
        /// Date (YYYY-MM-DD)
        #[arg(long)]
        date: String,

        message: String,
    },
}

#[derive(Subcommand, Debug)]
enum SalesCommands {
    /// List sales, newest first
    List {
        /// Only sales by this seller
        #[arg(long)]
        seller: Option<String>,
    },

    /// Record a sale
    Record {
        #[arg(long)]
        purchaser: String,

        #[arg(long)]
        company: String,

        /// Company name when --company is "Other"
        #[arg(long)]
        other_company: Option<String>,

        #[arg(long)]
        quantity: u32,

        #[arg(long)]
        species: String,

        /// Defaults to the farm seller
        #[arg(long)]
        seller: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum PosCommands {
    /// List items for sale
    Items,

    /// Complete an order
    Order {
        /// Lines as ITEM_ID:QUANTITY
        #[arg(required = true)]
        lines: Vec<String>,

        /// Image filename recorded with the order
        #[arg(long)]
        image_filename: Option<String>,
    },

    /// Purchase history
    History,
}

#[derive(Subcommand, Debug)]
enum UserCommands {
    /// List accounts
    List,

    /// Create an account
    Add {
        username: String,

        #[arg(long)]
        password: String,
    },

    /// Show login attempts
    Records,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if !cli.quiet {
        info!("Lepidoptera v1.0.0 - butterfly-farm dashboard");
    }

    let config = AppConfig::load(&cli.config)?;
    let json = cli.format == "json";

    match cli.command {
        Some(Commands::Serve { host, port }) => run_serve(config, host, port).await,
        Some(Commands::Classify { kind, images, log }) => {
            let kind: ClassifierKind = kind.parse()?;
            tokio::task::spawn_blocking(move || run_classify(&config, kind, &images, log, json))
                .await
                .map_err(|e| LepiError::Task(e.to_string()))?
        }
        Some(Commands::Catalog { action }) => run_catalog_command(&config, action, json),
        Some(Commands::Tasks { action }) => run_task_command(&config, action, json),
        Some(Commands::Care { action }) => run_care_command(&config, action, json),
        Some(Commands::Schedule { action }) => run_schedule_command(&config, action, json),
        Some(Commands::Sales { action }) => run_sales_command(&config, action, json),
        Some(Commands::Pos { action }) => run_pos_command(&config, action, json),
        Some(Commands::Users { action }) => run_user_command(&config, action, json),
        Some(Commands::Config { action }) => run_config_command(config, action, &cli.config),
        Some(Commands::Init { dir, force }) => run_init(dir, force),
        Some(Commands::Status) => run_status(&config),
        None => run_serve(config, None, None).await,
    }
}

/// Print `value` as JSON, or run the text printer
fn emit<T: Serialize + ?Sized>(json: bool, value: &T, text: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        text(value);
    }
    Ok(())
}

fn day_or_today(day: Option<String>) -> String {
    day.unwrap_or_else(|| Local::now().date_naive().to_string())
}

async fn run_serve(mut config: AppConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.web.host = host;
    }
    if let Some(port) = port {
        config.web.port = port;
    }
    if !config.web.enabled {
        warn!("Web UI is disabled in the configuration; starting anyway");
    }

    config.ensure_dirs()?;
    let db = Database::open(&config.database.path)?;
    info!("Database: {}", config.database.path);

    lepidoptera::web::start_server(config, db).await
}

#[derive(Serialize)]
struct ClassifiedImage {
    path: PathBuf,
    #[serde(flatten)]
    prediction: classify::Prediction,
    logged: bool,
}

fn run_classify(
    config: &AppConfig,
    kind: ClassifierKind,
    images: &[PathBuf],
    log: bool,
    json: bool,
) -> Result<()> {
    let registry = ModelRegistry::new(config);
    if registry.model(kind).is_none() {
        return Err(LepiError::ModelNotLoaded(kind.label().to_string()));
    }
    let log_path = config.classification_log_path(kind);
    let log_file = ClassificationLog::new(log_path, registry.catalog(kind));

    let mut results = Vec::new();
    for path in images {
        let bytes = std::fs::read(path)?;
        let prediction = match registry.classify(kind, &bytes) {
            Ok(prediction) => prediction,
            Err(e) => {
                warn!("Could not classify {:?}: {}", path, e);
                continue;
            }
        };

        let mut logged = false;
        if log {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "upload.jpg".to_string());
            let stored = classify::save_upload(&config.paths.upload_dir, &name, &bytes)?;
            let stored_name = stored
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or(name);
            logged = log_file.record(&prediction, &stored_name, &config.farm.location)?;
        }
        results.push(ClassifiedImage { path: path.clone(), prediction, logged });
    }

    emit(json, &results, |results| {
        for r in results {
            match r.prediction.classification.label() {
                Some(label) => println!(
                    "{}: {} ({:.2}%){}",
                    r.path.display(),
                    label,
                    r.prediction.classification.confidence(),
                    if r.logged { " [logged]" } else { "" }
                ),
                None => println!("{}: unknown class", r.path.display()),
            }
            for (name, value) in &r.prediction.details {
                println!("    {}: {}", name, value);
            }
        }
    })
}

fn run_catalog_command(config: &AppConfig, action: CatalogCommands, json: bool) -> Result<()> {
    match action {
        CatalogCommands::Species => emit(json, catalog::SPECIES, |species| {
            for s in species {
                println!("{:<32} {} ({})", s.name, s.scientific_name, s.family);
            }
        }),
        CatalogCommands::HostPlants { species } => {
            let plants = catalog::host_plants(&species)
                .ok_or_else(|| LepiError::Validation(format!("Unknown species: {}", species)))?;
            emit(json, &plants, |plants| println!("{}: {}", species, plants))
        }
        CatalogCommands::Classes { kind } => {
            let kind: ClassifierKind = kind.parse()?;
            let catalog = ReferenceCatalog::configured(config, kind);
            emit(json, catalog.entries(), |entries| {
                for (i, entry) in entries.iter().enumerate() {
                    println!("{:>3}  {}", i, entry.label);
                    for (name, value) in &entry.attributes {
                        println!("       {}: {}", name, value);
                    }
                }
            })
        }
    }
}

fn run_task_command(config: &AppConfig, action: TaskCommands, json: bool) -> Result<()> {
    let mut book = TaskBook::load(config.data_file(TASKS_FILE));

    match action {
        TaskCommands::List => emit(json, book.records(), |tasks| {
            for t in tasks {
                println!(
                    "{} {}  {:<28} {:<28} {}",
                    t.day, t.hour, t.activity, t.species, t.details
                );
            }
        }),
        TaskCommands::Add { day, hour, activity, species, details } => {
            let form = TaskForm { day: day_or_today(day), hour, activity, details, species };
            let record = form.into_record()?;
            book.add(record.clone())?;
            emit(json, &record, |t| {
                println!("Task added: {} for {} on {}", t.activity, t.species, t.day)
            })
        }
        TaskCommands::Distribution => {
            let distribution = serde_json::json!({
                "by_activity": book.activity_distribution(),
                "by_species": book.species_distribution(),
            });
            emit(json, &distribution, |_| {
                println!("By activity:");
                for (activity, n) in book.activity_distribution() {
                    println!("  {:<28} {}", activity, n);
                }
                println!("By species:");
                for (species, n) in book.species_distribution() {
                    println!("  {:<28} {}", species, n);
                }
            })
        }
    }
}

fn run_care_command(config: &AppConfig, action: CareCommands, json: bool) -> Result<()> {
    let mut book = CareBook::load(config.data_file(CARE_FILE));

    match action {
        CareCommands::List => emit(json, book.records(), |records| {
            for c in records {
                println!("{} {}  {:<28} {}", c.day, c.hour, c.species, c.activity);
            }
        }),
        CareCommands::Add { day, hour, species, activity } => {
            let form = CareForm { day: day_or_today(day), hour, species, activity };
            let record = form.into_record()?;
            book.add(record.clone())?;
            emit(json, &record, |c| {
                println!("Care recorded: {} for {} on {}", c.activity, c.species, c.day)
            })
        }
    }
}

fn run_schedule_command(config: &AppConfig, action: ScheduleCommands, json: bool) -> Result<()> {
    let today = Local::now().date_naive();
    let mut schedule = Schedule::load(config.data_file(SCHEDULE_FILE), today);

    match action {
        ScheduleCommands::List => emit(json, schedule.changes(), |changes| {
            for c in changes {
                println!("{}  {}", c.date, c.message);
            }
        }),
        ScheduleCommands::Add { date, message } => {
            schedule.schedule(parse_day(&date)?, &message, today)?;
            emit(json, schedule.changes(), |_| println!("Change scheduled for {}", date))
        }
    }
}

fn run_sales_command(config: &AppConfig, action: SalesCommands, json: bool) -> Result<()> {
    let path = config.data_file(SALES_FILE);

    match action {
        SalesCommands::List { seller } => {
            let sales = sales::load_sales(&path, seller.as_deref())?;
            emit(json, &sales, |sales| {
                for s in sales {
                    println!(
                        "{}  {:<12} {:<20} {:<24} {:>5}  {}",
                        s.timestamp, s.seller, s.purchaser, s.company, s.quantity, s.species
                    );
                }
            })
        }
        SalesCommands::Record { purchaser, company, other_company, quantity, species, seller } => {
            let seller = seller.unwrap_or_else(|| config.farm.default_seller.clone());
            let form = SaleForm { purchaser, company, other_company, quantity, species };
            let sale = form.into_record(&seller, Local::now())?;
            sales::record_sale(&path, &sale)?;
            emit(json, &sale, |s| {
                println!("Sale recorded for: {} from {}!", s.purchaser, s.company)
            })
        }
    }
}

/// Parse an `ITEM_ID:QUANTITY` order line
fn parse_line(line: &str) -> Result<(u32, u32)> {
    let invalid = || {
        LepiError::Validation(format!("Invalid order line '{}', expected ITEM_ID:QUANTITY", line))
    };
    let (id, qty) = line.split_once(':').ok_or_else(invalid)?;
    Ok((id.trim().parse().map_err(|_| invalid())?, qty.trim().parse().map_err(|_| invalid())?))
}

fn run_pos_command(config: &AppConfig, action: PosCommands, json: bool) -> Result<()> {
    let path = config.data_file(PURCHASES_FILE);

    match action {
        PosCommands::Items => emit(json, ITEMS, |items| {
            for i in items {
                println!("{:>3}  {:<24} {}", i.id, i.name, sales::money(u64::from(i.price)));
            }
        }),
        PosCommands::Order { lines, image_filename } => {
            let mut order = Order::new();
            for line in &lines {
                let (id, qty) = parse_line(line)?;
                order.add(id, qty)?;
            }
            let image = image_filename.as_deref();
            let receipt = sales::complete_purchase(&path, &order, image, None, Local::now())?;
            emit(json, &receipt, |r| {
                println!("Order No: #{}  {}", r.order_number, r.date_time);
                for l in &r.lines {
                    println!("  {}x {:<24} {}", l.quantity, l.name, sales::money(l.subtotal));
                }
                println!("Total: {}", sales::money(r.total));
            })
        }
        PosCommands::History => {
            let history: Vec<sales::PurchaseRecord> = store::load_records(&path)?;
            emit(json, &history, |history| {
                for p in history {
                    println!(
                        "{}  #{}  item {:>2} x{:<3} {:>8}  {}",
                        p.date,
                        p.order_number,
                        p.classification_code,
                        p.quantity,
                        sales::money(p.amount),
                        p.image_filename
                    );
                }
            })
        }
    }
}

fn run_user_command(config: &AppConfig, action: UserCommands, json: bool) -> Result<()> {
    match action {
        UserCommands::List => {
            let db = Database::open(&config.database.path)?;
            emit(json, &db.list_users()?, |users| {
                for u in users {
                    println!("{:<24} {}", u.username, u.created_at);
                }
            })
        }
        UserCommands::Add { username, password } => {
            let db = Database::open(&config.database.path)?;
            auth::sign_up(&db, &username, &password)?;
            emit(json, &username, |u| println!("Created account for {}", u))
        }
        UserCommands::Records => {
            let records = auth::login_records(&config.data_file(LOGIN_RECORDS_FILE))?;
            emit(json, &records, |records| {
                for r in records {
                    println!("{}  {:<24} {:?}", r.timestamp, r.username, r.status);
                }
            })
        }
    }
}

fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            println!("Configuration at {:?} is valid", config_path);
            println!("  Data directory: {:?}", config.paths.data_dir);
            println!("  Model directory: {:?}", config.paths.model_dir);
            println!("  Database: {}", config.database.path);
            for kind in ClassifierKind::ALL {
                let path = config.model_path(kind);
                if config.classifiers.get(kind).enabled && !path.exists() {
                    warn!("{} model not found at {:?}", kind, path);
                }
            }
        }
    }

    Ok(())
}

fn run_status(config: &AppConfig) -> Result<()> {
    println!("Lepidoptera v1.0.0 Status");
    println!("=========================");

    let registry = ModelRegistry::new(config);
    let ready = registry.preload();
    println!("\nClassifiers ({} of {} ready):", ready, ClassifierKind::ALL.len());
    for kind in ClassifierKind::ALL {
        println!(
            "  {:<18} {:<14} {}",
            kind.label(),
            registry.status(kind).description(),
            config.model_path(kind).display()
        );
    }

    println!("\nData files ({}):", config.paths.data_dir.display());
    let mut files: Vec<String> = vec![
        TASKS_FILE.into(),
        CARE_FILE.into(),
        SCHEDULE_FILE.into(),
        SALES_FILE.into(),
        PURCHASES_FILE.into(),
        LOGIN_RECORDS_FILE.into(),
    ];
    files.extend(ClassifierKind::ALL.iter().map(|k| config.classifiers.get(*k).log_file.clone()));
    for name in files {
        let table = store::load_table(&config.data_file(&name));
        println!("  {:<40} {} rows", name, table.len());
    }

    match Database::open(&config.database.path).and_then(|db| db.user_count()) {
        Ok(count) => println!("\nDatabase ({}): {} users", config.database.path, count),
        Err(e) => println!("\nDatabase: Error - {}", e),
    }

    Ok(())
}

fn run_init(dir: Option<PathBuf>, force: bool) -> Result<()> {
    let target = dir.unwrap_or_else(|| PathBuf::from("."));
    let config_path = target.join("config.json");

    if config_path.exists() && !force {
        return Err(LepiError::Config(
            "config.json already exists. Use --force to overwrite".to_string(),
        ));
    }

    let mut config = AppConfig::default();
    config.paths.data_dir = target.join("Data");
    config.paths.upload_dir = target.join("upload");
    config.paths.model_dir = target.join("model");
    config.ensure_dirs()?;
    std::fs::create_dir_all(&config.paths.model_dir)?;
    config.save(&config_path)?;

    println!("Lepidoptera initialized in {:?}", target);
    println!("\nCreated:");
    println!("  - config.json");
    println!("  - Data/");
    println!("  - upload/");
    println!("  - model/");
    println!("\nNext steps:");
    println!("  1. Copy the classifier .onnx files into model/");
    println!("  2. Start the dashboard: lepidoptera serve");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["lepidoptera"]).unwrap();
        assert!(!cli.verbose);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_classify_command() {
        let cli = Cli::try_parse_from([
            "lepidoptera", "classify", "--kind", "life_stages", "/tmp/egg.jpg", "--log",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Classify { kind, images, log }) => {
                assert_eq!(kind, "life_stages");
                assert_eq!(images, vec![PathBuf::from("/tmp/egg.jpg")]);
                assert!(log);
            }
            _ => panic!("Expected Classify command"),
        }
    }

    #[test]
    fn test_cli_sales_filter() {
        let args = ["lepidoptera", "--format", "json", "sales", "list", "--seller", "maria"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.format, "json");
        match cli.command {
            Some(Commands::Sales { action: SalesCommands::List { seller } }) => {
                assert_eq!(seller.as_deref(), Some("maria"));
            }
            _ => panic!("Expected Sales list command"),
        }
    }

    #[test]
    fn test_parse_order_line() {
        assert_eq!(parse_line("3:2").unwrap(), (3, 2));
        assert_eq!(parse_line(" 10 : 1 ").unwrap(), (10, 1));
        assert!(parse_line("3").is_err());
        assert!(parse_line("a:1").is_err());
    }

    #[test]
    fn test_init_creates_layout() {
        let dir = tempfile::TempDir::new().unwrap();
        run_init(Some(dir.path().to_path_buf()), false).unwrap();

        assert!(dir.path().join("config.json").exists());
        assert!(dir.path().join("Data").is_dir());
        assert!(dir.path().join("model").is_dir());
        assert!(run_init(Some(dir.path().to_path_buf()), false).is_err());
    }
}
