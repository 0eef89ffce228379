//! Tabula CLI - load a record model and run it against SQLite
//!
//! Usage:
//!   tabula --model <file> [--db <file>] [--memdb] [--init] [--parse] [--config <file>] [--sql]
//!
//! Examples:
//!   tabula --model orders.rdsl --parse
//!   tabula --model orders.rdsl --memdb --sql
//!   tabula --model orders.rdsl --db orders.db --init

use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tabula::config::Settings;
use tabula::logging::init_logging;
use tabula::lowering::{self, LoadResult};
use tabula::model::ModelRegistry;
use tabula::sql::{Archive, CreateTable, Insert, Update};
use tabula::store::{ListRequest, Store};
use tabula::StatementAssembler;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "tabula")]
#[command(about = "Tabula - relational record models with computed fields, on SQLite")]
#[command(version)]
struct Cli {
    /// Path to the model file
    #[arg(short, long)]
    model: PathBuf,

    /// Database file (overrides the config file)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Use a private in-memory database
    #[arg(long)]
    memdb: bool,

    /// Create the tables of every entity
    #[arg(long)]
    init: bool,

    /// Only load and validate the model, then print a summary
    #[arg(long)]
    parse: bool,

    /// Config file (default: $TABULA_CONFIG, then ./tabula.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the SQL generated for every entity
    #[arg(long)]
    sql: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // Help and version go to stdout and are not failures.
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = init_logging(&settings.logging) {
        eprintln!("Logging disabled: {}", e);
    }

    let source = match fs::read_to_string(&cli.model) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", cli.model.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let loaded = lowering::load(&source);
    report_diagnostics(&cli.model, &source, &loaded);
    let Some(registry) = loaded.registry else {
        return ExitCode::FAILURE;
    };
    info!(model = %cli.model.display(), entities = registry.len(), "loaded model");

    let language = settings.display.language.as_deref();
    if cli.parse {
        print_summary(&registry, language);
        return ExitCode::SUCCESS;
    }

    let in_memory = cli.memdb || settings.database.in_memory;
    let store = if in_memory {
        Store::open_in_memory()
    } else {
        let path = match &cli.db {
            Some(path) => Ok(path.clone()),
            None => settings.database.resolved_path(),
        };
        let path = match path {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Configuration error: {}", e);
                return ExitCode::FAILURE;
            }
        };
        Store::open(path)
    };
    let store = match store {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Cannot open database: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if cli.init || in_memory {
        let created = store.create_tables(&registry);
        println!("Created {} of {} table(s).", created.len(), registry.len());
    }

    if cli.sql {
        return print_sql(&registry);
    }

    print_record_counts(&store, &registry, language)
}

fn report_diagnostics(path: &Path, source: &str, loaded: &LoadResult) {
    let name = path.display().to_string();
    for diag in &loaded.diagnostics {
        if diag.write_report(&name, source, std::io::stderr()).is_err() {
            eprintln!("{}", diag);
        }
    }
}

fn print_summary(registry: &ModelRegistry, language: Option<&str>) {
    if let Some(title) = registry.title() {
        println!("Application: {}", title);
        println!();
    }
    for entity in registry.entities() {
        println!("{}:", registry.translate(language, &entity.name));
        for field in entity.fields.values() {
            let mut notes = Vec::new();
            if let Some(target) = &field.reference {
                notes.push(format!("-> {}", target));
            }
            if let Some(formula) = &field.formula {
                notes.push(format!("= {}", formula));
            }
            if field.listed {
                notes.push("listed".to_string());
            }
            println!(
                "  - {} ({}) {}",
                registry.translate(language, &field.name),
                field.field_type,
                notes.join(", ")
            );
        }
        for relation in entity.relations.values() {
            println!("  * {} -> {}", relation.name, relation.target);
        }
    }
}

fn print_sql(registry: &ModelRegistry) -> ExitCode {
    let assembler = StatementAssembler::new(registry);
    let mut status = ExitCode::SUCCESS;
    for entity in registry.entities() {
        println!("-- {}", entity.name);
        println!("{};", CreateTable::for_entity(entity).to_sql());
        for statement in [
            Insert::for_entity(entity).to_statement(),
            Update::for_entity(entity).to_statement(),
            Archive::for_entity(entity).to_statement(),
        ] {
            println!("{};", statement.sql);
        }
        let queries = [
            assembler.build_list_query(entity, None, None, None),
            assembler.build_object_query(entity),
        ];
        for query in queries {
            match query {
                Ok(statement) => println!("{};", statement.sql),
                Err(e) => {
                    eprintln!("Compilation error: {}", e);
                    status = ExitCode::FAILURE;
                }
            }
        }
        println!();
    }
    status
}

fn print_record_counts(store: &Store, registry: &ModelRegistry, language: Option<&str>) -> ExitCode {
    let mut status = ExitCode::SUCCESS;
    for entity in registry.entities() {
        match store.list(registry, &entity.name, &ListRequest::default()) {
            Ok(rows) => println!(
                "{}: {} record(s)",
                registry.translate(language, &entity.name),
                rows.len()
            ),
            Err(e) => {
                error!(entity = %entity.name, error = %e, "listing failed");
                eprintln!("{}: {}", entity.name, e);
                status = ExitCode::FAILURE;
            }
        }
    }
    status
}
