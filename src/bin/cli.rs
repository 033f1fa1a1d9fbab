//! docdex CLI - Main entry point for CLI binary
//!
//! This binary provides the `docdex` tool for creating projects, serving
//! the REST API and maintaining index buckets.

use anyhow::{bail, Context, Result};
use clap::Parser;
use docdex::engine::{
    api::{create_router, ApiState},
    cli::{
        formatter::{counted, CliFormatter},
        Cli, Commands, OutputFormat,
    },
    config::{Config, StorageBackend},
    people,
    repository::Repository,
};
use std::path::Path;
use std::sync::Arc;

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run_cli(cli) {
        CliFormatter::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> Result<()> {
    let project_dir = cli.get_project_dir();
    let json_output = cli.format == OutputFormat::Json;

    match cli.command {
        Commands::Init { name, memory } => {
            cmd_init(&project_dir, &name, memory, json_output)?;
        }
        Commands::Serve { port, host } => {
            cmd_serve(&project_dir, host, port)?;
        }
        Commands::Seed => {
            cmd_seed(&project_dir, json_output)?;
        }
        Commands::Status => {
            cmd_status(&project_dir, json_output)?;
        }
        Commands::Reindex { entity } => {
            cmd_reindex(&project_dir, entity, json_output)?;
        }
        Commands::Verify { entity } => {
            cmd_verify(&project_dir, entity, json_output)?;
        }
    }

    Ok(())
}

fn open(project_dir: &Path) -> Result<(Config, Repository)> {
    let config = Config::load(project_dir)
        .with_context(|| format!("loading project at {}", project_dir.display()))?;
    let repo = Repository::open(project_dir, &config)?;
    Ok((config, repo))
}

/// Entity names to act on: the one given, or every registered type
fn targets(repo: &Repository, entity: Option<String>) -> Result<Vec<String>> {
    match entity {
        Some(name) => {
            repo.entity(&name)?;
            Ok(vec![name])
        }
        None => Ok(repo.entity_names()),
    }
}

fn cmd_init(parent: &Path, name: &str, memory: bool, json: bool) -> Result<()> {
    let project_dir = parent.join(name);
    if project_dir.exists() {
        bail!("Project directory already exists: {}", project_dir.display());
    }

    std::fs::create_dir_all(project_dir.join("data"))?;

    let mut config = Config::default_for_project(name);
    if memory {
        config.storage.backend = StorageBackend::Memory;
    }
    config.save(&project_dir)?;

    let gitignore = "# docdex\ndata/*.db\ndata/*.db-*\n*.log\n";
    std::fs::write(project_dir.join(".gitignore"), gitignore)?;

    // Creates the database file for the sqlite backend
    Repository::open(&project_dir, &config)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "success": true,
                "project_dir": project_dir.display().to_string(),
                "name": name,
                "backend": config.storage.backend,
            })
        );
    } else {
        CliFormatter::success(&format!("Created docdex project: {}", name));
        CliFormatter::kv("Directory", &project_dir.display().to_string());
        CliFormatter::header("Next steps");
        CliFormatter::item(&format!("cd {}", project_dir.display()));
        CliFormatter::item("docdex seed");
        CliFormatter::item("docdex serve");
    }

    Ok(())
}

#[tokio::main]
async fn cmd_serve(project_dir: &Path, host: Option<String>, port: Option<u16>) -> Result<()> {
    let (config, repo) = open(project_dir)?;

    let state = ApiState {
        repo: Arc::new(repo),
    };
    let app = create_router(state);

    let host = host.unwrap_or_else(|| config.api.host.clone());
    let port = port.unwrap_or(config.api.port);
    let addr = format!("{}:{}", host, port);

    CliFormatter::header("docdex API Server");
    CliFormatter::kv("Project", &config.project.name);
    CliFormatter::kv("Listening", &format!("http://{}", addr));
    CliFormatter::kv("OpenAPI", &format!("http://{}/api/openapi.json", addr));
    CliFormatter::item("Press Ctrl+C to stop");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn cmd_seed(project_dir: &Path, json: bool) -> Result<()> {
    let (_, repo) = open(project_dir)?;
    let saved = people::init_data(&repo)?;

    if json {
        println!("{}", serde_json::json!({ "success": true, "seeded": saved.len() }));
    } else {
        CliFormatter::success(&format!("Seeded {}", counted(saved.len(), "person", "people")));
    }
    Ok(())
}

fn cmd_status(project_dir: &Path, json: bool) -> Result<()> {
    let (config, repo) = open(project_dir)?;
    let entities = repo.status()?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "project": config.project.name,
                "backend": repo.backend(),
                "api_port": config.api.port,
                "geo_cell_degrees": config.index.geo_cell_degrees,
                "entities": entities,
            })
        );
    } else {
        CliFormatter::header("docdex Project Status");
        CliFormatter::kv("Project", &config.project.name);
        CliFormatter::kv("Backend", repo.backend());
        CliFormatter::kv("API port", &config.api.port.to_string());

        CliFormatter::header("Entity types");
        if entities.is_empty() {
            CliFormatter::item("(none registered)");
        } else {
            let rows: Vec<Vec<String>> = entities
                .iter()
                .map(|e| {
                    vec![
                        e.name.clone(),
                        e.documents.to_string(),
                        e.indexed_fields.to_string(),
                    ]
                })
                .collect();
            CliFormatter::table(&["name", "documents", "indexed fields"], &rows);
        }
    }
    Ok(())
}

fn cmd_reindex(project_dir: &Path, entity: Option<String>, json: bool) -> Result<()> {
    let (_, repo) = open(project_dir)?;

    let mut results = Vec::new();
    for name in targets(&repo, entity)? {
        let count = repo.reindex(&name)?;
        results.push(serde_json::json!({ "entity": name, "documents": count }));
        if !json {
            CliFormatter::success(&format!("Reindexed {}: {}", name, counted(count, "document", "documents")));
        }
    }

    if json {
        println!("{}", serde_json::json!({ "success": true, "reindexed": results }));
    }
    Ok(())
}

fn cmd_verify(project_dir: &Path, entity: Option<String>, json: bool) -> Result<()> {
    let (_, repo) = open(project_dir)?;

    let mut results = Vec::new();
    for name in targets(&repo, entity)? {
        match repo.verify(&name) {
            Ok(count) => {
                if !json {
                    CliFormatter::success(&format!(
                        "{}: indexes match {}",
                        name,
                        counted(count, "document", "documents")
                    ));
                }
                results.push(serde_json::json!({ "entity": name, "consistent": true, "documents": count }));
            }
            Err(e) if !e.is_caller_error() => {
                if json {
                    println!(
                        "{}",
                        serde_json::json!({ "success": false, "entity": name, "error": e.to_string() })
                    );
                } else {
                    CliFormatter::warning(&format!("{}: {}", name, e));
                    CliFormatter::item(&format!("run `docdex reindex {}` to rebuild", name));
                }
                bail!("index verification failed for {}", name);
            }
            Err(e) => return Err(e.into()),
        }
    }

    if json {
        println!("{}", serde_json::json!({ "success": true, "verified": results }));
    }
    Ok(())
}
