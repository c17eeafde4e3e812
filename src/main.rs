// SPDX-License-Identifier: MIT

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

use flowgate_rs::flowgate::config::Settings;
use flowgate_rs::flowgate::engine::StateMachine;
use flowgate_rs::flowgate::instance::{FileStore, InstanceStore, WorkflowInstance};
use flowgate_rs::flowgate::server::{self, AppState};
use flowgate_rs::flowgate::workflow::{Workflow, WorkflowCatalog, WorkflowLoader};

#[derive(Parser, Debug)]
#[command(author, version, about = "Deterministic workflow enforcement for AI agents", long_about = None)]
struct Args {
    /// Directory holding instance snapshots
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Directory holding workflow definitions
    #[arg(long, global = true)]
    workflows_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a new workflow instance
    Start {
        /// Name of the workflow to start
        workflow: String,

        /// Stored as the `description` context key
        description: Option<String>,

        /// Load the definition from this file instead of the workflows directory
        #[arg(short = 'f', long)]
        workflow_file: Option<PathBuf>,
    },
    /// Show workflow status
    Status {
        /// Specific instance id
        #[arg(short, long)]
        instance_id: Option<String>,

        /// Most recent instance of this workflow
        #[arg(short, long)]
        workflow: Option<String>,
    },
    /// Take an action on an instance
    Transition {
        /// The action to take
        action: String,

        #[arg(short, long, conflicts_with = "workflow")]
        instance_id: Option<String>,

        #[arg(short, long)]
        workflow: Option<String>,

        /// Context data as key=value (repeatable)
        #[arg(short, long = "data")]
        data: Vec<String>,
    },
    /// Validate a workflow definition file
    Validate {
        file: PathBuf,
    },
    /// Delete instances not updated for a number of days
    Cleanup {
        #[arg(short, long, default_value_t = 30)]
        days: u32,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let port_override = match &args.command {
        Commands::Serve { port } => *port,
        _ => None,
    };
    let settings = Settings::from_env()?.with_overrides(
        args.state_dir.clone(),
        args.workflows_dir.clone(),
        port_override,
    );
    log::debug!("Using settings: {:?}", settings);

    let catalog = WorkflowCatalog::new(&settings.workflows_dir);

    match args.command {
        Commands::Start {
            workflow,
            description,
            workflow_file,
        } => {
            let definition = match workflow_file {
                Some(path) => WorkflowLoader::new().load_workflow(path).await?,
                None => catalog.load(&workflow).await.with_context(|| {
                    format!("Looked in {}", catalog.dir().display())
                })?,
            };
            let store = FileStore::open(&settings.state_dir).await?;

            let mut machine = StateMachine::new(&definition);
            if let Some(description) = description {
                machine.set_context("description", Value::String(description));
            }
            store.save(machine.instance()).await?;

            println!("Started workflow: {}", definition.name());
            println!("Instance ID: {}", machine.instance().id());
            println!("Initial state: {}", machine.current_state()?.name);
            println!("\nContext for agent:\n{}", machine.render_context()?);
        }
        Commands::Status {
            instance_id,
            workflow,
        } => {
            let store = FileStore::open(&settings.state_dir).await?;
            let instance = match (instance_id, workflow) {
                (Some(id), _) => store
                    .load(&id)
                    .await?
                    .with_context(|| format!("Instance '{}' not found", id))?,
                (None, Some(name)) => store
                    .get_active_instance(&name)
                    .await?
                    .with_context(|| format!("No active instance for workflow '{}'", name))?,
                (None, None) => {
                    print_instance_table(&store).await?;
                    return Ok(());
                }
            };

            let definition = catalog.load(instance.workflow_name()).await?;
            let machine = StateMachine::with_instance(&definition, instance);
            let summary = machine.instance_summary()?;

            println!("Instance ID: {}", summary.id);
            println!("Workflow: {}", summary.workflow);
            println!("Current state: {}", summary.current_state);
            println!("Available actions: {}", summary.available_actions.join(", "));
            println!("Transitions taken: {}", summary.history_length);
            println!("Updated: {}", summary.updated_at.format("%Y-%m-%d %H:%M:%S"));
            println!("\nCurrent context:\n{}", machine.render_context()?);
        }
        Commands::Transition {
            action,
            instance_id,
            workflow,
            data,
        } => {
            let store = FileStore::open(&settings.state_dir).await?;
            let instance = find_instance(&store, instance_id, workflow).await?;
            let definition = catalog.load(instance.workflow_name()).await?;
            let mut machine = StateMachine::with_instance(&definition, instance);

            let old_state = machine.current_state()?.name.clone();
            let update = parse_context_data(&data);
            let new_state = machine.transition(&action, Some(update))?;
            store.save(machine.instance()).await?;

            println!("Transition successful!");
            println!("{} -> {}", old_state, new_state.name);
            println!("Action: {}", action);
            println!("\nNew context:\n{}", machine.render_context()?);
        }
        Commands::Validate { file } => {
            let definition = WorkflowLoader::new()
                .load_workflow(&file)
                .await
                .with_context(|| format!("Invalid workflow: {}", file.display()))?;
            print_structure(&definition);
        }
        Commands::Cleanup { days } => {
            let store = FileStore::open(&settings.state_dir).await?;
            let deleted = store.cleanup_older_than(days).await?;
            println!(
                "Deleted {} old instances from {}",
                deleted,
                store.root().display()
            );
        }
        Commands::Serve { .. } => {
            let store = FileStore::open(&settings.state_dir).await?;
            let state = Arc::new(AppState::new(catalog, Arc::new(store)));
            server::serve(state, settings.port).await?;
        }
    }

    Ok(())
}

async fn find_instance(
    store: &FileStore,
    instance_id: Option<String>,
    workflow: Option<String>,
) -> anyhow::Result<WorkflowInstance> {
    let found = match (instance_id, workflow) {
        (Some(id), _) => store.load(&id).await?,
        (None, Some(name)) => store.get_active_instance(&name).await?,
        (None, None) => bail!("Specify either --instance-id or --workflow"),
    };
    found.context("Instance not found")
}

/// `key=value` items become string context entries; items without `=` are skipped
fn parse_context_data(items: &[String]) -> Map<String, Value> {
    items
        .iter()
        .filter_map(|item| item.split_once('='))
        .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
        .collect()
}

async fn print_instance_table(store: &FileStore) -> anyhow::Result<()> {
    let records = store.list().await?;
    if records.is_empty() {
        println!("No active workflow instances");
        return Ok(());
    }

    println!(
        "{:<36}  {:<20}  {:<20}  {}",
        "ID", "WORKFLOW", "CURRENT STATE", "UPDATED"
    );
    for record in records.iter().take(10) {
        println!(
            "{:<36}  {:<20}  {:<20}  {}",
            record.id,
            record.workflow_name,
            record.current_state,
            record.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

fn print_structure(workflow: &Workflow) {
    println!("Workflow '{}' is valid", workflow.name());
    println!("\nWorkflow: {}", workflow.name());
    println!("Version: {}", workflow.version());
    println!("States: {}", workflow.states().len());
    println!("Initial state: {}", workflow.initial_state());

    println!("\nStates:");
    for state in workflow.states() {
        println!("  - {} ({})", state.id, state.name);
        for (action, target) in &state.transitions {
            println!("    -> {}: {}", action, target);
        }
        if !state.prerequisites.is_empty() {
            println!("    requires: {}", state.prerequisites.join(", "));
        }
    }

    if !workflow.checks().is_empty() {
        println!("\nChecks:");
        for (name, check) in workflow.checks() {
            let keys = check.expression.referenced_keys();
            println!("  - {}: {} (reads {})", name, check.source, keys.join(", "));
        }
    }
}
