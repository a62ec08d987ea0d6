mod config;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use envdeck_core::validate::validate_form;
use envdeck_core::{
    reconcile_with_delta, resolve_actions, ActionMenu, CapabilitySet, CommandPhase,
    EnvironmentForm, InstanceSnapshot, InstanceState, Record, RowIndicator, SelectionAccumulator,
    SelectionChange, SelectionPolicy,
};
use envdeck_services::{InMemoryPlatform, Version};
use envdeck_workflow::{InstanceListView, InstanceWorkflows, UpgradeOutcome};
use tracing_subscriber::EnvFilter;

use crate::config::{load_config, Config};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Selection policy as named on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    Accumulate,
    PageScoped,
}

impl From<PolicyArg> for SelectionPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Accumulate => SelectionPolicy::Accumulate,
            PolicyArg::PageScoped => SelectionPolicy::PageScoped,
        }
    }
}

/// Environment and instance console toolkit.
#[derive(Parser)]
#[command(
    name = "envdeck",
    version,
    about = "Environment and instance console toolkit"
)]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Path to envdeck.toml (default: ./envdeck.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the action menu of an instance snapshot
    Actions {
        /// Path to the instance snapshot JSON file
        instance: PathBuf,
        /// Grant an action kind or service code (repeatable; overrides the config)
        #[arg(long = "grant")]
        grants: Vec<String>,
    },

    /// Replay recorded selection events and print the final selection
    Reconcile {
        /// Path to a JSON array of {visible_ids, selected} events
        events: PathBuf,
        /// How selections on earlier pages are treated
        #[arg(long, default_value = "accumulate", value_enum)]
        policy: PolicyArg,
    },

    /// Validate an environment form
    CheckEnv {
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
    },

    /// Run the upgrade pre-condition against an in-memory platform
    UpgradeDemo {
        /// Path to the instance snapshot JSON file
        instance: PathBuf,
        /// Number of newer versions the platform offers
        #[arg(long, default_value_t = 1)]
        versions: usize,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(msg) => {
            report_error(&msg, cli.output, cli.quiet);
            process::exit(1);
        }
    };
    init_logging(&config);
    tracing::debug!(config = ?cli.config, "configuration loaded");

    match cli.command {
        Commands::Actions { instance, grants } => {
            cmd_actions(&instance, &grants, &config, cli.output, cli.quiet);
        }
        Commands::Reconcile { events, policy } => {
            cmd_reconcile(&events, policy.into(), cli.output, cli.quiet);
        }
        Commands::CheckEnv {
            code,
            name,
            description,
        } => {
            let form = EnvironmentForm {
                code,
                name,
                description,
                group_id: None,
            };
            cmd_check_env(&form, cli.output, cli.quiet);
        }
        Commands::UpgradeDemo { instance, versions } => {
            cmd_upgrade_demo(&instance, versions, &config, cli.output, cli.quiet);
        }
    }
}

/// `ENVDECK_LOG` wins over the configured filter; logs go to stderr.
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_env("ENVDECK_LOG")
        .or_else(|_| EnvFilter::try_new(config.log_filter.as_deref().unwrap_or("warn")))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn read_json<T: serde::de::DeserializeOwned>(
    path: &Path,
    output: OutputFormat,
    quiet: bool,
) -> T {
    let content = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("error reading file '{}': {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            let msg = format!("error parsing JSON in '{}': {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

fn print_json(value: &impl serde::Serialize) {
    let pretty = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("serialization error: {}", e));
    println!("{}", pretty);
}

// ── actions ──────────────────────────────────────────────────────────────────

fn cmd_actions(
    instance_path: &Path,
    grants: &[String],
    config: &Config,
    output: OutputFormat,
    quiet: bool,
) {
    let snapshot: InstanceSnapshot = read_json(instance_path, output, quiet);
    let capabilities = if grants.is_empty() {
        config.capability_set()
    } else {
        CapabilitySet::from_grants(grants).map_err(|e| e.to_string())
    };
    let capabilities = match capabilities {
        Ok(c) => c,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    let menu = resolve_actions(&snapshot, &capabilities);
    match output {
        OutputFormat::Json => print_json(&menu),
        OutputFormat::Text => print_menu(&menu),
    }
}

fn describe_state(state: &InstanceState) -> String {
    match state {
        InstanceState::Operating => "operating".to_string(),
        InstanceState::Disconnected => "disconnected".to_string(),
        InstanceState::Failed => "failed".to_string(),
        InstanceState::Live { stopped, command } => {
            let status = if *stopped { "stopped" } else { "running" };
            match command {
                CommandPhase::Settled => status.to_string(),
                CommandPhase::InProgress { .. } => format!("{}, command in progress", status),
                CommandPhase::Errored { .. } => format!("{}, last command failed", status),
            }
        }
    }
}

fn print_menu(menu: &ActionMenu) {
    println!("instance {}: {}", menu.instance_id, describe_state(&menu.state));
    match &menu.indicator {
        RowIndicator::None => {}
        RowIndicator::InProgress { command_type } => match command_type {
            Some(t) => println!("  in progress: {}", t),
            None => println!("  in progress"),
        },
        RowIndicator::Error { summary } => println!("  error: {}", summary),
    }
    if menu.actions.is_empty() {
        println!("  actions: (none)");
    } else {
        let labels: Vec<&str> = menu.actions.iter().map(|a| a.label()).collect();
        println!("  actions: {}", labels.join(", "));
    }
    if !menu.blocked.is_empty() {
        let kinds: Vec<&str> = menu.blocked.iter().map(|b| b.kind.as_str()).collect();
        println!("  blocked until the command resolves: {}", kinds.join(", "));
    }
}

// ── reconcile ────────────────────────────────────────────────────────────────

fn cmd_reconcile(events_path: &Path, policy: SelectionPolicy, output: OutputFormat, quiet: bool) {
    let events: Vec<SelectionChange<Record>> = read_json(events_path, output, quiet);

    let mut accumulator = SelectionAccumulator::new();
    let mut steps = Vec::with_capacity(events.len());
    for (i, event) in events.iter().enumerate() {
        match reconcile_with_delta(&accumulator, event, policy) {
            Ok((next, delta)) => {
                accumulator = next;
                steps.push(delta);
            }
            Err(e) => {
                let msg = format!("event {}: {}", i + 1, e);
                report_error(&msg, output, quiet);
                process::exit(1);
            }
        }
    }

    match output {
        OutputFormat::Json => print_json(&serde_json::json!({
            "policy": policy.as_str(),
            "selected_ids": accumulator.submission(),
            "selected": accumulator.entities().collect::<Vec<_>>(),
            "steps": steps,
        })),
        OutputFormat::Text => {
            if !quiet {
                for (i, delta) in steps.iter().enumerate() {
                    println!(
                        "event {}: +[{}] -[{}]",
                        i + 1,
                        delta.newly_selected.join(", "),
                        delta.deselected.join(", ")
                    );
                }
            }
            println!(
                "selected ({}): {}",
                accumulator.len(),
                accumulator.submission().join(", ")
            );
        }
    }
}

// ── check-env ────────────────────────────────────────────────────────────────

fn cmd_check_env(form: &EnvironmentForm, output: OutputFormat, quiet: bool) {
    let errors = validate_form(form).err().unwrap_or_default();
    match output {
        OutputFormat::Json => print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "errors": errors,
        })),
        OutputFormat::Text => {
            if errors.is_empty() {
                println!("environment form is valid");
            } else if !quiet {
                for e in &errors {
                    eprintln!("{}", e);
                }
            }
        }
    }
    if !errors.is_empty() {
        process::exit(1);
    }
}

// ── upgrade-demo ─────────────────────────────────────────────────────────────

/// Seed a platform that serves the snapshot's values and `versions` newer
/// versions of its application.
fn demo_platform(snapshot: &InstanceSnapshot, versions: usize) -> InMemoryPlatform {
    let mut platform = InMemoryPlatform::new().with_instance(snapshot.clone());
    if let (Some(env), Some(app), Some(ver)) = (
        snapshot.env_id.as_deref(),
        snapshot.app_id.as_deref(),
        snapshot.app_version_id.as_deref(),
    ) {
        let newer = (1..=versions)
            .map(|i| Version::new(&format!("{}-next-{}", ver, i), &format!("next-{}", i)))
            .collect();
        platform = platform
            .with_values(env, app, ver, &format!("# values of {}\n", snapshot.id))
            .with_newer_versions(ver, newer);
    }
    platform
}

fn cmd_upgrade_demo(
    instance_path: &Path,
    versions: usize,
    config: &Config,
    output: OutputFormat,
    quiet: bool,
) {
    let snapshot: InstanceSnapshot = read_json(instance_path, output, quiet);
    let capabilities = match config.capability_set() {
        Ok(c) => c,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("failed to start runtime: {}", e), output, quiet);
            process::exit(1);
        }
    };

    let workflows = InstanceWorkflows::new(
        Arc::new(demo_platform(&snapshot, versions)),
        capabilities,
    );

    // Pick the row out of its environment's first page, the way the list
    // view would hand it over.
    let row = match snapshot.env_id.as_deref() {
        Some(env) => {
            let view = InstanceListView::new(env, config.page_size);
            let (page, _menus) = match rt.block_on(workflows.load(&view)) {
                Ok(stamped) => stamped.value,
                Err(e) => {
                    report_error(&e.to_string(), output, quiet);
                    process::exit(1);
                }
            };
            if output == OutputFormat::Text && !quiet {
                println!(
                    "listed {} of {} instances in {} (page size {})",
                    page.items.len(),
                    page.total_count,
                    env,
                    view.page.page_size
                );
            }
            page.items
                .into_iter()
                .find(|i| i.id == snapshot.id)
                .unwrap_or_else(|| snapshot.clone())
        }
        None => snapshot.clone(),
    };

    let outcome = match rt.block_on(workflows.prepare_upgrade(&row)) {
        Ok(stamped) => stamped.value,
        Err(e) => {
            report_error(&e.to_string(), output, quiet);
            process::exit(1);
        }
    };

    match output {
        OutputFormat::Json => print_json(&outcome),
        OutputFormat::Text => match outcome {
            UpgradeOutcome::Ready(plan) => {
                let labels: Vec<&str> = plan.versions.iter().map(|v| v.version.as_str()).collect();
                println!("upgrade available for {}: {}", plan.instance_id, labels.join(", "));
                if !quiet {
                    print!("{}", plan.values.yaml);
                }
            }
            UpgradeOutcome::NoUpgradeAvailable => {
                println!("no upgrade available for {}", snapshot.id);
            }
        },
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
