// crates/flowcli/src/main.rs

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use flowcore::{
    graph, Context, ExecutionEvent, ExecutionStatus, ExpressionEngine, Value, ValueMap, Workflow,
    WorkflowExecution, WorkflowNode,
};
use flowruntime::{DebugHandle, ExecuteOptions, FlowRuntime, RuntimeConfig};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flow")]
#[command(about = "Flow Engine CLI", long_about = None)]
struct Cli {
    /// Show debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow file
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Trigger data as JSON
        #[arg(short, long)]
        input: Option<String>,

        /// Trigger type recorded on the execution
        #[arg(long, default_value = "manual")]
        trigger_type: String,

        /// Pause before this node (repeatable)
        #[arg(short = 'b', long = "break")]
        breakpoints: Vec<String>,

        /// Pause before every node
        #[arg(long)]
        step: bool,

        /// Skip nodes ordered before this one
        #[arg(long)]
        resume_from: Option<String>,

        /// Context saved by an earlier run to start from
        #[arg(long)]
        context: Option<PathBuf>,

        /// Write the final context here
        #[arg(long)]
        save_context: Option<PathBuf>,
    },

    /// Validate a workflow file
    Validate {
        /// Path to workflow JSON file
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// Create a new example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },

    /// Evaluate an expression against a JSON context
    Eval {
        /// Expression, with or without {{ }}
        expression: String,

        /// Context object as JSON
        #[arg(short, long)]
        context: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            file,
            input,
            trigger_type,
            breakpoints,
            step,
            resume_from,
            context,
            save_context,
        } => {
            let previous = context.as_deref().map(load_context).transpose()?;
            let options = ExecuteOptions::new(parse_json_arg(input.as_deref())?)
                .with_trigger_type(trigger_type);
            let options = match resume_from {
                Some(node_id) => options.resume_from(node_id, previous),
                None => options.with_previous_context(previous),
            };
            run_workflow(&file, options, breakpoints, step, save_context.as_deref()).await?;
        }

        Commands::Validate { file } => {
            validate_workflow(&file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_workflow(&output)?;
        }

        Commands::Eval { expression, context } => {
            eval_expression(&expression, context.as_deref())?;
        }
    }

    Ok(())
}

fn parse_json_arg(raw: Option<&str>) -> Result<Value> {
    match raw {
        Some(text) => serde_json::from_str(text).context("Input must be valid JSON"),
        None => Ok(Value::Object(ValueMap::new())),
    }
}

fn load_workflow(file: &Path) -> Result<Workflow> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not a workflow", file.display()))
}

fn load_context(file: &Path) -> Result<Context> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    Ok(serde_json::from_str(&text)?)
}

fn runtime() -> FlowRuntime {
    FlowRuntime::with_registry(flownodes::standard_registry(), RuntimeConfig::from_env())
}

async fn run_workflow(
    file: &Path,
    options: ExecuteOptions,
    breakpoints: Vec<String>,
    step: bool,
    save_context: Option<&Path>,
) -> Result<()> {
    println!("🚀 Loading workflow from: {}", file.display());
    let workflow = load_workflow(file)?;

    println!("📋 Workflow: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Connections: {}", workflow.connections.len());
    println!();

    let runtime = runtime();
    let mut events = runtime.subscribe_events();

    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::WorkflowStarted { execution_id, .. } => {
                    println!("▶️  Workflow started ({})", execution_id);
                }
                ExecutionEvent::NodeStarted { node_id, node_type, .. } => {
                    println!("  ⚡ Starting node: {} ({})", node_id, node_type);
                }
                ExecutionEvent::NodeCompleted { node_id, duration_ms, .. } => {
                    println!("  ✅ Node {} completed in {}ms", node_id, duration_ms);
                }
                ExecutionEvent::NodeFailed { node_id, error, .. } => {
                    println!("  ❌ Node {} failed: {}", node_id, error);
                }
                ExecutionEvent::NodeSkipped { node_id, reason, .. } => {
                    println!("  ⏭️  Node {} skipped ({})", node_id, reason);
                }
                ExecutionEvent::DebugPaused { node_id, .. } => {
                    println!("  ⏸️  Paused before {}", node_id);
                }
                ExecutionEvent::DebugResumed { .. } => {}
                ExecutionEvent::WorkflowCompleted { status, duration_ms, .. } => {
                    println!("🏁 Workflow {} after {}ms", status, duration_ms);
                    break;
                }
            }
        }
    });

    let (execution, context) = if breakpoints.is_empty() && !step {
        runtime.execute_with_context(&workflow, options).await
    } else {
        let debugger = runtime.debugger().with_breakpoints(breakpoints);
        debugger.set_step_mode(step);
        let prompt = tokio::spawn(debug_prompt(debugger.handle()));
        let outcome = debugger.execute_with_context(&workflow, options).await;
        prompt.abort();
        outcome
    };

    let _ = event_task.await;

    if let Some(path) = save_context {
        std::fs::write(path, serde_json::to_string_pretty(&context)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("💾 Context saved to {}", path.display());
    }

    print_summary(&execution)?;

    if execution.status != ExecutionStatus::Completed {
        bail!(
            "Workflow {}: {}",
            execution.status,
            execution.error.as_deref().unwrap_or("no error recorded")
        );
    }
    Ok(())
}

/// Interactive control loop for paused runs: continue, step or quit.
async fn debug_prompt(handle: DebugHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let node_id = handle.wait_for_pause().await;
        println!("     [c]ontinue, [s]tep or [q]uit before {}?", node_id);
        match lines.next_line().await {
            Ok(Some(line)) => match line.trim() {
                "s" | "step" => handle.step(),
                "q" | "quit" => handle.cancel(),
                _ => handle.resume(),
            },
            _ => {
                handle.cancel();
                return;
            }
        }
    }
}

fn print_summary(execution: &WorkflowExecution) -> Result<()> {
    println!();
    println!("📊 Execution Summary:");
    println!("   Execution ID: {}", execution.id);
    println!("   Status: {}", execution.status);
    if let Some(duration_ms) = execution.duration_ms {
        println!("   Duration: {}ms", duration_ms);
    }

    if !execution.node_results.is_empty() {
        println!();
        println!("📤 Results:");
        for result in &execution.node_results {
            if result.success {
                println!("   {}: {}", result.node_id, serde_json::to_string(&result.data)?);
            } else {
                println!(
                    "   {}: failed: {}",
                    result.node_id,
                    result.error.as_deref().unwrap_or_default()
                );
            }
        }
    }
    Ok(())
}

fn validate_workflow(file: &Path) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());
    let workflow = load_workflow(file)?;

    graph::validate(&workflow)?;

    let registry = flownodes::standard_registry();
    let unknown: Vec<&WorkflowNode> = workflow
        .nodes
        .iter()
        .filter(|n| !registry.contains(&n.node_type))
        .collect();
    for node in &unknown {
        println!("⚠️  Node {} uses unknown type {}", node.id, node.node_type);
    }

    println!("✅ Workflow is valid:");
    println!("   Name: {}", workflow.name);
    println!("   Nodes: {}", workflow.nodes.len());
    println!("   Connections: {}", workflow.connections.len());
    println!("   Order: {}", graph::order(&workflow)?.join(" → "));

    if !unknown.is_empty() {
        bail!("{} node(s) use unregistered types", unknown.len());
    }
    Ok(())
}

fn list_nodes() {
    println!("📦 Available Node Types:");
    println!();

    let registry = flownodes::standard_registry();
    for node_type in registry.list_handler_types() {
        if let Some(metadata) = registry.get_metadata(&node_type) {
            println!("  • {} ({})", node_type, metadata.category);
            println!("    {}", metadata.description);
        } else {
            println!("  • {}", node_type);
        }
    }
}

fn create_example_workflow(output: &Path) -> Result<()> {
    let mut workflow = Workflow::new("Example HTTP Workflow");
    workflow.description = Some("Fetches data from an API and logs the result".to_string());

    let trigger = workflow.add_node(
        WorkflowNode::new("trigger.manual")
            .with_name("Start")
            .with_position(100.0, 100.0),
    );
    let fetch = workflow.add_node(
        WorkflowNode::new("http.request")
            .with_name("Fetch Data")
            .with_config("method", "GET")
            .with_config("url", "{{ $trigger.url }}")
            .with_position(300.0, 100.0),
    );
    let log = workflow.add_node(
        WorkflowNode::new("debug.log")
            .with_name("Log Response")
            .with_config("message", "{{ $node['Fetch Data'].status }}: {{ $prev.body }}")
            .with_position(500.0, 100.0),
    );

    workflow.connect(trigger, fetch.clone());
    workflow.connect(fetch, log);

    let json = serde_json::to_string_pretty(&workflow)?;
    std::fs::write(output, json)?;

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  flow run --file {} --input '{{\"url\": \"https://api.github.com/zen\"}}'",
        output.display()
    );

    Ok(())
}

fn eval_expression(expression: &str, context: Option<&str>) -> Result<()> {
    let context = match parse_json_arg(context)? {
        Value::Object(map) => map,
        _ => bail!("Context must be a JSON object"),
    };

    let engine = ExpressionEngine::new();
    let template = if flowcore::expression::contains_expression(expression) {
        expression.to_string()
    } else {
        format!("{{{{ {} }}}}", expression)
    };

    let value = engine.resolve_str(&template, &context)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
