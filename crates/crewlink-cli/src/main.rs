//! Crewlink CLI - run LLM crews against MCP tool providers
//!
//! A crew is a built-in preset name or a path to a crew definition TOML.

mod output;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

use crewlink_core::{presets, CrewDefinition, CrewRunner, EventSink, LlmSelector, Settings};

#[derive(Parser)]
#[command(name = "crewlink")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run sequential LLM crews against MCP tool providers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// LLM selector for every agent, e.g. openai/gpt-4o
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Environment file to load instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the providers, run the crew, stop the providers
    Run {
        /// Preset name or crew definition file
        crew: String,
    },

    /// Start the providers, list their tools and stop them
    Tools {
        /// Preset name or crew definition file
        crew: String,
    },

    /// Validate a crew definition and its required environment
    Check {
        /// Preset name or crew definition file
        crew: String,
    },

    /// List built-in presets
    Presets,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Environment first so RUST_LOG from the file applies
    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("Failed to load environment file {}", path.display()))?;
        }
        None => {
            let _ = dotenvy::dotenv();
        }
    }

    let default_filter = if cli.verbose {
        "info,crewlink_core=debug,crewlink_mcp=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Some(model) = &cli.model {
        LlmSelector::parse(model)?;
    }

    let mut settings = Settings::load().unwrap_or_else(|e| {
        eprintln!("{}", style(format!("Warning: {}, using defaults", e)).yellow());
        Settings::default()
    });
    if cli.verbose {
        settings.verbose = Some(true);
    }

    let succeeded = match cli.command {
        Commands::Run { crew } => run(&crew, settings, cli.model).await?,
        Commands::Tools { crew } => tools(&crew, settings).await?,
        Commands::Check { crew } => check(&crew)?,
        Commands::Presets => {
            show_presets();
            true
        }
    };

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}

fn runner(settings: Settings, model: Option<String>, events: EventSink) -> CrewRunner {
    let runner = CrewRunner::stdio().with_settings(settings).with_events(events);
    match model {
        Some(model) => runner.with_llm(model),
        None => runner,
    }
}

async fn run(crew: &str, settings: Settings, model: Option<String>) -> anyhow::Result<bool> {
    let def = CrewDefinition::from_source(crew)?;

    let (sink, rx) = EventSink::channel();
    let printer = tokio::spawn(output::print_events(rx));

    let report = runner(settings, model, sink).run(&def).await;
    // The runner owned the last sender, so the printer drains and ends
    printer.await?;

    Ok(report.is_success())
}

async fn tools(crew: &str, settings: Settings) -> anyhow::Result<bool> {
    let def = CrewDefinition::from_source(crew)?;

    let (sink, rx) = EventSink::channel();
    let printer = tokio::spawn(output::print_events(rx));

    let report = runner(settings, None, sink).list_tools(&def).await;
    printer.await?;

    let Ok(providers) = &report.outcome else {
        return Ok(false);
    };

    println!();
    for provider in providers {
        println!("{}", style(format!("{}:", provider.name)).bold());
        if provider.tools.is_empty() {
            println!("  {}", style("No tools").dim());
        }
        for tool in &provider.tools {
            println!(
                "  {:<32} {}",
                style(&tool.name).green(),
                style(output::truncate_str(&tool.description, 80)).dim()
            );
        }
        println!();
    }

    Ok(true)
}

fn check(crew: &str) -> anyhow::Result<bool> {
    let def = CrewDefinition::from_source(crew)?;

    println!("{} {}", style("Crew:").bold(), style(&def.name).cyan());
    if let Some(description) = &def.description {
        println!("  {}", style(description).dim());
    }
    println!();

    println!("{}", style("Providers:").bold());
    for provider in &def.providers {
        println!(
            "  {:<24} {} {}",
            style(&provider.name).green(),
            provider.command,
            style(provider.args.join(" ")).dim()
        );
    }

    println!("{}", style("Agents:").bold());
    for agent in &def.agents {
        println!(
            "  {:<24} {} {}",
            style(&agent.id).green(),
            agent.role,
            style(format!("tools: [{}]", agent.tools.join(", "))).dim()
        );
    }

    println!("{}", style("Tasks:").bold());
    for task in &def.tasks {
        let context = match &task.context {
            None => "previous task".to_string(),
            Some(ids) if ids.is_empty() => "none".to_string(),
            Some(ids) => ids.join(", "),
        };
        println!(
            "  {:<24} {} {}",
            style(&task.id).green(),
            task.agent,
            style(format!("context: {}", context)).dim()
        );
    }

    let mut ok = true;
    if !def.required_env.is_empty() {
        println!("{}", style("Environment:").bold());
        for name in &def.required_env {
            let set = std::env::var(name).map(|v| !v.is_empty()).unwrap_or(false);
            if set {
                println!("  {} {}", style("✓").green(), name);
            } else {
                ok = false;
                println!("  {} {} {}", style("✗").red(), name, style("not set").red());
            }
        }
    }

    // Expansion catches `${VAR}` references outside required_env
    if let Err(e) = def.resolve_providers() {
        ok = false;
        println!("{} {}", style("Error:").red().bold(), e);
    }

    Ok(ok)
}

fn show_presets() {
    println!("{}", style("Built-in presets:").bold());
    println!();
    for name in presets::names() {
        let description = presets::get(name)
            .and_then(|src| CrewDefinition::from_toml(src).ok())
            .and_then(|def| def.description)
            .unwrap_or_default();
        println!("  {:<12} {}", style(name).green(), style(description).dim());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["crewlink", "run", "github", "--verbose", "-m", "openai/gpt-4o"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.model.as_deref(), Some("openai/gpt-4o"));
        assert!(matches!(cli.command, Commands::Run { crew } if crew == "github"));
    }

    #[test]
    fn test_crew_argument_required() {
        assert!(Cli::try_parse_from(["crewlink", "tools"]).is_err());
        assert!(Cli::try_parse_from(["crewlink", "presets"]).is_ok());
    }

    #[test]
    fn test_check_builtin_presets() {
        // context7 needs no environment
        assert!(check("context7").unwrap());
        assert!(check("no-such-crew-or-file").is_err());
    }
}
