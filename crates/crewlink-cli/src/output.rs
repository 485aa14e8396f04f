//! Terminal rendering of run events

use console::style;
use crewlink_core::{EventReceiver, RunEvent};

/// Longest tool output shown inline
const TOOL_OUTPUT_PREVIEW: usize = 300;

/// Print events until every sender is gone
pub async fn print_events(mut rx: EventReceiver) {
    while let Some(event) = rx.recv().await {
        render(&event);
    }
}

pub fn render(event: &RunEvent) {
    match event {
        RunEvent::ProviderStarting { name } => {
            println!("{} {}", style("Starting").cyan(), style(name).bold());
        }
        RunEvent::ProviderReady { name, tools } => {
            println!(
                "{} {} ({} tools)",
                style("✓").green(),
                style(name).bold(),
                tools.len()
            );
            for tool in tools {
                println!("    {}", style(tool).dim());
            }
        }
        RunEvent::ProviderFailed { name, error } => {
            eprintln!("{} {}: {}", style("✗").red(), style(name).bold(), error);
        }
        RunEvent::ToolsLoaded { total } => {
            println!("{} {}", style("Tools loaded:").bold(), total);
            println!();
        }
        RunEvent::DirectToolCall { tool, success, output } => {
            let mark = if *success { style("✓").green() } else { style("✗").red() };
            println!("{} {}", mark, style(tool).yellow());
            println!("{}", output);
            println!();
        }
        RunEvent::CrewStarting { name } => {
            println!("{} {}", style("Crew").bold(), style(name).cyan());
        }
        RunEvent::TaskStarted { task_id, agent_role, description } => {
            println!();
            println!(
                "{} {} {}",
                style("▶").cyan(),
                style(task_id).bold(),
                style(format!("[{}]", agent_role)).dim()
            );
            println!("  {}", style(first_line(description)).dim());
        }
        RunEvent::ToolInvoked { tool, arguments, .. } => {
            println!("  {} {} {}", style("→").yellow(), tool, style(arguments.to_string()).dim());
        }
        RunEvent::ToolCompleted { success, output, .. } => {
            let mark = if *success { style("←").green() } else { style("←").red() };
            println!("  {} {}", mark, style(truncate_str(output, TOOL_OUTPUT_PREVIEW)).dim());
        }
        RunEvent::TaskCompleted { task_id, output, .. } => {
            println!("{} {}", style("✓").green(), style(task_id).bold());
            println!("{}", output);
        }
        RunEvent::CrewFinished { output } => {
            println!();
            println!("{}", style("Final result:").bold().green());
            println!("{}", output);
        }
        RunEvent::RunFailed { error, causes } => {
            eprintln!();
            eprintln!("{} {}", style("Error:").red().bold(), error);
            for cause in causes {
                eprintln!("  {} {}", style("caused by:").dim(), cause);
            }
        }
        RunEvent::ProviderStopping { name } => {
            println!("{} {}", style("Stopping").dim(), name);
        }
        RunEvent::ProviderStopFailed { name, error } => {
            eprintln!(
                "{} {}: {}",
                style("Error stopping").red(),
                style(name).bold(),
                error
            );
        }
        RunEvent::Finished => {}
    }
}

fn first_line(text: &str) -> &str {
    text.trim().lines().next().unwrap_or_default()
}

/// Truncate on a char boundary, marking the cut
pub fn truncate_str(text: &str, max: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}
