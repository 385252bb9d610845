use financial_research_agent::{
    agent::Orchestrator,
    config::AgentConfig,
    report::{render_markdown, report_file_name, save_report, DEFAULT_REPORT_FILE},
};
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage:
  research \"<question>\"     answer one question and write financial_report.md
  research --interactive    ask questions until 'exit'";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "-h" || a == "--help") {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = AgentConfig::from_env()?;
    let orchestrator = Orchestrator::from_config(&config)?;

    info!("Financial Research Agent starting");

    if args.iter().any(|a| a == "-i" || a == "--interactive") {
        return interactive(&orchestrator).await;
    }

    let question = args.join(" ");
    let report = orchestrator.run_query(&question).await;

    println!("\n=== REPORT ===\n");
    println!("{}", report);

    save_report(
        DEFAULT_REPORT_FILE,
        &render_markdown(&question, &report, Utc::now()),
    )?;
    println!("\nSaved to {}", DEFAULT_REPORT_FILE);

    Ok(())
}

async fn interactive(orchestrator: &Orchestrator) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("Ask a financial question ('exit' to quit).");

    loop {
        stdout.write_all(b"\n> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question.to_lowercase().as_str(), "exit" | "quit" | "q") {
            break;
        }

        let report = orchestrator.run_query(question).await;
        println!("\n{}", report);

        let path = report_file_name(question);
        match save_report(&path, &render_markdown(question, &report, Utc::now())) {
            Ok(()) => println!("\nSaved to {}", path),
            Err(e) => warn!(error = %e, path = %path, "Could not save report"),
        }
    }

    Ok(())
}
