use anyhow::Context;
use clap::{Parser, Subcommand};
use disclosure_scraper::app::ports::HttpClientPort;
use disclosure_scraper::config::Config;
use disclosure_scraper::infra::http_client::ReqwestHttp;
use disclosure_scraper::pipeline::Pipeline;
use disclosure_scraper::sink::CsvFileSink;
use disclosure_scraper::{logging, metrics};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "disclosure_scraper")]
#[command(about = "Quarterly regulator disclosure pipeline")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML configuration file (defaults are used when it does not exist)
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover, download, parse and enrich, then write the consolidated file
    Run {
        /// Number of most recent periods to process
        #[arg(long)]
        periods: Option<usize>,
        /// Where to write the consolidated CSV
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Only list the periods that would be processed
    Discover {
        #[arg(long)]
        periods: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    match &cli.command {
        Commands::Run { periods, output } => {
            if let Some(n) = periods {
                config.period_count = *n;
            }
            if let Some(path) = output {
                config.output_path = path.clone();
            }
        }
        Commands::Discover { periods } => {
            if let Some(n) = periods {
                config.period_count = *n;
            }
        }
    }
    config.validate()?;

    let _log_guard = logging::init_logging(&config.log_dir);
    metrics::init_metrics();

    let http: Arc<dyn HttpClientPort> = Arc::new(ReqwestHttp::new(&config.http)?);
    let pipeline = Pipeline::new(config, http);

    let work = async {
        match cli.command {
            Commands::Discover { .. } => {
                let periods = pipeline.discover().await?;
                println!("📅 {} period(s) selected:", periods.len());
                for period in &periods {
                    println!("   {} -> {}", period.label(), period.source_url);
                }
            }
            Commands::Run { .. } => {
                let mut sink = CsvFileSink::new(pipeline.config().output_path.clone());
                let summary = pipeline.run(&mut sink).await?;
                println!("\n📊 Run summary:");
                println!("{}", serde_json::to_string_pretty(&summary)?);
                println!("✅ Output file: {}", sink.path().display());
            }
        }
        anyhow::Ok(())
    };

    tokio::select! {
        result = work => {
            if let Err(e) = &result {
                error!("Run failed: {:#}", e);
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping");
            anyhow::bail!("interrupted")
        }
    }
}
