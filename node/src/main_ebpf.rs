use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::{ColoredString, Colorize};
use hhd_common::Verdict;
use hhd_node::config::HhdConfig;
use hhd_node::datapath::SoftDatapath;
use hhd_node::replay::{self, ReplayOutcome};
use hhd_node::stats::HhdStats;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hhd-loader")]
#[command(author = "HHD Team")]
#[command(version = "0.1.0")]
#[command(about = "HHD XDP heavy-hitter detector and forwarder", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the XDP program, fill its tables and attach it to the interface
    Attach {
        /// Configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Statistics interval in seconds
        #[arg(short, long, default_value = "5")]
        interval: u64,
    },

    /// Parse and validate a configuration file
    CheckConfig {
        /// Configuration file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Run hex-encoded frames through the software datapath
    Replay {
        /// Configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// File with one hex-encoded frame per line
        #[arg(short, long)]
        frames: PathBuf,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Attach { config, interval } => {
            attach_program(&config, interval).await?;
        }
        Commands::CheckConfig { config } => {
            check_config(&config)?;
        }
        Commands::Replay {
            config,
            frames,
            json,
        } => {
            replay_frames(&config, &frames, json)?;
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<HhdConfig> {
    HhdConfig::load(path).with_context(|| format!("Invalid configuration {}", path.display()))
}

#[cfg(target_os = "linux")]
async fn attach_program(config_path: &Path, interval: u64) -> Result<()> {
    use hhd_node::ebpf_loader::HhdLoader;
    use std::time::Duration;

    // Check if running as root (required for XDP)
    if !nix::unistd::Uid::effective().is_root() {
        eprintln!(
            "{}",
            "❌ Error: attach requires root privileges".bright_red()
        );
        eprintln!("   Please run with: sudo hhd-loader attach --config <file>");
        std::process::exit(1);
    }

    let config = load_config(config_path)?;

    println!(
        "{}",
        "╔════════════════════════════════════════════╗".bright_cyan()
    );
    println!(
        "{}",
        "║   HHD XDP Heavy-Hitter Detector            ║".bright_cyan()
    );
    println!(
        "{}",
        "╚════════════════════════════════════════════╝".bright_cyan()
    );
    println!();
    println!(
        "  Program:   {}",
        config.program.display().to_string().bright_white()
    );
    println!("  Interface: {}", config.interface.bright_yellow());
    println!("  Mode:      {}", config.xdp_mode.to_string().bright_white());
    println!(
        "  Threshold: {} packets per flow",
        config.threshold.to_string().bright_green()
    );
    println!(
        "  Routes:    {} ({} egress ports)",
        config.routes.len(),
        config.egress.len()
    );
    println!();

    let mut loader = HhdLoader::load(&config.program, config.threshold)?;
    loader.init_logging();
    loader.populate(&config)?;
    loader.attach(&config.interface, config.xdp_mode)?;

    println!();
    println!(
        "{}",
        "✅ XDP program loaded and attached successfully!".bright_green()
    );
    println!("{}", "Press Ctrl+C to detach and exit...".dimmed());
    println!();

    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    ticker.tick().await;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl+C")?;
                break;
            }
            _ = ticker.tick() => {
                print_stats(&loader.get_stats()?);
                for (slot, count) in loader.hottest_slots(3)? {
                    println!("  Hot slot {:>4}:   {:>10}", slot, count);
                }
                println!();
            }
        }
    }

    let interface = loader.interface().unwrap_or_default().to_string();

    println!();
    println!("{}", "Detaching XDP program...".yellow());
    loader.detach()?;
    println!(
        "{}",
        format!("✅ XDP program detached from {}", interface).bright_green()
    );

    Ok(())
}

#[cfg(not(target_os = "linux"))]
async fn attach_program(_config_path: &Path, _interval: u64) -> Result<()> {
    anyhow::bail!("attach is only supported on Linux")
}

fn check_config(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    println!("{}", "✅ Configuration is valid".bright_green());
    println!("  Threshold: {}", config.threshold);
    println!("  Interface: {} ({} mode)", config.interface, config.xdp_mode);
    println!("  Program:   {}", config.program.display());
    println!();

    for egress in &config.egress {
        println!(
            "  Egress port {} -> {} (mac {})",
            egress.port.to_string().bright_white(),
            egress.interface.bright_yellow(),
            egress.mac
        );
    }
    for route in &config.routes {
        println!(
            "  Route {} -> port {} via {}",
            route.destination.to_string().bright_white(),
            route.egress_port,
            route.mac
        );
    }
    if config.routes.is_empty() {
        println!(
            "{}",
            "⚠ No routes: every admitted packet will abort".yellow()
        );
    }

    Ok(())
}

fn replay_frames(config_path: &Path, frames_path: &Path, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let frames = replay::read_frames(frames_path)
        .with_context(|| format!("Failed to read frames from {}", frames_path.display()))?;

    let datapath = SoftDatapath::from_config(&config);
    let outcomes = replay::replay(&datapath, frames);
    let stats = datapath.stats();

    if json {
        let report = replay_report(&outcomes, &stats);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for outcome in &outcomes {
        println!("  line {:>4}: {}", outcome.line, colorize(outcome));
    }
    println!();
    print_stats(&stats);

    Ok(())
}

fn replay_report(outcomes: &[ReplayOutcome], stats: &HhdStats) -> serde_json::Value {
    let results: Vec<_> = outcomes
        .iter()
        .map(|outcome| {
            serde_json::json!({
                "line": outcome.line,
                "verdict": outcome.verdict.label(),
                "reason": outcome.describe(),
                "frame": hex::encode(&outcome.frame),
            })
        })
        .collect();
    serde_json::json!({ "results": results, "stats": stats })
}

fn colorize(outcome: &ReplayOutcome) -> ColoredString {
    let detail = outcome.describe();
    match outcome.verdict {
        Verdict::Abort(_) => detail.bright_red(),
        Verdict::Drop(_) => detail.yellow(),
        Verdict::Pass | Verdict::Redirect(_) => detail.bright_green(),
    }
}

fn print_stats(stats: &HhdStats) {
    println!("{}", "═══ HHD Statistics ═══".bright_cyan());
    println!("  Total Packets:   {:>10}", stats.total_packets);
    println!("  Passed:          {:>10}", stats.passed_packets);
    println!("  Redirected:      {:>10}", stats.redirected_packets);
    println!("  Dropped:         {:>10}", stats.dropped_malformed);
    println!("  Heavy Hitters:   {:>10}", stats.dropped_heavy_hitter);
    println!("  Aborted:         {:>10}", stats.aborted_packets);
    println!("  Drop Rate:       {:>9.2}%", stats.drop_rate());
    println!("  Abort Rate:      {:>9.2}%", stats.abort_rate());
}
