use anyhow::{anyhow, bail, Result};
use clap::Parser;
use proxy_probe::{
    logging::init_logging,
    proxy::{CheckConfig, Coordinator, ProxyChecker, ProxyParser},
    report::{self, console, Summary},
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Proxy checker with censorship detection
#[derive(Parser)]
#[command(name = "proxy-probe")]
#[command(about = "Checks proxy functionality and detects throttling or mid-transfer freezes")]
#[command(after_help = "Usage examples:
  proxy-probe proxy-list.txt
  proxy-probe proxy-list.txt -c 10 -v
  proxy-probe proxy-list.txt --timeout 60 --slow-time 20 -o working.txt")]
struct Cli {
    /// File with proxy list (format: host:port:username:password)
    input_file: PathBuf,

    /// Output file for working proxies
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of concurrent checks
    #[arg(short, long, default_value = "5")]
    concurrency: usize,

    /// Connection timeout in seconds
    #[arg(long, default_value = "10")]
    timeout_connect: f64,

    /// Total timeout per proxy in seconds
    #[arg(long, default_value = "30")]
    timeout: f64,

    /// Time threshold for slow proxy detection in seconds
    #[arg(long, default_value = "15")]
    slow_time: f64,

    /// Speed threshold for slow proxy detection in KB/s
    #[arg(long, default_value = "50")]
    slow_speed: f64,

    /// Lower bound of the freeze byte window
    #[arg(long, default_value = "14000")]
    stall_min: u64,

    /// Upper bound of the freeze byte window
    #[arg(long, default_value = "25000")]
    stall_max: u64,

    /// Silence in seconds inside the byte window that counts as a freeze
    #[arg(long, default_value = "5")]
    stall_silence: f64,

    /// URL returning the external IP as JSON (repeatable, tried in order)
    #[arg(long = "ip-url")]
    ip_urls: Vec<String>,

    /// URL used for the download test (repeatable, tried in order)
    #[arg(long = "payload-url")]
    payload_urls: Vec<String>,

    /// Verify TLS certificates of the test endpoints
    #[arg(long)]
    verify_tls: bool,

    /// Include slow proxies in working list when saving
    #[arg(long)]
    include_slow: bool,

    /// Write all results as JSON to this file
    #[arg(long)]
    json: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn check_config(&self) -> Result<CheckConfig> {
        let mut config = CheckConfig::new()
            .with_concurrency(self.concurrency)
            .with_connect_timeout(seconds("--timeout-connect", self.timeout_connect)?)
            .with_total_timeout(seconds("--timeout", self.timeout)?)
            .with_slow_time(seconds("--slow-time", self.slow_time)?)
            .with_slow_speed(self.slow_speed * 1024.0)
            .with_stall_window(self.stall_min, self.stall_max)
            .with_stall_silence(seconds("--stall-silence", self.stall_silence)?)
            .with_verify_tls(self.verify_tls);

        if !self.ip_urls.is_empty() {
            config = config.with_ip_urls(self.ip_urls.clone());
        }
        if !self.payload_urls.is_empty() {
            config = config.with_payload_urls(self.payload_urls.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

fn seconds(flag: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| anyhow!("Invalid {} value {}: {}", flag, value, e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config = cli.check_config()?;
    let proxies = ProxyParser::parse_file(&cli.input_file)?;
    if proxies.is_empty() {
        bail!("No proxies to check in {}", cli.input_file.display());
    }

    console::print_header(proxies.len(), &config);

    let coordinator = Coordinator::new(ProxyChecker::new(config.clone()), config.concurrency);
    let results = coordinator
        .run_all_with(proxies, |result| console::print_result(result, cli.verbose))
        .await;

    let summary = Summary::from_results(&results);
    console::print_summary(&summary);

    if let Some(output_path) = &cli.output {
        let working = report::working_proxies(&results, cli.include_slow);
        ProxyParser::save_to_file(&working, output_path)?;
        println!(
            "\nSaved {} working proxies to {}",
            working.len(),
            output_path.display()
        );
    }

    if let Some(json_path) = &cli.json {
        report::save_json(&results, &summary, json_path)?;
        info!("JSON report written to {}", json_path.display());
    }

    Ok(())
}
