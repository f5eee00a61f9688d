use clap::Parser;
use log::{error, warn};
use packet_tally::analysis::{analyze_file, CaptureSession};
use packet_tally::capture::{list_interfaces, CaptureError, StopSignal};
use packet_tally::config::Config;
use packet_tally::formatting::format_summary;
use packet_tally::persistence::{save_packets, save_stats};
use std::path::{Path, PathBuf};
use std::process;

const EXIT_OK: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_PERMISSION_DENIED: i32 = 2;
const EXIT_WRITE_FAILURE: i32 = 3;

#[derive(Parser, Debug)]
#[command(name = "packet-tally")]
#[command(about = "Capture network packets and count them by transport protocol")]
struct Cli {
    #[arg(short, long, help = "Network interface to capture from")]
    interface: Option<String>,

    #[arg(short = 'n', long, help = "Number of packets to capture (default: unlimited)")]
    count: Option<u64>,

    #[arg(short, long, help = "BPF filter expression, e.g. \"tcp port 80\"")]
    filter: Option<String>,

    #[arg(short, long, help = "Save captured packets to a pcap file")]
    output: Option<PathBuf>,

    #[arg(short, long = "stats-file", help = "Save statistics to a JSON file")]
    stats_file: Option<PathBuf>,

    #[arg(short, long = "list-interfaces", help = "List available network interfaces")]
    list_interfaces: bool,

    #[arg(short, long, help = "Analyze an existing pcap file")]
    analyze: Option<PathBuf>,

    #[arg(short, long, help = "Configuration file path")]
    config: Option<PathBuf>,

    #[arg(long = "dump-config", help = "Write the effective configuration to a TOML file and exit")]
    dump_config: Option<PathBuf>,

    #[arg(short, long, help = "Enable debug logging")]
    debug: bool,
}

impl Cli {
    /// Config file values, overridden by whatever was given on the command line.
    fn effective_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from_file(path)?,
            None => Config::default(),
        };

        if self.interface.is_some() {
            config.capture.interface = self.interface.clone();
        }
        if self.count.is_some() {
            config.capture.count = self.count;
        }
        if self.filter.is_some() {
            config.capture.filter = self.filter.clone();
        }
        if self.output.is_some() {
            config.output.packets = self.output.clone();
        }
        if self.stats_file.is_some() {
            config.output.stats = self.stats_file.clone();
        }
        Ok(config)
    }
}

fn init_logging(debug: bool, analyze: bool) {
    let filter = match (debug, analyze) {
        (true, _) => "debug",
        // per-packet lines are noise when reading a whole file
        (false, true) => "info,packet_tally::packets=warn",
        (false, false) => "info",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();
}

fn exit_code_for(err: &CaptureError) -> i32 {
    if err.is_permission_denied() {
        EXIT_PERMISSION_DENIED
    } else {
        EXIT_FAILURE
    }
}

fn install_interrupt_handler(stop: &StopSignal) {
    let stop = stop.clone();
    let result = ctrlc::set_handler(move || {
        if stop.is_stopped() {
            // second Ctrl-C: give up on a graceful stop
            process::exit(130);
        }
        eprintln!("\nStopping capture...");
        stop.stop();
    });
    if let Err(e) = result {
        warn!("Could not install Ctrl-C handler: {}", e);
    }
}

fn print_interfaces() -> i32 {
    match list_interfaces() {
        Ok(interfaces) => {
            println!("\nAvailable Network Interfaces:");
            for iface in interfaces {
                match iface.description {
                    Some(desc) => println!("- {} ({})", iface.name, desc),
                    None => println!("- {}", iface.name),
                }
            }
            EXIT_OK
        }
        Err(e) => {
            error!("{}", e);
            exit_code_for(&e)
        }
    }
}

fn analyze(path: &Path, config: &Config) -> i32 {
    let tally = match analyze_file(path) {
        Ok(tally) => tally,
        Err(e) => {
            error!("Error analyzing capture file: {}", e);
            return exit_code_for(&e);
        }
    };

    println!("\nAnalysis Results:");
    println!("{}", format_summary(&tally));

    if let Some(stats_path) = &config.output.stats {
        if let Err(e) = save_stats(&tally.report_with_total(), stats_path) {
            error!("Error saving results: {}", e);
            return EXIT_WRITE_FAILURE;
        }
        println!("\nResults saved to: {}", stats_path.display());
    }
    EXIT_OK
}

fn capture(config: &Config) -> i32 {
    let stop = StopSignal::new();
    install_interrupt_handler(&stop);

    let mut session = CaptureSession::new(config.capture.clone(), config.retains_packets(), stop);
    if let Err(e) = session.run_live() {
        error!("{}", e);
        return exit_code_for(&e);
    }

    let (tally, retained) = session.finalize();
    println!("\nCapture Statistics:");
    println!("{}", format_summary(&tally));

    let mut code = EXIT_OK;
    if let Some(path) = &config.output.packets {
        match save_packets(retained, path) {
            Ok(()) => println!("\nPackets saved to: {}", path.display()),
            Err(e) => {
                error!("Error saving packets: {}", e);
                code = EXIT_WRITE_FAILURE;
            }
        }
    }
    if let Some(path) = &config.output.stats {
        match save_stats(&tally.report(), path) {
            Ok(()) => println!("\nStatistics saved to: {}", path.display()),
            Err(e) => {
                error!("Error saving statistics: {}", e);
                code = EXIT_WRITE_FAILURE;
            }
        }
    }
    code
}

fn run(cli: &Cli) -> anyhow::Result<i32> {
    let config = cli.effective_config()?;

    if let Some(path) = &cli.dump_config {
        config.save_to_file(path)?;
        println!("Configuration written to: {}", path.display());
        return Ok(EXIT_OK);
    }

    if cli.list_interfaces {
        return Ok(print_interfaces());
    }

    if let Some(path) = &cli.analyze {
        return Ok(analyze(path, &config));
    }

    Ok(capture(&config))
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.analyze.is_some());

    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_FAILURE
        }
    };
    process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "packet-tally",
            "-i",
            "eth0",
            "-n",
            "100",
            "-f",
            "tcp port 80",
            "-o",
            "capture.pcap",
            "-s",
            "stats.json",
        ]);
        let config = cli.effective_config().unwrap();

        assert_eq!(config.capture.interface.as_deref(), Some("eth0"));
        assert_eq!(config.capture.count, Some(100));
        assert_eq!(config.capture.filter.as_deref(), Some("tcp port 80"));
        assert_eq!(config.output.packets, Some(PathBuf::from("capture.pcap")));
        assert_eq!(config.output.stats, Some(PathBuf::from("stats.json")));
        assert!(config.retains_packets());
    }

    #[test]
    fn test_flags_parse() {
        let cli = Cli::parse_from(["packet-tally", "-l", "-d"]);
        assert!(cli.list_interfaces);
        assert!(cli.debug);

        let cli = Cli::parse_from(["packet-tally", "-a", "trace.pcap"]);
        assert_eq!(cli.analyze, Some(PathBuf::from("trace.pcap")));
    }

    #[test]
    fn test_exit_codes() {
        let denied = CaptureError::PermissionDenied("denied".into());
        assert_eq!(exit_code_for(&denied), EXIT_PERMISSION_DENIED);
        let failed = CaptureError::CaptureFailure("no such device".into());
        assert_eq!(exit_code_for(&failed), EXIT_FAILURE);
        let read = CaptureError::FileReadFailure {
            path: "x.pcap".into(),
            reason: "bad magic".into(),
        };
        assert_eq!(exit_code_for(&read), EXIT_FAILURE);
    }

    #[test]
    fn test_missing_analysis_file_fails() {
        let config = Config::default();
        assert_eq!(analyze(Path::new("/nonexistent/trace.pcap"), &config), EXIT_FAILURE);
    }
}
