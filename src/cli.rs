use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use telemetry_link::LinkConfig;
use telemetry_link::config::{
    DEFAULT_INTERPRETER, DEFAULT_IP, DEFAULT_MESSAGE_RATE, DEFAULT_PORT, DEFAULT_TIMEOUT_SECS,
};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "telemetry-link",
    about = "Launch a telemetry producer and consume its TCP stream"
)]
pub struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Launch the producer and log its telemetry until the link is lost
    Run(RunOpts),
    /// Check that a producer is accepting connections (nothing is launched)
    Probe(ProbeOpts),
}

#[derive(Args, Debug, Clone)]
pub struct TargetOpts {
    /// Producer server address (IPv4 or IPv6 literal)
    #[arg(long, default_value = DEFAULT_IP)]
    pub ip: String,
    /// Producer server port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Seconds to keep retrying the connect
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,
}

#[derive(Args, Debug, Clone)]
pub struct RunOpts {
    #[command(flatten)]
    pub target: TargetOpts,
    /// Producer program or script
    #[arg(long)]
    pub producer: PathBuf,
    /// Interpreter for the producer; empty runs it directly
    #[arg(long, default_value = DEFAULT_INTERPRETER)]
    pub interpreter: String,
    /// Device locator passed to the producer
    #[arg(long, default_value = "/dev/video0")]
    pub device: String,
    /// Producer message rate in Hz
    #[arg(long, default_value_t = DEFAULT_MESSAGE_RATE)]
    pub rate: u32,
    /// Record the producer's video to this path
    #[arg(long)]
    pub save: Option<PathBuf>,
    /// Show the producer in its own terminal
    #[arg(long, default_value_t = false)]
    pub display: bool,
    /// Stats print interval in seconds
    #[arg(long, default_value_t = 10)]
    pub stats: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ProbeOpts {
    #[command(flatten)]
    pub target: TargetOpts,
    /// Receive one payload and log it
    #[arg(long, default_value_t = false)]
    pub sample: bool,
}

impl RunOpts {
    pub fn to_config(&self) -> LinkConfig {
        let interpreter = Some(self.interpreter.clone()).filter(|i| !i.is_empty());
        let mut config = LinkConfig::new(&self.producer, &self.device)
            .with_interpreter(interpreter)
            .with_address(&self.target.ip, self.target.port)
            .with_connect_timeout(self.target.timeout)
            .with_message_rate(self.rate)
            .with_display(self.display)
            .with_stats_interval(Duration::from_secs(self.stats));
        if let Some(path) = &self.save {
            config = config.with_recording(path);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_flags_map_onto_config() {
        let cli = Cli::parse_from([
            "telemetry-link",
            "run",
            "--producer",
            "scripts/ImageTracker.py",
            "--interpreter",
            "",
            "--rate",
            "5",
            "--save",
            "out.avi",
            "--port",
            "4000",
        ]);
        let Cmd::Run(opts) = cli.cmd else {
            panic!("expected run");
        };
        let cfg = opts.to_config();
        assert_eq!(cfg.interpreter, None);
        assert_eq!(cfg.message_rate_hz, 5);
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.ip, "127.0.0.1");
        assert_eq!(cfg.connect_timeout_secs, 30);
        assert_eq!(cfg.recording_path, Some(PathBuf::from("out.avi")));
        assert!(!cfg.display);
    }

    #[test]
    fn probe_defaults() {
        let cli = Cli::parse_from(["telemetry-link", "-v", "probe"]);
        assert!(cli.verbose);
        let Cmd::Probe(opts) = cli.cmd else {
            panic!("expected probe");
        };
        assert_eq!(opts.target.port, 3456);
        assert!(!opts.sample);
    }
}
