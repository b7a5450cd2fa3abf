//! Producer process launch.
//!
//! The producer is started from a structured argument list (no shell string)
//! and detached from our standard streams. Callers never wait on or kill it;
//! a background thread only collects its exit status so finished producers
//! do not linger as zombies. Whether it actually came up is decided by the
//! connect that follows.

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;

use log::{debug, info, warn};

use crate::config::LinkConfig;
use crate::error::LinkError;

/// Terminal used to show the producer when display is enabled.
#[cfg(unix)]
pub const DISPLAY_TERMINAL: [&str; 3] = ["gnome-terminal", "--window", "--"];
/// `start` opens a new console window; the empty string is its title.
#[cfg(windows)]
pub const DISPLAY_TERMINAL: [&str; 6] = ["cmd", "/C", "start", "", "cmd", "/C"];

/// A fully resolved producer invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchCommand {
    pub interpreter: Option<String>,
    pub producer: PathBuf,
    pub device: String,
    pub rate_hz: u32,
    pub display: bool,
    pub recording: Option<PathBuf>,
}

impl LaunchCommand {
    pub fn from_config(config: &LinkConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            producer: config.producer.clone(),
            device: config.device.clone(),
            rate_hz: config.message_rate_hz,
            display: config.display,
            recording: config.recording_path.clone(),
        }
    }

    /// Producer argument vector, program first. Flag names are the producer's
    /// public contract: `--port`, `--rate`, `--display`, `--save`.
    pub fn argv(&self) -> Vec<OsString> {
        let mut argv: Vec<OsString> = Vec::new();

        macro_rules! push_flag {
            ($k:literal) => {{
                argv.push(OsString::from($k));
            }};
            ($k:literal, $v:expr) => {{
                argv.push(OsString::from($k));
                argv.push(OsString::from($v));
            }};
        }

        if let Some(interpreter) = &self.interpreter {
            argv.push(OsString::from(interpreter));
        }
        argv.push(self.producer.clone().into_os_string());
        push_flag!("--port", &self.device);
        push_flag!("--rate", self.rate_hz.to_string());
        if self.display {
            push_flag!("--display");
        }
        if let Some(path) = &self.recording {
            push_flag!("--save", path);
        }
        argv
    }

    #[cfg(unix)]
    pub fn command(&self) -> Command {
        use std::os::unix::process::CommandExt;

        let mut argv = self.argv();
        if self.display {
            argv.splice(0..0, DISPLAY_TERMINAL.map(OsString::from));
        }
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            // own process group: a Ctrl-C aimed at us does not reach the producer
            .process_group(0);
        cmd
    }

    #[cfg(windows)]
    pub fn command(&self) -> Command {
        use std::os::windows::process::CommandExt;

        const DETACHED_PROCESS: u32 = 0x0000_0008;

        let mut argv = self.argv();
        if self.display {
            argv.splice(0..0, DISPLAY_TERMINAL.map(OsString::from));
        }
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        if !self.display {
            cmd.creation_flags(DETACHED_PROCESS)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());
        }
        cmd
    }
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let argv: Vec<String> = self
            .argv()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        f.write_str(&argv.join(" "))
    }
}

pub trait Launcher {
    /// Start the producer. Only the spawn step itself can fail here.
    fn launch(&mut self, cmd: &LaunchCommand) -> Result<(), LinkError>;
}

/// Spawns the producer as a detached OS process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    /// Spawn `cmd` and hand the child to a reaper thread. Returns its pid.
    fn spawn_detached(cmd: &LaunchCommand) -> Result<u32, LinkError> {
        let mut child = cmd.command().spawn().map_err(LinkError::ProducerLaunch)?;
        let pid = child.id();
        let reaper = thread::Builder::new()
            .name(format!("reap-{}", pid))
            .spawn(move || match child.wait() {
                Ok(status) => debug!("producer {} exited: {}", pid, status),
                Err(e) => warn!("waiting on producer {}: {}", pid, e),
            });
        if let Err(e) = reaper {
            // the child is already running; only its exit status is lost
            warn!("no reaper for producer {}: {}", pid, e);
        }
        Ok(pid)
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&mut self, cmd: &LaunchCommand) -> Result<(), LinkError> {
        info!("executing command: {}", cmd);
        let pid = Self::spawn_detached(cmd)?;
        info!("producer started (pid {})", pid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_INTERPRETER;

    fn strings(argv: Vec<OsString>) -> Vec<String> {
        argv.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn default_invocation() {
        let cfg = LinkConfig::new("scripts/ImageTracker.py", "/dev/video0");
        let cmd = LaunchCommand::from_config(&cfg);
        assert_eq!(
            strings(cmd.argv()),
            [
                DEFAULT_INTERPRETER,
                "scripts/ImageTracker.py",
                "--port",
                "/dev/video0",
                "--rate",
                "1"
            ]
        );
        assert_eq!(
            cmd.to_string(),
            format!("{DEFAULT_INTERPRETER} scripts/ImageTracker.py --port /dev/video0 --rate 1")
        );
    }

    #[test]
    fn display_and_recording_flags() {
        let cfg = LinkConfig::new("tracker", "/dev/video2")
            .with_interpreter(None)
            .with_message_rate(20)
            .with_display(true)
            .with_recording("out dir/run 1.avi");
        let argv = strings(LaunchCommand::from_config(&cfg).argv());
        assert_eq!(
            argv,
            [
                "tracker",
                "--port",
                "/dev/video2",
                "--rate",
                "20",
                "--display",
                "--save",
                "out dir/run 1.avi"
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn display_wraps_in_terminal() {
        let cfg = LinkConfig::new("tracker.py", "/dev/video0").with_display(true);
        let cmd = LaunchCommand::from_config(&cfg).command();
        assert_eq!(cmd.get_program(), "gnome-terminal");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(&args[..4], ["--window", "--", "python3", "tracker.py"]);
    }

    #[cfg(unix)]
    #[test]
    fn headless_runs_program_directly() {
        let cfg = LinkConfig::new("tracker.py", "/dev/video0");
        let cmd = LaunchCommand::from_config(&cfg).command();
        assert_eq!(cmd.get_program(), "python3");
    }

    #[cfg(unix)]
    #[test]
    fn spawn_failure_is_a_launch_error() {
        let cfg =
            LinkConfig::new("/nonexistent/producer-binary", "/dev/null").with_interpreter(None);
        let err = ProcessLauncher
            .launch(&LaunchCommand::from_config(&cfg))
            .unwrap_err();
        assert!(matches!(err, LinkError::ProducerLaunch(_)));
    }

    #[cfg(unix)]
    #[test]
    fn spawn_does_not_wait_for_producer() {
        let cfg = LinkConfig::new("true", "/dev/null").with_interpreter(None);
        ProcessLauncher
            .launch(&LaunchCommand::from_config(&cfg))
            .unwrap();
    }

    #[cfg(windows)]
    #[test]
    fn display_opens_a_console_window() {
        let cfg = LinkConfig::new("tracker.py", "COM3").with_display(true);
        let cmd = LaunchCommand::from_config(&cfg).command();
        assert_eq!(cmd.get_program(), "cmd");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(&args[..7], ["/C", "start", "", "cmd", "/C", "python", "tracker.py"]);
    }

    /// Process state letter from `/proc/<pid>/stat`, if `pid` is still our child.
    #[cfg(target_os = "linux")]
    fn child_state(pid: u32) -> Option<char> {
        let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
        // "pid (comm) S ppid ..."; comm may itself contain spaces or parens
        let mut rest = stat[stat.rfind(')')? + 1..].split_whitespace();
        let state = rest.next()?.chars().next()?;
        let ppid: u32 = rest.next()?.parse().ok()?;
        (ppid == std::process::id()).then_some(state)
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn finished_producers_are_reaped() {
        let cfg = LinkConfig::new("true", "/dev/null").with_interpreter(None);
        let cmd = LaunchCommand::from_config(&cfg);
        let pids: Vec<u32> = (0..3)
            .map(|_| ProcessLauncher::spawn_detached(&cmd).unwrap())
            .collect();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            let left: Vec<_> = pids.iter().filter_map(|&p| child_state(p)).collect();
            if left.is_empty() {
                break;
            }
            assert!(
                std::time::Instant::now() < deadline,
                "children still present: {:?}",
                left
            );
            thread::sleep(std::time::Duration::from_millis(50));
        }
    }
}
