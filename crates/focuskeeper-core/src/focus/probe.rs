//! Foreground window probes.
//!
//! Querying the OS for the frontmost window is platform specific and can fail
//! for mundane reasons (missing accessibility permission, a window closing
//! mid-query). Probes report those as [`ProbeError`] and the guard logs and
//! carries on.

use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::time::Duration;

use wait_timeout::ChildExt;

use super::{ForegroundTarget, TargetKind};
use crate::error::ProbeError;

pub trait ForegroundProbe: Send + Sync {
    /// The current foreground target, or `None` when nothing identifiable is in front.
    fn foreground(&self) -> Result<Option<ForegroundTarget>, ProbeError>;
}

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Runs an external command and parses `app<TAB>title[<TAB>url]` from stdout.
///
/// On X11, for example: `sh -c 'printf "%s\t%s" "$(xdotool getactivewindow getwindowclassname)" "$(xdotool getactivewindow getwindowname)"'`.
///
/// A command still running at the timeout is killed.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandProbe {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build from an argv list such as the `probe_command` config entry.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }

    pub fn parse_output(stdout: &str) -> Result<Option<ForegroundTarget>, ProbeError> {
        let Some(line) = stdout.lines().map(str::trim_end).find(|l| !l.trim().is_empty()) else {
            return Ok(None);
        };

        let mut fields = line.split('\t').map(str::trim);
        let name = fields
            .next()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ProbeError::BadOutput(line.to_string()))?;
        let title = fields.next().filter(|t| !t.is_empty()).map(str::to_owned);
        let url = fields.next().filter(|u| !u.is_empty()).map(str::to_owned);

        Ok(Some(ForegroundTarget {
            kind: if url.is_some() {
                TargetKind::Website
            } else {
                TargetKind::App
            },
            name: name.to_string(),
            title,
            url,
        }))
    }
}

impl ForegroundProbe for CommandProbe {
    fn foreground(&self) -> Result<Option<ForegroundTarget>, ProbeError> {
        let failed = |e: std::io::Error| ProbeError::CommandFailed(format!("{}: {e}", self.program));

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(failed)?;

        if child.wait_timeout(self.timeout).map_err(failed)?.is_none() {
            tracing::warn!(program = %self.program, "probe command timed out, killing it");
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProbeError::TimedOut(self.timeout.as_millis() as u64));
        }
        let output = child.wait_with_output().map_err(failed)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::CommandFailed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        Self::parse_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// A probe whose answer is set by hand. Used in tests and dry runs.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    current: Mutex<Option<ForegroundTarget>>,
    failures_left: Mutex<u32>,
}

impl ScriptedProbe {
    pub fn new(initial: Option<ForegroundTarget>) -> Self {
        Self {
            current: Mutex::new(initial),
            failures_left: Mutex::new(0),
        }
    }

    pub fn set_foreground(&self, target: Option<ForegroundTarget>) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = target;
    }

    /// Make the next `n` queries fail.
    pub fn fail_next(&self, n: u32) {
        *self.failures_left.lock().unwrap_or_else(|e| e.into_inner()) = n;
    }
}

impl ForegroundProbe for ScriptedProbe {
    fn foreground(&self) -> Result<Option<ForegroundTarget>, ProbeError> {
        {
            let mut failures = self.failures_left.lock().unwrap_or_else(|e| e.into_inner());
            if *failures > 0 {
                *failures -= 1;
                return Err(ProbeError::PermissionDenied("scripted failure".into()));
            }
        }
        Ok(self.current.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_app_and_title() {
        let target = CommandProbe::parse_output("Code\tmain.rs - focuskeeper\n")
            .unwrap()
            .unwrap();
        assert_eq!(target.kind, TargetKind::App);
        assert_eq!(target.name, "Code");
        assert_eq!(target.title.as_deref(), Some("main.rs - focuskeeper"));
        assert!(target.url.is_none());
    }

    #[test]
    fn parse_with_url_is_website() {
        let target = CommandProbe::parse_output("Firefox\tRust Blog\thttps://blog.rust-lang.org/")
            .unwrap()
            .unwrap();
        assert_eq!(target.kind, TargetKind::Website);
        assert_eq!(target.url.as_deref(), Some("https://blog.rust-lang.org/"));
    }

    #[test]
    fn parse_empty_and_bad_output() {
        assert!(CommandProbe::parse_output("\n  \n").unwrap().is_none());
        assert!(CommandProbe::parse_output("\ttitle only").is_err());
    }

    #[test]
    fn from_argv_requires_program() {
        assert!(CommandProbe::from_argv(&[]).is_none());
        assert!(CommandProbe::from_argv(&["xdotool".into(), "getactivewindow".into()]).is_some());
    }

    #[test]
    fn missing_program_is_an_error() {
        let probe = CommandProbe::new("focuskeeper-no-such-probe-binary", Vec::new());
        assert!(matches!(probe.foreground(), Err(ProbeError::CommandFailed(_))));
    }

    #[cfg(unix)]
    #[test]
    fn hung_command_is_killed_at_timeout() {
        let probe = CommandProbe::new("sleep", vec!["5".into()])
            .with_timeout(Duration::from_millis(100));
        let started = std::time::Instant::now();
        assert!(matches!(probe.foreground(), Err(ProbeError::TimedOut(100))));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[cfg(unix)]
    #[test]
    fn fast_command_output_is_parsed() {
        let probe = CommandProbe::new("printf", vec!["Steam\\tLibrary".into()]);
        let target = probe.foreground().unwrap().unwrap();
        assert_eq!(target.name, "Steam");
        assert_eq!(target.title.as_deref(), Some("Library"));
    }

    #[test]
    fn scripted_failures_then_answer() {
        let probe = ScriptedProbe::new(Some(ForegroundTarget::app("Steam", None)));
        probe.fail_next(2);
        assert!(probe.foreground().is_err());
        assert!(probe.foreground().is_err());
        assert_eq!(probe.foreground().unwrap().unwrap().name, "Steam");
    }
}
