//! Ping probe implementation on top of the system `ping` command.
//!
//! One echo request per probe. The reply line is parsed for the responder
//! address, round-trip time and TTL; anything else counts as a lost probe.

use std::net::IpAddr;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;

use super::{ProbeError, ProbeFuture, ProbeOutcome, Prober};

/// Extra time the `ping` process gets on top of the probe timeout before it
/// is killed.
pub const COMMAND_GRACE: Duration = Duration::from_secs(2);

/// Output dialect and command line of the platform `ping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingFlavor {
    /// `ping -n 1 -w <ms>`, replies as `Reply from <ip>: ... time=Nms TTL=N`
    Windows,
    /// `ping -c 1 -W <secs>`, replies as `N bytes from <ip>: ... time=N.N ms`
    Posix,
}

impl PingFlavor {
    /// The flavor of the platform this binary was built for.
    pub fn native() -> Self {
        if cfg!(windows) {
            PingFlavor::Windows
        } else {
            PingFlavor::Posix
        }
    }

    fn args(self, host: &str, timeout: Duration) -> Vec<String> {
        match self {
            PingFlavor::Windows => vec![
                "-n".to_string(),
                "1".to_string(),
                "-w".to_string(),
                timeout.as_millis().to_string(),
                host.to_string(),
            ],
            PingFlavor::Posix => {
                // -W takes whole seconds
                let secs = timeout.as_millis().div_ceil(1000).max(1);
                vec![
                    "-c".to_string(),
                    "1".to_string(),
                    "-W".to_string(),
                    secs.to_string(),
                    host.to_string(),
                ]
            }
        }
    }

    fn reply_regex(self) -> &'static Regex {
        static WINDOWS: OnceLock<Regex> = OnceLock::new();
        static POSIX: OnceLock<Regex> = OnceLock::new();

        match self {
            PingFlavor::Windows => WINDOWS.get_or_init(|| {
                Regex::new(r"(?i)reply from\s+([0-9a-f.:]+?):?\s.*?time[=<]?\s*(\d+)\s*ms").unwrap()
            }),
            PingFlavor::Posix => POSIX.get_or_init(|| {
                Regex::new(
                    r"(?i)bytes from\s+(?:\S+\s+\()?([0-9a-f.:]+?)\)?:?\s.*?time[=<\s]\s*([0-9.]+)\s*ms",
                )
                .unwrap()
            }),
        }
    }
}

/// Probe adapter that runs the platform `ping` once per attempt.
#[derive(Debug, Clone)]
pub struct PingCommand {
    program: String,
    flavor: PingFlavor,
}

impl Default for PingCommand {
    fn default() -> Self {
        Self {
            program: "ping".to_string(),
            flavor: PingFlavor::native(),
        }
    }
}

impl PingCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use another executable, e.g. an absolute path or a wrapper script.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_flavor(mut self, flavor: PingFlavor) -> Self {
        self.flavor = flavor;
        self
    }

    async fn run(&self, host: &str, timeout: Duration) -> Result<ProbeOutcome, ProbeError> {
        if host.is_empty() || host.starts_with('-') {
            return Err(ProbeError::Command(format!("refusing to ping {:?}", host)));
        }

        let limit = timeout + COMMAND_GRACE;
        let mut command = Command::new(&self.program);
        command
            .args(self.flavor.args(host, timeout))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(limit, command.output())
            .await
            .map_err(|_| ProbeError::Timeout(limit))?
            .map_err(|e| ProbeError::Command(format!("failed to execute {}: {}", self.program, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_ping_output(&stdout, self.flavor)
    }
}

impl Prober for PingCommand {
    fn probe<'a>(&'a self, host: &'a str, timeout: Duration) -> ProbeFuture<'a> {
        Box::pin(async move {
            let result = self.run(host, timeout).await;
            if let Err(e) = &result {
                tracing::debug!(%host, error = %e, "ping probe failed");
            }
            ProbeOutcome::from(result)
        })
    }
}

/// Parse ping output for the first echo reply.
///
/// The TTL is optional and may appear before or after the time field.
fn parse_ping_output(output: &str, flavor: PingFlavor) -> Result<ProbeOutcome, ProbeError> {
    static TTL: OnceLock<Regex> = OnceLock::new();
    let ttl_re = TTL.get_or_init(|| Regex::new(r"(?i)\bttl[=\s]\s*(\d+)").unwrap());
    let reply_re = flavor.reply_regex();

    for line in output.lines() {
        let Some(caps) = reply_re.captures(line) else {
            continue;
        };
        let Ok(latency_ms) = caps[2].parse::<f64>() else {
            continue;
        };

        let responder = caps[1].parse::<IpAddr>().ok().map(|ip| ip.to_string());
        let ttl = ttl_re
            .captures(line)
            .and_then(|c| c[1].parse::<u32>().ok());

        return Ok(ProbeOutcome::success(latency_ms, responder, ttl));
    }

    Err(ProbeError::NoReply)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posix_args() {
        let args = PingFlavor::Posix.args("8.8.8.8", Duration::from_millis(1500));
        assert_eq!(args, vec!["-c", "1", "-W", "2", "8.8.8.8"]);

        let args = PingFlavor::Posix.args("8.8.8.8", Duration::from_millis(200));
        assert_eq!(args[3], "1");
    }

    #[test]
    fn test_windows_args() {
        let args = PingFlavor::Windows.args("example.com", Duration::from_millis(750));
        assert_eq!(args, vec!["-n", "1", "-w", "750", "example.com"]);
    }

    #[test]
    fn test_parse_linux() {
        let output = r#"PING 8.8.8.8 (8.8.8.8) 56(84) bytes of data.
64 bytes from 8.8.8.8: icmp_seq=1 ttl=117 time=12.3 ms

--- 8.8.8.8 ping statistics ---
1 packets transmitted, 1 received, 0% packet loss, time 0ms
rtt min/avg/max/mdev = 12.300/12.300/12.300/0.000 ms"#;
        let outcome = parse_ping_output(output, PingFlavor::Posix).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.latency_ms, Some(12.3));
        assert_eq!(outcome.responder_address.as_deref(), Some("8.8.8.8"));
        assert_eq!(outcome.ttl, Some(117));
    }

    #[test]
    fn test_parse_linux_named_host() {
        let output = "64 bytes from lhr25s34-in-f14.1e100.net (142.250.187.206): icmp_seq=1 ttl=117 time=9.13 ms";
        let outcome = parse_ping_output(output, PingFlavor::Posix).unwrap();
        assert_eq!(outcome.responder_address.as_deref(), Some("142.250.187.206"));
        assert_eq!(outcome.latency_ms, Some(9.13));
    }

    #[test]
    fn test_parse_posix_without_ttl() {
        let output = "64 bytes from 2001:4860:4860::8888: icmp_seq=1 time=14.2 ms";
        let outcome = parse_ping_output(output, PingFlavor::Posix).unwrap();
        assert_eq!(outcome.latency_ms, Some(14.2));
        assert_eq!(outcome.responder_address.as_deref(), Some("2001:4860:4860::8888"));
        assert_eq!(outcome.ttl, None);
    }

    #[test]
    fn test_parse_macos() {
        let output = r#"PING google.com (142.250.69.174): 56 data bytes
64 bytes from 142.250.69.174: icmp_seq=0 ttl=116 time=17.906 ms

--- google.com ping statistics ---
1 packets transmitted, 1 packets received, 0.0% packet loss
round-trip min/avg/max/stddev = 17.906/17.906/17.906/0.000 ms"#;
        let outcome = parse_ping_output(output, PingFlavor::Posix).unwrap();
        assert_eq!(outcome.latency_ms, Some(17.906));
        assert_eq!(outcome.ttl, Some(116));
    }

    #[test]
    fn test_parse_windows() {
        let output = r#"Pinging 8.8.8.8 with 32 bytes of data:
Reply from 8.8.8.8: bytes=32 time=14ms TTL=117

Ping statistics for 8.8.8.8:
    Packets: Sent = 1, Received = 1, Lost = 0 (0% loss),"#;
        let outcome = parse_ping_output(output, PingFlavor::Windows).unwrap();
        assert_eq!(outcome.latency_ms, Some(14.0));
        assert_eq!(outcome.responder_address.as_deref(), Some("8.8.8.8"));
        assert_eq!(outcome.ttl, Some(117));

        let outcome = parse_ping_output("Reply from 10.0.0.1: bytes=32 time<1ms TTL=64", PingFlavor::Windows).unwrap();
        assert_eq!(outcome.latency_ms, Some(1.0));
    }

    #[test]
    fn test_parse_no_reply() {
        let unreachable = "Reply from 192.168.1.1: Destination host unreachable.";
        assert!(matches!(
            parse_ping_output(unreachable, PingFlavor::Windows),
            Err(ProbeError::NoReply)
        ));

        let lost = r#"PING 10.255.255.1 (10.255.255.1) 56(84) bytes of data.

--- 10.255.255.1 ping statistics ---
1 packets transmitted, 0 received, 100% packet loss, time 0ms"#;
        assert!(matches!(
            parse_ping_output(lost, PingFlavor::Posix),
            Err(ProbeError::NoReply)
        ));
    }

    #[tokio::test]
    async fn test_missing_program_is_failure() {
        let prober = PingCommand::new().with_program("/nonexistent/ping-binary");
        let outcome = prober.probe("127.0.0.1", Duration::from_millis(100)).await;
        assert_eq!(outcome, ProbeOutcome::failure());
    }

    #[tokio::test]
    async fn test_option_like_host_is_failure() {
        let outcome = PingCommand::new().probe("-f", Duration::from_millis(100)).await;
        assert_eq!(outcome, ProbeOutcome::failure());
    }
}
