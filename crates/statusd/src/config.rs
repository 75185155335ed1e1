use crate::cli::Args;
use anyhow::Context;
use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use system_utils::CommandSpec;

const DEFAULT_LOADAVG_PATH: &str = "/proc/loadavg";
const DEFAULT_MEMINFO_PATH: &str = "/proc/meminfo";
const DEFAULT_COLLECTOR_TIMEOUT: &str = "10s";
const DEFAULT_TASKLIST: [&[&str]; 2] = [&["ps", "ax"], &["grep", "[s]u nobody"]];

/// Everything the server needs, resolved once at startup.
#[derive(Debug)]
pub(crate) struct ProbeConfig {
    pub(crate) listen_addr: SocketAddr,
    pub(crate) token: String,
    pub(crate) tls: Option<TlsConfig>,
    pub(crate) collectors: CollectorConfig,
}

#[derive(Debug, Clone)]
pub(crate) struct TlsConfig {
    pub(crate) cert: PathBuf,
    pub(crate) key: PathBuf,
}

#[derive(Debug, Clone)]
pub(crate) struct CollectorConfig {
    pub(crate) loadavg_path: PathBuf,
    pub(crate) meminfo_path: PathBuf,
    pub(crate) timeout: Duration,
    pub(crate) tasklist: Vec<CommandSpec>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    collectors: CollectorsSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CollectorsSection {
    #[serde(default = "default_loadavg_path")]
    loadavg_path: PathBuf,
    #[serde(default = "default_meminfo_path")]
    meminfo_path: PathBuf,
    #[serde(default = "default_timeout")]
    timeout: String,
    #[serde(default = "default_tasklist")]
    tasklist: Vec<StageSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StageSection {
    argv: Vec<String>,
}

impl Default for CollectorsSection {
    fn default() -> Self {
        Self {
            loadavg_path: default_loadavg_path(),
            meminfo_path: default_meminfo_path(),
            timeout: default_timeout(),
            tasklist: default_tasklist(),
        }
    }
}

impl ProbeConfig {
    pub(crate) fn from_args(args: &Args) -> anyhow::Result<Self> {
        let file = match &args.config {
            Some(path) => load_config_file(path)?,
            None => ConfigFile::default(),
        };
        validate_token(&args.token)?;
        let listen_addr = parse_listen_addr(&args.listen_addr)?;
        let tls = args.ssl.then(|| TlsConfig {
            cert: args.cert.clone(),
            key: args.key.clone(),
        });
        let collectors = CollectorConfig::from_section(file.collectors)?;
        Ok(Self {
            listen_addr,
            token: args.token.clone(),
            tls,
            collectors,
        })
    }
}

impl CollectorConfig {
    fn from_section(section: CollectorsSection) -> anyhow::Result<Self> {
        let timeout = humantime::parse_duration(&section.timeout)
            .with_context(|| format!("invalid collectors.timeout {:?}", section.timeout))?;
        if timeout.is_zero() {
            anyhow::bail!("collectors.timeout must be greater than zero");
        }
        let tasklist = section
            .tasklist
            .into_iter()
            .enumerate()
            .map(|(index, stage)| {
                CommandSpec::new(stage.argv)
                    .with_context(|| format!("collectors.tasklist[{index}] must set argv"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self {
            loadavg_path: section.loadavg_path,
            meminfo_path: section.meminfo_path,
            timeout,
            tasklist,
        })
    }
}

fn load_config_file(path: &Path) -> anyhow::Result<ConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    Ok(config)
}

fn validate_token(token: &str) -> anyhow::Result<()> {
    if token.starts_with('/') {
        anyhow::bail!("token must not start with '/'");
    }
    if token
        .chars()
        .any(|c| matches!(c, ':' | '*' | '{' | '}') || c.is_whitespace())
    {
        anyhow::bail!("token must not contain ':', '*', braces or whitespace");
    }
    Ok(())
}

pub(crate) fn parse_listen_addr(raw: &str) -> anyhow::Result<SocketAddr> {
    let normalized = normalize_listen_addr(raw);
    normalized
        .to_socket_addrs()
        .with_context(|| format!("invalid listen address {raw}"))?
        .next()
        .with_context(|| format!("listen address {raw} did not resolve"))
}

fn normalize_listen_addr(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with(':') {
        format!("0.0.0.0{raw}")
    } else {
        raw.to_string()
    }
}

fn default_loadavg_path() -> PathBuf {
    PathBuf::from(DEFAULT_LOADAVG_PATH)
}

fn default_meminfo_path() -> PathBuf {
    PathBuf::from(DEFAULT_MEMINFO_PATH)
}

fn default_timeout() -> String {
    DEFAULT_COLLECTOR_TIMEOUT.to_string()
}

fn default_tasklist() -> Vec<StageSection> {
    DEFAULT_TASKLIST
        .iter()
        .map(|argv| StageSection {
            argv: argv.iter().map(|arg| arg.to_string()).collect(),
        })
        .collect()
}

#[cfg(test)]
pub(crate) fn test_collectors(
    loadavg_path: PathBuf,
    meminfo_path: PathBuf,
    tasklist: Vec<CommandSpec>,
) -> CollectorConfig {
    CollectorConfig {
        loadavg_path,
        meminfo_path,
        timeout: Duration::from_secs(10),
        tasklist,
    }
}

#[cfg(test)]
pub(crate) fn default_collectors() -> CollectorConfig {
    CollectorConfig::from_section(CollectorsSection::default()).expect("default collectors")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse_collectors(input: &str) -> anyhow::Result<CollectorConfig> {
        let file: ConfigFile = toml::from_str(input)?;
        CollectorConfig::from_section(file.collectors)
    }

    #[test]
    fn defaults_read_proc_and_filter_su_nobody() {
        let config = parse_collectors("").unwrap();
        assert_eq!(config.loadavg_path, PathBuf::from("/proc/loadavg"));
        assert_eq!(config.meminfo_path, PathBuf::from("/proc/meminfo"));
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.tasklist.len(), 2);
        assert_eq!(config.tasklist[0].argv(), ["ps", "ax"]);
        assert_eq!(config.tasklist[1].argv(), ["grep", "[s]u nobody"]);
    }

    #[test]
    fn collectors_section_overrides_defaults() {
        let input = r#"
[collectors]
loadavg_path = "/tmp/loadavg"
timeout = "250ms"

[[collectors.tasklist]]
argv = ["ps", "-eo", "pid,comm"]
"#;
        let config = parse_collectors(input).unwrap();
        assert_eq!(config.loadavg_path, PathBuf::from("/tmp/loadavg"));
        assert_eq!(config.meminfo_path, PathBuf::from("/proc/meminfo"));
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert_eq!(config.tasklist.len(), 1);
        assert_eq!(config.tasklist[0].program(), "ps");
    }

    #[test]
    fn empty_tasklist_is_allowed() {
        let input = r#"
[collectors]
tasklist = []
"#;
        let config = parse_collectors(input).unwrap();
        assert!(config.tasklist.is_empty());
    }

    #[test]
    fn stage_requires_argv() {
        let input = r#"
[[collectors.tasklist]]
argv = []
"#;
        assert!(parse_collectors(input).is_err());
    }

    #[test]
    fn timeout_must_be_positive_duration() {
        assert!(parse_collectors("[collectors]\ntimeout = \"0s\"\n").is_err());
        assert!(parse_collectors("[collectors]\ntimeout = \"soon\"\n").is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let parsed: Result<ConfigFile, _> = toml::from_str("[collectors]\nloadavg = \"/x\"\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn go_style_port_binds_every_interface() {
        assert_eq!(normalize_listen_addr(":8080"), "0.0.0.0:8080");
        assert_eq!(
            parse_listen_addr(":8080").unwrap(),
            "0.0.0.0:8080".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_listen_addr("127.0.0.1:19310").unwrap(),
            "127.0.0.1:19310".parse::<SocketAddr>().unwrap()
        );
        assert!(parse_listen_addr("not an address").is_err());
    }

    #[test]
    fn token_rejects_route_syntax() {
        assert!(validate_token("").is_ok());
        assert!(validate_token("xyz").is_ok());
        assert!(validate_token("a/b").is_ok());
        assert!(validate_token(":id").is_err());
        assert!(validate_token("*rest").is_err());
        assert!(validate_token("/xyz").is_err());
        assert!(validate_token("x y").is_err());
    }

    #[test]
    fn from_args_enables_tls_with_cert_paths() {
        let args = Args::try_parse_from([
            "statusd",
            "-p",
            "127.0.0.1:8443",
            "-t",
            "xyz",
            "--ssl",
            "--cert",
            "/etc/statusd/cert.pem",
        ])
        .unwrap();
        let config = ProbeConfig::from_args(&args).unwrap();
        let tls = config.tls.expect("tls enabled");
        assert_eq!(tls.cert, PathBuf::from("/etc/statusd/cert.pem"));
        assert_eq!(tls.key, PathBuf::from("key.pem"));
        assert_eq!(config.token, "xyz");
        assert_eq!(config.listen_addr.port(), 8443);
    }

    #[test]
    fn from_args_reports_missing_config_file() {
        let args =
            Args::try_parse_from(["statusd", "--config", "/nonexistent/statusd.toml"]).unwrap();
        let err = ProbeConfig::from_args(&args).unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }
}
