use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use derive_setters::Setters;
use url::Url;

use crate::domain::{DEFAULT_INTERVAL_MS, DEFAULT_MAX_ROWS, LPError, MIN_INTERVAL_MS};

/// Live table panes fed by a refresh endpoint and a push channel.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// Origin of the backend serving both endpoints
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    pub origin: String,

    /// Origin used for refresh requests, overrides --origin
    #[arg(long)]
    pub request_origin: Option<String>,

    /// Origin used for the push channel, overrides --origin
    #[arg(long)]
    pub ws_origin: Option<String>,

    #[arg(long, default_value = "/request")]
    pub request_path: String,

    #[arg(long, default_value = "/ws")]
    pub ws_path: String,

    /// Pane bound to INDEX, optionally titled: INDEX[=TITLE]. Repeatable.
    #[arg(long = "pane", value_name = "INDEX[=TITLE]")]
    pub panes: Vec<String>,

    /// Auto refresh interval in milliseconds (minimum 200)
    #[arg(long, default_value_t = DEFAULT_INTERVAL_MS)]
    pub interval_ms: u64,

    /// Start with auto refresh disabled
    #[arg(long)]
    pub no_auto_refresh: bool,

    /// Number of most recent rows kept per pane
    #[arg(long, default_value_t = DEFAULT_MAX_ROWS)]
    pub max_rows: usize,

    /// Reconnect the push channel with exponential backoff after it closes
    #[arg(long)]
    pub reconnect: bool,

    /// Skip a refresh request while the previous one for the same index is in flight
    #[arg(long)]
    pub coalesce: bool,

    #[arg(long, default_value_t = 10_000)]
    pub request_timeout_ms: u64,

    #[arg(long, default_value_t = 100)]
    pub event_poll_ms: u64,

    #[arg(long, default_value = "~/.livepane.log")]
    pub log_file: String,
}

#[derive(Debug, Clone, PartialEq, Setters)]
pub struct PaneConfig {
    #[setters(into)]
    pub index: String,
    #[setters(strip_option, into)]
    pub title: Option<String>,
    pub auto_refresh: bool,
    pub interval_ms: u64,
    pub max_rows: usize,
}

impl PaneConfig {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            title: None,
            auto_refresh: true,
            interval_ms: DEFAULT_INTERVAL_MS,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }

    /// Parses `INDEX[=TITLE]`.
    pub fn parse(entry: &str) -> Result<Self, LPError> {
        let (index, title) = match entry.split_once('=') {
            Some((index, title)) => (index.trim(), Some(title.trim())),
            None => (entry.trim(), None),
        };
        if index.is_empty() {
            return Err(LPError::Config(format!("pane '{entry}' has no index")));
        }
        let mut pane = PaneConfig::new(index);
        if let Some(title) = title.filter(|t| !t.is_empty()) {
            pane = pane.title(title);
        }
        Ok(pane)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub request_url: Url,
    pub ws_url: Url,
    pub panes: Vec<PaneConfig>,
    pub reconnect: bool,
    pub coalesce: bool,
    pub request_timeout: Duration,
    pub event_poll_time: u64,
    pub log_file: PathBuf,
}

pub const DEFAULT_PANES: [&str; 2] = ["ds_top", "ds_bottom"];

impl AppConfig {
    pub fn from_args(args: &Args) -> Result<Self, LPError> {
        let origin = Url::parse(&args.origin)?;
        let request_origin = match &args.request_origin {
            Some(o) => Url::parse(o)?,
            None => origin.clone(),
        };
        let ws_origin = match &args.ws_origin {
            Some(o) => Url::parse(o)?,
            None => origin,
        };

        let entries: Vec<&str> = if args.panes.is_empty() {
            DEFAULT_PANES.to_vec()
        } else {
            args.panes.iter().map(String::as_str).collect()
        };
        let panes = entries
            .into_iter()
            .map(|entry| {
                PaneConfig::parse(entry).map(|p| {
                    p.auto_refresh(!args.no_auto_refresh)
                        .interval_ms(args.interval_ms.max(MIN_INTERVAL_MS))
                        .max_rows(args.max_rows.max(1))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let log_file = shellexpand::full(&args.log_file)
            .map_err(|e| LPError::Config(format!("log file '{}': {e}", args.log_file)))?;

        Ok(Self {
            request_url: request_origin.join(&args.request_path)?,
            ws_url: push_url(&ws_origin, &args.ws_path)?,
            panes,
            reconnect: args.reconnect,
            coalesce: args.coalesce,
            request_timeout: Duration::from_millis(args.request_timeout_ms),
            event_poll_time: args.event_poll_ms,
            log_file: PathBuf::from(log_file.as_ref()),
        })
    }
}

/// Push channel url for a page origin: `http` maps to `ws`, `https` to `wss`.
pub fn push_url(origin: &Url, path: &str) -> Result<Url, LPError> {
    let scheme = match origin.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(LPError::Config(format!(
                "unsupported origin scheme '{other}'"
            )));
        }
    };
    let mut url = origin.join(path)?;
    url.set_scheme(scheme)
        .map_err(|_| LPError::Config(format!("cannot use scheme {scheme} for {origin}")))?;
    Ok(url)
}

/// The http(s) origin a push channel url belongs to, sent as `Origin` header.
pub fn http_origin(ws_url: &Url) -> String {
    let scheme = if ws_url.scheme() == "wss" { "https" } else { "http" };
    match (ws_url.host_str(), ws_url.port()) {
        (Some(host), Some(port)) => format!("{scheme}://{host}:{port}"),
        (Some(host), None) => format!("{scheme}://{host}"),
        _ => format!("{scheme}://localhost"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["livepane"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn defaults() {
        let cfg = AppConfig::from_args(&args(&[])).unwrap();
        assert_eq!(cfg.request_url.as_str(), "http://127.0.0.1:8000/request");
        assert_eq!(cfg.ws_url.as_str(), "ws://127.0.0.1:8000/ws");
        let indexes: Vec<&str> = cfg.panes.iter().map(|p| p.index.as_str()).collect();
        assert_eq!(indexes, DEFAULT_PANES);
        assert!(cfg.panes.iter().all(|p| p.auto_refresh && p.interval_ms == 1000));
        assert!(cfg.panes.iter().all(|p| p.max_rows == 300));
        assert!(!cfg.reconnect);
        assert!(!cfg.log_file.to_string_lossy().starts_with('~'));
    }

    #[test]
    fn secure_origin_uses_secure_channel() {
        let origin = Url::parse("https://example.org:8443/app/").unwrap();
        assert_eq!(
            push_url(&origin, "/ws").unwrap().as_str(),
            "wss://example.org:8443/ws"
        );
        let origin = Url::parse("http://example.org").unwrap();
        assert_eq!(push_url(&origin, "/ws").unwrap().as_str(), "ws://example.org/ws");
        let origin = Url::parse("ftp://example.org").unwrap();
        assert!(push_url(&origin, "/ws").is_err());
    }

    #[test]
    fn per_endpoint_origins() {
        let cfg = AppConfig::from_args(&args(&[
            "--request-origin",
            "http://10.0.0.1:8001",
            "--ws-origin",
            "https://10.0.0.2:8002",
            "--ws-path",
            "/push",
        ]))
        .unwrap();
        assert_eq!(cfg.request_url.as_str(), "http://10.0.0.1:8001/request");
        assert_eq!(cfg.ws_url.as_str(), "wss://10.0.0.2:8002/push");
        assert_eq!(http_origin(&cfg.ws_url), "https://10.0.0.2:8002");
    }

    #[test]
    fn pane_entries_and_clamping() {
        let cfg = AppConfig::from_args(&args(&[
            "--pane",
            "metrics=Training metrics",
            "--pane",
            "history",
            "--interval-ms",
            "50",
            "--no-auto-refresh",
        ]))
        .unwrap();
        assert_eq!(cfg.panes.len(), 2);
        assert_eq!(cfg.panes[0].title.as_deref(), Some("Training metrics"));
        assert_eq!(cfg.panes[1].title, None);
        assert!(cfg.panes.iter().all(|p| p.interval_ms == 200 && !p.auto_refresh));
    }

    #[test]
    fn bad_input_is_a_config_error() {
        assert!(PaneConfig::parse("=title").is_err());
        assert!(AppConfig::from_args(&args(&["--origin", "not a url"])).is_err());
    }
}
