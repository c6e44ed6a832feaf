use std::{
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use chrono::NaiveDate;
use serde::Deserialize;

use crate::{domain::Channel, domain::TimeWindow, errors::Error, writer::validate_channel_dir, Result};

pub const DEFAULT_SETTINGS_FILE: &str = "appsettings.json";
pub const DEFAULT_API_BASE_URL: &str = "https://slack.com/api/";

/// Window archived when no dates are given on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DefaultWindow {
    /// The current UTC day.
    #[default]
    Today,
    /// The last 30 UTC days, today included.
    Last30Days,
}

impl DefaultWindow {
    pub fn resolve(self, today: NaiveDate) -> TimeWindow {
        match self {
            DefaultWindow::Today => TimeWindow::day(today),
            DefaultWindow::Last30Days => TimeWindow::trailing_days(today, 30),
        }
    }
}

impl FromStr for DefaultWindow {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "today" => Ok(DefaultWindow::Today),
            "last-30-days" | "last_30_days" | "30d" => Ok(DefaultWindow::Last30Days),
            other => Err(Error::Config(format!(
                "unknown default window {other:?} (expected \"today\" or \"last-30-days\")"
            ))),
        }
    }
}

/// Typed configuration for an archive run.
#[derive(Clone, Debug)]
pub struct Config {
    // Slack
    pub slack_token: String,
    pub api_base_url: String,
    pub channels: Vec<Channel>,
    pub request_timeout: Duration,
    pub page_limit: u32,

    // Archive
    pub output_path: PathBuf,
    pub max_concurrent_channels: usize,
    pub default_window: DefaultWindow,
    pub run_timeout: Option<Duration>,
}

/// On-disk settings file. Section and key names follow the `appsettings.json`
/// layout, so an existing file keeps working.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    #[serde(rename = "Slack")]
    slack: SlackSection,
    #[serde(rename = "Archive")]
    archive: ArchiveSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct SlackSection {
    token: Option<String>,
    channels: Vec<Channel>,
    api_base_url: Option<String>,
    request_timeout_secs: Option<u64>,
    page_limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct ArchiveSection {
    output_path: Option<PathBuf>,
    max_concurrent_channels: Option<usize>,
    default_window: Option<String>,
    run_timeout_secs: Option<u64>,
}

impl Config {
    /// Load `.env`, then the settings file, then environment overrides.
    ///
    /// `settings_path` wins over `SCA_CONFIG`, which wins over `./appsettings.json`
    /// (used only if it exists).
    pub fn load(settings_path: Option<&Path>) -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let explicit = settings_path
            .map(Path::to_path_buf)
            .or_else(|| env_path("SCA_CONFIG"));
        let settings = match explicit {
            Some(path) => read_settings(&path)?,
            None => {
                let fallback = Path::new(DEFAULT_SETTINGS_FILE);
                if fallback.is_file() {
                    read_settings(fallback)?
                } else {
                    SettingsFile::default()
                }
            }
        };

        Self::from_settings(settings)
    }

    fn from_settings(settings: SettingsFile) -> Result<Self> {
        let SettingsFile { slack, archive } = settings;

        let slack_token = env_str("SLACK_TOKEN")
            .and_then(non_empty)
            .or(slack.token.and_then(non_empty))
            .ok_or_else(|| {
                Error::Config("SLACK_TOKEN (or Slack.Token in settings) is required".to_string())
            })?;

        let channels = match env_str("SLACK_CHANNELS").and_then(non_empty) {
            Some(raw) => parse_channels(&raw)?,
            None => slack.channels,
        };
        if channels.is_empty() {
            return Err(Error::Config(
                "no channels configured (SLACK_CHANNELS or Slack.Channels)".to_string(),
            ));
        }
        for c in &channels {
            if c.id.trim().is_empty() {
                return Err(Error::Config(format!("channel #{} has an empty id", c.name)));
            }
            validate_channel_dir(&c.name)?;
        }

        let mut api_base_url = env_str("SLACK_API_BASE_URL")
            .and_then(non_empty)
            .or(slack.api_base_url)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        if !api_base_url.ends_with('/') {
            api_base_url.push('/');
        }

        let request_timeout = Duration::from_secs(
            env_u64("SLACK_REQUEST_TIMEOUT_SECS")
                .or(slack.request_timeout_secs)
                .unwrap_or(30),
        );
        let page_limit = env_u32("SLACK_PAGE_LIMIT")
            .or(slack.page_limit)
            .unwrap_or(200)
            .clamp(1, 1000);

        let output_path = env_path("ARCHIVE_OUTPUT_PATH")
            .or(archive.output_path)
            .unwrap_or_else(|| PathBuf::from("./archive"));
        let max_concurrent_channels = env_usize("ARCHIVE_MAX_CONCURRENT_CHANNELS")
            .or(archive.max_concurrent_channels)
            .unwrap_or(4)
            .max(1);
        let default_window = match env_str("ARCHIVE_DEFAULT_WINDOW")
            .and_then(non_empty)
            .or(archive.default_window)
        {
            Some(raw) => raw.parse()?,
            None => DefaultWindow::default(),
        };
        let run_timeout = env_u64("ARCHIVE_RUN_TIMEOUT_SECS")
            .or(archive.run_timeout_secs)
            .filter(|s| *s > 0)
            .map(Duration::from_secs);

        Ok(Self {
            slack_token,
            api_base_url,
            channels,
            request_timeout,
            page_limit,
            output_path,
            max_concurrent_channels,
            default_window,
            run_timeout,
        })
    }
}

fn read_settings(path: &Path) -> Result<SettingsFile> {
    let raw = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("failed to read settings {}: {e}", path.display()))
    })?;
    parse_settings(&raw)
        .map_err(|e| Error::Config(format!("invalid settings {}: {e}", path.display())))
}

fn parse_settings(raw: &str) -> Result<SettingsFile> {
    Ok(serde_json::from_str(raw)?)
}

/// `C123:general,C456:random` → channels. A bare id uses the id as the name.
pub fn parse_channels(raw: &str) -> Result<Vec<Channel>> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let (id, name) = match entry.split_once(':') {
                Some((id, name)) => (id.trim(), name.trim()),
                None => (entry, entry),
            };
            if id.is_empty() || name.is_empty() {
                return Err(Error::Config(format!("invalid channel entry {entry:?}")));
            }
            Ok(Channel::new(id, name.trim_start_matches('#')))
        })
        .collect()
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).filter(|v| !v.is_empty()).map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_channel_list() {
        let chans = parse_channels("C1:general, C2:#random ,C3").unwrap();
        assert_eq!(
            chans,
            vec![
                Channel::new("C1", "general"),
                Channel::new("C2", "random"),
                Channel::new("C3", "C3"),
            ]
        );
        assert!(parse_channels("C1:").is_err());
    }

    #[test]
    fn parses_settings_file_layout() {
        let raw = r#"{
            "Slack": {
                "Token": "xoxb-test",
                "Channels": [{ "Id": "C1", "Name": "general" }]
            },
            "Archive": { "OutputPath": "/data/archive", "DefaultWindow": "last-30-days" }
        }"#;
        let s = parse_settings(raw).unwrap();
        assert_eq!(s.slack.token.as_deref(), Some("xoxb-test"));
        assert_eq!(s.slack.channels, vec![Channel::new("C1", "general")]);
        assert_eq!(s.archive.output_path, Some(PathBuf::from("/data/archive")));
        assert_eq!(s.archive.default_window.as_deref(), Some("last-30-days"));
        assert!(s.archive.run_timeout_secs.is_none());
    }

    const ENV_KEYS: [&str; 9] = [
        "SLACK_TOKEN",
        "SLACK_CHANNELS",
        "SLACK_API_BASE_URL",
        "SLACK_REQUEST_TIMEOUT_SECS",
        "SLACK_PAGE_LIMIT",
        "ARCHIVE_OUTPUT_PATH",
        "ARCHIVE_MAX_CONCURRENT_CHANNELS",
        "ARCHIVE_DEFAULT_WINDOW",
        "ARCHIVE_RUN_TIMEOUT_SECS",
    ];

    // Only test in this crate that touches the process environment.
    #[test]
    fn env_overrides_settings_file() {
        for k in ENV_KEYS {
            env::remove_var(k);
        }
        let raw = r#"{
            "Slack": {
                "Token": "xoxb-file",
                "Channels": [{ "Id": "C1", "Name": "general" }],
                "ApiBaseUrl": "http://localhost:9000/api",
                "PageLimit": 50
            },
            "Archive": {
                "OutputPath": "/data/from-file",
                "MaxConcurrentChannels": 2,
                "RunTimeoutSecs": 600
            }
        }"#;

        // Settings alone.
        let cfg = Config::from_settings(parse_settings(raw).unwrap()).unwrap();
        assert_eq!(cfg.slack_token, "xoxb-file");
        assert_eq!(cfg.channels, vec![Channel::new("C1", "general")]);
        assert_eq!(cfg.api_base_url, "http://localhost:9000/api/");
        assert_eq!(cfg.page_limit, 50);
        assert_eq!(cfg.output_path, PathBuf::from("/data/from-file"));
        assert_eq!(cfg.max_concurrent_channels, 2);
        assert_eq!(cfg.default_window, DefaultWindow::Today);
        assert_eq!(cfg.run_timeout, Some(Duration::from_secs(600)));
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));

        // Environment wins; empty values fall through to the file.
        env::set_var("SLACK_TOKEN", "xoxb-env");
        env::set_var("SLACK_CHANNELS", "C7:ops,C8:#dev");
        env::set_var("ARCHIVE_MAX_CONCURRENT_CHANNELS", "8");
        env::set_var("ARCHIVE_DEFAULT_WINDOW", "last-30-days");
        env::set_var("ARCHIVE_OUTPUT_PATH", "");
        env::set_var("SLACK_API_BASE_URL", "  ");

        let cfg = Config::from_settings(parse_settings(raw).unwrap());
        for k in ENV_KEYS {
            env::remove_var(k);
        }
        let cfg = cfg.unwrap();

        assert_eq!(cfg.slack_token, "xoxb-env");
        assert_eq!(
            cfg.channels,
            vec![Channel::new("C7", "ops"), Channel::new("C8", "dev")]
        );
        assert_eq!(cfg.max_concurrent_channels, 8);
        assert_eq!(cfg.default_window, DefaultWindow::Last30Days);
        assert_eq!(cfg.output_path, PathBuf::from("/data/from-file"));
        assert_eq!(cfg.api_base_url, "http://localhost:9000/api/");

        // Nothing anywhere: token is required.
        let err = Config::from_settings(SettingsFile::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn default_window_resolves_against_today() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let w = DefaultWindow::Today.resolve(today);
        assert_eq!(w.from.unwrap().date_naive(), today);
        assert_eq!(w.to.unwrap().date_naive(), today);

        let w = "last-30-days".parse::<DefaultWindow>().unwrap().resolve(today);
        assert_eq!(
            w.from.unwrap().date_naive(),
            NaiveDate::from_ymd_opt(2026, 2, 9).unwrap()
        );
        assert!("yesterday".parse::<DefaultWindow>().is_err());
    }
}
