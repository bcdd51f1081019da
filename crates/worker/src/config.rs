use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use atelier_comfyui::retry::RetryPolicy;
use atelier_pipeline::generation::GenerationSettings;

/// Worker configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local ComfyUI install.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// ComfyUI base URL (default: `http://127.0.0.1:8188`).
    pub comfyui_url: String,
    /// Root directory of the local artifact store (default: `./data`).
    pub output_dir: PathBuf,
    /// Bucket artifacts are written to (default: `outputs`).
    pub output_bucket: String,
    /// Extra `*.json` templates to register next to the built-in ones.
    pub template_dir: Option<PathBuf>,
    /// Output polling attempts (default: `60`).
    pub poll_max_attempts: u32,
    /// Seconds between polling attempts (default: `2`).
    pub poll_delay_secs: u64,
    /// Schema discovery deadline in seconds (default: `10`).
    pub discovery_timeout_secs: u64,
    /// Per-request HTTP timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                  | Default                  |
    /// |--------------------------|--------------------------|
    /// | `COMFYUI_URL`            | `http://127.0.0.1:8188`  |
    /// | `OUTPUT_DIR`             | `./data`                 |
    /// | `OUTPUT_BUCKET`          | `outputs`                |
    /// | `TEMPLATE_DIR`           | unset                    |
    /// | `POLL_MAX_ATTEMPTS`      | `60`                     |
    /// | `POLL_DELAY_SECS`        | `2`                      |
    /// | `DISCOVERY_TIMEOUT_SECS` | `10`                     |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let text = |var: &str, default: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let comfyui_url = text("COMFYUI_URL", "http://127.0.0.1:8188");
        if !(comfyui_url.starts_with("http://") || comfyui_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                var: "COMFYUI_URL",
                value: comfyui_url,
                reason: "must start with http:// or https://".into(),
            });
        }

        Ok(Self {
            comfyui_url,
            output_dir: PathBuf::from(text("OUTPUT_DIR", "./data")),
            output_bucket: text("OUTPUT_BUCKET", "outputs"),
            template_dir: lookup("TEMPLATE_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            poll_max_attempts: parse_var(&lookup, "POLL_MAX_ATTEMPTS", 60)?,
            poll_delay_secs: parse_var(&lookup, "POLL_DELAY_SECS", 2)?,
            discovery_timeout_secs: parse_var(&lookup, "DISCOVERY_TIMEOUT_SECS", 10)?,
            request_timeout_secs: parse_var(&lookup, "REQUEST_TIMEOUT_SECS", 30)?,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            bucket: self.output_bucket.clone(),
            poll: RetryPolicy::new(
                self.poll_max_attempts,
                Duration::from_secs(self.poll_delay_secs),
            ),
            discovery_timeout: Duration::from_secs(self.discovery_timeout_secs),
            ..Default::default()
        }
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<WorkerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.comfyui_url, "http://127.0.0.1:8188");
        assert_eq!(cfg.output_bucket, "outputs");
        assert_eq!(cfg.poll_max_attempts, 60);
        assert_eq!(cfg.template_dir, None);
        assert_eq!(cfg.generation_settings().poll.delay, Duration::from_secs(2));
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config(&[
            ("POLL_MAX_ATTEMPTS", " 5 "),
            ("OUTPUT_BUCKET", "renders"),
            ("TEMPLATE_DIR", "/srv/t"),
        ])
        .unwrap();
        assert_eq!(cfg.poll_max_attempts, 5);
        assert_eq!(cfg.output_bucket, "renders");
        assert_eq!(cfg.template_dir, Some(PathBuf::from("/srv/t")));
    }

    #[test]
    fn invalid_number_names_the_variable() {
        let err = config(&[("POLL_DELAY_SECS", "soon")]).unwrap_err();
        assert_matches!(err, ConfigError::Invalid { var: "POLL_DELAY_SECS", .. });
        assert!(err.to_string().contains("'soon'"));
    }

    #[test]
    fn url_scheme_is_required() {
        assert_matches!(
            config(&[("COMFYUI_URL", "localhost:8188")]),
            Err(ConfigError::Invalid { var: "COMFYUI_URL", .. })
        );
    }
}
