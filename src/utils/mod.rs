pub mod throttle;

use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::models::common::Config;

const ENV_PREFIX: &str = "WALLET_HISTORY";

pub fn load_config<P: AsRef<Path>>(file_name: P) -> Result<Config> {
    let config_path = file_name.as_ref();
    info!("Config path: {}", config_path.to_string_lossy());

    // File first, then WALLET_HISTORY__SECTION__KEY environment overrides
    let mut config: Config = config::Config::builder()
        .add_source(config::File::from(config_path).required(true))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("failed to read config file")?
        .try_deserialize()
        .context("failed to parse config YAML")?;

    if config.provider.api_key.is_none() {
        config.provider.api_key = std::env::var("ETHERSCAN_API_KEY").ok();
    }

    config.address = config.address.trim().to_string();

    Ok(config)
}

/// Account addresses are `0x` followed by exactly 40 hex digits.
pub fn is_valid_address(address: &str) -> bool {
    address.len() == 42 && address.starts_with("0x") && address.parse::<Address>().is_ok()
}

pub(crate) fn strip_html(error: &str) -> String {
    // If the error contains HTML tags, extract just the text content
    if error.contains("<!doctype html>") || error.contains("<html>") {
        error
            .lines()
            .map(|line| line.trim())
            .find(|line| {
                !line.starts_with('<')
                    && !line.ends_with('>')
                    && !line.is_empty()
                    && *line != "html"
                    && *line != "body"
            })
            .unwrap_or(error)
            .to_string()
    } else {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_address() {
        assert!(is_valid_address("0xa39b189482f984388a34460636fea9eb181ad1a6"));
        assert!(is_valid_address("0xD620AADaBaA20d2af700853C4504028cba7C3333"));
        assert!(!is_valid_address("a39b189482f984388a34460636fea9eb181ad1a6"));
        assert!(!is_valid_address("0xa39b189482f984388a34460636fea9eb181ad1a"));
        assert!(!is_valid_address("0xz39b189482f984388a34460636fea9eb181ad1a6"));
        assert!(!is_valid_address(""));
    }

    #[test]
    fn test_strip_html() {
        let body = "<!doctype html>\n<html>\n<body>\n<h1>\nService Unavailable\n</h1>\n</body>\n</html>";
        assert_eq!(strip_html(body), "Service Unavailable");
        assert_eq!(strip_html("Max rate limit reached"), "Max rate limit reached");
    }

    #[test]
    fn test_load_config_applies_defaults() {
        let dir = std::env::temp_dir().join(format!("wallet-history-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yml");
        std::fs::write(
            &path,
            r#"
address: " 0xa39b189482f984388a34460636fea9eb181ad1a6 "
provider:
  api_key: "test-key"
fetcher:
  max_concurrent: 2
output:
  path: "out.csv"
metrics:
  enabled: false
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.address, "0xa39b189482f984388a34460636fea9eb181ad1a6");
        assert_eq!(config.start_page, 1);
        assert_eq!(config.end_page, 1);
        assert_eq!(config.provider.api_key.as_deref(), Some("test-key"));
        assert_eq!(config.provider.request_interval_ms, 200);
        assert_eq!(config.fetcher.max_concurrent, 2);
        assert_eq!(config.fetcher.timeout_secs, 30);
        assert_eq!(config.normalizer.worker_count, 4);
        assert_eq!(config.normalizer.buffer_size, 1000);
        assert_eq!(config.output.path, "out.csv");
        assert!(!config.output.streaming);
        assert_eq!(config.output.batch_size, 100);
        assert_eq!(config.output.flush_interval_secs, 5);
        assert_eq!(config.metrics.port, 9100);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
