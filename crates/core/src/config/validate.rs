use super::{types::Config, ConfigError};

const PRIVACY_STATUSES: &[&str] = &["public", "unlisted", "private"];

/// Validate configuration
/// Currently validates:
/// - Alert threshold and per-run item limit are at least 1
/// - Credentials and webhook URL are not empty
/// - YouTube privacy status is one YouTube accepts
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let pipeline = &config.pipeline;
    if pipeline.alert_threshold == 0 {
        return Err(invalid("pipeline.alert_threshold must be at least 1"));
    }
    if pipeline.max_items_per_run == 0 {
        return Err(invalid("pipeline.max_items_per_run must be at least 1"));
    }

    let required = [
        ("zoom.client_id", &config.zoom.client_id),
        ("zoom.client_secret", &config.zoom.client_secret),
        ("youtube.client_id", &config.youtube.client_id),
        ("youtube.client_secret", &config.youtube.client_secret),
        ("discord.webhook_url", &config.discord.webhook_url),
    ];
    for (key, value) in required {
        if value.trim().is_empty() {
            return Err(invalid(&format!("{} cannot be empty", key)));
        }
    }

    if !PRIVACY_STATUSES.contains(&config.youtube.privacy_status.as_str()) {
        return Err(invalid(&format!(
            "youtube.privacy_status must be one of {}, got '{}'",
            PRIVACY_STATUSES.join(", "),
            config.youtube.privacy_status
        )));
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}
