//! Credential resolution for the external services
//!
//! Priority: ENV → TOML. A missing credential is only an error when the
//! feature that needs it is used.

use climatech_common::config::TomlConfig;
use climatech_common::{Error, Result};
use tracing::{info, warn};

pub const APPEEARS_USER_ENV: &str = "APPEARS_USER";
pub const APPEEARS_PASS_ENV: &str = "APPEARS_PASS";
pub const FIRMS_MAP_KEY_ENV: &str = "FIRMS_MAP_KEY";

/// Credential value: non-empty, non-whitespace
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| is_valid_key(v))
}

/// Resolve AppEEARS username and password
///
/// Both halves come from the same tier; a username in the environment with
/// the password only in TOML is not combined.
pub fn resolve_appeears_credentials(config: &TomlConfig) -> Result<(String, String)> {
    let env_pair = env_value(APPEEARS_USER_ENV).zip(env_value(APPEEARS_PASS_ENV));
    let toml_pair = config
        .appeears
        .username
        .clone()
        .filter(|v| is_valid_key(v))
        .zip(config.appeears.password.clone().filter(|v| is_valid_key(v)));

    if env_pair.is_some() && toml_pair.is_some() {
        warn!("AppEEARS credentials found in environment and TOML. Using environment.");
    }

    if let Some(pair) = env_pair {
        info!("AppEEARS credentials loaded from environment");
        return Ok(pair);
    }
    if let Some(pair) = toml_pair {
        info!("AppEEARS credentials loaded from TOML config");
        return Ok(pair);
    }

    Err(Error::Config(format!(
        "AppEEARS credentials not configured. Set {} and {}, or [appeears] username/password in the TOML config",
        APPEEARS_USER_ENV, APPEEARS_PASS_ENV
    )))
}

/// Resolve the FIRMS map key
pub fn resolve_firms_map_key(config: &TomlConfig) -> Result<String> {
    if let Some(key) = env_value(FIRMS_MAP_KEY_ENV) {
        info!("FIRMS map key loaded from environment");
        return Ok(key);
    }
    if let Some(key) = config.firms.map_key.as_ref().filter(|k| is_valid_key(k)) {
        info!("FIRMS map key loaded from TOML config");
        return Ok(key.clone());
    }

    Err(Error::Config(format!(
        "FIRMS map key not configured. Set {} or [firms] map_key in the TOML config",
        FIRMS_MAP_KEY_ENV
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        std::env::remove_var(APPEEARS_USER_ENV);
        std::env::remove_var(APPEEARS_PASS_ENV);
        std::env::remove_var(FIRMS_MAP_KEY_ENV);
    }

    fn toml_with_credentials() -> TomlConfig {
        let mut config = TomlConfig::default();
        config.appeears.username = Some("toml-user".to_string());
        config.appeears.password = Some("toml-pass".to_string());
        config.firms.map_key = Some("toml-key".to_string());
        config
    }

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("abc"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("   "));
    }

    #[test]
    #[serial]
    fn test_env_wins_over_toml() {
        clear_env();
        std::env::set_var(APPEEARS_USER_ENV, "env-user");
        std::env::set_var(APPEEARS_PASS_ENV, "env-pass");
        std::env::set_var(FIRMS_MAP_KEY_ENV, "env-key");

        let config = toml_with_credentials();
        assert_eq!(
            resolve_appeears_credentials(&config).unwrap(),
            ("env-user".to_string(), "env-pass".to_string())
        );
        assert_eq!(resolve_firms_map_key(&config).unwrap(), "env-key");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_half_env_pair_falls_back_to_toml() {
        clear_env();
        std::env::set_var(APPEEARS_USER_ENV, "env-user");

        let config = toml_with_credentials();
        assert_eq!(
            resolve_appeears_credentials(&config).unwrap(),
            ("toml-user".to_string(), "toml-pass".to_string())
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_missing_credentials_is_config_error() {
        clear_env();
        let config = TomlConfig::default();
        assert!(matches!(resolve_appeears_credentials(&config), Err(Error::Config(_))));
        assert!(matches!(resolve_firms_map_key(&config), Err(Error::Config(_))));
    }
}
