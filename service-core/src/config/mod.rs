use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::de::DeserializeOwned;

/// Environment variable prefix shared by every service setting.
pub const ENV_PREFIX: &str = "APP";

/// Loads a settings struct from `<file_name>.(yaml|toml|json)` (optional)
/// overlaid with `APP__SECTION__KEY` environment variables.
pub fn load<T: DeserializeOwned>(file_name: &str) -> Result<T, AppError> {
    dotenvy::dotenv().ok();

    let config = Cfg::builder()
        .add_source(File::with_name(file_name).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(config.try_deserialize()?)
}

/// `true` when `APP_ENV`/`ENVIRONMENT` names a production deployment.
pub fn is_production() -> bool {
    std::env::var("APP_ENV")
        .or_else(|_| std::env::var("ENVIRONMENT"))
        .map(|v| v.eq_ignore_ascii_case("prod") || v.eq_ignore_ascii_case("production"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(default = "default_port")]
        port: u16,
    }

    fn default_port() -> u16 {
        3001
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let sample: Sample = load("does-not-exist-anywhere").unwrap();
        assert_eq!(sample.port, 3001);
    }
}
