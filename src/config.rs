use crate::errors::{EngineError, EngineResult};
use crate::models::DEFAULT_RISK_FREE_RATE;
use crate::search::SearchConfig;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub scenario_path: PathBuf,
    pub option_data_path: PathBuf,
    pub data_dir: PathBuf,
    pub risk_free_rate: f64,
    pub search: SearchConfig,
}

impl AppConfig {
    pub fn from_env() -> EngineResult<Self> {
        dotenvy::dotenv().ok();

        let risk_free_rate = parse_f64("RISK_FREE_RATE", &DEFAULT_RISK_FREE_RATE.to_string())?;

        let defaults = SearchConfig::default();
        let search = SearchConfig {
            start: parse_f64("SEARCH_START", &defaults.start.to_string())?,
            step: parse_f64("SEARCH_STEP", &defaults.step.to_string())?,
            max_iterations: env_var_or("SEARCH_MAX_ITER", &defaults.max_iterations.to_string())
                .parse::<u32>()
                .map_err(|e| EngineError::Config(format!("SEARCH_MAX_ITER: {e}")))?,
            precision: parse_f64("SEARCH_PRECISION", &defaults.precision.to_string())?,
            x_max_search: parse_f64("SEARCH_X_MAX", &defaults.x_max_search.to_string())?,
        };

        Ok(Self {
            scenario_path: PathBuf::from(env_var("SCENARIO_PATH")?),
            option_data_path: PathBuf::from(env_var_or("OPTION_DATA_PATH", "option_data.json")),
            data_dir: PathBuf::from(env_var_or("DATA_DIR", "data")),
            risk_free_rate,
            search,
        })
    }
}

fn parse_f64(key: &str, default: &str) -> EngineResult<f64> {
    env_var_or(key, default)
        .parse::<f64>()
        .map_err(|e| EngineError::Config(format!("{key}: {e}")))
}

fn env_var(key: &str) -> EngineResult<String> {
    std::env::var(key).map_err(|_| EngineError::Config(format!("missing env var: {key}")))
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
