use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use crate::errors::ConfigError;

const CONFIG_DIR_NAME: &str = "coop-wizard";
const CONFIG_FILE_NAME: &str = "config.json";
const TMP_SUFFIX: &str = "tmp";

/// Runtime settings for the wizard engine and its HTTP backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WizardConfig {
    /// Base URL of the cooperative API. Empty selects the offline backend.
    #[serde(default)]
    pub api_base_url: String,
    #[serde(default = "WizardConfig::default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "WizardConfig::default_resend_cooldown_secs")]
    pub resend_cooldown_secs: i64,
    #[serde(default = "WizardConfig::default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    #[serde(default = "WizardConfig::default_min_loan_amount")]
    pub min_loan_amount: f64,
    #[serde(default = "WizardConfig::default_min_investment_amount")]
    pub min_investment_amount: f64,
    #[serde(default = "WizardConfig::default_otp_length")]
    pub otp_length: usize,
    /// Drop a step's completed flag when one of its fields is edited later.
    #[serde(default = "WizardConfig::default_invalidate_completed_on_edit")]
    pub invalidate_completed_on_edit: bool,
    #[serde(default = "WizardConfig::default_log_filter")]
    pub log_filter: String,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            request_timeout_secs: Self::default_request_timeout_secs(),
            resend_cooldown_secs: Self::default_resend_cooldown_secs(),
            max_upload_bytes: Self::default_max_upload_bytes(),
            min_loan_amount: Self::default_min_loan_amount(),
            min_investment_amount: Self::default_min_investment_amount(),
            otp_length: Self::default_otp_length(),
            invalidate_completed_on_edit: Self::default_invalidate_completed_on_edit(),
            log_filter: Self::default_log_filter(),
        }
    }
}

impl WizardConfig {
    pub fn default_request_timeout_secs() -> u64 {
        15
    }

    pub fn default_resend_cooldown_secs() -> i64 {
        30
    }

    pub fn default_max_upload_bytes() -> u64 {
        5 * 1024 * 1024
    }

    pub fn default_min_loan_amount() -> f64 {
        1000.0
    }

    pub fn default_min_investment_amount() -> f64 {
        5000.0
    }

    pub fn default_otp_length() -> usize {
        6
    }

    pub fn default_invalidate_completed_on_edit() -> bool {
        true
    }

    pub fn default_log_filter() -> String {
        "coop_wizard=info".into()
    }

    pub fn is_offline(&self) -> bool {
        self.api_base_url.trim().is_empty()
    }
}

/// Handles persistence for [`WizardConfig`].
#[derive(Debug, Clone)]
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    /// Uses the platform configuration directory, falling back to the home
    /// directory and finally the working directory.
    pub fn new() -> Result<Self, ConfigError> {
        let base = dirs::config_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::with_base_dir(base)
    }

    pub fn with_base_dir(base: PathBuf) -> Result<Self, ConfigError> {
        let dir = base.join(CONFIG_DIR_NAME);
        fs::create_dir_all(&dir)?;
        Ok(Self {
            path: dir.join(CONFIG_FILE_NAME),
        })
    }

    pub fn load(&self) -> Result<WizardConfig, ConfigError> {
        if self.path.exists() {
            let data = fs::read_to_string(&self.path)?;
            Ok(serde_json::from_str(&data)?)
        } else {
            Ok(WizardConfig::default())
        }
    }

    pub fn save(&self, config: &WizardConfig) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(config)?;
        let tmp = tmp_path(&self.path);
        write_atomic(&tmp, &json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let ext = match path.extension().and_then(|ext| ext.to_str()) {
        Some(existing) => format!("{}.{}", existing, TMP_SUFFIX),
        None => TMP_SUFFIX.to_string(),
    };
    tmp.set_extension(ext);
    tmp
}

fn write_atomic(path: &Path, data: &str) -> Result<(), ConfigError> {
    let mut file = File::create(path)?;
    file.write_all(data.as_bytes())?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigManager::with_base_dir(temp.path().to_path_buf()).unwrap();
        let config = manager.load().unwrap();
        assert_eq!(config, WizardConfig::default());
        assert_eq!(config.resend_cooldown_secs, 30);
        assert!(config.is_offline());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigManager::with_base_dir(temp.path().to_path_buf()).unwrap();
        fs::write(
            manager.path(),
            r#"{ "api_base_url": "https://api.example.coop/", "min_loan_amount": 2000 }"#,
        )
        .unwrap();
        let config = manager.load().unwrap();
        assert_eq!(config.api_base_url, "https://api.example.coop/");
        assert_eq!(config.min_loan_amount, 2000.0);
        assert_eq!(config.max_upload_bytes, 5 * 1024 * 1024);
        assert!(config.invalidate_completed_on_edit);
    }

    #[test]
    fn save_then_load_preserves_values() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigManager::with_base_dir(temp.path().to_path_buf()).unwrap();
        let config = WizardConfig {
            resend_cooldown_secs: 45,
            invalidate_completed_on_edit: false,
            ..WizardConfig::default()
        };
        manager.save(&config).unwrap();
        assert!(!tmp_path(manager.path()).exists());
        assert_eq!(manager.load().unwrap(), config);
    }

    #[test]
    fn malformed_file_reports_serde_error() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigManager::with_base_dir(temp.path().to_path_buf()).unwrap();
        fs::write(manager.path(), "{ not json").unwrap();
        assert!(matches!(manager.load(), Err(ConfigError::Serde(_))));
    }
}
