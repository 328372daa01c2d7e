use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub admin: AdminSettings,
    pub kyc: KycSettings,
    pub engine: EngineSettings,
    pub reconciliation: ReconciliationSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub log_level: String,
}

/// Bootstrap identity for the reserved system user. The token lifetime is
/// consumed by the external HTTP layer only.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminSettings {
    pub email: String,
    pub password: String,
    pub access_token_expire_minutes: u64,
}

/// KYC document handling knobs, consumed by the external upload service.
#[derive(Debug, Clone, Deserialize)]
pub struct KycSettings {
    pub document_upload_dir: String,
    pub max_file_size: u64,
    pub allowed_file_extensions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    /// Wall-clock deadline for a single fund-engine operation.
    pub operation_timeout_secs: u64,
    /// Optional cap on a single admin funding; absent means the treasury may
    /// go arbitrarily negative.
    pub reserve_ceiling: Option<Decimal>,
}

impl EngineSettings {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationSettings {
    pub interval_secs: u64,
    /// When true, drifted cached balances are rewritten from the ledger.
    pub repair: bool,
}

impl ReconciliationSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Settings {
    /// Loads configuration from `config/default.toml`, an optional
    /// `config/local.toml`, and `APP__`-prefixed environment variables.
    /// `DATABASE_URL`, `ADMIN_EMAIL`, `ADMIN_PASSWORD`, and
    /// `RECONCILIATION_INTERVAL` are also honored as bare variables, which
    /// take precedence.
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let mut settings: Settings = builder.build()?.try_deserialize()?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            settings.database.url = url;
        }
        if let Ok(email) = std::env::var("ADMIN_EMAIL") {
            settings.admin.email = email;
        }
        if let Ok(password) = std::env::var("ADMIN_PASSWORD") {
            settings.admin.password = password;
        }
        if let Ok(minutes) = std::env::var("ACCESS_TOKEN_EXPIRE_MINUTES") {
            if let Ok(minutes) = minutes.parse() {
                settings.admin.access_token_expire_minutes = minutes;
            }
        }
        if let Ok(dir) = std::env::var("KYC_DOCUMENT_UPLOAD_DIR") {
            settings.kyc.document_upload_dir = dir;
        }
        if let Ok(size) = std::env::var("MAX_FILE_SIZE") {
            if let Ok(size) = size.parse() {
                settings.kyc.max_file_size = size;
            }
        }
        if let Ok(extensions) = std::env::var("ALLOWED_FILE_EXTENSIONS") {
            settings.kyc.allowed_file_extensions =
                extensions.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(interval) = std::env::var("RECONCILIATION_INTERVAL") {
            if let Ok(secs) = interval.parse() {
                settings.reconciliation.interval_secs = secs;
            }
        }

        Ok(settings)
    }
}
