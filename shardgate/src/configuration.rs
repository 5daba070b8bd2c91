use std::path::Path;

#[derive(serde::Deserialize, Debug)]
pub struct ApplicationSettings {
    pub port: u16,
    pub host: String,
}

/// One tablet the gate routes to.
#[derive(serde::Deserialize, Debug, Clone)]
pub struct TabletSettings {
    pub keyspace: String,
    pub shard: String,
    /// Base URL, e.g. `http://127.0.0.1:4101`.
    pub address: String,
    pub bearer_token: Option<String>,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct TransportSettings {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub request_timeout_ms: Option<u64>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 100,
            request_timeout_ms: None,
        }
    }
}

#[derive(serde::Deserialize, Debug)]
pub struct Settings {
    pub application: ApplicationSettings,
    /// Path to the VSchema JSON document.
    pub vschema_path: String,
    pub tablets: Vec<TabletSettings>,

    #[serde(default)]
    pub transport: TransportSettings,
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = Path::new(env!("CARGO_MANIFEST_DIR")).join("..");
    let configuration_directory = base_path.join("configuration");
    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .expect("Failed to parse APP_ENVIRONMENT.");
    let environment_filename = format!("{}.yaml", environment.as_str());
    let settings = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(environment_filename),
        ))
        // Override from environment variables if set
        .set_override_option("application.host", std::env::var("GATE_HOST").ok())?
        .set_override_option("application.port", std::env::var("GATE_PORT").ok())?
        .set_override_option(
            "vschema_path",
            std::env::var("GATE_VSCHEMA").ok().filter(|s| !s.is_empty()),
        )?
        .build()?;
    settings.try_deserialize::<Settings>()
}

pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}
