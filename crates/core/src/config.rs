use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub irc: IrcConfig,
    pub api: ApiConfig,
    pub classifier: ClassifierConfig,
    pub dispatch: DispatchConfig,
    pub context: ContextConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct IrcConfig {
    /// Nick the bot answers to; addressing is detected against this.
    pub nick: String,
    pub admin_nicks: Vec<String>,
    /// Conversations excluded from all processing.
    pub blocked_channels: Vec<String>,
    /// Identifiers seeded into the ignore list at startup.
    pub ignored_nicks: Vec<String>,
    /// Longest single line the transport will carry.
    pub line_limit: usize,
    /// Pause between chunks of a split reply.
    pub send_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Bearer credential for the generation API. Required; startup fails
    /// without it.
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
    pub timeout_secs: u64,
    pub temperature: f64,
    pub max_tokens: u32,
    pub max_reply_len: usize,
}

#[derive(Clone, Debug)]
pub struct ClassifierConfig {
    pub mode: ClassifierMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierMode {
    Heuristic,
    Model,
    Off,
}

#[derive(Clone, Debug)]
pub struct DispatchConfig {
    pub queue_capacity: usize,
    pub worker_count: usize,
    pub cooldown_secs: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

#[derive(Clone, Debug)]
pub struct ContextConfig {
    /// Channel window capacity (entries kept per channel).
    pub channel_window: usize,
    /// Durable turn pairs kept per user.
    pub user_turns: usize,
    /// Channel entries included in an outbound prompt.
    pub prompt_channel_entries: usize,
    /// User turns included in an outbound prompt.
    pub prompt_user_turns: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub log_level: Option<String>,
    pub classifier_mode: Option<ClassifierMode>,
    pub worker_count: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub cooldown_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://banter.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            irc: IrcConfig {
                nick: "banter".to_string(),
                admin_nicks: Vec::new(),
                blocked_channels: Vec::new(),
                ignored_nicks: Vec::new(),
                line_limit: 440,
                send_delay_ms: 1_000,
            },
            api: ApiConfig {
                api_key: None,
                base_url: "https://api.x.ai/v1".to_string(),
                model: "grok-4-1-fast-reasoning".to_string(),
                system_prompt: "You are a witty and helpful assistant in an IRC channel. \
                                Be concise, fun, and friendly. Never output code blocks, \
                                ASCII art, or mass mentions."
                    .to_string(),
                timeout_secs: 8,
                temperature: 0.95,
                max_tokens: 900,
                max_reply_len: 1_400,
            },
            classifier: ClassifierConfig { mode: ClassifierMode::Heuristic },
            dispatch: DispatchConfig {
                queue_capacity: 50,
                worker_count: 3,
                cooldown_secs: 4,
                max_attempts: 3,
                backoff_base_ms: 500,
                backoff_max_ms: 8_000,
            },
            context: ContextConfig {
                channel_window: 40,
                user_turns: 20,
                prompt_channel_entries: 25,
                prompt_user_turns: 6,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for ClassifierMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "heuristic" => Ok(Self::Heuristic),
            "model" => Ok(Self::Model),
            "off" => Ok(Self::Off),
            other => Err(ConfigError::Validation(format!(
                "unsupported classifier mode `{other}` (expected heuristic|model|off)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("banter.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(irc) = patch.irc {
            if let Some(nick) = irc.nick {
                self.irc.nick = nick;
            }
            if let Some(admin_nicks) = irc.admin_nicks {
                self.irc.admin_nicks = admin_nicks;
            }
            if let Some(blocked_channels) = irc.blocked_channels {
                self.irc.blocked_channels = blocked_channels;
            }
            if let Some(ignored_nicks) = irc.ignored_nicks {
                self.irc.ignored_nicks = ignored_nicks;
            }
            if let Some(line_limit) = irc.line_limit {
                self.irc.line_limit = line_limit;
            }
            if let Some(send_delay_ms) = irc.send_delay_ms {
                self.irc.send_delay_ms = send_delay_ms;
            }
        }

        if let Some(api) = patch.api {
            if let Some(api_key_value) = api.api_key {
                self.api.api_key = Some(secret_value(api_key_value));
            }
            if let Some(base_url) = api.base_url {
                self.api.base_url = base_url;
            }
            if let Some(model) = api.model {
                self.api.model = model;
            }
            if let Some(system_prompt) = api.system_prompt {
                self.api.system_prompt = system_prompt;
            }
            if let Some(timeout_secs) = api.timeout_secs {
                self.api.timeout_secs = timeout_secs;
            }
            if let Some(temperature) = api.temperature {
                self.api.temperature = temperature;
            }
            if let Some(max_tokens) = api.max_tokens {
                self.api.max_tokens = max_tokens;
            }
            if let Some(max_reply_len) = api.max_reply_len {
                self.api.max_reply_len = max_reply_len;
            }
        }

        if let Some(classifier) = patch.classifier {
            if let Some(mode) = classifier.mode {
                self.classifier.mode = mode;
            }
        }

        if let Some(dispatch) = patch.dispatch {
            if let Some(queue_capacity) = dispatch.queue_capacity {
                self.dispatch.queue_capacity = queue_capacity;
            }
            if let Some(worker_count) = dispatch.worker_count {
                self.dispatch.worker_count = worker_count;
            }
            if let Some(cooldown_secs) = dispatch.cooldown_secs {
                self.dispatch.cooldown_secs = cooldown_secs;
            }
            if let Some(max_attempts) = dispatch.max_attempts {
                self.dispatch.max_attempts = max_attempts;
            }
            if let Some(backoff_base_ms) = dispatch.backoff_base_ms {
                self.dispatch.backoff_base_ms = backoff_base_ms;
            }
            if let Some(backoff_max_ms) = dispatch.backoff_max_ms {
                self.dispatch.backoff_max_ms = backoff_max_ms;
            }
        }

        if let Some(context) = patch.context {
            if let Some(channel_window) = context.channel_window {
                self.context.channel_window = channel_window;
            }
            if let Some(user_turns) = context.user_turns {
                self.context.user_turns = user_turns;
            }
            if let Some(prompt_channel_entries) = context.prompt_channel_entries {
                self.context.prompt_channel_entries = prompt_channel_entries;
            }
            if let Some(prompt_user_turns) = context.prompt_user_turns {
                self.context.prompt_user_turns = prompt_user_turns;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("BANTER_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("BANTER_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("BANTER_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("BANTER_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("BANTER_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("BANTER_IRC_NICK") {
            self.irc.nick = value;
        }
        if let Some(value) = read_env("BANTER_IRC_ADMIN_NICKS") {
            self.irc.admin_nicks = parse_list(&value);
        }
        if let Some(value) = read_env("BANTER_IRC_BLOCKED_CHANNELS") {
            self.irc.blocked_channels = parse_list(&value);
        }
        if let Some(value) = read_env("BANTER_IRC_IGNORED_NICKS") {
            self.irc.ignored_nicks = parse_list(&value);
        }

        if let Some(value) = read_env("BANTER_API_KEY") {
            self.api.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("BANTER_API_BASE_URL") {
            self.api.base_url = value;
        }
        if let Some(value) = read_env("BANTER_API_MODEL") {
            self.api.model = value;
        }
        if let Some(value) = read_env("BANTER_API_TIMEOUT_SECS") {
            self.api.timeout_secs = parse_u64("BANTER_API_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("BANTER_CLASSIFIER_MODE") {
            self.classifier.mode = value.parse()?;
        }

        if let Some(value) = read_env("BANTER_DISPATCH_QUEUE_CAPACITY") {
            self.dispatch.queue_capacity =
                parse_usize("BANTER_DISPATCH_QUEUE_CAPACITY", &value)?;
        }
        if let Some(value) = read_env("BANTER_DISPATCH_WORKER_COUNT") {
            self.dispatch.worker_count = parse_usize("BANTER_DISPATCH_WORKER_COUNT", &value)?;
        }
        if let Some(value) = read_env("BANTER_DISPATCH_COOLDOWN_SECS") {
            self.dispatch.cooldown_secs = parse_u64("BANTER_DISPATCH_COOLDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("BANTER_DISPATCH_MAX_ATTEMPTS") {
            self.dispatch.max_attempts = parse_u32("BANTER_DISPATCH_MAX_ATTEMPTS", &value)?;
        }

        if let Some(value) = read_env("BANTER_CONTEXT_CHANNEL_WINDOW") {
            self.context.channel_window = parse_usize("BANTER_CONTEXT_CHANNEL_WINDOW", &value)?;
        }
        if let Some(value) = read_env("BANTER_CONTEXT_USER_TURNS") {
            self.context.user_turns = parse_usize("BANTER_CONTEXT_USER_TURNS", &value)?;
        }

        let log_level = read_env("BANTER_LOGGING_LEVEL").or_else(|| read_env("BANTER_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("BANTER_LOGGING_FORMAT").or_else(|| read_env("BANTER_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(api_key) = overrides.api_key {
            self.api.api_key = Some(secret_value(api_key));
        }
        if let Some(model) = overrides.model {
            self.api.model = model;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(classifier_mode) = overrides.classifier_mode {
            self.classifier.mode = classifier_mode;
        }
        if let Some(worker_count) = overrides.worker_count {
            self.dispatch.worker_count = worker_count;
        }
        if let Some(queue_capacity) = overrides.queue_capacity {
            self.dispatch.queue_capacity = queue_capacity;
        }
        if let Some(cooldown_secs) = overrides.cooldown_secs {
            self.dispatch.cooldown_secs = cooldown_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_irc(&self.irc)?;
        validate_api(&self.api)?;
        validate_dispatch(&self.dispatch)?;
        validate_context(&self.context)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("banter.toml"), PathBuf::from("config/banter.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_irc(irc: &IrcConfig) -> Result<(), ConfigError> {
    if irc.nick.trim().is_empty() {
        return Err(ConfigError::Validation("irc.nick must not be empty".to_string()));
    }
    if irc.line_limit < 64 {
        return Err(ConfigError::Validation("irc.line_limit must be at least 64".to_string()));
    }
    Ok(())
}

fn validate_api(api: &ApiConfig) -> Result<(), ConfigError> {
    let missing = api
        .api_key
        .as_ref()
        .map(|value| value.expose_secret().trim().is_empty())
        .unwrap_or(true);
    if missing {
        return Err(ConfigError::Validation(
            "api.api_key is required; set it in [api] or via BANTER_API_KEY".to_string(),
        ));
    }

    if api.timeout_secs == 0 || api.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "api.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if !api.base_url.starts_with("http://") && !api.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "api.base_url must start with http:// or https://".to_string(),
        ));
    }

    if api.max_reply_len < 64 {
        return Err(ConfigError::Validation(
            "api.max_reply_len must be at least 64".to_string(),
        ));
    }

    Ok(())
}

fn validate_dispatch(dispatch: &DispatchConfig) -> Result<(), ConfigError> {
    if dispatch.queue_capacity == 0 {
        return Err(ConfigError::Validation(
            "dispatch.queue_capacity must be greater than zero".to_string(),
        ));
    }
    if dispatch.worker_count == 0 {
        return Err(ConfigError::Validation(
            "dispatch.worker_count must be greater than zero".to_string(),
        ));
    }
    if dispatch.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "dispatch.max_attempts must be greater than zero".to_string(),
        ));
    }
    if dispatch.backoff_max_ms < dispatch.backoff_base_ms {
        return Err(ConfigError::Validation(
            "dispatch.backoff_max_ms must be at least dispatch.backoff_base_ms".to_string(),
        ));
    }
    Ok(())
}

fn validate_context(context: &ContextConfig) -> Result<(), ConfigError> {
    if context.channel_window == 0 || context.user_turns == 0 {
        return Err(ConfigError::Validation(
            "context window sizes must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .collect()
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    irc: Option<IrcPatch>,
    api: Option<ApiPatch>,
    classifier: Option<ClassifierPatch>,
    dispatch: Option<DispatchPatch>,
    context: Option<ContextPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct IrcPatch {
    nick: Option<String>,
    admin_nicks: Option<Vec<String>>,
    blocked_channels: Option<Vec<String>>,
    ignored_nicks: Option<Vec<String>>,
    line_limit: Option<usize>,
    send_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    system_prompt: Option<String>,
    timeout_secs: Option<u64>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    max_reply_len: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ClassifierPatch {
    mode: Option<ClassifierMode>,
}

#[derive(Debug, Default, Deserialize)]
struct DispatchPatch {
    queue_capacity: Option<usize>,
    worker_count: Option<usize>,
    cooldown_secs: Option<u64>,
    max_attempts: Option<u32>,
    backoff_base_ms: Option<u64>,
    backoff_max_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ContextPatch {
    channel_window: Option<usize>,
    user_turns: Option<usize>,
    prompt_channel_entries: Option<usize>,
    prompt_user_turns: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ClassifierMode, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn missing_api_key_is_a_fatal_validation_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&["BANTER_API_KEY"]);

        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => return Err("expected validation failure without api key".to_string()),
            Err(error) => error,
        };
        let mentions_key = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("api.api_key")
        );
        ensure(mentions_key, "validation failure should mention api.api_key")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_BANTER_API_KEY", "xai-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("banter.toml");
            fs::write(
                &path,
                r#"
[api]
api_key = "${TEST_BANTER_API_KEY}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let key = config.api.api_key.as_ref().ok_or("api key should be present")?;
            ensure(
                key.expose_secret() == "xai-from-env",
                "api key should be loaded from environment",
            )
        })();

        clear_vars(&["TEST_BANTER_API_KEY"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BANTER_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("BANTER_API_KEY", "xai-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("banter.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[api]
api_key = "xai-from-file"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            let key = config.api.api_key.as_ref().ok_or("api key should be present")?;
            ensure(
                key.expose_secret() == "xai-from-env",
                "env api key should win over file and defaults",
            )
        })();

        clear_vars(&["BANTER_DATABASE_URL", "BANTER_API_KEY"]);
        result
    }

    #[test]
    fn classifier_mode_and_list_env_overrides_parse() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BANTER_API_KEY", "xai-test");
        env::set_var("BANTER_CLASSIFIER_MODE", "off");
        env::set_var("BANTER_IRC_IGNORED_NICKS", "spammy, lurker ,");
        env::set_var("BANTER_DISPATCH_WORKER_COUNT", "5");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.classifier.mode == ClassifierMode::Off,
                "classifier mode should come from env",
            )?;
            ensure(
                config.irc.ignored_nicks == vec!["spammy".to_string(), "lurker".to_string()],
                "ignored nicks list should be trimmed and filtered",
            )?;
            ensure(config.dispatch.worker_count == 5, "worker count should come from env")
        })();

        clear_vars(&[
            "BANTER_API_KEY",
            "BANTER_CLASSIFIER_MODE",
            "BANTER_IRC_IGNORED_NICKS",
            "BANTER_DISPATCH_WORKER_COUNT",
        ]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BANTER_API_KEY", "xai-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("xai-secret-value"), "debug output should not contain key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )
        })();

        clear_vars(&["BANTER_API_KEY"]);
        result
    }

    #[test]
    fn invalid_dispatch_settings_are_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BANTER_API_KEY", "xai-test");
        env::set_var("BANTER_DISPATCH_QUEUE_CAPACITY", "0");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected queue capacity validation failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::Validation(ref message) if message.contains("queue_capacity")
                ),
                "validation failure should mention queue_capacity",
            )
        })();

        clear_vars(&["BANTER_API_KEY", "BANTER_DISPATCH_QUEUE_CAPACITY"]);
        result
    }
}
