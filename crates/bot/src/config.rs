//! Bot configuration

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "summaria")]
#[command(about = "Summaria - Telegram group-chat summarizer bot")]
pub struct BotConfig {
    /// Telegram bot token
    #[arg(long, env = "SUMMARIA_BOT_TOKEN")]
    pub bot_token: String,

    /// OpenAI-compatible API key
    #[arg(long, env = "SUMMARIA_OPENAI_API_KEY")]
    pub openai_api_key: String,

    /// Model name to use
    #[arg(long, env = "SUMMARIA_OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub openai_model: String,

    /// API base URL (OpenAI or compatible)
    #[arg(
        long = "openai-base-url",
        env = "SUMMARIA_OPENAI_BASE_URL",
        default_value = "https://api.openai.com/v1"
    )]
    pub openai_base_url: String,

    /// Path to the SQLite database for the durable tier
    #[arg(long, env = "SUMMARIA_DB_PATH", default_value = "memory.sqlite")]
    pub db_path: String,

    /// Maximum summaries per UTC day
    #[arg(long, env = "SUMMARIA_DAILY_LIMIT", default_value = "100")]
    pub daily_limit: u32,

    /// Per-user cooldown between guarded commands, in seconds
    #[arg(long, env = "SUMMARIA_COOLDOWN_SECS", default_value = "30")]
    pub cooldown_secs: i64,

    /// Retention horizon for buffered messages, in minutes
    #[arg(long, env = "SUMMARIA_RETENTION_MINUTES", default_value = "180")]
    pub retention_minutes: i64,

    /// Below this many in-memory results a query also consults the database
    #[arg(long, env = "SUMMARIA_FALLBACK_THRESHOLD", default_value = "3")]
    pub fallback_threshold: usize,

    /// How long after startup the empty-result reply discloses that
    /// pre-restart history may be missing, in minutes
    #[arg(long, env = "SUMMARIA_STARTUP_GRACE_MINUTES", default_value = "90")]
    pub startup_grace_minutes: i64,

    /// User id allowed to clear history (0 = nobody)
    #[arg(long, env = "SUMMARIA_OWNER_ID", default_value = "0")]
    pub owner_id: i64,

    /// Public webhook URL; when set the bot serves updates over HTTP
    /// instead of long polling
    #[arg(long, env = "SUMMARIA_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// HTTP listen host for webhook mode
    #[arg(long, env = "SUMMARIA_HTTP_HOST", default_value = "0.0.0.0")]
    pub http_host: String,

    /// HTTP listen port for webhook mode
    #[arg(long, env = "SUMMARIA_HTTP_PORT", default_value = "8080")]
    pub http_port: u16,

    /// Timeout for one LLM request, in seconds
    #[arg(long, env = "SUMMARIA_LLM_TIMEOUT_SECS", default_value = "60")]
    pub llm_timeout_secs: u64,
}
