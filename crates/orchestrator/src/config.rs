use anyhow::{bail, Result};
use std::env;
use tracing::{error, info};

/// Environment-sourced configuration for the full pipeline. Required vars
/// are checked up front so a misconfigured deployment fails at startup
/// rather than partway through a batch.
pub struct Config {
    pub database_url: String,
    pub bitrix_webhook_url: String,
    pub ai_api_base_url: String,
    pub ai_api_token: String,
    pub s3_endpoint_url: String,
    pub s3_bucket_name: String,
    pub s3_region: String,
    pub s3_access_key: String,
    pub s3_secret_key: String,
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
    pub download_dir: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables...");

        let database_url = require_var("DATABASE_URL")?;
        let bitrix_webhook_url = require_var("BITRIX_WEBHOOK_URL")?;
        let ai_api_base_url = require_var("AI_API_BASE_URL")?;
        let ai_api_token = require_var("AI_API_TOKEN")?;
        let s3_endpoint_url = require_var("S3_ENDPOINT_URL")?;
        let s3_bucket_name = require_var("S3_BUCKET_NAME")?;
        let s3_region = require_var("S3_REGION")?;
        let s3_access_key = require_var("S3_ACCESS_KEY")?;
        let s3_secret_key = require_var("S3_SECRET_KEY")?;
        let telegram_bot_token = require_var("TELEGRAM_BOT_TOKEN")?;
        let telegram_chat_id = require_var("TELEGRAM_CHAT_ID")?;

        let download_dir = env::var("DOWNLOAD_DIR").unwrap_or_else(|_| "/tmp/tender-docs".to_string());

        Ok(Self {
            database_url,
            bitrix_webhook_url,
            ai_api_base_url,
            ai_api_token,
            s3_endpoint_url,
            s3_bucket_name,
            s3_region,
            s3_access_key,
            s3_secret_key,
            telegram_bot_token,
            telegram_chat_id,
            download_dir,
        })
    }
}

fn require_var(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) => {
            info!("✓ {} found (length: {})", name, value.len());
            Ok(value)
        }
        Err(e) => {
            error!("✗ {} not found: {:?}", name, e);
            bail!("{name} environment variable not set")
        }
    }
}
