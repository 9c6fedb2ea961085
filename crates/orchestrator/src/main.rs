use ai_classifier::{AiClassifier, AiClassifierConfig};
use alerter::{Alerter, AlerterConfig};
use aws_lambda_events::event::sqs::SqsEvent;
use crm_exporter::{CrmConfig, CrmExporter};
use document_scraper::DocumentScraper;
use http_fetcher::HttpFetcher;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use object_store_client::{ObjectStoreClient, ObjectStoreConfig};
use persistence::Database;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

mod config;
mod process;
mod types;

use config::Config;
use process::Services;
use types::ProcessMessage;

async fn function_handler(
    event: LambdaEvent<SqsEvent>,
    services: Arc<Services>,
) -> Result<String, Error> {
    info!("=== TENDER ORCHESTRATOR LAMBDA STARTED ===");

    let records = &event.payload.records;
    info!("Processing {} SQS records", records.len());

    for record in records {
        let Some(body) = &record.body else {
            warn!("SQS record has no body, skipping");
            continue;
        };

        match process_message(body, &services).await {
            Ok(()) => info!("Successfully processed message"),
            Err(e) => error!("Failed to process message: {}", e),
        }
    }

    Ok("Completed tender processing".to_string())
}

async fn process_message(message_body: &str, services: &Services) -> anyhow::Result<()> {
    let message: ProcessMessage = serde_json::from_str(message_body)?;
    process::process(&message.tender_id, &message.tender_type, services).await
}

async fn build_services(config: &Config) -> anyhow::Result<Services> {
    let db = Database::connect(&config.database_url).await?;

    let store = ObjectStoreClient::new(ObjectStoreConfig {
        endpoint: config.s3_endpoint_url.clone(),
        bucket: config.s3_bucket_name.clone(),
        region: config.s3_region.clone(),
        access_key: config.s3_access_key.clone(),
        secret_key: config.s3_secret_key.clone(),
    })
    .await;

    Ok(Services {
        db,
        fetcher: HttpFetcher::new(),
        store,
        scraper: DocumentScraper::new(PathBuf::from(&config.download_dir)),
        classifier: AiClassifier::new(AiClassifierConfig {
            base_url: config.ai_api_base_url.clone(),
            api_token: config.ai_api_token.clone(),
        }),
        exporter: CrmExporter::new(CrmConfig {
            webhook_url: config.bitrix_webhook_url.clone(),
        }),
        alerter: Alerter::new(AlerterConfig {
            bot_token: Some(config.telegram_bot_token.clone()),
            chat_id: Some(config.telegram_chat_id.clone()),
        }),
    })
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    info!("=== Tender Orchestrator Starting ===");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        Error::from(e.to_string().as_str())
    })?;

    let services = Arc::new(build_services(&config).await.map_err(|e| {
        error!("Failed to initialize services: {}", e);
        Error::from(e.to_string().as_str())
    })?);

    run(service_fn(move |event| {
        let services = services.clone();
        async move { function_handler(event, services).await }
    }))
    .await
}
