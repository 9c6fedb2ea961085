use ai_classifier::AiClassifier;
use alerter::Alerter;
use anyhow::Result;
use crm_exporter::CrmExporter;
use document_scraper::DocumentScraper;
use http_fetcher::HttpFetcher;
use object_store_client::{ObjectStoreClient, UploadSource};
use persistence::Database;
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;
use tender_core::filter_engine::apply_filters;
use tender_core::state_machine::{State, TenderStateMachine, Trigger};
use tender_core::types::{AiStatus, Document, DocumentStatus, StorageLocation, Tender};
use tender_core::validator::validate;
use tracing::{debug, error, info, warn};

const HEAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Bundles every collaborator `process` needs. Owned by `main` for the
/// lifetime of the Lambda process and handed to each invocation by reference.
pub struct Services {
    pub db: Database,
    pub fetcher: HttpFetcher,
    pub store: ObjectStoreClient,
    pub scraper: DocumentScraper,
    pub classifier: AiClassifier,
    pub exporter: CrmExporter,
    pub alerter: Alerter,
}

/// §4.K: the single end-to-end driver for one tender. Mirrors the upstream
/// `process_and_save_tender` sequencing — validate, fetch or scrape
/// documents, filter, classify, export — persisting the state machine's
/// state after every transition.
pub async fn process(tender_id: &str, tender_type: &str, services: &Services) -> Result<()> {
    info!("Starting processing tender {} of type {}", tender_id, tender_type);

    let Some(mut tender) = services.db.fetch_tender(tender_id).await? else {
        error!("Tender {} not found in database", tender_id);
        return Ok(());
    };

    let initial_state = State::from_str(&tender.state).unwrap_or(State::Received);
    let mut sm = TenderStateMachine::new(tender_id, initial_state);

    match run(tender_id, &mut tender, &mut sm, services).await {
        Ok(()) => {
            info!("Tender {} processing finished, state: {}", tender_id, sm.state());
            Ok(())
        }
        Err(e) => {
            error!("Error processing tender {}: {}", tender_id, e);
            if let Ok(state) = sm.fire(Trigger::EncounterError) {
                persist_state(services, tender_id, state).await;
            }
            services
                .alerter
                .notify(&tender, &format!("Ошибка обработки тендера {tender_id}: {e}"))
                .await;
            Err(e)
        }
    }
}

async fn run(
    tender_id: &str,
    tender: &mut Tender,
    sm: &mut TenderStateMachine,
    services: &Services,
) -> Result<()> {
    fire_and_persist(sm, Trigger::StartValidating, services, tender_id).await?;

    let errors = validate(tender, &tender.docs);
    if !errors.is_empty() {
        fire_and_persist(sm, Trigger::FailValidation, services, tender_id).await?;
        let message = errors.join("; ");
        error!("Validation failed for tender {}: {}", tender_id, message);
        services.db.append_error(tender_id, "validation", &message).await?;
        services
            .alerter
            .notify(tender, &format!("Ошибка валидации: {message}"))
            .await;
        return Ok(());
    }

    fire_and_persist(sm, Trigger::FetchDocuments, services, tender_id).await?;
    let updated_docs = match fetch_or_scrape_documents(tender_id, tender, sm, services).await? {
        Some(docs) => docs,
        None => return Ok(()),
    };
    tender.docs = updated_docs;

    fire_and_persist(sm, Trigger::StartFiltering, services, tender_id).await?;
    let filters = services.db.list_active_filters(&tender.r#type).await?;
    if !apply_filters(tender, &filters) {
        fire_and_persist(sm, Trigger::RejectAfterFiltering, services, tender_id).await?;
        info!("Tender {} rejected after filtering", tender_id);
        return Ok(());
    }

    fire_and_persist(sm, Trigger::StartAi, services, tender_id).await?;
    if !run_ai_classification(tender_id, tender, services).await? {
        fire_and_persist(sm, Trigger::RejectAfterAi, services, tender_id).await?;
        info!("Tender {} rejected after AI processing", tender_id);
        return Ok(());
    }

    fire_and_persist(sm, Trigger::PrepareExport, services, tender_id).await?;
    fire_and_persist(sm, Trigger::StartExporting, services, tender_id).await?;
    if services.exporter.export(tender, &services.store, &services.alerter).await {
        fire_and_persist(sm, Trigger::Complete, services, tender_id).await?;
    } else {
        fire_and_persist(sm, Trigger::FailExport, services, tender_id).await?;
        error!("Export failed for tender {}", tender_id);
        services.alerter.notify(tender, "Ошибка экспорта в Bitrix").await;
    }

    Ok(())
}

/// HEAD-checks every (de-duplicated) document URL; accessible ones go
/// straight to the object store, everything else falls back to scraping via
/// `kontur_link` and then `etp_url`. Drives the state machine through to
/// `DocumentsSaved` itself (`SaveDocuments` on the direct-fetch path,
/// `FinishScraping` on the scrape path — the two have disjoint legal source
/// states). Returns `None` when a scrape branch already terminated the
/// pipeline (alert sent, state persisted).
async fn fetch_or_scrape_documents(
    tender_id: &str,
    tender: &Tender,
    sm: &mut TenderStateMachine,
    services: &Services,
) -> Result<Option<Vec<Document>>> {
    let mut updated_docs = Vec::new();
    let mut seen_urls = HashSet::new();
    let mut any_fetch_failed = false;

    for doc in &tender.docs {
        if !seen_urls.insert(doc.url.clone()) {
            warn!("Skipping duplicate document URL: {}", doc.url);
            continue;
        }
        debug!("Processing document {} with URL {}", doc.file_name, doc.url);

        let accessible = matches!(services.fetcher.head(&doc.url, HEAD_TIMEOUT).await, Ok(200));
        if !accessible {
            any_fetch_failed = true;
            continue;
        }

        match services
            .store
            .upload(UploadSource::Url(&doc.url), &doc.file_name, tender_id)
            .await
        {
            Some(new_url) => {
                services
                    .db
                    .upsert_document(
                        tender_id,
                        &doc.file_name,
                        &new_url,
                        StorageLocation::S3,
                        DocumentStatus::Downloaded,
                    )
                    .await?;
                info!("Successfully uploaded {} to object store: {}", doc.file_name, new_url);
                updated_docs.push(Document {
                    id: None,
                    tender_id: tender_id.to_string(),
                    file_name: doc.file_name.clone(),
                    url: new_url,
                    storage_location: StorageLocation::S3,
                    status: DocumentStatus::Downloaded,
                });
            }
            None => {
                error!("Upload failed despite accessible URL for {}", doc.file_name);
                any_fetch_failed = true;
            }
        }
    }

    if !any_fetch_failed {
        fire_and_persist(sm, Trigger::SaveDocuments, services, tender_id).await?;
        return Ok(Some(updated_docs));
    }

    fire_and_persist(sm, Trigger::DocumentsNotFound, services, tender_id).await?;
    fire_and_persist(sm, Trigger::StartScraping, services, tender_id).await?;

    info!("Attempting scraping via kontur_link: {:?}", tender.kontur_link);
    if let Some(link) = tender.kontur_link.as_deref() {
        if let Some(scraped) = services.scraper.scrape(link, tender_id, &services.store).await {
            persist_scraped(tender_id, &scraped, services).await?;
            updated_docs.extend(scraped.into_iter().map(|d| to_document(tender_id, d)));
            fire_and_persist(sm, Trigger::FinishScraping, services, tender_id).await?;
            info!(
                "Scraping via kontur_link successful, {} documents saved for tender {}",
                updated_docs.len(),
                tender_id
            );
            return Ok(Some(updated_docs));
        }
    }

    info!("Scraping via kontur_link failed, attempting via etp_url: {:?}", tender.etp_url);
    if let Some(url) = tender.etp_url.as_deref() {
        if let Some(scraped) = services.scraper.scrape(url, tender_id, &services.store).await {
            persist_scraped(tender_id, &scraped, services).await?;
            updated_docs.extend(scraped.into_iter().map(|d| to_document(tender_id, d)));
            fire_and_persist(sm, Trigger::FinishScraping, services, tender_id).await?;
            info!(
                "Scraping via etp_url successful, {} documents saved for tender {}",
                updated_docs.len(),
                tender_id
            );
            return Ok(Some(updated_docs));
        }
    }

    fire_and_persist(sm, Trigger::FailScraping, services, tender_id).await?;
    let message = format!(
        "Не удалось скачать документы через kontur_link ({:?}) и etp_url ({:?})",
        tender.kontur_link, tender.etp_url
    );
    error!("Scraping failed for tender {} using both kontur_link and etp_url", tender_id);
    services.alerter.notify(tender, &message).await;
    Ok(None)
}

async fn persist_scraped(
    tender_id: &str,
    scraped: &[document_scraper::ScrapedDocument],
    services: &Services,
) -> Result<()> {
    for doc in scraped {
        services
            .db
            .upsert_document(
                tender_id,
                &doc.file_name,
                &doc.url,
                StorageLocation::S3,
                DocumentStatus::Downloaded,
            )
            .await?;
    }
    Ok(())
}

fn to_document(tender_id: &str, scraped: document_scraper::ScrapedDocument) -> Document {
    Document {
        id: None,
        tender_id: tender_id.to_string(),
        file_name: scraped.file_name,
        url: scraped.url,
        storage_location: StorageLocation::S3,
        status: DocumentStatus::Downloaded,
    }
}

/// Classifies the first supported document, persists the ai_checks row
/// end-to-end, and returns whether the tender was accepted.
async fn run_ai_classification(tender_id: &str, tender: &Tender, services: &Services) -> Result<bool> {
    let Some(doc) = tender
        .docs
        .iter()
        .find(|d| AiClassifier::is_supported_format(&d.file_name))
    else {
        error!("No suitable document for tender {}", tender_id);
        return Ok(false);
    };

    let bytes = match services.store.fetch(tender_id, &doc.file_name).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to download {} for AI classification: {}", doc.file_name, e);
            return Ok(false);
        }
    };

    let task_id = match services.classifier.submit(bytes, &doc.file_name).await {
        Ok(task_id) => task_id,
        Err(e) => {
            error!("Failed to send tender {} to AI: {}", tender_id, e);
            return Ok(false);
        }
    };

    let check_id = services.db.create_ai_check(tender_id, &task_id).await?;
    let attempt = services.db.count_ai_checks(tender_id).await?;
    info!("Tender {} AI classification attempt #{}", tender_id, attempt);

    let (status, response) = match services.classifier.poll(&task_id).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Polling AI task {} for tender {} failed: {}", task_id, tender_id, e);
            let message = e.to_string();
            services
                .db
                .update_ai_check(check_id, AiStatus::Failed, Some(&message))
                .await?;
            return Ok(false);
        }
    };

    let accepted = status == AiStatus::Success && ai_classifier::is_accepted(response.as_ref());
    let response_text = response.as_ref().map(|v| v.to_string());
    services
        .db
        .update_ai_check(check_id, status, response_text.as_deref())
        .await?;

    info!(
        "AI result for tender {}: status={}, accepted={}",
        tender_id, status, accepted
    );
    Ok(accepted)
}

async fn fire_and_persist(
    sm: &mut TenderStateMachine,
    trigger: Trigger,
    services: &Services,
    tender_id: &str,
) -> Result<State> {
    let state = sm.fire(trigger)?;
    persist_state(services, tender_id, state).await;
    Ok(state)
}

async fn persist_state(services: &Services, tender_id: &str, state: State) {
    if let Err(e) = services.db.update_tender_state(tender_id, state.as_str()).await {
        error!("Failed to persist state {} for tender {}: {}", state, tender_id, e);
    }
}
