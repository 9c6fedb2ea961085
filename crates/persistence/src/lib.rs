use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use tender_core::types::{
    AiStatus, Document, DocumentStatus, ErrorRow, Filter, Lot, Organizer, StorageLocation, Tender,
};
use tracing::{debug, info, warn};

/// §4.I transactional operations used by the orchestrator. All writes are
/// committed immediately; failed writes roll back. Concurrent readers are
/// permitted; per-tender writers are serialized by the orchestrator, not by
/// this layer.
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;
        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    async fn ensure_schema(&self) -> Result<()> {
        info!("Ensuring tender pipeline schema exists");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tenders (
                external_id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                notification_number TEXT,
                notification_type TEXT,
                organizer JSONB NOT NULL DEFAULT '{}'::JSONB,
                initial_price NUMERIC(15,2),
                currency TEXT,
                application_deadline TIMESTAMPTZ,
                etp_code TEXT,
                etp_name TEXT,
                etp_url TEXT,
                kontur_link TEXT,
                publication_date TIMESTAMPTZ,
                last_modified TIMESTAMPTZ,
                selection_method TEXT,
                smp TEXT,
                type TEXT NOT NULL,
                state TEXT NOT NULL DEFAULT 'RECEIVED',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS lots (
                id SERIAL PRIMARY KEY,
                tender_id TEXT NOT NULL REFERENCES tenders(external_id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                customer_id INTEGER,
                initial_sum NUMERIC(15,2),
                currency TEXT,
                delivery_place TEXT,
                delivery_term TEXT,
                payment_term TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id SERIAL PRIMARY KEY,
                tender_id TEXT NOT NULL REFERENCES tenders(external_id) ON DELETE CASCADE,
                file_name TEXT NOT NULL,
                url TEXT NOT NULL,
                storage_location TEXT NOT NULL DEFAULT 'original',
                status TEXT NOT NULL DEFAULT 'pending',
                UNIQUE (tender_id, file_name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS filters (
                id SERIAL PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT,
                type TEXT NOT NULL,
                priority INTEGER NOT NULL,
                active BOOLEAN NOT NULL DEFAULT TRUE,
                parent_id INTEGER REFERENCES filters(id),
                calculation TEXT NOT NULL,
                success_action INTEGER,
                condition TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ai_checks (
                id SERIAL PRIMARY KEY,
                tender_id TEXT NOT NULL REFERENCES tenders(external_id) ON DELETE CASCADE,
                ai_status TEXT NOT NULL,
                task_id TEXT,
                ai_response TEXT,
                checked_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS errors (
                id SERIAL PRIMARY KEY,
                tender_id TEXT NOT NULL REFERENCES tenders(external_id) ON DELETE CASCADE,
                module TEXT NOT NULL,
                error_message TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Schema ensured");
        Ok(())
    }

    /// Fetch a tender with its lots and documents eagerly loaded. Missing
    /// tenders return `Ok(None)` — the orchestrator logs and returns.
    pub async fn fetch_tender(&self, external_id: &str) -> Result<Option<Tender>> {
        let row = sqlx::query(
            r#"
            SELECT external_id, title, notification_number, notification_type, organizer,
                   initial_price, currency, application_deadline, etp_code, etp_name, etp_url,
                   kontur_link, publication_date, last_modified, selection_method, smp,
                   type, state, created_at
            FROM tenders WHERE external_id = $1
            "#,
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let organizer_json: serde_json::Value = row.get("organizer");
        let organizer: Organizer = serde_json::from_value(organizer_json).unwrap_or_default();

        let lots = self.fetch_lots(external_id).await?;
        let docs = self.fetch_documents(external_id).await?;

        Ok(Some(Tender {
            external_id: row.get("external_id"),
            title: row.get("title"),
            notification_number: row.get("notification_number"),
            notification_type: row.get("notification_type"),
            organizer,
            initial_price: row.get("initial_price"),
            currency: row.get("currency"),
            application_deadline: row.get("application_deadline"),
            etp_code: row.get("etp_code"),
            etp_name: row.get("etp_name"),
            etp_url: row.get("etp_url"),
            kontur_link: row.get("kontur_link"),
            publication_date: row.get("publication_date"),
            last_modified: row.get("last_modified"),
            selection_method: row.get("selection_method"),
            smp: row.get("smp"),
            r#type: row.get("type"),
            state: row.get("state"),
            created_at: row.get("created_at"),
            lots,
            docs,
        }))
    }

    async fn fetch_lots(&self, tender_id: &str) -> Result<Vec<Lot>> {
        let rows = sqlx::query(
            "SELECT id, tender_id, title, customer_id, initial_sum, currency, delivery_place, delivery_term, payment_term FROM lots WHERE tender_id = $1",
        )
        .bind(tender_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Lot {
                id: row.get("id"),
                tender_id: row.get("tender_id"),
                title: row.get("title"),
                customer_id: row.get("customer_id"),
                initial_sum: row.get("initial_sum"),
                currency: row.get("currency"),
                delivery_place: row.get("delivery_place"),
                delivery_term: row.get("delivery_term"),
                payment_term: row.get("payment_term"),
            })
            .collect())
    }

    async fn fetch_documents(&self, tender_id: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT id, tender_id, file_name, url, storage_location, status FROM documents WHERE tender_id = $1",
        )
        .bind(tender_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let location: String = row.get("storage_location");
                let status: String = row.get("status");
                Document {
                    id: row.get("id"),
                    tender_id: row.get("tender_id"),
                    file_name: row.get("file_name"),
                    url: row.get("url"),
                    storage_location: parse_storage_location(&location),
                    status: parse_document_status(&status),
                }
            })
            .collect())
    }

    /// Persists a state transition. Every mutation of state is written
    /// atomically with no other side effects in the same statement.
    pub async fn update_tender_state(&self, tender_id: &str, state: &str) -> Result<()> {
        sqlx::query("UPDATE tenders SET state = $1 WHERE external_id = $2")
            .bind(state)
            .bind(tender_id)
            .execute(&self.pool)
            .await?;
        debug!("Persisted state {} for tender {}", state, tender_id);
        Ok(())
    }

    /// Insert-or-update by the unique key (tender_id, file_name); duplicate
    /// inserts collapse into an update of url/location/status.
    pub async fn upsert_document(
        &self,
        tender_id: &str,
        file_name: &str,
        url: &str,
        storage_location: StorageLocation,
        status: DocumentStatus,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (tender_id, file_name, url, storage_location, status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tender_id, file_name) DO UPDATE SET
                url = EXCLUDED.url,
                storage_location = EXCLUDED.storage_location,
                status = EXCLUDED.status
            "#,
        )
        .bind(tender_id)
        .bind(file_name)
        .bind(url)
        .bind(storage_location_str(storage_location))
        .bind(document_status_str(status))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Creates a PENDING ai_checks row and returns its id.
    pub async fn create_ai_check(&self, tender_id: &str, task_id: &str) -> Result<i32> {
        let row = sqlx::query(
            r#"
            INSERT INTO ai_checks (tender_id, ai_status, task_id, ai_response)
            VALUES ($1, 'PENDING', $2, NULL)
            RETURNING id
            "#,
        )
        .bind(tender_id)
        .bind(task_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("id"))
    }

    /// Updates a previously created ai_checks row with its terminal status
    /// and serialized response.
    pub async fn update_ai_check(
        &self,
        id: i32,
        status: AiStatus,
        ai_response: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE ai_checks SET ai_status = $1, ai_response = $2, checked_at = now() WHERE id = $3",
        )
        .bind(status.to_string())
        .bind(ai_response)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count_ai_checks(&self, tender_id: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS c FROM ai_checks WHERE tender_id = $1")
            .bind(tender_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("c"))
    }

    /// Append a durable error log row (§3 Error) and return the row as
    /// recorded, including its assigned id and timestamp.
    pub async fn append_error(&self, tender_id: &str, module: &str, message: &str) -> Result<ErrorRow> {
        let row = sqlx::query(
            r#"
            INSERT INTO errors (tender_id, module, error_message)
            VALUES ($1, $2, $3)
            RETURNING id, created_at
            "#,
        )
        .bind(tender_id)
        .bind(module)
        .bind(message)
        .fetch_one(&self.pool)
        .await?;
        warn!("Logged error for tender {}: {}", tender_id, message);
        Ok(ErrorRow {
            id: Some(row.get("id")),
            tender_id: tender_id.to_string(),
            module: module.to_string(),
            error_message: message.to_string(),
            created_at: row.get("created_at"),
        })
    }

    /// Active filters matching `tender_type`, ordered by ascending priority.
    pub async fn list_active_filters(&self, tender_type: &str) -> Result<Vec<Filter>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, description, type, priority, active, parent_id,
                   calculation, success_action, condition, created_at
            FROM filters
            WHERE active = TRUE AND type = $1
            ORDER BY priority ASC
            "#,
        )
        .bind(tender_type)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Filter {
                id: row.get("id"),
                title: row.get("title"),
                description: row.get("description"),
                r#type: row.get("type"),
                priority: row.get("priority"),
                active: row.get("active"),
                parent_id: row.get("parent_id"),
                calculation: row.get("calculation"),
                success_action: row.get("success_action"),
                condition: row.get("condition"),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}

fn storage_location_str(loc: StorageLocation) -> &'static str {
    match loc {
        StorageLocation::Original => "original",
        StorageLocation::S3 => "s3",
    }
}

fn parse_storage_location(s: &str) -> StorageLocation {
    match s {
        "s3" => StorageLocation::S3,
        _ => StorageLocation::Original,
    }
}

fn document_status_str(status: DocumentStatus) -> &'static str {
    match status {
        DocumentStatus::Pending => "pending",
        DocumentStatus::Downloaded => "downloaded",
        DocumentStatus::Error => "error",
    }
}

fn parse_document_status(s: &str) -> DocumentStatus {
    match s {
        "downloaded" => DocumentStatus::Downloaded,
        "error" => DocumentStatus::Error,
        _ => DocumentStatus::Pending,
    }
}
