use alerter::Alerter;
use bigdecimal::BigDecimal;
use object_store_client::ObjectStoreClient;
use reqwest::{multipart, Client};
use serde_json::{json, Value};
use tender_core::types::Tender;
use tracing::{error, info};

#[derive(Clone)]
pub struct CrmConfig {
    pub webhook_url: String,
}

/// §4.G driver: two user-field updates, an optional file upload, then a
/// `crm.lead.add` call carrying the full field mapping. A webhook failure
/// raises a Telegram alert and returns `false`; the caller does not retry.
pub struct CrmExporter {
    client: Client,
    config: CrmConfig,
}

impl CrmExporter {
    pub fn new(config: CrmConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub async fn export(
        &self,
        tender: &Tender,
        store: &ObjectStoreClient,
        alerter: &Alerter,
    ) -> bool {
        self.update_user_field("UF_CRM_1742608808760", &["Оплата после поставки"])
            .await;
        self.update_user_field("UF_CRM_1742608851091", &["30 дней"]).await;

        let file_id = if let Some(doc) = tender.docs.first() {
            self.upload_file(store, &doc.url, &doc.file_name, &tender.external_id)
                .await
        } else {
            None
        };

        let lot_title = tender
            .lots
            .first()
            .map(|l| l.title.clone())
            .unwrap_or_else(|| tender.title.clone());
        let delivery_place = tender.lots.first().and_then(|l| l.delivery_place.clone());
        let delivery_term = tender.lots.first().and_then(|l| l.delivery_term.clone());
        let payment_term = tender.lots.first().and_then(|l| l.payment_term.clone());
        let price = price_str(&tender.initial_price);
        let doc_url = tender.docs.first().map(|d| d.url.clone()).unwrap_or_default();

        let comments = format!(
            "Тип: {}\nНомер уведомления: {}\nТип уведомления: {}\nМетод выбора: {}\nSMP: {}\nДата публикации: {}",
            tender.r#type,
            tender.notification_number.as_deref().unwrap_or(""),
            tender.notification_type.as_deref().unwrap_or(""),
            tender.selection_method.as_deref().unwrap_or(""),
            tender.smp.as_deref().unwrap_or(""),
            tender.publication_date.map(|d| d.to_rfc3339()).unwrap_or_default(),
        );

        let summary = format!(
            "{}, сумма: {} {}, доставка: {}, срок: {}, оплата: {}",
            lot_title,
            price,
            tender.currency.as_deref().unwrap_or(""),
            delivery_place.as_deref().unwrap_or(""),
            delivery_term.as_deref().unwrap_or(""),
            payment_term.as_deref().unwrap_or(""),
        );

        let payload = json!({
            "fields": {
                "TITLE": format!("{} (ID: {})", lot_title, tender.external_id),
                "ASSIGNED_BY_ID": 9,
                "SOURCE_ID": "BIDZAAR",
                "SOURCE_DESCRIPTION": tender.etp_url.clone().unwrap_or_default(),
                "OPPORTUNascopy link | edit linkOPPORTUNITY": price,
                "CURRENCY_ID": tender.currency,
                "COMPANY_TITLE": tender.organizer.short_name.clone().unwrap_or_default(),
                "PHONE": [{"VALUE": tender.organizer.phone.clone().unwrap_or_default(), "VALUE_TYPE": "WORK"}],
                "EMAIL": [{"VALUE": tender.organizer.email.clone().unwrap_or_default(), "VALUE_TYPE": "WORK"}],
                "COMMENTS": comments,
                "UF_CRM_1742603751016": lot_title,
                "UF_CRM_1742606680844": file_id.clone().unwrap_or_default(),
                "UF_CRM_1742606760239": tender.etp_url.clone().unwrap_or_default(),
                "UF_CRM_1742609850193": tender.organizer.full_name.clone().unwrap_or_default(),
                "UF_CRM_1742609875440": tender.external_id,
                "UF_CRM_1742609910653": tender.notification_number.clone().unwrap_or_default(),
                "UF_CRM_1742609934994": lot_title,
                "UF_CRM_1742609963686": tender.selection_method.clone().unwrap_or_else(|| "Тендер".to_string()),
                "UF_CRM_1742609998740": tender.notification_type.clone().unwrap_or_default(),
                "UF_CRM_1742610026724": price,
                "UF_CRM_1742610077432": tender.etp_url.clone().unwrap_or_default(),
                "UF_CRM_1742610126567": tender.kontur_link.clone().unwrap_or_default(),
                "UF_CRM_1742610167102": tender.application_deadline.map(|d| d.to_rfc3339()).unwrap_or_default(),
                "UF_CRM_1742610221983": tender.last_modified.map(|d| d.to_rfc3339()).unwrap_or_default(),
                "UF_CRM_1742610256352": delivery_place.clone().unwrap_or_default(),
                "UF_CRM_1742610279807": tender.organizer.inn.clone().unwrap_or_default(),
                "UF_CRM_1742610403956": file_id.unwrap_or_default(),
                "UF_CRM_1742610442197": doc_url,
                "UF_CRM_1742610493435": tender.organizer.phone.clone().unwrap_or_default(),
                "UF_CRM_1742610518824": summary,
                "UF_CRM_1742608808760": payment_term.unwrap_or_default(),
                "UF_CRM_1742608851091": delivery_term.unwrap_or_default(),
            }
        });

        let resp = match self
            .client
            .post(format!("{}/crm.lead.add.json", self.config.webhook_url))
            .json(&payload)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                error!("Failed to export tender {} to CRM: {}", tender.external_id, e);
                alerter
                    .notify(
                        tender,
                        &format!("Ошибка экспорта в Bitrix для заявки {}: {e}", tender.external_id),
                    )
                    .await;
                return false;
            }
        };

        if !resp.status().is_success() {
            let status = resp.status();
            error!("Failed to export tender {} to CRM: {}", tender.external_id, status);
            alerter
                .notify(
                    tender,
                    &format!("Ошибка экспорта в Bitrix для заявки {}: {}", tender.external_id, status),
                )
                .await;
            return false;
        }

        let body: Value = match resp.json().await {
            Ok(body) => body,
            Err(_) => return false,
        };
        let bitrix_id = body.get("result").cloned();
        let exported = matches!(&bitrix_id, Some(Value::Number(n)) if n.as_i64().unwrap_or(0) != 0)
            || matches!(&bitrix_id, Some(Value::String(s)) if !s.is_empty());
        if exported {
            info!("Tender {} exported to CRM with ID {:?}", tender.external_id, bitrix_id);
        }
        exported
    }

    async fn update_user_field(&self, field_id: &str, enum_values: &[&str]) {
        let payload = json!({
            "ID": field_id,
            "fields": {
                "ENUM": enum_values.iter().map(|v| json!({"VALUE": v})).collect::<Vec<_>>(),
            }
        });
        match self
            .client
            .post(format!("{}/crm.userfield.update", self.config.webhook_url))
            .json(&payload)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                info!("Updated user field {} with values {:?}", field_id, enum_values);
            }
            Ok(resp) => {
                error!("Failed to update user field {}: {}", field_id, resp.status());
            }
            Err(e) => {
                error!("Failed to update user field {}: {}", field_id, e);
            }
        }
    }

    /// Only object-store-owned URLs are fetchable for re-upload to the CRM;
    /// anything else is skipped, matching the upstream S3-only restriction.
    async fn upload_file(
        &self,
        store: &ObjectStoreClient,
        file_url: &str,
        file_name: &str,
        tender_id: &str,
    ) -> Option<String> {
        if !store.owns_url(file_url) {
            error!("Unsupported file URL for CRM upload: {}", file_url);
            return None;
        }

        let bytes = match store.fetch(tender_id, file_name).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to download {} for CRM upload: {}", file_url, e);
                return None;
            }
        };

        let part = multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = multipart::Form::new().part("file", part);

        match self
            .client
            .post(format!("{}/disk.file.upload", self.config.webhook_url))
            .multipart(form)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                let body: Value = resp.json().await.ok()?;
                let file_id = body
                    .get("result")
                    .and_then(|r| r.get("ID"))
                    .map(|id| id.to_string());
                info!("File {} uploaded to CRM with ID {:?}", file_name, file_id);
                file_id
            }
            Ok(resp) => {
                error!("Failed to upload file to CRM: {}", resp.status());
                None
            }
            Err(e) => {
                error!("Failed to upload file to CRM: {}", e);
                None
            }
        }
    }
}

fn price_str(price: &Option<BigDecimal>) -> String {
    match price {
        Some(p) => p.to_string(),
        None => "None".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_str_matches_python_str_none() {
        assert_eq!(price_str(&None), "None");
    }

    #[test]
    fn price_str_formats_decimal() {
        let price = Some("1500.50".parse::<BigDecimal>().unwrap());
        assert_eq!(price_str(&price), "1500.50");
    }
}
