use crate::types::{Document, Tender};
use once_cell::sync::Lazy;
use regex::Regex;

const ALLOWED_DOCUMENT_FORMATS: &[&str] = &["pdf", "docx", "zip", "7z", "xls", "xlsx"];

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^@]+@[^@]+\.[^@]+$").unwrap());
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?\d{1,3}\s?\(?\d{3}\)?[\s-]?\d{3}[\s-]?\d{2}[\s-]?\d{2}$").unwrap());
static INN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{10}|\d{12})$").unwrap());
static KPP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{9}$").unwrap());

/// §4.D field presence/format checks over the tender record.
pub fn validate_tender(tender: &Tender) -> Vec<String> {
    let mut errors = Vec::new();

    if tender.external_id.is_empty() {
        errors.push("Отсутствует ID заявки".to_string());
    }
    if tender.notification_number.as_deref().unwrap_or("").is_empty() {
        errors.push("Отсутствует номер закупки".to_string());
    }
    if tender.title.is_empty() {
        errors.push("Отсутствует название".to_string());
    }
    if tender.publication_date.is_none() {
        errors.push("Отсутствует дата публикации".to_string());
    }
    if tender.application_deadline.is_none() {
        errors.push("Отсутствует дедлайн подачи".to_string());
    }

    let organizer = &tender.organizer;
    if organizer.full_name.as_deref().unwrap_or("").is_empty() {
        errors.push("Отсутствует полное название организатора".to_string());
    }
    if !is_valid_inn(organizer.inn.as_deref().unwrap_or("")) {
        errors.push("Некорректный ИНН организатора".to_string());
    }
    if let Some(kpp) = organizer.kpp.as_deref() {
        if !is_valid_kpp(kpp) {
            errors.push("Некорректный КПП организатора".to_string());
        }
    }
    if let Some(email) = organizer.email.as_deref() {
        if !is_valid_email(email) {
            errors.push("Некорректный email организатора".to_string());
        }
    }
    if let Some(phone) = organizer.phone.as_deref() {
        if !is_valid_phone(phone) {
            errors.push("Некорректный телефон организатора".to_string());
        }
    }

    errors
}

/// §4.D: empty list is an error; each document needs an allowed extension
/// and a URL with both scheme and host.
pub fn validate_documents(docs: &[Document]) -> Vec<String> {
    let mut errors = Vec::new();

    if docs.is_empty() {
        errors.push("Нет документов".to_string());
    }

    for doc in docs {
        if doc.file_name.is_empty() {
            errors.push(format!("Документ без имени: {}", doc.url));
        } else if !is_valid_format(&doc.file_name) {
            errors.push(format!("Неподдерживаемый формат: {}", doc.file_name));
        }

        if !is_valid_url(&doc.url) {
            errors.push(format!("Некорректный URL: {}", doc.url));
        }
    }

    errors
}

/// Aggregation per §4.D: concatenated lists, non-empty means validation fails.
pub fn validate(tender: &Tender, docs: &[Document]) -> Vec<String> {
    let mut errors = validate_tender(tender);
    errors.extend(validate_documents(docs));
    errors
}

fn is_valid_inn(inn: &str) -> bool {
    INN_RE.is_match(inn)
}

fn is_valid_kpp(kpp: &str) -> bool {
    KPP_RE.is_match(kpp)
}

fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}

fn is_valid_format(file_name: &str) -> bool {
    file_name
        .rsplit('.')
        .next()
        .map(|ext| ALLOWED_DOCUMENT_FORMATS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_valid_url(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => !parsed.scheme().is_empty() && parsed.host().is_some(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DocumentStatus, Organizer, StorageLocation};
    use chrono::Utc;

    fn base_tender() -> Tender {
        Tender {
            external_id: "IS1".to_string(),
            title: "Test tender".to_string(),
            notification_number: Some("N1".to_string()),
            notification_type: None,
            organizer: Organizer {
                full_name: Some("ООО Ромашка".to_string()),
                inn: Some("1234567890".to_string()),
                ..Default::default()
            },
            initial_price: None,
            currency: None,
            application_deadline: Some(Utc::now()),
            etp_code: None,
            etp_name: None,
            etp_url: None,
            kontur_link: None,
            publication_date: Some(Utc::now()),
            last_modified: None,
            selection_method: None,
            smp: None,
            r#type: "goods".to_string(),
            state: "RECEIVED".to_string(),
            created_at: Utc::now(),
            lots: vec![],
            docs: vec![],
        }
    }

    fn doc(file_name: &str, url: &str) -> Document {
        Document {
            id: None,
            tender_id: "IS1".to_string(),
            file_name: file_name.to_string(),
            url: url.to_string(),
            storage_location: StorageLocation::Original,
            status: DocumentStatus::Pending,
        }
    }

    #[test]
    fn missing_notification_number_is_flagged() {
        let mut tender = base_tender();
        tender.notification_number = None;
        let errors = validate_tender(&tender);
        assert!(errors.contains(&"Отсутствует номер закупки".to_string()));
    }

    #[test]
    fn valid_tender_has_no_errors() {
        assert!(validate_tender(&base_tender()).is_empty());
    }

    #[test]
    fn invalid_inn_is_flagged() {
        let mut tender = base_tender();
        tender.organizer.inn = Some("123".to_string());
        assert!(validate_tender(&tender).contains(&"Некорректный ИНН организатора".to_string()));
    }

    #[test]
    fn empty_document_list_fails_validation() {
        let errors = validate_documents(&[]);
        assert_eq!(errors, vec!["Нет документов".to_string()]);
    }

    #[test]
    fn disallowed_extension_fails_validation() {
        let docs = vec![doc("malware.exe", "https://example.com/malware.exe")];
        let errors = validate_documents(&docs);
        assert!(errors
            .iter()
            .any(|e| e.contains("Неподдерживаемый формат")));
    }

    #[test]
    fn valid_document_passes() {
        let docs = vec![doc("tender.pdf", "https://example.com/tender.pdf")];
        assert!(validate_documents(&docs).is_empty());
    }
}
