use crate::types::{Filter, Tender};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// §4.E condition language: a node is a leaf or an AND/OR composite over
/// sub-nodes. Decoded once per filter at evaluation time, not re-parsed per
/// row (see spec §9 design note).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    And {
        #[serde(rename = "AND")]
        and: Vec<Condition>,
    },
    Or {
        #[serde(rename = "OR")]
        or: Vec<Condition>,
    },
    Leaf {
        field: String,
        op: String,
        value: Value,
    },
}

fn get_nested_value<'a>(data: &'a Value, field: &str) -> Option<&'a Value> {
    let mut current = data;
    for key in field.split('.') {
        current = current.as_object()?.get(key)?;
    }
    Some(current)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    a == b
}

fn compare_numeric(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    let a = a.as_f64()?;
    let b = b.as_f64()?;
    a.partial_cmp(&b)
}

/// Evaluate a single condition node against the flattened tender map.
/// A missing field or a type mismatch both yield `false`.
pub fn evaluate_condition(condition: &Condition, tender_data: &Value) -> bool {
    match condition {
        Condition::And { and } => and.iter().all(|c| evaluate_condition(c, tender_data)),
        Condition::Or { or } => or.iter().any(|c| evaluate_condition(c, tender_data)),
        Condition::Leaf { field, op, value } => {
            let tender_value = match get_nested_value(tender_data, field) {
                Some(v) if !v.is_null() => v,
                _ => {
                    debug!("Field {} not found in tender data", field);
                    return false;
                }
            };

            match op.as_str() {
                "=" => values_equal(tender_value, value),
                "!=" => !values_equal(tender_value, value),
                ">" => compare_numeric(tender_value, value)
                    .map(|o| o.is_gt())
                    .unwrap_or(false),
                "<" => compare_numeric(tender_value, value)
                    .map(|o| o.is_lt())
                    .unwrap_or(false),
                ">=" => compare_numeric(tender_value, value)
                    .map(|o| o.is_ge())
                    .unwrap_or(false),
                "<=" => compare_numeric(tender_value, value)
                    .map(|o| o.is_le())
                    .unwrap_or(false),
                "contains" => match (tender_value.as_str(), value.as_str()) {
                    (Some(haystack), Some(needle)) => {
                        haystack.to_lowercase().contains(&needle.to_lowercase())
                    }
                    _ => false,
                },
                other => {
                    debug!("Unknown operator {} in condition", other);
                    false
                }
            }
        }
    }
}

/// A filter with no condition passes trivially (§8 boundary).
pub fn check_filter(filter: &Filter, tender_data: &Value) -> bool {
    let Some(raw) = filter.condition.as_deref().filter(|s| !s.is_empty()) else {
        debug!("Filter {} has no condition, passing", filter.id);
        return true;
    };

    match serde_json::from_str::<Condition>(raw) {
        Ok(condition) => evaluate_condition(&condition, tender_data),
        Err(e) => {
            tracing::error!("Invalid filter condition JSON for filter {}: {}", filter.id, e);
            false
        }
    }
}

/// Project the §4.E flat attribute map. `organizer.*` is accessible via
/// dotted path because `organizer` is serialized as a nested JSON object.
pub fn tender_to_flat_map(tender: &Tender) -> Value {
    serde_json::json!({
        "external_id": tender.external_id,
        "title": tender.title,
        "notification_number": tender.notification_number,
        "notification_type": tender.notification_type,
        "organizer": serde_json::to_value(&tender.organizer).unwrap_or(Value::Null),
        "initial_price": tender.initial_price.as_ref().map(|v| v.to_string()),
        "currency": tender.currency,
        "application_deadline": tender.application_deadline,
        "etp_code": tender.etp_code,
        "etp_name": tender.etp_name,
        "etp_url": tender.etp_url,
        "kontur_link": tender.kontur_link,
        "publication_date": tender.publication_date,
        "last_modified": tender.last_modified,
        "selection_method": tender.selection_method,
        "smp": tender.smp,
        "type": tender.r#type,
        "state": tender.state,
    })
}

/// §4.E semantics: passes iff at least one active filter (already filtered
/// by type and ordered by priority by the caller) evaluates true,
/// short-circuiting on first success. No active filters => pass.
pub fn apply_filters(tender: &Tender, active_filters: &[Filter]) -> bool {
    if active_filters.is_empty() {
        debug!(
            "No active filters found for tender {}, passing to next stage",
            tender.external_id
        );
        return true;
    }

    let tender_data = tender_to_flat_map(tender);
    for filter in active_filters {
        if check_filter(filter, &tender_data) {
            debug!("Tender {} passed filter {}", tender.external_id, filter.id);
            return true;
        }
    }
    debug!("Tender {} did not pass any filters", tender.external_id);
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Organizer;
    use chrono::Utc;

    fn tender() -> Tender {
        Tender {
            external_id: "IS1".to_string(),
            title: "Supply of office chairs".to_string(),
            notification_number: Some("N1".to_string()),
            notification_type: None,
            organizer: Organizer {
                full_name: Some("ООО Ромашка".to_string()),
                inn: Some("1234567890".to_string()),
                ..Default::default()
            },
            initial_price: None,
            currency: Some("RUB".to_string()),
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
            state: "FILTERING".to_string(),
            created_at: Utc::now(),
            lots: vec![],
            docs: vec![],
        }
    }

    fn filter_with_condition(id: i32, condition: &str) -> Filter {
        Filter {
            id,
            title: "f".to_string(),
            description: None,
            r#type: "goods".to_string(),
            priority: 1,
            active: true,
            parent_id: None,
            calculation: "any".to_string(),
            success_action: None,
            condition: Some(condition.to_string()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn no_active_filters_passes() {
        assert!(apply_filters(&tender(), &[]));
    }

    #[test]
    fn filter_with_no_condition_passes_trivially() {
        let mut f = filter_with_condition(1, "");
        f.condition = None;
        assert!(apply_filters(&tender(), &[f]));
    }

    #[test]
    fn contains_matches_case_insensitive() {
        let f = filter_with_condition(
            1,
            r#"{"field": "title", "op": "contains", "value": "CHAIRS"}"#,
        );
        assert!(apply_filters(&tender(), &[f]));
    }

    #[test]
    fn missing_field_is_false() {
        let f = filter_with_condition(
            1,
            r#"{"field": "does.not.exist", "op": "=", "value": "x"}"#,
        );
        assert!(!apply_filters(&tender(), &[f]));
    }

    #[test]
    fn and_requires_all_subconditions() {
        let f = filter_with_condition(
            1,
            r#"{"AND": [
                {"field": "currency", "op": "=", "value": "RUB"},
                {"field": "title", "op": "contains", "value": "nonexistent"}
            ]}"#,
        );
        assert!(!apply_filters(&tender(), &[f]));
    }

    #[test]
    fn or_matches_on_first_true() {
        let f = filter_with_condition(
            1,
            r#"{"OR": [
                {"field": "currency", "op": "=", "value": "USD"},
                {"field": "currency", "op": "=", "value": "RUB"}
            ]}"#,
        );
        assert!(apply_filters(&tender(), &[f]));
    }

    #[test]
    fn nested_organizer_field_is_reachable() {
        let f = filter_with_condition(
            1,
            r#"{"field": "organizer.inn", "op": "=", "value": "1234567890"}"#,
        );
        assert!(apply_filters(&tender(), &[f]));
    }

    #[test]
    fn all_filters_false_rejects() {
        let f = filter_with_condition(
            1,
            r#"{"field": "currency", "op": "=", "value": "USD"}"#,
        );
        assert!(!apply_filters(&tender(), &[f]));
    }
}
