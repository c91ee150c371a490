//! Field Mapper
//!
//! Shapes classified records into a destination [`TargetSchema`]. Pure: no
//! external calls and no shared state. A field that cannot be extracted or
//! coerced is zeroed and reported; it never drops the record or fails the batch.

pub mod coerce;
pub mod rules;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::classify::EnrichedRecord;
use crate::entity::EntityType;
use crate::isolate::{isolate, FailureScope, IsolatedFailure};
use crate::schema::{
    display_identifier, identifier_from_value, record_identifier, Record, TargetSchema,
    TransformedRecord,
};

pub use coerce::{coerce, parse_float_prefix, MappingFieldError};
pub use rules::{rule_set, Extraction, RuleSet};

/// A source record paired with its destination-shaped form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub original: Record,
    pub transformed: TransformedRecord,
}

impl WorkItem {
    /// Approval key.
    pub fn id(&self) -> &str {
        &self.transformed.id
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("Unable to determine entity type from record structure")]
    UnknownEntityType,
}

#[derive(Debug, Clone)]
pub struct MappingReport {
    pub entity_type: Option<EntityType>,
    pub items: Vec<WorkItem>,
    /// Fields that were zeroed because their value could not be coerced.
    pub failures: Vec<IsolatedFailure>,
}

/// Map every enriched record onto `schema`, one output per input, same order.
///
/// When `entity_type` is `None` it is inferred from the first record's shape;
/// failing that the whole mapping is refused, since no rule set can be chosen.
pub fn map_work_items(
    records: &[EnrichedRecord],
    schema: &TargetSchema,
    entity_type: Option<EntityType>,
) -> Result<MappingReport, MappingError> {
    let Some(first) = records.first() else {
        return Ok(MappingReport {
            entity_type,
            items: Vec::new(),
            failures: Vec::new(),
        });
    };

    let entity_type = match entity_type {
        Some(entity_type) => entity_type,
        None => EntityType::infer(&first.enriched).ok_or(MappingError::UnknownEntityType)?,
    };
    let rules = rule_set(entity_type);

    let mut failures = Vec::new();
    let items = records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let (item, mut record_failures) = map_record(record, schema, rules, index);
            failures.append(&mut record_failures);
            item
        })
        .collect();

    Ok(MappingReport {
        entity_type: Some(entity_type),
        items,
        failures,
    })
}

fn map_record(
    record: &EnrichedRecord,
    schema: &TargetSchema,
    rules: &RuleSet,
    index: usize,
) -> (WorkItem, Vec<IsolatedFailure>) {
    let label = display_identifier(&record.original);
    let mut fields = Record::new();
    let mut failures = Vec::new();

    for (field, field_type) in schema.fields() {
        let raw = match rules.extraction(field) {
            Some(extraction) => extraction.apply(&record.enriched),
            None => record.enriched.get(field).cloned(),
        };
        if matches!(raw, None | Some(Value::Null)) {
            debug!(record = %label, field = field, "Field absent; using zero value");
        }

        let (value, failure) = isolate(
            FailureScope::Field,
            format!("{label}.{field}"),
            coerce(field, field_type, raw),
            || field_type.zero_value(),
        )
        .into_parts();
        failures.extend(failure);
        fields.insert(field.to_string(), value);
    }

    let id = fields
        .get(rules.id_field)
        .and_then(identifier_from_value)
        .or_else(|| record_identifier(&record.original))
        .unwrap_or_else(|| format!("#{index}"));

    let item = WorkItem {
        original: record.original.clone(),
        transformed: TransformedRecord { id, fields },
    };
    (item, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use serde_json::json;

    fn enriched(value: Value, cohort: &str) -> EnrichedRecord {
        let original = value.as_object().cloned().unwrap();
        EnrichedRecord::new(original, cohort)
    }

    #[test]
    fn maps_plans_with_defaults_for_missing_fields() {
        let records = vec![
            enriched(json!({"id": "p1", "billingFrequency": "monthly"}), "standard"),
            enriched(json!({"id": "p2", "billingFrequency": "annual", "price": "99.00"}), "unclassified"),
        ];

        let report = map_work_items(&records, &EntityType::Plans.default_schema(), Some(EntityType::Plans)).unwrap();

        assert_eq!(report.items.len(), 2);
        assert!(report.failures.is_empty());
        let p1 = &report.items[0].transformed;
        assert_eq!(p1.id, "p1");
        assert_eq!(p1.get("name"), Some(&json!("")));
        assert_eq!(p1.get("price").and_then(Value::as_f64), Some(0.0));
        assert_eq!(p1.get("currency"), Some(&json!("USD")));
        assert_eq!(p1.get("cohort"), Some(&json!("standard")));
        assert_eq!(report.items[1].transformed.get("price").and_then(Value::as_f64), Some(99.0));
    }

    #[test]
    fn output_follows_schema_declaration_order() {
        let schema = TargetSchema::from_pairs(&[("cohort", FieldType::String), ("id", FieldType::String)]);
        let records = vec![enriched(json!({"id": "t1", "amount": "5", "type": "sale"}), "small")];

        let report = map_work_items(&records, &schema, None).unwrap();

        let keys: Vec<&String> = report.items[0].transformed.fields.keys().collect();
        assert_eq!(keys, vec!["cohort", "id"]);
        assert_eq!(report.entity_type, Some(EntityType::Transactions));
    }

    #[test]
    fn unparsable_amount_is_zeroed_and_reported() {
        let schema = EntityType::Transactions.default_schema();
        let records = vec![
            enriched(json!({"id": "t1", "amount": "12.50", "type": "sale"}), "a"),
            enriched(json!({"id": "t2", "amount": "abc", "type": "sale"}), "a"),
        ];

        let report = map_work_items(&records, &schema, Some(EntityType::Transactions)).unwrap();

        assert_eq!(report.items[0].transformed.get("amount").and_then(Value::as_f64), Some(12.5));
        let zeroed = report.items[1].transformed.get("amount").unwrap();
        assert_eq!(zeroed.as_f64(), Some(0.0));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key, "t2.amount");
    }

    #[test]
    fn fields_without_rules_fall_back_to_direct_lookup() {
        let schema = EntityType::Plans
            .default_schema()
            .with_field("trialDays", FieldType::Number);
        let records = vec![enriched(json!({"id": "p1", "trialDays": "14"}), "x")];

        let report = map_work_items(&records, &schema, Some(EntityType::Plans)).unwrap();
        assert_eq!(report.items[0].transformed.get("trialDays").and_then(Value::as_f64), Some(14.0));
    }

    #[test]
    fn customers_are_keyed_by_entityid() {
        let records = vec![enriched(json!({"id": "c9", "email": "a@b.c", "balance": "10"}), "smb")];
        let report = map_work_items(&records, &EntityType::Customers.default_schema(), None).unwrap();
        assert_eq!(report.items[0].id(), "c9");
        assert_eq!(report.items[0].transformed.get("entityid"), Some(&json!("c9")));
    }

    #[test]
    fn records_without_identifiers_get_positional_keys() {
        let schema = TargetSchema::from_pairs(&[("name", FieldType::String)]);
        let records = vec![enriched(json!({"name": "basic", "billingFrequency": "monthly"}), "x")];
        let report = map_work_items(&records, &schema, Some(EntityType::Plans)).unwrap();
        assert_eq!(report.items[0].id(), "#0");
    }

    #[test]
    fn inference_failure_is_a_hard_stop() {
        let records = vec![enriched(json!({"id": "mystery"}), "x")];
        let result = map_work_items(&records, &EntityType::Plans.default_schema(), None);
        assert_eq!(result.unwrap_err(), MappingError::UnknownEntityType);
    }

    #[test]
    fn empty_input_needs_no_inference() {
        let report = map_work_items(&[], &EntityType::Plans.default_schema(), None).unwrap();
        assert!(report.items.is_empty());
        assert_eq!(report.entity_type, None);
    }
}
