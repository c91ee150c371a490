//! Entity-specific prompt text for cohort assignment.

use crate::entity::EntityType;
use crate::schema::Record;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a data integration expert specializing in NetSuite implementations.";

/// Build the user prompt for one record, embedding its serialized fields.
pub fn cohort_prompt(entity_type: EntityType, record: &Record) -> String {
    let data = serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string());
    let (noun, criteria) = match entity_type {
        EntityType::Customers => ("customer", "account size, product type, or logical grouping"),
        EntityType::Transactions => ("transaction", "transaction size, frequency, or type"),
        EntityType::Subscriptions => ("subscription", "plan type, billing frequency, or subscription value"),
        EntityType::Plans => ("plan", "pricing tier, features, or target market"),
    };
    format!(
        "Analyze the following {noun} data and assign it to a cohort based on {criteria}: {data}. Return a cohort name."
    )
}
