//! Per-entity extraction rules.
//!
//! Each entity type owns one static [`RuleSet`]; `rule_set` is an exhaustive
//! match so adding an entity type without rules fails to compile.

use serde_json::Value;

use crate::entity::{is_truthy, EntityType};
use crate::schema::Record;

/// How a target field is pulled out of an enriched record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction {
    /// Copy a source field as-is.
    Field(&'static str),
    /// Copy a source field, substituting a literal when it is empty.
    FieldOr(&'static str, &'static str),
}

impl Extraction {
    pub fn apply(self, record: &Record) -> Option<Value> {
        match self {
            Extraction::Field(source) => record.get(source).cloned(),
            Extraction::FieldOr(source, default) => Some(
                record
                    .get(source)
                    .filter(|value| is_truthy(value))
                    .cloned()
                    .unwrap_or_else(|| Value::String(default.to_string())),
            ),
        }
    }
}

#[derive(Debug)]
pub struct RuleSet {
    pub entity_type: EntityType,
    /// Target field holding the approval key.
    pub id_field: &'static str,
    rules: &'static [(&'static str, Extraction)],
}

impl RuleSet {
    /// Rule for a target field, if this entity type defines one.
    pub fn extraction(&self, target_field: &str) -> Option<Extraction> {
        self.rules
            .iter()
            .find(|(field, _)| *field == target_field)
            .map(|(_, extraction)| *extraction)
    }

    pub fn target_fields(&self) -> impl Iterator<Item = &'static str> {
        self.rules.iter().map(|(field, _)| *field)
    }
}

use Extraction::{Field, FieldOr};

static CUSTOMER_RULES: RuleSet = RuleSet {
    entity_type: EntityType::Customers,
    id_field: "entityid",
    rules: &[
        ("entityid", Field("id")),
        ("email", Field("email")),
        ("currency", FieldOr("currency", "USD")),
        ("balance", Field("balance")),
        ("cohort", Field("cohort")),
    ],
};

static TRANSACTION_RULES: RuleSet = RuleSet {
    entity_type: EntityType::Transactions,
    id_field: "id",
    rules: &[
        ("id", Field("id")),
        ("amount", Field("amount")),
        ("status", Field("status")),
        ("type", Field("type")),
        ("date", Field("createdAt")),
        ("customerId", Field("customerId")),
        ("cohort", Field("cohort")),
    ],
};

static SUBSCRIPTION_RULES: RuleSet = RuleSet {
    entity_type: EntityType::Subscriptions,
    id_field: "id",
    rules: &[
        ("id", Field("id")),
        ("planId", Field("planId")),
        ("status", Field("status")),
        ("price", Field("price")),
        ("billingPeriod", Field("billingPeriod")),
        ("customerId", Field("customerId")),
        ("cohort", Field("cohort")),
    ],
};

static PLAN_RULES: RuleSet = RuleSet {
    entity_type: EntityType::Plans,
    id_field: "id",
    rules: &[
        ("id", Field("id")),
        ("name", Field("name")),
        ("price", Field("price")),
        ("billingFrequency", Field("billingFrequency")),
        ("currency", FieldOr("currency", "USD")),
        ("cohort", Field("cohort")),
    ],
};

pub fn rule_set(entity_type: EntityType) -> &'static RuleSet {
    match entity_type {
        EntityType::Customers => &CUSTOMER_RULES,
        EntityType::Transactions => &TRANSACTION_RULES,
        EntityType::Subscriptions => &SUBSCRIPTION_RULES,
        EntityType::Plans => &PLAN_RULES,
    }
}
