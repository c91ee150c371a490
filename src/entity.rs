//! Entity catalogue: the kinds of billing data a run can migrate.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;

use crate::schema::{FieldType, Record, TargetSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Customers,
    Transactions,
    Subscriptions,
    Plans,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported entity type: {tag}. Supported types: customers, transactions, subscriptions, plans")]
pub struct UnsupportedEntityType {
    pub tag: String,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        EntityType::Customers,
        EntityType::Transactions,
        EntityType::Subscriptions,
        EntityType::Plans,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Customers => "customers",
            EntityType::Transactions => "transactions",
            EntityType::Subscriptions => "subscriptions",
            EntityType::Plans => "plans",
        }
    }

    /// Schema the destination expects when the caller has no custom one.
    pub fn default_schema(self) -> TargetSchema {
        use FieldType::{Number, String};
        match self {
            EntityType::Customers => TargetSchema::from_pairs(&[
                ("entityid", String),
                ("email", String),
                ("currency", String),
                ("balance", Number),
                ("cohort", String),
            ]),
            EntityType::Transactions => TargetSchema::from_pairs(&[
                ("id", String),
                ("amount", Number),
                ("status", String),
                ("type", String),
                ("date", String),
                ("customerId", String),
                ("cohort", String),
            ]),
            EntityType::Subscriptions => TargetSchema::from_pairs(&[
                ("id", String),
                ("planId", String),
                ("status", String),
                ("price", Number),
                ("billingPeriod", String),
                ("customerId", String),
                ("cohort", String),
            ]),
            EntityType::Plans => TargetSchema::from_pairs(&[
                ("id", String),
                ("name", String),
                ("price", Number),
                ("billingFrequency", String),
                ("currency", String),
                ("cohort", String),
            ]),
        }
    }

    /// Path appended to the destination base URL for this entity.
    pub fn destination_path(self) -> &'static str {
        match self {
            EntityType::Customers => "/customers",
            EntityType::Transactions => "/transactions",
            EntityType::Subscriptions => "/subscriptions",
            EntityType::Plans => "/plans",
        }
    }

    /// Guess the entity type from a record's shape.
    ///
    /// Precedence: email → customers, amount+type → transactions,
    /// planId → subscriptions, billingFrequency → plans.
    pub fn infer(record: &Record) -> Option<EntityType> {
        let present = |field: &str| record.get(field).is_some_and(is_truthy);

        if present("email") {
            Some(EntityType::Customers)
        } else if present("amount") && present("type") {
            Some(EntityType::Transactions)
        } else if present("planId") {
            Some(EntityType::Subscriptions)
        } else if present("billingFrequency") {
            Some(EntityType::Plans)
        } else {
            None
        }
    }
}

/// Loose presence check used for shape inference: null, false, 0 and "" count as absent.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = UnsupportedEntityType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase();
        EntityType::ALL
            .into_iter()
            .find(|entity| entity.as_str() == tag)
            .ok_or(UnsupportedEntityType { tag: s.to_string() })
    }
}
