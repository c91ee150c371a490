//! External collaborator abstractions
//!
//! The source ledger, the cohort (classification) service and the destination
//! ERP are reached only through the traits in this module, so the pipeline can
//! be driven by real clients or by test doubles through dependency injection.

pub mod source;
pub mod cohort;
pub mod destination;

pub use source::{FetchError, JsonFixtureSource, SourceLedger};
pub use cohort::{ClassificationError, CohortRequest, CohortService, FixedCohortService};
pub use destination::{
    DestinationConfig, DestinationWriter, DryRunDestination, WriteError, WriteOutcome,
    WriteSweepError,
};
