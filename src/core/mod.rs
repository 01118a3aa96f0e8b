//! Core module - storage, traceability components and configuration

pub mod access;
pub mod catalog;
pub mod config;
pub mod error;
pub mod ledger;
pub mod project;
pub mod quality;
pub mod registrar;
pub mod resolver;
pub mod serialize;
pub mod store;
pub mod tracker;

pub use access::{AccessConfig, AccessPolicy, Caller, Operation, UserDirectory};
pub use catalog::{StatusChange, StoreCatalog, UnitCatalog, UnitFilter};
pub use config::Config;
pub use error::{RecordKind, TraceError};
pub use ledger::ProductionLedger;
pub use project::{Project, ProjectError};
pub use quality::{QualityGate, QualitySummary, RecordedDecision};
pub use registrar::IdentityRegistrar;
pub use resolver::{Trace, TraceabilityResolver};
pub use store::Store;
pub use tracker::{StatusUpdate, Tracker};
