//! Pipeline composition and execution for Ensemble.
//!
//! Capability units are assembled into pipelines (sequential chains,
//! parallel fan-outs and bounded loops), registered under catalog names and
//! run by the [`ExecutionEngine`], which streams ordered events back.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────┐   fresh units   ┌──────────────────┐
//! │ CapabilityCatalog │ ──────────────▶ │ PipelineBuilder  │── ownership
//! └───────────────────┘                 └────────┬─────────┘   assigned
//!           ▲                                    │ Pipeline     atomically
//!           │ DefinitionCompiler                 ▼
//! ┌───────────────────┐  factory()     ┌──────────────────┐   UnitInvoker
//! │ PipelineRegistry  │ ─────────────▶ │ ExecutionEngine  │ ─────────────▶
//! └───────────────────┘                └──────────────────┘   event stream
//! ```

pub mod catalog;
pub mod definition;
pub mod engine;
pub mod error;
pub mod execution;
pub mod invoker;
pub mod pipeline;
pub mod registry;
pub mod unit;

pub use catalog::{CapabilityCatalog, UnitConstructor, default_constructor};
pub use definition::{DefinitionCategory, DefinitionCompiler};
pub use engine::ExecutionEngine;
pub use error::{PipelineError, Result};
pub use execution::{EventStream, Execution, RunOutcome};
pub use invoker::{DryRunInvoker, SharedUnitInvoker, UnitEventStream, UnitInput, UnitInvoker};
pub use pipeline::{
    Composition, ExitPredicate, IterationView, Member, Pipeline, PipelineBuilder,
};
pub use registry::{
    BootstrapReport, CategoryRegistrar, FnRegistrar, PipelineFactory, PipelineMetadata,
    PipelineRegistry, RegistryEntry, StatusReport,
};
pub use unit::CapabilityUnit;
