//! Domain facade for Ensemble.
//!
//! Wires the capability catalog, the pipeline registry, the execution engine
//! and the dynamic dispatcher together by explicit construction. There is no
//! global state: one [`DomainServices`] is built at process start and handed
//! to whatever transport layer needs it.
//!
//! - **Pipeline service**: build, register, list and run catalog pipelines
//! - **Dynamic dispatcher**: classify free text, build an ad hoc pipeline, run it
//!
//! # Example
//!
//! ```ignore
//! use ensemble_domain::DomainServices;
//!
//! let services = DomainServices::from_config(&config, Arc::new(DryRunInvoker))?;
//! let outcome = services
//!     .dispatcher()
//!     .run_dynamic("compare pricing options", SessionState::new("s1"))
//!     .finish()
//!     .await;
//! ```

mod error;
pub mod intent;
pub mod services;

pub use error::{DomainError, Result};
pub use intent::{Classification, IntentTable};
pub use services::{DomainConfig, DomainServices};
pub use services::dispatch::{DISPATCH_STATE_KEY, DynamicDispatcher};
pub use services::pipelines::{CUSTOM_CATEGORY, PipelineService};

// Re-export key types from infrastructure crates for convenience
pub use ensemble_pipeline::{
    DryRunInvoker, Execution, PipelineMetadata, RunOutcome, SharedUnitInvoker, StatusReport,
    UnitInvoker,
};
pub use ensemble_types::{CompositionKind, ExecutionEvent, SessionState};
