//! Built-in pipeline catalog.
//!
//! Each category is an embedded TOML file registered by its own routine, so
//! a category that fails to compile (for example because the configured
//! capability catalog lacks one of its members) is skipped on its own while
//! the others still register.
//!
//! | Routine        | Category           | Pipelines |
//! |----------------|--------------------|-----------|
//! | initiative     | Strategic Planning | 6         |
//! | goals          | Strategic Planning | 4         |
//! | sales          | Sales              | 7         |
//! | marketing      | Marketing          | 10        |
//! | hr             | HR                 | 4         |
//! | compliance     | Compliance         | 4         |
//! | product        | Product            | 5         |
//! | documentation  | Operations         | 5         |
//! | evaluation     | Evaluation         | 6         |
//! | knowledge      | Knowledge          | 4         |
//! | financial      | Financial          | 6         |

use ensemble_pipeline::{
    CategoryRegistrar, DefinitionCategory, DefinitionCompiler, RegistryEntry, Result,
};

/// Embedded category sources, in registration order.
pub const BUILTIN_CATEGORIES: &[(&str, &str)] = &[
    ("initiative", include_str!("../workflows/initiative.toml")),
    ("sales", include_str!("../workflows/sales.toml")),
    ("marketing", include_str!("../workflows/marketing.toml")),
    ("hr", include_str!("../workflows/hr.toml")),
    ("compliance", include_str!("../workflows/compliance.toml")),
    ("product", include_str!("../workflows/product.toml")),
    ("documentation", include_str!("../workflows/documentation.toml")),
    ("goals", include_str!("../workflows/goals.toml")),
    ("evaluation", include_str!("../workflows/evaluation.toml")),
    ("knowledge", include_str!("../workflows/knowledge.toml")),
    ("financial", include_str!("../workflows/financial.toml")),
];

/// Registration routine for one embedded category file.
///
/// The file is parsed when the routine runs, so parse errors surface as a
/// failed category rather than a failed startup.
#[derive(Debug, Clone)]
pub struct BuiltinCategory {
    routine: &'static str,
    source: &'static str,
    compiler: DefinitionCompiler,
}

impl BuiltinCategory {
    pub fn new(routine: &'static str, source: &'static str, compiler: DefinitionCompiler) -> Self {
        Self {
            routine,
            source,
            compiler,
        }
    }
}

impl CategoryRegistrar for BuiltinCategory {
    fn category(&self) -> &str {
        self.routine
    }

    fn entries(&self) -> Result<Vec<RegistryEntry>> {
        DefinitionCategory::from_toml(self.source, self.compiler.clone())?.entries()
    }
}

/// All built-in registration routines.
pub fn builtin_registrars(compiler: &DefinitionCompiler) -> Vec<Box<dyn CategoryRegistrar>> {
    BUILTIN_CATEGORIES
        .iter()
        .map(|&(routine, source)| {
            Box::new(BuiltinCategory::new(routine, source, compiler.clone()))
                as Box<dyn CategoryRegistrar>
        })
        .collect()
}
