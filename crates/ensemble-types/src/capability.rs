//! Capability descriptors.
//!
//! A descriptor is the externally supplied description of one specialist:
//! what it is called, the instruction text handed to the model layer and the
//! tools it may use. The engine never interprets the instruction or tools.

use serde::{Deserialize, Serialize};

/// Configuration of one capability, as loaded from the catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Stable identifier used by pipelines and the dispatcher (e.g. `financial`).
    pub id: String,
    /// Display name of the unit (e.g. `FinancialAnalysisAgent`).
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Instruction text passed through to the unit-execution layer.
    #[serde(default)]
    pub instruction: String,
    /// Tool references passed through to the unit-execution layer.
    #[serde(default)]
    pub tools: Vec<String>,
    /// State key the unit's final text is written to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
}

impl CapabilityDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            instruction: String::new(),
            tools: Vec::new(),
            output_key: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// The state key this capability's output is stored under.
    ///
    /// Defaults to `<id>_output` when not configured.
    pub fn output_key(&self) -> String {
        self.output_key
            .clone()
            .unwrap_or_else(|| format!("{}_output", self.id))
    }
}
