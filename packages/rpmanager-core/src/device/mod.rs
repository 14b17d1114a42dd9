//! Device HTTP API: wire types, the probe request primitive, and input
//! coercion for function calls.

pub mod inputs;
mod probe;

pub use inputs::{coerce_inputs, InputKind};
pub use probe::{Probe, ProbeOutcome, ProbeRequest, API_KEY_HEADER};

use serde::{Deserialize, Serialize};

/// Body of `GET /discover`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
}

/// One declared parameter of a device function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionInput {
    pub name: String,
    /// Primitive type tag as the device reports it ("string", "number", ...)
    #[serde(rename = "type", default = "default_input_type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

fn default_input_type() -> String {
    "string".to_string()
}

/// A function descriptor served by the device itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceFunction {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inputs: Vec<FunctionInput>,
}

/// Body of `GET /functions`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FunctionCatalog {
    #[serde(default)]
    pub functions: Vec<DeviceFunction>,
    #[serde(default)]
    pub count: usize,
}

impl FunctionCatalog {
    pub fn find(&self, function_id: &str) -> Option<&DeviceFunction> {
        self.functions.iter().find(|f| f.id == function_id)
    }
}
