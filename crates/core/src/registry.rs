//! Declarative parameter table: human-facing name → where to write it.
//!
//! The table is built once and only read afterwards. Supporting a new
//! template means adding entries here (or loading them from JSON), never
//! touching the binder.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::graph::{Graph, InputValue, Node, NodeId};
use crate::operation::OperationType;
use crate::path::ParamPath;

// ---------------------------------------------------------------------------
// Parameter names
// ---------------------------------------------------------------------------

pub const PARAM_PROMPT: &str = "prompt";
pub const PARAM_NEGATIVE_PROMPT: &str = "negative_prompt";
pub const PARAM_STEPS: &str = "steps";
pub const PARAM_SEED: &str = "seed";
pub const PARAM_CFG: &str = "cfg";
pub const PARAM_SAMPLER_NAME: &str = "sampler_name";
pub const PARAM_SCHEDULER: &str = "scheduler";
pub const PARAM_DENOISE: &str = "denoise";
pub const PARAM_WIDTH: &str = "width";
pub const PARAM_HEIGHT: &str = "height";
pub const PARAM_BATCH_SIZE: &str = "batch_size";
pub const PARAM_FILENAME_PREFIX: &str = "filename_prefix";
pub const PARAM_IMAGE: &str = "image";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Literal type a parameter is written as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Integer,
    Float,
    Text,
    Boolean,
    /// An integer that may be requested as random (`-1` or `"random"`).
    Seed,
}

impl ValueKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Integer => "an integer",
            Self::Float => "a number",
            Self::Text => "text",
            Self::Boolean => "a boolean",
            Self::Seed => "a seed",
        }
    }
}

/// Disambiguates between several nodes of the same operation type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    /// Some node references this one through the named input
    /// (`positive` / `negative` on a sampler).
    ConsumedVia(String),
    /// The node has the named input.
    HasInput(String),
    /// The node does not have the named input.
    LacksInput(String),
    /// `_meta.title` contains the text, case-insensitively.
    TitleContains(String),
}

impl Selector {
    pub fn matches(&self, graph: &Graph, id: &NodeId, node: &Node) -> bool {
        match self {
            Self::ConsumedVia(input) => graph.nodes().any(|(_, consumer)| {
                matches!(consumer.input(input), Some(InputValue::Reference(r)) if &r.producer == id)
            }),
            Self::HasInput(name) => node.inputs.contains_key(name),
            Self::LacksInput(name) => !node.inputs.contains_key(name),
            Self::TitleContains(text) => node
                .title()
                .is_some_and(|t| t.to_lowercase().contains(&text.to_lowercase())),
        }
    }
}

/// Where one parameter lands for one operation type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub value_kind: ValueKind,
    pub target: OperationType,
    pub primary: ParamPath,
    #[serde(default)]
    pub fallback: Option<ParamPath>,
    #[serde(default)]
    pub selector: Option<Selector>,
}

impl ParameterSpec {
    /// `inputs.<input>` on every node of `target`.
    pub fn input(name: &str, value_kind: ValueKind, target: OperationType, input: &str) -> Self {
        Self {
            name: name.to_string(),
            value_kind,
            target,
            primary: ParamPath::input(input),
            fallback: None,
            selector: None,
        }
    }

    pub fn with_fallback(mut self, fallback: ParamPath) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Whether `node` is a write target for this spec.
    pub fn applies_to(&self, graph: &Graph, id: &NodeId, node: &Node) -> bool {
        node.operation == self.target
            && self
                .selector
                .as_ref()
                .map_or(true, |s| s.matches(graph, id, node))
    }
}

/// An immutable table of [`ParameterSpec`]s. A name may have several
/// entries, one per target operation type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterRegistry {
    specs: Vec<ParameterSpec>,
}

static STANDARD: LazyLock<ParameterRegistry> = LazyLock::new(ParameterRegistry::build_standard);

impl ParameterRegistry {
    pub fn new(specs: Vec<ParameterSpec>) -> Self {
        Self { specs }
    }

    /// The table for the stock ComfyUI node set.
    pub fn standard() -> &'static ParameterRegistry {
        &STANDARD
    }

    /// Load a table from a JSON array of specs.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, CoreError> {
        serde_json::from_value(json.clone())
            .map_err(|e| CoreError::Validation(format!("Invalid parameter table: {e}")))
    }

    /// A new table with `extra` entries appended.
    pub fn extended(&self, extra: impl IntoIterator<Item = ParameterSpec>) -> Self {
        let mut specs = self.specs.clone();
        specs.extend(extra);
        Self { specs }
    }

    pub fn specs_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ParameterSpec> + 'a {
        self.specs.iter().filter(move |s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.iter().any(|s| s.name == name)
    }

    pub fn kind_of(&self, name: &str) -> Option<ValueKind> {
        self.specs_for(name).next().map(|s| s.value_kind)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    fn build_standard() -> Self {
        use OperationType as Op;
        use ValueKind as K;

        let positive = || Selector::ConsumedVia("positive".to_string());
        let negative = || Selector::ConsumedVia("negative".to_string());

        let mut specs = vec![
            ParameterSpec::input(PARAM_PROMPT, K::Text, Op::ClipTextEncode, "text")
                .with_selector(positive()),
            ParameterSpec::input(PARAM_PROMPT, K::Text, Op::ClipTextEncodeSdxl, "text_g")
                .with_fallback(ParamPath::input("text"))
                .with_selector(positive()),
            ParameterSpec::input(PARAM_NEGATIVE_PROMPT, K::Text, Op::ClipTextEncode, "text")
                .with_selector(negative()),
            ParameterSpec::input(PARAM_NEGATIVE_PROMPT, K::Text, Op::ClipTextEncodeSdxl, "text_g")
                .with_fallback(ParamPath::input("text"))
                .with_selector(negative()),
            ParameterSpec::input(PARAM_SEED, K::Seed, Op::KSampler, "seed")
                .with_fallback(ParamPath::input("noise_seed")),
            ParameterSpec::input(PARAM_SEED, K::Seed, Op::KSamplerAdvanced, "noise_seed")
                .with_fallback(ParamPath::input("seed")),
        ];

        for sampler in [Op::KSampler, Op::KSamplerAdvanced] {
            specs.push(ParameterSpec::input(PARAM_STEPS, K::Integer, sampler.clone(), "steps"));
            specs.push(ParameterSpec::input(PARAM_CFG, K::Float, sampler.clone(), "cfg"));
            specs.push(ParameterSpec::input(
                PARAM_SAMPLER_NAME,
                K::Text,
                sampler.clone(),
                "sampler_name",
            ));
            specs.push(ParameterSpec::input(PARAM_SCHEDULER, K::Text, sampler, "scheduler"));
        }
        specs.push(ParameterSpec::input(PARAM_DENOISE, K::Float, Op::KSampler, "denoise"));

        for dim in [PARAM_WIDTH, PARAM_HEIGHT, PARAM_BATCH_SIZE] {
            specs.push(ParameterSpec::input(dim, K::Integer, Op::EmptyLatentImage, dim));
        }
        specs.push(ParameterSpec::input(
            PARAM_FILENAME_PREFIX,
            K::Text,
            Op::SaveImage,
            "filename_prefix",
        ));
        specs.push(ParameterSpec::input(PARAM_IMAGE, K::Text, Op::LoadImage, "image"));

        Self { specs }
    }
}
