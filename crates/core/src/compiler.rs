//! Compile facade: template + request → executor-ready graph.
//!
//! Bind → Splice (when adapters were supplied) → Repair. Every stage works
//! on its own copy, so the template is never touched and concurrent
//! compiles of the same template are independent.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::binder::{bind, ParameterSet};
use crate::diagnostics::Diagnostic;
use crate::error::CoreError;
use crate::graph::Graph;
use crate::hashing::workflow_hash;
use crate::registry::{ParameterRegistry, PARAM_PROMPT, PARAM_SEED};
use crate::repair::repair;
use crate::schema::SchemaInfo;
use crate::splice::{splice, AdapterSpec, SpliceStrategy};

/// Seeds stay below 2^53 so they survive a round trip through an f64.
pub const MAX_SEED: u64 = 1 << 53;

const RANDOM_SEED_TEXT: &str = "random";

/// What the caller wants generated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompileRequest {
    #[serde(default)]
    pub parameters: ParameterSet,
    #[serde(default)]
    pub adapters: Vec<AdapterSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledWorkflow {
    #[serde(serialize_with = "serialize_graph")]
    pub graph: Graph,
    pub diagnostics: Vec<Diagnostic>,
    /// Parameters as actually bound (random seed resolved, activation
    /// text appended).
    pub resolved_parameters: ParameterSet,
    pub strategy: Option<SpliceStrategy>,
    pub applied_adapters: Vec<AdapterSpec>,
    /// SHA-256 of the submission payload.
    pub workflow_hash: String,
}

impl CompiledWorkflow {
    /// The JSON body for `POST /prompt`.
    pub fn payload(&self) -> Value {
        self.graph.to_json()
    }
}

fn serialize_graph<S: serde::Serializer>(graph: &Graph, serializer: S) -> Result<S::Ok, S::Error> {
    graph.to_json().serialize(serializer)
}

/// Compile with the thread-local RNG for seed resolution.
pub fn compile(
    template: &Graph,
    request: &CompileRequest,
    registry: &ParameterRegistry,
    schema: &SchemaInfo,
) -> Result<CompiledWorkflow, CoreError> {
    compile_with_rng(template, request, registry, schema, &mut rand::rng())
}

pub fn compile_with_rng<R: Rng>(
    template: &Graph,
    request: &CompileRequest,
    registry: &ParameterRegistry,
    schema: &SchemaInfo,
    rng: &mut R,
) -> Result<CompiledWorkflow, CoreError> {
    if template.is_empty() {
        return Err(CoreError::InvalidWorkflow("template has no nodes".to_string()));
    }

    let mut parameters = request.parameters.clone();
    resolve_seed(&mut parameters, rng);

    let bound = bind(template, &parameters, registry);
    let mut diagnostics = bound.diagnostics;

    let (mut spliced, strategy, applied_adapters) = if request.adapters.is_empty() {
        (bound.graph, None, Vec::new())
    } else {
        let outcome = splice(&bound.graph, &request.adapters, schema);
        diagnostics.extend(outcome.diagnostics);
        (outcome.graph, outcome.strategy, outcome.applied)
    };

    // Trigger words only for adapters that actually made it into the graph.
    if append_activation_text(&mut parameters, &applied_adapters) {
        let prompt: ParameterSet = parameters
            .get_key_value(PARAM_PROMPT)
            .map(|(name, value)| (name.clone(), value.clone()))
            .into_iter()
            .collect();
        let rebound = bind(&spliced, &prompt, registry);
        spliced = rebound.graph;
        for diagnostic in rebound.diagnostics {
            if !diagnostics.contains(&diagnostic) {
                diagnostics.push(diagnostic);
            }
        }
    }

    let repaired = repair(&spliced);
    diagnostics.extend(repaired.diagnostics);
    let graph = repaired.graph;

    // Repair only relinks to nodes that do not depend on the consumer.
    if let Some(node) = graph.find_cycle() {
        return Err(CoreError::Cycle(node));
    }

    let hash = workflow_hash(&graph.to_json());
    tracing::info!(
        nodes = graph.len(),
        diagnostics = diagnostics.len(),
        adapters = applied_adapters.len(),
        workflow_hash = %hash,
        "Workflow compiled",
    );

    Ok(CompiledWorkflow {
        graph,
        diagnostics,
        resolved_parameters: parameters,
        strategy,
        applied_adapters,
        workflow_hash: hash,
    })
}

/// Replace a `-1` or `"random"` seed with a concrete one.
fn resolve_seed<R: Rng>(parameters: &mut ParameterSet, rng: &mut R) {
    let Some(seed) = parameters.get_mut(PARAM_SEED) else {
        return;
    };
    if !wants_random_seed(seed) {
        return;
    }
    let resolved = rng.random_range(0..MAX_SEED);
    tracing::debug!(seed = resolved, "Random seed resolved");
    *seed = Value::from(resolved);
}

fn wants_random_seed(seed: &Value) -> bool {
    match seed {
        Value::Number(n) => n.as_i64() == Some(-1),
        Value::String(s) => {
            let s = s.trim();
            s == "-1" || s.eq_ignore_ascii_case(RANDOM_SEED_TEXT)
        }
        Value::Null => true,
        _ => false,
    }
}

/// Append each applied adapter's activation text to the prompt, in
/// application order, skipping text the prompt already contains. Returns
/// whether the prompt changed.
fn append_activation_text(parameters: &mut ParameterSet, adapters: &[AdapterSpec]) -> bool {
    let Some(Value::String(prompt)) = parameters.get_mut(PARAM_PROMPT) else {
        return false;
    };
    let original_len = prompt.len();

    let mut ordered: Vec<&AdapterSpec> = adapters.iter().filter(|a| a.is_applicable()).collect();
    ordered.sort_by_key(|a| a.order);

    for text in ordered
        .iter()
        .filter_map(|a| a.activation_text.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        if prompt.to_lowercase().contains(&text.to_lowercase()) {
            continue;
        }
        if prompt.trim().is_empty() {
            *prompt = text.to_string();
        } else {
            prompt.push_str(", ");
            prompt.push_str(text);
        }
    }
    prompt.len() != original_len
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{InputValue, NodeId, NodeRef};
    use crate::schema::NodeSchema;
    use assert_matches::assert_matches;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn template() -> Graph {
        Graph::from_str_json(include_str!("../templates/txt2img.json")).unwrap()
    }

    fn literal(graph: &Graph, id: &str, input: &str) -> Value {
        graph
            .get(&NodeId::from(id))
            .unwrap()
            .input(input)
            .and_then(InputValue::as_literal)
            .cloned()
            .unwrap()
    }

    fn request(parameters: Value, adapters: Vec<AdapterSpec>) -> CompileRequest {
        CompileRequest {
            parameters: serde_json::from_value(parameters).unwrap(),
            adapters,
        }
    }

    fn compile_txt2img(req: &CompileRequest, schema: &SchemaInfo) -> CompiledWorkflow {
        compile(&template(), req, ParameterRegistry::standard(), schema).unwrap()
    }

    fn chain_schema() -> SchemaInfo {
        SchemaInfo::default().with_node("LoraLoader", NodeSchema::default())
    }

    #[test]
    fn binds_without_adapters() {
        let req = request(json!({ "prompt": "a lighthouse", "steps": 30, "seed": 7 }), vec![]);
        let out = compile_txt2img(&req, &SchemaInfo::default());

        assert_eq!(literal(&out.graph, "6", "text"), json!("a lighthouse"));
        assert_eq!(literal(&out.graph, "3", "steps"), json!(30));
        assert_eq!(literal(&out.graph, "3", "seed"), json!(7));
        assert_eq!(out.strategy, None);
        assert!(out.diagnostics.is_empty());
        assert_eq!(out.workflow_hash, workflow_hash(&out.payload()));
    }

    #[test]
    fn random_seed_is_resolved_and_reported() {
        let req = request(json!({ "seed": -1 }), vec![]);
        let mut rng = StdRng::seed_from_u64(1);
        let schema = SchemaInfo::default();
        let registry = ParameterRegistry::standard();
        let out = compile_with_rng(&template(), &req, registry, &schema, &mut rng).unwrap();

        let seed = out.resolved_parameters["seed"].as_u64().unwrap();
        assert!(seed < MAX_SEED);
        assert_eq!(literal(&out.graph, "3", "seed"), json!(seed));
    }

    #[test]
    fn random_seed_text_is_accepted() {
        assert!(wants_random_seed(&json!("Random")));
        assert!(wants_random_seed(&json!("-1")));
        assert!(!wants_random_seed(&json!(42)));
    }

    #[test]
    fn adapters_are_spliced_and_trigger_words_appended() {
        let mut adapter = AdapterSpec::new("detail.safetensors", 0.6, 0.6, 0);
        adapter.activation_text = Some("sharp focus".into());
        let req = request(json!({ "prompt": "a lighthouse" }), vec![adapter]);

        let out = compile_txt2img(&req, &chain_schema());

        assert_eq!(out.strategy, Some(SpliceStrategy::Chained));
        assert_eq!(literal(&out.graph, "6", "text"), json!("a lighthouse, sharp focus"));
        assert_eq!(out.resolved_parameters["prompt"], json!("a lighthouse, sharp focus"));
        let sampler_model = out
            .graph
            .get(&NodeId::from("3"))
            .unwrap()
            .input("model")
            .and_then(InputValue::as_reference)
            .cloned();
        assert_eq!(sampler_model, Some(NodeRef::new("10", 0)));
        assert!(out.graph.dangling_references().is_empty());
    }

    #[test]
    fn activation_text_already_present_is_not_repeated() {
        let mut params: ParameterSet =
            serde_json::from_value(json!({ "prompt": "Sharp Focus, a fox" })).unwrap();
        let mut adapter = AdapterSpec::new("a.safetensors", 1.0, 1.0, 0);
        adapter.activation_text = Some("sharp focus".into());
        append_activation_text(&mut params, &[adapter]);
        assert_eq!(params["prompt"], json!("Sharp Focus, a fox"));
    }

    #[test]
    fn unapplied_adapters_leave_the_prompt_alone() {
        let mut adapter = AdapterSpec::new("detail.safetensors", 1.0, 1.0, 0);
        adapter.activation_text = Some("intricate".into());
        let req = request(json!({ "prompt": "a fox" }), vec![adapter]);

        let out = compile_txt2img(&req, &SchemaInfo::default());

        assert!(out.applied_adapters.is_empty());
        assert_eq!(literal(&out.graph, "6", "text"), json!("a fox"));
        assert_eq!(out.resolved_parameters["prompt"], json!("a fox"));
    }

    #[test]
    fn skipped_files_contribute_no_trigger_words() {
        let loader = NodeSchema {
            choices: [("lora_name".to_string(), vec!["known.safetensors".to_string()])].into(),
            ..Default::default()
        };
        let schema = SchemaInfo::default().with_node("LoraLoader", loader);
        let mut known = AdapterSpec::new("known.safetensors", 1.0, 1.0, 0);
        known.activation_text = Some("sharp".into());
        let mut gone = AdapterSpec::new("gone.safetensors", 1.0, 1.0, 1);
        gone.activation_text = Some("blurry".into());
        let req = request(json!({ "prompt": "a fox" }), vec![known, gone]);

        let out = compile_txt2img(&req, &schema);

        assert_eq!(out.applied_adapters.len(), 1);
        assert_eq!(literal(&out.graph, "6", "text"), json!("a fox, sharp"));
        assert_eq!(out.resolved_parameters["prompt"], json!("a fox, sharp"));
    }

    #[test]
    fn truncated_adapters_contribute_no_trigger_words() {
        let stack = NodeSchema {
            required: vec!["lora_name_1".to_string()],
            ..Default::default()
        };
        let schema = SchemaInfo::default()
            .with_node("CR LoRA Stack", stack)
            .with_node("CR Apply LoRA Stack", NodeSchema::default());
        let adapters: Vec<AdapterSpec> = ["first", "second"]
            .iter()
            .enumerate()
            .map(|(i, word)| {
                let file = format!("{word}.safetensors");
                let mut adapter = AdapterSpec::new(&file, 1.0, 1.0, i as i32);
                adapter.activation_text = Some(word.to_string());
                adapter
            })
            .collect();
        let req = request(json!({ "prompt": "a fox" }), adapters);

        let out = compile_txt2img(&req, &schema);

        assert_eq!(out.strategy, Some(SpliceStrategy::Stacked { capacity: 1 }));
        assert_eq!(literal(&out.graph, "6", "text"), json!("a fox, first"));
        assert_matches!(
            &out.diagnostics[..],
            [Diagnostic::AdaptersTruncated { supplied: 2, capacity: 1 }]
        );
    }

    #[test]
    fn unsupported_executor_still_compiles() {
        let req = request(json!({}), vec![AdapterSpec::new("a.safetensors", 1.0, 1.0, 0)]);
        let out = compile_txt2img(&req, &SchemaInfo::default());
        assert_eq!(out.graph, template());
        assert_matches!(&out.diagnostics[..], [Diagnostic::AdaptersUnsupported { .. }]);
    }

    #[test]
    fn compile_is_deterministic_for_fixed_inputs() {
        let req = request(json!({ "prompt": "x", "seed": 3 }), vec![]);
        let a = compile_txt2img(&req, &SchemaInfo::default());
        let b = compile_txt2img(&req, &SchemaInfo::default());
        assert_eq!(a.workflow_hash, b.workflow_hash);
    }

    #[test]
    fn empty_template_is_rejected() {
        let err = compile(
            &Graph::new(),
            &CompileRequest::default(),
            ParameterRegistry::standard(),
            &SchemaInfo::default(),
        )
        .unwrap_err();
        assert_matches!(err, CoreError::InvalidWorkflow(_));
    }
}
