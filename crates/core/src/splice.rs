//! LoRA adapter splicing.
//!
//! Inserts adapter nodes between the base model loader (and the base CLIP
//! loader) and every node that consumed them directly. Two strategies,
//! picked from what the executor reports:
//!
//! - **Stacked**: one `CR LoRA Stack` node with every slot populated plus
//!   one `CR Apply LoRA Stack` node. Capacity is fixed by the executor.
//! - **Chained**: one `LoraLoader` per adapter, each consuming the previous
//!   one's MODEL and CLIP outputs. No capacity limit.
//!
//! Anything that prevents a splice (no loaders in the template, no adapter
//! node types on the executor) leaves the graph untouched and is reported
//! as a diagnostic.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::diagnostics::{report, Diagnostic};
use crate::graph::{Graph, InputValue, Node, NodeId, NodeRef};
use crate::operation::OperationType;
use crate::schema::SchemaInfo;

/// File name the executor uses for an empty adapter slot.
pub const NO_ADAPTER: &str = "None";

/// Strength used when a weight is missing or not a number.
pub const DEFAULT_WEIGHT: f64 = 1.0;

const SWITCH_ON: &str = "On";
const SWITCH_OFF: &str = "Off";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One adapter the user selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterSpec {
    pub file_path: String,
    #[serde(default, deserialize_with = "lenient_weight")]
    pub model_weight: Option<f64>,
    #[serde(default, deserialize_with = "lenient_weight")]
    pub conditioning_weight: Option<f64>,
    #[serde(default)]
    pub order: i32,
    /// Trigger words appended to the prompt when this adapter is applied.
    #[serde(default)]
    pub activation_text: Option<String>,
}

impl AdapterSpec {
    pub fn new(file_path: &str, model_weight: f64, conditioning_weight: f64, order: i32) -> Self {
        Self {
            file_path: file_path.to_string(),
            model_weight: Some(model_weight),
            conditioning_weight: Some(conditioning_weight),
            order,
            activation_text: None,
        }
    }

    /// Non-empty and not the `none` sentinel.
    pub fn is_applicable(&self) -> bool {
        let path = self.file_path.trim();
        !path.is_empty() && !path.eq_ignore_ascii_case("none")
    }

    pub fn model_strength(&self) -> f64 {
        self.model_weight.filter(|w| w.is_finite()).unwrap_or(DEFAULT_WEIGHT)
    }

    pub fn clip_strength(&self) -> f64 {
        self.conditioning_weight
            .filter(|w| w.is_finite())
            .unwrap_or(DEFAULT_WEIGHT)
    }
}

/// Accept numbers and numeric strings; anything else becomes `None`.
fn lenient_weight<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|w| w.is_finite()))
}

/// How the adapters were spliced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum SpliceStrategy {
    Stacked { capacity: usize },
    Chained,
}

/// Result of [`splice`].
#[derive(Debug, Clone, PartialEq)]
pub struct SpliceOutcome {
    pub graph: Graph,
    pub diagnostics: Vec<Diagnostic>,
    /// `None` when the graph was left unchanged.
    pub strategy: Option<SpliceStrategy>,
    /// Ids of the inserted nodes, in chain order.
    pub inserted: Vec<NodeId>,
    /// Adapters that made it into the graph, in application order.
    pub applied: Vec<AdapterSpec>,
}

impl SpliceOutcome {
    fn unchanged(graph: &Graph, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            graph: graph.clone(),
            diagnostics,
            strategy: None,
            inserted: Vec::new(),
            applied: Vec::new(),
        }
    }
}

/// Where the model and CLIP pathways originate.
struct BaseProducers {
    model: NodeRef,
    clip: NodeRef,
}

// ---------------------------------------------------------------------------
// Splice
// ---------------------------------------------------------------------------

/// Splice `adapters` into a copy of `graph`.
pub fn splice(graph: &Graph, adapters: &[AdapterSpec], schema: &SchemaInfo) -> SpliceOutcome {
    let mut diagnostics = Vec::new();
    if adapters.is_empty() {
        return SpliceOutcome::unchanged(graph, diagnostics);
    }

    let Some(base) = locate_base_producers(graph, &mut diagnostics) else {
        return SpliceOutcome::unchanged(graph, diagnostics);
    };

    let strategy = match (schema.stack_capacity(), schema.supports_chaining()) {
        (Some(capacity), _) => SpliceStrategy::Stacked { capacity },
        (None, true) => SpliceStrategy::Chained,
        (None, false) => {
            let reason = if schema.is_empty() {
                "executor schema unavailable"
            } else {
                "executor exposes no LoRA node types"
            };
            report(
                &mut diagnostics,
                Diagnostic::AdaptersUnsupported {
                    reason: reason.to_string(),
                },
            );
            return SpliceOutcome::unchanged(graph, diagnostics);
        }
    };

    let mut applied = select_adapters(adapters, strategy, schema, &mut diagnostics);
    if applied.is_empty() {
        return SpliceOutcome::unchanged(graph, diagnostics);
    }

    // Recorded before any node is inserted, so chain nodes never appear here.
    let model_consumers = graph.consumers_of(&base.model);
    let clip_consumers = graph.consumers_of(&base.clip);

    let mut out = graph.clone();
    let (inserted, tail) = match strategy {
        SpliceStrategy::Stacked { capacity } => {
            if applied.len() > capacity {
                report(
                    &mut diagnostics,
                    Diagnostic::AdaptersTruncated {
                        supplied: applied.len(),
                        capacity,
                    },
                );
                applied.truncate(capacity);
            }
            insert_stack(&mut out, &base, &applied, capacity)
        }
        SpliceStrategy::Chained => insert_chain(&mut out, &base, &applied),
    };

    redirect(&mut out, &model_consumers, &inserted, NodeRef::new(tail.clone(), 0));
    redirect(&mut out, &clip_consumers, &inserted, NodeRef::new(tail.clone(), 1));

    tracing::info!(
        strategy = ?strategy,
        adapters = applied.len(),
        tail = %tail,
        model_consumers = model_consumers.len(),
        clip_consumers = clip_consumers.len(),
        "Adapters spliced",
    );

    SpliceOutcome {
        graph: out,
        diagnostics,
        strategy: Some(strategy),
        inserted,
        applied,
    }
}

/// First base loader per pathway in node-id order.
fn locate_base_producers(
    graph: &Graph,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<BaseProducers> {
    let model = pick_producer(graph, "model", OperationType::base_model_slot, diagnostics);
    let clip = pick_producer(graph, "clip", OperationType::base_clip_slot, diagnostics);
    match (model, clip) {
        (Some(model), Some(clip)) => Some(BaseProducers { model, clip }),
        (None, _) => {
            report(
                diagnostics,
                Diagnostic::AdaptersUnsupported {
                    reason: "template has no model loader".to_string(),
                },
            );
            None
        }
        (_, None) => {
            report(
                diagnostics,
                Diagnostic::AdaptersUnsupported {
                    reason: "template has no CLIP loader".to_string(),
                },
            );
            None
        }
    }
}

fn pick_producer(
    graph: &Graph,
    pathway: &str,
    slot_of: fn(&OperationType) -> Option<u32>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<NodeRef> {
    let candidates: Vec<(&NodeId, u32)> = graph
        .nodes()
        .filter_map(|(id, node)| slot_of(&node.operation).map(|slot| (id, slot)))
        .collect();
    let (id, slot) = candidates.first()?;
    if candidates.len() > 1 {
        report(
            diagnostics,
            Diagnostic::AmbiguousProducer {
                pathway: pathway.to_string(),
                chosen: (*id).clone(),
                candidates: candidates.len(),
            },
        );
    }
    Some(NodeRef::new((*id).clone(), *slot))
}

/// Applicable adapters in application order, minus files the executor
/// does not list.
fn select_adapters(
    adapters: &[AdapterSpec],
    strategy: SpliceStrategy,
    schema: &SchemaInfo,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<AdapterSpec> {
    let file_node = match strategy {
        SpliceStrategy::Stacked { .. } => OperationType::LoraStack,
        SpliceStrategy::Chained => OperationType::LoraLoader,
    };
    let known_files = schema.adapter_files(&file_node);

    let mut selected: Vec<AdapterSpec> = Vec::with_capacity(adapters.len());
    for adapter in adapters {
        if !adapter.is_applicable() {
            report(
                diagnostics,
                Diagnostic::AdapterSkipped {
                    file: adapter.file_path.clone(),
                    reason: "no adapter file selected".to_string(),
                },
            );
            continue;
        }
        if let Some(files) = known_files {
            if !files.iter().any(|f| f == adapter.file_path.trim()) {
                report(
                    diagnostics,
                    Diagnostic::AdapterSkipped {
                        file: adapter.file_path.clone(),
                        reason: "file not available on executor".to_string(),
                    },
                );
                continue;
            }
        }
        selected.push(adapter.clone());
    }
    // Stable: equal orders keep input order.
    selected.sort_by_key(|a| a.order);
    selected
}

/// Insert the stack and apply nodes. Returns (inserted ids, tail id).
fn insert_stack(
    graph: &mut Graph,
    base: &BaseProducers,
    adapters: &[AdapterSpec],
    capacity: usize,
) -> (Vec<NodeId>, NodeId) {
    let ids = graph.allocate_ids(2);
    let (stack_id, apply_id) = (ids[0].clone(), ids[1].clone());

    let mut stack = Node::new(OperationType::LoraStack);
    for slot in 1..=capacity {
        let (switch, file, model_w, clip_w) = match adapters.get(slot - 1) {
            Some(a) => (SWITCH_ON, a.file_path.trim(), a.model_strength(), a.clip_strength()),
            None => (SWITCH_OFF, NO_ADAPTER, DEFAULT_WEIGHT, DEFAULT_WEIGHT),
        };
        stack = stack
            .with_input(&format!("switch_{slot}"), json!(switch))
            .with_input(&format!("lora_name_{slot}"), json!(file))
            .with_input(&format!("model_weight_{slot}"), json!(model_w))
            .with_input(&format!("clip_weight_{slot}"), json!(clip_w));
    }

    let apply = Node::new(OperationType::ApplyLoraStack)
        .with_input("model", base.model.clone())
        .with_input("clip", base.clip.clone())
        .with_input("lora_stack", NodeRef::new(stack_id.clone(), 0));

    graph.insert(stack_id, stack);
    graph.insert(apply_id.clone(), apply);
    (ids, apply_id)
}

/// Insert one loader per adapter, each fed by the previous one.
fn insert_chain(
    graph: &mut Graph,
    base: &BaseProducers,
    adapters: &[AdapterSpec],
) -> (Vec<NodeId>, NodeId) {
    let ids = graph.allocate_ids(adapters.len());
    let mut model = base.model.clone();
    let mut clip = base.clip.clone();

    for (id, adapter) in ids.iter().zip(adapters) {
        let node = Node::new(OperationType::LoraLoader)
            .with_input("lora_name", json!(adapter.file_path.trim()))
            .with_input("strength_model", json!(adapter.model_strength()))
            .with_input("strength_clip", json!(adapter.clip_strength()))
            .with_input("model", model)
            .with_input("clip", clip);
        graph.insert(id.clone(), node);
        model = NodeRef::new(id.clone(), 0);
        clip = NodeRef::new(id.clone(), 1);
    }

    let tail = model.producer;
    (ids, tail)
}

/// Point every recorded consumer at `target`, leaving chain nodes alone.
fn redirect(graph: &mut Graph, consumers: &[(NodeId, String)], chain: &[NodeId], target: NodeRef) {
    for (consumer, input) in consumers {
        if chain.contains(consumer) {
            continue;
        }
        if let Some(node) = graph.get_mut(consumer) {
            node.inputs
                .insert(input.clone(), InputValue::Reference(target.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::NodeSchema;
    use assert_matches::assert_matches;

    fn template() -> Graph {
        Graph::from_json(&json!({
            "1": { "class_type": "UNETLoader", "inputs": { "unet_name": "flux.safetensors" } },
            "2": { "class_type": "CLIPLoader", "inputs": { "clip_name": "t5.safetensors" } },
            "3": {
                "class_type": "CLIPTextEncode",
                "inputs": { "text": "a fox", "clip": ["2", 0] }
            },
            "4": { "class_type": "KSampler", "inputs": { "model": ["1", 0], "positive": ["3", 0] } }
        }))
        .unwrap()
    }

    fn checkpoint_template() -> Graph {
        Graph::from_json(&json!({
            "4": {
                "class_type": "CheckpointLoaderSimple",
                "inputs": { "ckpt_name": "sdxl.safetensors" }
            },
            "6": { "class_type": "CLIPTextEncode", "inputs": { "text": "", "clip": ["4", 1] } },
            "7": { "class_type": "CLIPTextEncode", "inputs": { "text": "", "clip": ["4", 1] } },
            "3": {
                "class_type": "KSampler",
                "inputs": { "model": ["4", 0], "positive": ["6", 0], "negative": ["7", 0] }
            },
            "8": { "class_type": "VAEDecode", "inputs": { "samples": ["3", 0], "vae": ["4", 2] } }
        }))
        .unwrap()
    }

    fn one_adapter() -> [AdapterSpec; 1] {
        [AdapterSpec::new("a.safetensors", 1.0, 1.0, 0)]
    }

    fn chain_schema() -> SchemaInfo {
        SchemaInfo::default().with_node("LoraLoader", NodeSchema::default())
    }

    fn stack_schema(capacity: usize) -> SchemaInfo {
        let stack = NodeSchema {
            required: (1..=capacity).map(|i| format!("lora_name_{i}")).collect(),
            ..Default::default()
        };
        chain_schema()
            .with_node("CR LoRA Stack", stack)
            .with_node("CR Apply LoRA Stack", NodeSchema::default())
    }

    fn reference(graph: &Graph, id: &str, input: &str) -> NodeRef {
        graph
            .get(&NodeId::from(id))
            .unwrap()
            .input(input)
            .and_then(InputValue::as_reference)
            .cloned()
            .unwrap()
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

    // -- chained --------------------------------------------------------------

    #[test]
    fn single_adapter_is_chained_after_the_loaders() {
        let adapters = [AdapterSpec::new("a.safetensors", 0.8, 1.0, 1)];
        let out = splice(&template(), &adapters, &chain_schema());

        assert_eq!(out.strategy, Some(SpliceStrategy::Chained));
        assert_eq!(out.inserted, vec![NodeId::from("5")]);
        let node = out.graph.get(&NodeId::from("5")).unwrap();
        assert_eq!(node.operation, OperationType::LoraLoader);
        assert_eq!(reference(&out.graph, "5", "model"), NodeRef::new("1", 0));
        assert_eq!(reference(&out.graph, "5", "clip"), NodeRef::new("2", 0));
        assert_eq!(literal(&out.graph, "5", "lora_name"), json!("a.safetensors"));
        assert_eq!(literal(&out.graph, "5", "strength_model"), json!(0.8));
        assert_eq!(literal(&out.graph, "5", "strength_clip"), json!(1.0));

        assert_eq!(reference(&out.graph, "4", "model"), NodeRef::new("5", 0));
        assert_eq!(reference(&out.graph, "3", "clip"), NodeRef::new("5", 1));
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn chain_links_in_order_without_a_cap() {
        let adapters: Vec<_> = (0..5)
            .rev()
            .map(|i| AdapterSpec::new(&format!("l{i}.safetensors"), 1.0, 1.0, i))
            .collect();
        let out = splice(&template(), &adapters, &chain_schema());

        assert_eq!(out.inserted.len(), 5);
        let first = &out.inserted[0];
        assert_eq!(literal(&out.graph, first.as_str(), "lora_name"), json!("l0.safetensors"));
        assert_eq!(reference(&out.graph, first.as_str(), "model"), NodeRef::new("1", 0));
        for pair in out.inserted.windows(2) {
            let (previous, next) = (pair[0].clone(), pair[1].as_str());
            assert_eq!(reference(&out.graph, next, "model"), NodeRef::new(previous.clone(), 0));
            assert_eq!(reference(&out.graph, next, "clip"), NodeRef::new(previous, 1));
        }
        let tail = out.inserted.last().unwrap().clone();
        assert_eq!(reference(&out.graph, "4", "model"), NodeRef::new(tail, 0));
        assert!(out.graph.find_cycle().is_none());
    }

    #[test]
    fn duplicate_files_are_kept() {
        let adapters = [
            AdapterSpec::new("same.safetensors", 0.5, 0.5, 1),
            AdapterSpec::new("same.safetensors", 0.3, 0.3, 2),
        ];
        let out = splice(&template(), &adapters, &chain_schema());
        assert_eq!(out.inserted.len(), 2);
    }

    #[test]
    fn checkpoint_slots_are_redirected_separately() {
        let graph = checkpoint_template();
        let model_before = graph.consumers_of(&NodeRef::new("4", 0));
        let clip_before = graph.consumers_of(&NodeRef::new("4", 1));

        let out = splice(&graph, &one_adapter(), &chain_schema());
        let tail = out.inserted[0].clone();
        assert_eq!(tail, NodeId::from("9"));

        for (consumer, input) in model_before {
            let redirected = reference(&out.graph, consumer.as_str(), &input);
            assert_eq!(redirected, NodeRef::new(tail.clone(), 0));
        }
        for (consumer, input) in clip_before {
            let redirected = reference(&out.graph, consumer.as_str(), &input);
            assert_eq!(redirected, NodeRef::new(tail.clone(), 1));
        }
        // The VAE output is not part of either pathway.
        assert_eq!(reference(&out.graph, "8", "vae"), NodeRef::new("4", 2));
        assert_eq!(reference(&out.graph, "9", "clip"), NodeRef::new("4", 1));
    }

    // -- stacked --------------------------------------------------------------

    #[test]
    fn stack_fills_every_slot() {
        let adapters = [
            AdapterSpec::new("a.safetensors", 0.7, 0.6, 1),
            AdapterSpec::new("b.safetensors", 0.5, 0.4, 2),
        ];
        let out = splice(&template(), &adapters, &stack_schema(4));

        assert_eq!(out.strategy, Some(SpliceStrategy::Stacked { capacity: 4 }));
        assert_eq!(out.inserted, vec![NodeId::from("5"), NodeId::from("6")]);

        let stack = out.graph.get(&NodeId::from("5")).unwrap();
        assert_eq!(stack.operation, OperationType::LoraStack);
        assert_eq!(literal(&out.graph, "5", "lora_name_1"), json!("a.safetensors"));
        assert_eq!(literal(&out.graph, "5", "model_weight_1"), json!(0.7));
        assert_eq!(literal(&out.graph, "5", "clip_weight_2"), json!(0.4));
        assert_eq!(literal(&out.graph, "5", "switch_2"), json!("On"));
        for slot in 3..=4 {
            assert_eq!(literal(&out.graph, "5", &format!("lora_name_{slot}")), json!("None"));
            assert_eq!(literal(&out.graph, "5", &format!("switch_{slot}")), json!("Off"));
            assert_eq!(literal(&out.graph, "5", &format!("model_weight_{slot}")), json!(1.0));
        }

        assert_eq!(reference(&out.graph, "6", "model"), NodeRef::new("1", 0));
        assert_eq!(reference(&out.graph, "6", "clip"), NodeRef::new("2", 0));
        assert_eq!(reference(&out.graph, "6", "lora_stack"), NodeRef::new("5", 0));
        assert_eq!(reference(&out.graph, "4", "model"), NodeRef::new("6", 0));
        assert_eq!(reference(&out.graph, "3", "clip"), NodeRef::new("6", 1));
    }

    #[test]
    fn stack_truncates_to_capacity() {
        let adapters: Vec<_> = (0..5)
            .map(|i| AdapterSpec::new(&format!("l{i}.safetensors"), 1.0, 1.0, i))
            .collect();
        let out = splice(&template(), &adapters, &stack_schema(3));
        assert_eq!(out.applied.len(), 3);
        assert_matches!(
            &out.diagnostics[..],
            [Diagnostic::AdaptersTruncated { supplied: 5, capacity: 3 }]
        );
        assert_eq!(literal(&out.graph, "5", "lora_name_3"), json!("l2.safetensors"));
    }

    #[test]
    fn largest_possible_id_does_not_stop_splicing() {
        let graph = Graph::from_json(&json!({
            "18446744073709551615": {
                "class_type": "UNETLoader",
                "inputs": { "unet_name": "flux.safetensors" }
            },
            "2": { "class_type": "CLIPLoader", "inputs": { "clip_name": "t5.safetensors" } },
            "3": {
                "class_type": "CLIPTextEncode",
                "inputs": { "text": "a fox", "clip": ["2", 0] }
            },
            "4": {
                "class_type": "KSampler",
                "inputs": { "model": ["18446744073709551615", 0], "positive": ["3", 0] }
            }
        }))
        .unwrap();
        let out = splice(&graph, &one_adapter(), &chain_schema());

        assert_eq!(out.inserted, vec![NodeId::from("1")]);
        assert_eq!(reference(&out.graph, "1", "model"), NodeRef::new("18446744073709551615", 0));
        assert_eq!(reference(&out.graph, "4", "model"), NodeRef::new("1", 0));
        assert_eq!(reference(&out.graph, "3", "clip"), NodeRef::new("1", 1));
    }

    // -- no-ops ---------------------------------------------------------------

    #[test]
    fn no_adapters_is_a_no_op() {
        let out = splice(&template(), &[], &stack_schema(3));
        assert_eq!(out.graph, template());
        assert_eq!(out.strategy, None);
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn empty_schema_reports_unsupported() {
        let out = splice(&template(), &one_adapter(), &SchemaInfo::default());
        assert_eq!(out.graph, template());
        assert_matches!(&out.diagnostics[..], [Diagnostic::AdaptersUnsupported { .. }]);
    }

    #[test]
    fn missing_loader_reports_unsupported() {
        let mut graph = template();
        graph.remove(&NodeId::from("2"));
        let out = splice(&graph, &one_adapter(), &chain_schema());
        assert_eq!(out.graph, graph);
        assert_matches!(
            &out.diagnostics[..],
            [Diagnostic::AdaptersUnsupported { reason }] if reason.contains("CLIP")
        );
    }

    #[test]
    fn sentinel_and_empty_paths_are_skipped() {
        let adapters = [
            AdapterSpec::new("none", 1.0, 1.0, 0),
            AdapterSpec::new("  ", 1.0, 1.0, 1),
            AdapterSpec::new("real.safetensors", 1.0, 1.0, 2),
        ];
        let out = splice(&template(), &adapters, &chain_schema());
        assert_eq!(out.inserted.len(), 1);
        assert_eq!(out.diagnostics.len(), 2);
    }

    #[test]
    fn files_missing_from_executor_are_skipped() {
        let loader = NodeSchema {
            choices: [("lora_name".to_string(), vec!["known.safetensors".to_string()])].into(),
            ..Default::default()
        };
        let schema = SchemaInfo::default().with_node("LoraLoader", loader);
        let adapters = [
            AdapterSpec::new("known.safetensors", 1.0, 1.0, 0),
            AdapterSpec::new("gone.safetensors", 1.0, 1.0, 1),
        ];
        let out = splice(&template(), &adapters, &schema);
        assert_eq!(out.applied.len(), 1);
        assert_matches!(
            &out.diagnostics[..],
            [Diagnostic::AdapterSkipped { file, .. }] if file == "gone.safetensors"
        );
    }

    // -- weights --------------------------------------------------------------

    #[test]
    fn non_numeric_weights_default_to_one() {
        let adapter: AdapterSpec = serde_json::from_value(json!({
            "file_path": "a.safetensors",
            "model_weight": "strong",
            "conditioning_weight": "0.25"
        }))
        .unwrap();
        assert_eq!(adapter.model_strength(), 1.0);
        assert_eq!(adapter.clip_strength(), 0.25);
        assert_eq!(adapter.order, 0);
    }
}
