//! Reference integrity repair.
//!
//! Every reference must name a node that exists. After a structural
//! rewrite, dangling references are either relinked to a surviving node
//! that plays the expected role or removed outright:
//!
//! - any input of a text encoder → first CLIP-producing node in id order.
//!   The consumer's role decides, not the input name.
//! - `model` on anything → an adapter-chain tail if there is one, then any
//!   other chain node, then a base model loader.
//! - everything else → removed.
//!
//! A relink never targets a node that already depends on the consumer,
//! so repair cannot introduce a cycle. The output has no dangling
//! references, which makes a second pass a no-op.

use crate::diagnostics::{report, Diagnostic, Rewritten};
use crate::graph::{Graph, InputValue, NodeId, NodeRef};

const MODEL_INPUT: &str = "model";

/// Repair a copy of `graph`.
pub fn repair(graph: &Graph) -> Rewritten {
    let mut out = graph.clone();
    let mut diagnostics = Vec::new();

    for (consumer, input, dangling) in graph.dangling_references() {
        let replacement = replacement_for(&out, &consumer, &input);
        let Some(node) = out.get_mut(&consumer) else {
            continue;
        };

        match replacement {
            Some(target) => {
                let diagnostic = Diagnostic::ReferenceRelinked {
                    node: consumer.clone(),
                    input: input.clone(),
                    missing: dangling.producer,
                    replacement: target.producer.clone(),
                };
                node.inputs.insert(input, InputValue::Reference(target));
                report(&mut diagnostics, diagnostic);
            }
            None => {
                node.inputs.remove(&input);
                report(
                    &mut diagnostics,
                    Diagnostic::ReferenceRemoved {
                        node: consumer,
                        input,
                        missing: dangling.producer,
                    },
                );
            }
        }
    }

    if !diagnostics.is_empty() {
        tracing::info!(fixes = diagnostics.len(), "Dangling references repaired");
    }

    Rewritten {
        graph: out,
        diagnostics,
    }
}

/// A surviving producer for `consumer.input`, if its role calls for one.
fn replacement_for(graph: &Graph, consumer: &NodeId, input: &str) -> Option<NodeRef> {
    let node = graph.get(consumer)?;
    if node.operation.is_text_conditioning_consumer() {
        return graph
            .nodes()
            .filter(|(id, _)| !graph.depends_on(id, consumer))
            .find_map(|(id, n)| n.operation.clip_slot().map(|slot| NodeRef::new(id.clone(), slot)));
    }
    if input == MODEL_INPUT {
        return model_candidates(graph)
            .into_iter()
            .find(|r| !graph.depends_on(&r.producer, consumer));
    }
    None
}

/// Model producers, most preferred first: chain tails, other chain
/// nodes, then loaders. Id order within each group.
fn model_candidates(graph: &Graph) -> Vec<NodeRef> {
    let chain: Vec<&NodeId> = graph
        .nodes()
        .filter(|(_, n)| n.operation.is_adapter_chain())
        .map(|(id, _)| id)
        .collect();

    // A tail is a chain node no other chain node consumes.
    let is_tail = |id: &NodeId| {
        !chain.iter().any(|other| {
            graph
                .get(other)
                .is_some_and(|n| n.references().any(|(_, r)| &r.producer == id))
        })
    };

    let (tails, inner): (Vec<&NodeId>, Vec<&NodeId>) =
        chain.iter().copied().partition(|id| is_tail(*id));
    let loaders = graph
        .nodes()
        .filter(|(_, n)| n.operation.base_model_slot().is_some())
        .map(|(id, _)| id);

    tails
        .into_iter()
        .chain(inner)
        .chain(loaders)
        .filter_map(|id| {
            let slot = graph.get(id)?.operation.model_slot()?;
            Some(NodeRef::new(id.clone(), slot))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn reference(graph: &Graph, id: &str, input: &str) -> Option<NodeRef> {
        graph
            .get(&NodeId::from(id))?
            .input(input)
            .and_then(InputValue::as_reference)
            .cloned()
    }

    fn broken() -> Graph {
        Graph::from_json(&json!({
            "1": { "class_type": "UNETLoader", "inputs": { "unet_name": "flux.safetensors" } },
            "2": { "class_type": "CLIPLoader", "inputs": { "clip_name": "t5.safetensors" } },
            "3": {
                "class_type": "CLIPTextEncode",
                "inputs": { "text": "a fox", "clip": ["99", 0] }
            },
            "4": {
                "class_type": "KSampler",
                "inputs": { "model": ["98", 0], "positive": ["3", 0], "latent_image": ["97", 0] }
            }
        }))
        .unwrap()
    }

    #[test]
    fn text_encoder_relinks_to_clip_loader() {
        let out = repair(&broken());
        assert_eq!(reference(&out.graph, "3", "clip"), Some(NodeRef::new("2", 0)));
        assert!(out.diagnostics.iter().any(|d| matches!(
            d,
            Diagnostic::ReferenceRelinked { node, replacement, .. }
                if node.as_str() == "3" && replacement.as_str() == "2"
        )));
    }

    #[test]
    fn text_encoder_relinks_by_role_not_input_name() {
        let graph = Graph::from_json(&json!({
            "2": { "class_type": "CLIPLoader", "inputs": { "clip_name": "t5.safetensors" } },
            "5": {
                "class_type": "CLIPTextEncodeSDXL",
                "inputs": { "text_g": "a fox", "text_encoder": ["99", 0] }
            }
        }))
        .unwrap();
        let out = repair(&graph);
        assert_eq!(reference(&out.graph, "5", "text_encoder"), Some(NodeRef::new("2", 0)));
        assert!(out.graph.dangling_references().is_empty());
    }

    #[test]
    fn model_relinks_and_other_inputs_are_removed() {
        let out = repair(&broken());
        assert_eq!(reference(&out.graph, "4", "model"), Some(NodeRef::new("1", 0)));
        assert!(out.graph.get(&NodeId::from("4")).unwrap().input("latent_image").is_none());
        assert_eq!(out.diagnostics.len(), 3);
    }

    #[test]
    fn output_has_no_dangling_references() {
        let out = repair(&broken());
        assert!(out.graph.dangling_references().is_empty());
    }

    #[test]
    fn repair_is_idempotent() {
        let once = repair(&broken());
        let twice = repair(&once.graph);
        assert_eq!(twice.graph, once.graph);
        assert!(twice.diagnostics.is_empty());
    }

    #[test]
    fn consistent_graph_is_untouched() {
        let graph = Graph::from_json(&json!({
            "1": { "class_type": "CheckpointLoaderSimple", "inputs": {} },
            "2": { "class_type": "KSampler", "inputs": { "model": ["1", 0] } }
        }))
        .unwrap();
        let out = repair(&graph);
        assert_eq!(out.graph, graph);
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn model_prefers_chain_tail() {
        let graph = Graph::from_json(&json!({
            "1": { "class_type": "CheckpointLoaderSimple", "inputs": {} },
            "5": { "class_type": "LoraLoader", "inputs": { "model": ["1", 0], "clip": ["1", 1] } },
            "6": { "class_type": "LoraLoader", "inputs": { "model": ["5", 0], "clip": ["5", 1] } },
            "7": { "class_type": "KSampler", "inputs": { "model": ["40", 0] } }
        }))
        .unwrap();
        let out = repair(&graph);
        assert_eq!(reference(&out.graph, "7", "model"), Some(NodeRef::new("6", 0)));
    }

    #[test]
    fn relink_never_creates_a_cycle() {
        // The only chain node depends on the consumer, so fall back to the loader.
        let graph = Graph::from_json(&json!({
            "1": { "class_type": "UNETLoader", "inputs": {} },
            "2": {
                "class_type": "LoraLoaderModelOnly",
                "inputs": { "model": ["1", 0], "hint": ["3", 0] }
            },
            "3": { "class_type": "ModelPatch", "inputs": { "model": ["50", 0] } }
        }))
        .unwrap();
        let out = repair(&graph);
        assert_eq!(reference(&out.graph, "3", "model"), Some(NodeRef::new("1", 0)));
        assert!(out.graph.find_cycle().is_none());
    }

    #[test]
    fn missing_clip_producer_removes_input() {
        let graph = Graph::from_json(&json!({
            "3": { "class_type": "CLIPTextEncode", "inputs": { "text": "x", "clip": ["99", 0] } }
        }))
        .unwrap();
        let out = repair(&graph);
        assert!(out.graph.get(&NodeId::from("3")).unwrap().input("clip").is_none());
        assert_matches!(&out.diagnostics[..], [Diagnostic::ReferenceRemoved { .. }]);
    }
}
