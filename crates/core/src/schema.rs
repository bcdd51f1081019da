//! What the executor can run right now, parsed from `GET /object_info`.
//!
//! The introspection payload maps each class type to its declared inputs:
//!
//! ```json
//! {
//!   "LoraLoader": {
//!     "input": {
//!       "required": {
//!         "model": ["MODEL"],
//!         "lora_name": [["detail.safetensors", "style.safetensors"]],
//!         "strength_model": ["FLOAT", { "default": 1.0 }]
//!       }
//!     },
//!     "output": ["MODEL", "CLIP"]
//!   }
//! }
//! ```
//!
//! Parsing is lenient: entries that do not have this shape are skipped.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::operation::OperationType;

/// Input name used by single-adapter loaders for the adapter file.
pub const ADAPTER_FILE_INPUT: &str = "lora_name";

/// Declared shape of one operation type.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeSchema {
    pub required: Vec<String>,
    pub optional: Vec<String>,
    /// Enumerated valid values for combo inputs (file pickers and the like).
    pub choices: BTreeMap<String, Vec<String>>,
    pub outputs: Vec<String>,
}

impl NodeSchema {
    pub fn has_input(&self, name: &str) -> bool {
        self.required.iter().chain(&self.optional).any(|n| n == name)
    }

    fn from_object_info(value: &Value) -> Self {
        let mut schema = Self::default();
        let input = value.get("input");
        let sections = [("required", &mut schema.required), ("optional", &mut schema.optional)];
        for (section, target) in sections {
            let Some(fields) = input.and_then(|i| i.get(section)).and_then(Value::as_object) else {
                continue;
            };
            for (name, decl) in fields {
                target.push(name.clone());
                if let Some(options) = combo_choices(decl) {
                    let options: Vec<String> = options
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect();
                    schema.choices.insert(name.clone(), options);
                }
            }
        }
        schema.outputs = value
            .get("output")
            .and_then(Value::as_array)
            .map(|outs| outs.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        schema
    }
}

/// Choices of a combo input: `[["a", "b"]]`, or `["COMBO", {"options": ["a", "b"]}]`
/// on newer executors.
fn combo_choices(decl: &Value) -> Option<&Vec<Value>> {
    match decl.get(0)? {
        Value::Array(options) => Some(options),
        Value::String(kind) if kind == "COMBO" => decl.get(1)?.get("options")?.as_array(),
        _ => None,
    }
}

/// Operation types available on the executor.
///
/// An empty `SchemaInfo` means nothing is known (discovery failed) and no
/// adapter strategy will be chosen.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaInfo {
    node_types: BTreeMap<String, NodeSchema>,
}

impl SchemaInfo {
    pub fn from_object_info(json: &Value) -> Self {
        let node_types = json
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter(|(_, v)| v.is_object())
                    .map(|(k, v)| (k.clone(), NodeSchema::from_object_info(v)))
                    .collect()
            })
            .unwrap_or_default();
        Self { node_types }
    }

    /// Builder used when the caller already knows the shapes.
    pub fn with_node(mut self, class_type: &str, schema: NodeSchema) -> Self {
        self.node_types.insert(class_type.to_string(), schema);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.node_types.is_empty()
    }

    pub fn len(&self) -> usize {
        self.node_types.len()
    }

    pub fn supports(&self, op: &OperationType) -> bool {
        self.node_types.contains_key(op.class_type())
    }

    pub fn node(&self, op: &OperationType) -> Option<&NodeSchema> {
        self.node_types.get(op.class_type())
    }

    /// Whether a single-adapter loader is available for chaining.
    pub fn supports_chaining(&self) -> bool {
        self.supports(&OperationType::LoraLoader)
    }

    /// Highest slot number of the stacking node, when both it and its
    /// apply node exist and the stack declares at least one slot.
    pub fn stack_capacity(&self) -> Option<usize> {
        if !self.supports(&OperationType::ApplyLoraStack) {
            return None;
        }
        let stack = self.node(&OperationType::LoraStack)?;
        stack
            .required
            .iter()
            .chain(&stack.optional)
            .filter_map(|name| stack_slot_index(name))
            .max()
            .filter(|&slots| slots > 0)
    }

    /// Valid adapter files for `op`, when the executor enumerates them.
    ///
    /// Looks at `lora_name` for loaders and `lora_name_1` for stacks.
    pub fn adapter_files(&self, op: &OperationType) -> Option<&[String]> {
        let node = self.node(op)?;
        node.choices
            .get(ADAPTER_FILE_INPUT)
            .or_else(|| node.choices.get(&format!("{ADAPTER_FILE_INPUT}_1")))
            .map(Vec::as_slice)
            .filter(|files| !files.is_empty())
    }
}

/// `lora_name_3` → `Some(3)`.
fn stack_slot_index(input: &str) -> Option<usize> {
    input
        .strip_prefix(ADAPTER_FILE_INPUT)?
        .strip_prefix('_')?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object_info() -> Value {
        json!({
            "LoraLoader": {
                "input": {
                    "required": {
                        "model": ["MODEL"],
                        "clip": ["CLIP"],
                        "lora_name": [["detail.safetensors", "style.safetensors"]],
                        "strength_model": ["FLOAT", { "default": 1.0 }],
                        "strength_clip": ["FLOAT", { "default": 1.0 }]
                    }
                },
                "output": ["MODEL", "CLIP"]
            },
            "CR LoRA Stack": {
                "input": {
                    "required": {
                        "switch_1": [["Off", "On"]],
                        "lora_name_1": [["None", "detail.safetensors"]],
                        "switch_2": [["Off", "On"]],
                        "lora_name_2": [["None", "detail.safetensors"]],
                        "switch_3": [["Off", "On"]],
                        "lora_name_3": [["None", "detail.safetensors"]]
                    },
                    "optional": { "lora_stack": ["LORA_STACK"] }
                },
                "output": ["LORA_STACK", "STRING"]
            },
            "CR Apply LoRA Stack": {
                "input": { "required": {
                    "model": ["MODEL"],
                    "clip": ["CLIP"],
                    "lora_stack": ["LORA_STACK"]
                } },
                "output": ["MODEL", "CLIP", "STRING"]
            },
            "broken": 42
        })
    }

    #[test]
    fn parses_inputs_choices_and_outputs() {
        let schema = SchemaInfo::from_object_info(&object_info());
        assert_eq!(schema.len(), 3);
        let lora = schema.node(&OperationType::LoraLoader).unwrap();
        assert!(lora.has_input("strength_clip"));
        assert_eq!(lora.outputs, vec!["MODEL", "CLIP"]);
        assert_eq!(
            schema.adapter_files(&OperationType::LoraLoader).unwrap(),
            ["detail.safetensors", "style.safetensors"]
        );
    }

    #[test]
    fn stack_capacity_counts_file_slots() {
        let schema = SchemaInfo::from_object_info(&object_info());
        assert_eq!(schema.stack_capacity(), Some(3));
    }

    #[test]
    fn stack_capacity_is_the_highest_slot() {
        let mut info = object_info();
        let required = info["CR LoRA Stack"]["input"]["required"].as_object_mut().unwrap();
        required.remove("lora_name_3");
        required.insert("lora_name_4".into(), json!([["None"]]));
        let schema = SchemaInfo::from_object_info(&info);
        assert_eq!(schema.stack_capacity(), Some(4));
    }

    #[test]
    fn combo_options_form_lists_adapter_files() {
        let schema = SchemaInfo::from_object_info(&json!({
            "LoraLoader": {
                "input": { "required": {
                    "lora_name": ["COMBO", { "options": ["detail.safetensors"] }],
                    "strength_model": ["FLOAT", { "default": 1.0 }]
                } },
                "output": ["MODEL", "CLIP"]
            }
        }));
        assert_eq!(
            schema.adapter_files(&OperationType::LoraLoader).unwrap(),
            ["detail.safetensors"]
        );
        let lora = schema.node(&OperationType::LoraLoader).unwrap();
        assert!(!lora.choices.contains_key("strength_model"));
    }

    #[test]
    fn stack_needs_apply_node() {
        let mut info = object_info();
        info.as_object_mut().unwrap().remove("CR Apply LoRA Stack");
        let schema = SchemaInfo::from_object_info(&info);
        assert_eq!(schema.stack_capacity(), None);
        assert!(schema.supports_chaining());
    }

    #[test]
    fn non_object_payload_is_empty() {
        let schema = SchemaInfo::from_object_info(&json!("oops"));
        assert!(schema.is_empty());
        assert!(!schema.supports_chaining());
    }

    #[test]
    fn slot_index_parsing() {
        assert_eq!(stack_slot_index("lora_name_12"), Some(12));
        assert_eq!(stack_slot_index("lora_name"), None);
        assert_eq!(stack_slot_index("lora_stack"), None);
    }
}
