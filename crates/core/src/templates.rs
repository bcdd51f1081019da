//! Named workflow templates, each paired with its parameter table.
//!
//! Built once at start-up and shared read-only afterwards. Supporting a
//! new workflow means registering a template graph and, if it uses node
//! types the standard table does not cover, extra parameter specs.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::compiler::{compile, CompileRequest, CompiledWorkflow};
use crate::error::CoreError;
use crate::graph::Graph;
use crate::registry::ParameterRegistry;
use crate::schema::SchemaInfo;

pub const TXT2IMG: &str = "txt2img";
pub const IMG2IMG: &str = "img2img";

const BUILTIN: &[(&str, &str, &str)] = &[
    (
        TXT2IMG,
        "Text to image with a single checkpoint",
        include_str!("../templates/txt2img.json"),
    ),
    (
        IMG2IMG,
        "Image to image from an uploaded input",
        include_str!("../templates/img2img.json"),
    ),
];

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowTemplate {
    pub name: String,
    pub description: String,
    pub graph: Graph,
    pub parameters: ParameterRegistry,
}

impl WorkflowTemplate {
    /// Parse a template from API-format JSON text.
    pub fn from_json_str(
        name: &str,
        description: &str,
        raw: &str,
        parameters: ParameterRegistry,
    ) -> Result<Self, CoreError> {
        let graph = Graph::from_str_json(raw)
            .map_err(|e| CoreError::InvalidWorkflow(format!("template '{name}': {e}")))?;
        Ok(Self {
            name: name.to_string(),
            description: description.to_string(),
            graph,
            parameters,
        })
    }

    pub fn compile(
        &self,
        request: &CompileRequest,
        schema: &SchemaInfo,
    ) -> Result<CompiledWorkflow, CoreError> {
        compile(&self.graph, request, &self.parameters, schema)
    }
}

/// Immutable lookup table of templates by name.
#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    templates: BTreeMap<String, Arc<WorkflowTemplate>>,
}

impl WorkflowRegistry {
    /// The templates shipped with this crate.
    pub fn builtin() -> Result<Self, CoreError> {
        let mut registry = Self::default();
        for (name, description, raw) in BUILTIN {
            let parameters = ParameterRegistry::standard().clone();
            let template = WorkflowTemplate::from_json_str(name, description, raw, parameters)?;
            registry = registry.with_template(template);
        }
        Ok(registry)
    }

    /// Add (or replace) a template.
    pub fn with_template(mut self, template: WorkflowTemplate) -> Self {
        if self.templates.contains_key(&template.name) {
            tracing::warn!(template = %template.name, "Replacing registered template");
        }
        self.templates.insert(template.name.clone(), Arc::new(template));
        self
    }

    /// Add every `*.json` file in `dir`, named after the file stem, using
    /// the standard parameter table.
    pub fn with_directory(mut self, dir: &Path) -> Result<Self, CoreError> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            CoreError::Validation(format!("cannot read template dir {}: {e}", dir.display()))
        })?;

        let mut paths: Vec<_> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        for path in paths {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            let raw = std::fs::read_to_string(&path).map_err(|e| {
                CoreError::Validation(format!("cannot read template {}: {e}", path.display()))
            })?;
            let template = WorkflowTemplate::from_json_str(
                &name,
                &format!("Loaded from {}", path.display()),
                &raw,
                ParameterRegistry::standard().clone(),
            )?;
            tracing::info!(template = %name, path = %path.display(), "Template loaded");
            self = self.with_template(template);
        }
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Result<Arc<WorkflowTemplate>, CoreError> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownTemplate(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
