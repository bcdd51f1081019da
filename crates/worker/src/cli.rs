//! Command-line surface.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use atelier_comfyui::api::ComfyUIApi;
use atelier_comfyui::discovery::discover_schema;
use atelier_core::error::CoreError;
use atelier_core::schema::SchemaInfo;
use atelier_core::templates::WorkflowRegistry;
use atelier_pipeline::generation::{
    GenerationOutcome, GenerationRequest, GenerationService, PipelineError,
};
use atelier_pipeline::store::LocalStore;
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, WorkerConfig};

#[derive(Parser, Debug)]
#[command(name = "atelier-worker")]
#[command(about = "Compile and run ComfyUI workflow templates", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a template and print the executor payload.
    Compile {
        #[command(flatten)]
        job: JobArgs,

        /// Saved `/object_info` response to compile against instead of
        /// asking the executor.
        #[arg(long)]
        schema: Option<PathBuf>,
    },
    /// Compile, submit, wait for the output and store it.
    Generate {
        #[command(flatten)]
        job: JobArgs,
    },
    /// Show what the executor supports.
    Schema,
    /// List registered templates.
    Templates,
}

#[derive(Args, Debug, Clone)]
pub struct JobArgs {
    /// Template name.
    #[arg(long, short, default_value = "txt2img")]
    pub template: String,

    /// JSON file with `parameters` and `adapters`.
    #[arg(long, short)]
    pub request: Option<PathBuf>,

    /// `name=value` parameter, repeatable. Values are read as JSON when
    /// they parse, as text otherwise.
    #[arg(long = "param", short = 'p')]
    pub params: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Run one command; the returned JSON is printed by the binary.
pub async fn execute(
    cli: Cli,
    config: &WorkerConfig,
    cancel: &CancellationToken,
) -> Result<Value, CliError> {
    let templates = load_templates(config)?;

    match cli.cmd {
        Commands::Templates => Ok(json!(templates
            .names()
            .map(|name| {
                let description = templates
                    .get(name)
                    .map(|t| t.description.clone())
                    .unwrap_or_default();
                json!({ "name": name, "description": description })
            })
            .collect::<Vec<_>>())),

        Commands::Schema => {
            let timeout = config.generation_settings().discovery_timeout;
            let schema = discover_schema(&api(config)?, timeout, cancel).await;
            Ok(json!({
                "node_types": schema.len(),
                "stack_capacity": schema.stack_capacity(),
                "supports_chaining": schema.supports_chaining(),
            }))
        }

        Commands::Compile { job, schema } => {
            let request = job.into_request()?;
            let compiled = match schema {
                Some(path) => {
                    let info: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
                    templates
                        .get(&request.template)?
                        .compile(&compile_request(&request), &SchemaInfo::from_object_info(&info))?
                }
                None => service(config, templates)?.compile(&request, cancel).await?,
            };
            Ok(json!({
                "prompt": compiled.payload(),
                "workflow_hash": compiled.workflow_hash,
                "resolved_parameters": compiled.resolved_parameters,
                "strategy": compiled.strategy,
                "diagnostics": compiled
                    .diagnostics
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>(),
            }))
        }

        Commands::Generate { job } => {
            let request = job.into_request()?;
            let outcome = service(config, templates)?.run(request, cancel).await?;
            Ok(match outcome {
                GenerationOutcome::Completed {
                    session_id,
                    prompt_id,
                    artifact,
                    diagnostics,
                } => json!({
                    "status": "completed",
                    "session_id": session_id,
                    "prompt_id": prompt_id,
                    "artifact": artifact,
                    "diagnostics": diagnostics.iter().map(ToString::to_string).collect::<Vec<_>>(),
                }),
                GenerationOutcome::TimedOut { session_id, prompt_id } => json!({
                    "status": "timed_out",
                    "message": "timed out, check back later",
                    "session_id": session_id,
                    "prompt_id": prompt_id,
                }),
                GenerationOutcome::Cancelled { session_id, prompt_id } => json!({
                    "status": "cancelled",
                    "session_id": session_id,
                    "prompt_id": prompt_id,
                }),
            })
        }
    }
}

impl JobArgs {
    /// Merge the request file (if any) with `--param` overrides.
    pub fn into_request(self) -> Result<GenerationRequest, CliError> {
        let mut request = match &self.request {
            Some(path) => read_request(path)?,
            None => GenerationRequest {
                template: self.template.clone(),
                parameters: Default::default(),
                adapters: Vec::new(),
            },
        };
        request.template = self.template;

        for raw in self.params {
            let (name, value) = raw
                .split_once('=')
                .ok_or_else(|| CliError::Input(format!("expected name=value, got '{raw}'")))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(CliError::Input(format!("empty parameter name in '{raw}'")));
            }
            let value = serde_json::from_str(value).unwrap_or_else(|_| Value::from(value));
            request.parameters.insert(name.to_string(), value);
        }
        Ok(request)
    }
}

/// Request files carry parameters and adapters; the template comes from
/// the command line.
fn read_request(path: &Path) -> Result<GenerationRequest, CliError> {
    let mut raw: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    let Some(obj) = raw.as_object_mut() else {
        return Err(CliError::Input(format!("{} must contain a JSON object", path.display())));
    };
    obj.entry("template").or_insert_with(|| Value::from(""));
    Ok(serde_json::from_value(raw)?)
}

fn compile_request(request: &GenerationRequest) -> atelier_core::compiler::CompileRequest {
    atelier_core::compiler::CompileRequest {
        parameters: request.parameters.clone(),
        adapters: request.adapters.clone(),
    }
}

fn load_templates(config: &WorkerConfig) -> Result<WorkflowRegistry, CliError> {
    let registry = WorkflowRegistry::builtin()?;
    Ok(match &config.template_dir {
        Some(dir) => registry.with_directory(dir)?,
        None => registry,
    })
}

fn api(config: &WorkerConfig) -> Result<ComfyUIApi, CliError> {
    ComfyUIApi::with_timeout(&config.comfyui_url, config.request_timeout())
        .map_err(|e| CliError::Input(format!("cannot build HTTP client: {e}")))
}

fn service(
    config: &WorkerConfig,
    templates: WorkflowRegistry,
) -> Result<GenerationService, CliError> {
    Ok(GenerationService::new(
        api(config)?,
        Arc::new(LocalStore::new(&config.output_dir)),
        Arc::new(templates),
        config.generation_settings(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn params_are_parsed_as_json_or_text() {
        let cli = Cli::try_parse_from([
            "atelier-worker",
            "compile",
            "--template",
            "img2img",
            "-p",
            "steps=30",
            "-p",
            "prompt=a red fox",
        ])
        .unwrap();
        let Commands::Compile { job, .. } = cli.cmd else {
            panic!("expected compile");
        };
        let request = job.into_request().unwrap();
        assert_eq!(request.template, "img2img");
        assert_eq!(request.parameters["steps"], json!(30));
        assert_eq!(request.parameters["prompt"], json!("a red fox"));
    }

    #[test]
    fn malformed_param_is_rejected() {
        let job = JobArgs {
            template: "txt2img".into(),
            request: None,
            params: vec!["steps".into()],
        };
        assert!(matches!(job.into_request(), Err(CliError::Input(_))));
    }

    #[test]
    fn request_file_supplies_adapters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("req.json");
        std::fs::write(
            &path,
            r#"{
                "parameters": { "seed": 1 },
                "adapters": [ { "file_path": "a.safetensors", "model_weight": 0.5 } ]
            }"#,
        )
        .unwrap();
        let job = JobArgs {
            template: "txt2img".into(),
            request: Some(path),
            params: vec!["seed=2".into()],
        };
        let request = job.into_request().unwrap();
        assert_eq!(request.adapters.len(), 1);
        assert_eq!(request.adapters[0].model_strength(), 0.5);
        assert_eq!(request.parameters["seed"], json!(2));
    }

    #[tokio::test]
    async fn offline_compile_uses_saved_schema() {
        let dir = tempfile::tempdir().unwrap();
        let schema_path = dir.path().join("object_info.json");
        std::fs::write(
            &schema_path,
            r#"{ "LoraLoader": { "input": { "required": {} }, "output": ["MODEL", "CLIP"] } }"#,
        )
        .unwrap();
        let request_path = dir.path().join("req.json");
        std::fs::write(
            &request_path,
            r#"{
                "parameters": { "prompt": "x" },
                "adapters": [ { "file_path": "a.safetensors" } ]
            }"#,
        )
        .unwrap();

        let cli = Cli {
            cmd: Commands::Compile {
                job: JobArgs {
                    template: "txt2img".into(),
                    request: Some(request_path),
                    params: vec![],
                },
                schema: Some(schema_path),
            },
        };
        let config = WorkerConfig::from_lookup(|_| None).unwrap();
        let out = execute(cli, &config, &CancellationToken::new()).await.unwrap();

        assert_eq!(out["prompt"]["10"]["class_type"], "LoraLoader");
        assert_eq!(out["strategy"]["strategy"], "chained");
    }
}
