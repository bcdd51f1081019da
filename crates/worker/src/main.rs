use atelier_worker::cli::{execute, Cli};
use atelier_worker::config::WorkerConfig;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout stays clean JSON.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "atelier_worker=debug,atelier_pipeline=debug,\
                 atelier_comfyui=info,atelier_core=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = WorkerConfig::from_env()?;
    tracing::debug!(
        comfyui_url = %config.comfyui_url,
        output_dir = %config.output_dir.display(),
        "Worker configured",
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    let output = execute(cli, &config, &cancel).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
