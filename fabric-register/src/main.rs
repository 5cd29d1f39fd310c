//! `tekton-register`: registration helper for Tekton components.

mod cli;
mod hermes;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fabric_config::{StartupManifest, hermes_url};
use fabric_registry::{HeartbeatConfig, HeartbeatController};

use cli::{Cli, Command};
use hermes::HermesClient;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Register {
            component,
            config,
            hermes_url,
        } => register(&component, config, hermes_url).await,
        Command::Unregister {
            component,
            hermes_url,
        } => unregister(&component, hermes_url).await,
        Command::Status {
            component,
            hermes_url,
        } => status(&component, hermes_url).await,
        Command::Generate {
            component,
            name,
            port,
            output,
        } => generate(&component, name.as_deref(), port, output),
        Command::List { hermes_url } => list(hermes_url).await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn endpoint(flag: Option<String>) -> String {
    flag.unwrap_or_else(hermes_url)
}

fn load_manifest(component: &str, config: Option<PathBuf>) -> anyhow::Result<StartupManifest> {
    let manifest = match config {
        Some(path) => StartupManifest::load(&path)
            .with_context(|| format!("loading manifest from {}", path.display()))?,
        None => StartupManifest::discover(component)
            .with_context(|| format!("discovering manifest for `{component}`"))?,
    };
    manifest.validate()?;
    anyhow::ensure!(
        manifest.component.id == component,
        "manifest declares id `{}` but `{component}` was requested",
        manifest.component.id
    );
    Ok(manifest)
}

fn token_path(component: &str) -> PathBuf {
    fabric_config::tekton_root()
        .join(".tekton")
        .join("tokens")
        .join(format!("{component}.token"))
}

async fn persist_token(component: &str, controller: &HeartbeatController) {
    // The first registration attempt may still be retrying; wait briefly.
    for _ in 0..50 {
        if let Some(token) = controller.token().await {
            let path = token_path(component);
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Err(err) = std::fs::write(&path, token) {
                error!(component, %err, "could not persist registration token");
            }
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
}

async fn register(
    component: &str,
    config: Option<PathBuf>,
    hermes_flag: Option<String>,
) -> anyhow::Result<()> {
    let manifest = load_manifest(component, config)?;
    let descriptor = manifest.to_descriptor()?;

    let client = Arc::new(HermesClient::new(endpoint(hermes_flag)));
    let controller =
        HeartbeatController::new(client, descriptor, HeartbeatConfig::default());
    controller.start().await?;
    persist_token(component, &controller).await;

    info!(component, "registration active; press Ctrl+C to unregister and exit");
    wait_for_shutdown_signal().await;

    info!(component, "shutting down; unregistering");
    controller.shutdown().await;
    let _ = std::fs::remove_file(token_path(component));
    Ok(())
}

async fn unregister(component: &str, hermes_flag: Option<String>) -> anyhow::Result<()> {
    // A standalone unregister relies on the token persisted by `register`.
    let path = token_path(component);
    let token = std::fs::read_to_string(&path).with_context(|| {
        format!(
            "no persisted token at {}; unregister from the owning process",
            path.display()
        )
    })?;

    let client = HermesClient::new(endpoint(hermes_flag));
    let id = component.parse()?;
    fabric_registry::RegistrationTransport::unregister(&client, &id, token.trim()).await?;
    let _ = std::fs::remove_file(path);
    println!("Component {component} unregistered");
    Ok(())
}

async fn status(component: &str, hermes_flag: Option<String>) -> anyhow::Result<()> {
    let client = HermesClient::new(endpoint(hermes_flag));
    let status = client.status(component).await?;
    print_status(component, &status);
    Ok(())
}

async fn list(hermes_flag: Option<String>) -> anyhow::Result<()> {
    let client = HermesClient::new(endpoint(hermes_flag));
    let components = client.list().await?;
    println!("{}", serde_json::to_string_pretty(&components)?);
    Ok(())
}

fn generate(
    component: &str,
    name: Option<&str>,
    port: u16,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let manifest = StartupManifest::template(component, name.unwrap_or(component), port);
    manifest.validate()?;
    let yaml = manifest.to_yaml()?;

    match output {
        Some(path) => {
            std::fs::write(&path, yaml)
                .with_context(|| format!("writing manifest to {}", path.display()))?;
            println!("Manifest written to {}", path.display());
        }
        None => print!("{yaml}"),
    }
    Ok(())
}

fn print_status(component: &str, status: &Value) {
    println!("Component: {component}");
    println!(
        "Registered: {}",
        status.get("registered").and_then(Value::as_bool).unwrap_or(false)
    );
    if let Some(details) = status.get("details").filter(|d| d.is_object()) {
        println!("\nDetails:");
        for key in ["name", "version", "description", "endpoint"] {
            if let Some(value) = details.get(key).and_then(Value::as_str) {
                println!("  {key}: {value}");
            }
        }
        if let Some(capabilities) = details.get("capabilities").and_then(Value::as_array) {
            println!("  capabilities: {}", capabilities.len());
            for capability in capabilities {
                println!("    - {capability}");
            }
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate =
        signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
        _ = terminate.recv() => info!("received SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("received interrupt");
}
