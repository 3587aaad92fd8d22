//! `reefsync watch`: boot everything and keep polling until Ctrl-C.

use std::time::Duration;

use serde_json::{Value, json};
use tracing::{info, warn};

use reefsync_core::Hub;

use super::Context;
use crate::cli::WatchArgs;
use crate::error::CliError;
use crate::output::{print_output, render};

/// Period of the status line printed while watching.
const STATUS_PERIOD: Duration = Duration::from_secs(60);

pub async fn handle(args: WatchArgs, ctx: &Context<'_>) -> Result<(), CliError> {
    for name in &args.devices {
        if !ctx.config.devices.contains_key(name) {
            return Err(CliError::UnknownDevice { name: name.clone() });
        }
    }

    let hub = Hub::new();
    let configs = ctx
        .config
        .device_configs()
        .map_err(|e| CliError::config(e, ctx.path))?;
    for device_config in configs {
        if !args.devices.is_empty() && !args.devices.contains(&device_config.id) {
            continue;
        }
        let id = device_config.id.clone();
        match hub.add_device(device_config).await {
            Ok(handle) => info!(device = %id, kind = %handle.kind(), "watching"),
            Err(e) => warn!(device = %id, error = %e, "boot failed, skipping"),
        }
    }

    if !args.no_cloud {
        if let Some(cloud) = ctx.config.cloud_config().map_err(|e| CliError::config(e, ctx.path))? {
            if let Err(e) = hub.add_cloud(&cloud).await {
                warn!(account = %cloud.id, error = %e, "cloud account unavailable");
            }
        }
    }

    for (name, group) in &ctx.config.virtuals {
        let booted = group.members.iter().all(|m| hub.device(m).is_some());
        if !booted {
            warn!(group = %name, "not every member booted, group skipped");
            continue;
        }
        if let Err(e) = hub.add_virtual(name, &group.members) {
            warn!(group = %name, error = %e, "could not build group");
        }
    }

    if hub.registry().is_empty() {
        hub.shutdown().await;
        return Err(CliError::Device {
            message: "no device could be booted".into(),
        });
    }

    let mut status = tokio::time::interval(STATUS_PERIOD);
    loop {
        tokio::select! {
            biased;
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "could not listen for Ctrl-C");
                }
                break;
            }
            _ = status.tick() => {
                print_output(&render(ctx.format, &status_json(&hub).await));
            }
        }
    }

    info!("stopping");
    hub.shutdown().await;
    Ok(())
}

async fn status_json(hub: &Hub) -> Value {
    let mut devices = Vec::new();
    for handle in hub.registry().handles() {
        let in_error = handle.lock().await.in_error();
        devices.push(json!({
            "id": handle.id(),
            "kind": handle.kind().to_string(),
            "hwid": handle.hwid().map(|h| h.to_string()),
            "in_error": in_error,
            "link": handle.link_state().to_string(),
        }));
    }
    Value::Array(devices)
}
