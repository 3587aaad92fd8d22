//! One-shot device commands: boot, act, print.

use std::time::Duration;

use serde_json::{Value, json};
use tracing::debug;

use reefsync_core::{CoreError, DataPath, FetchReport, Hub, LinkState};

use super::{Context, parse_value};
use crate::cli::{GetArgs, PressArgs, PushArgs, RefreshArgs, SetArgs, WaveArgs};
use crate::error::CliError;
use crate::output::{print_output, render};

/// How long `wave --cloud` waits for the account to pick the pump up.
const LINK_WAIT: Duration = Duration::from_secs(15);

fn parse_path(raw: &str) -> Result<DataPath, CliError> {
    Ok(raw.parse::<DataPath>()?)
}

pub async fn get(args: GetArgs, ctx: &Context<'_>) -> Result<(), CliError> {
    let path = parse_path(&args.path)?;

    let value = if ctx.is_group(&args.device) {
        let hub = Hub::new();
        let group = ctx.boot_group(&hub, &args.device).await;
        let value = match group {
            Ok(group) => group.get_data(&path, args.missing_ok).await.map_err(CliError::from),
            Err(e) => Err(e),
        };
        hub.shutdown().await;
        value?
    } else {
        ctx.boot(&args.device).await?.get_data(&path, args.missing_ok)?
    };

    print_output(&render(ctx.format, &value.unwrap_or(Value::Null)));
    Ok(())
}

pub async fn set(args: SetArgs, ctx: &Context<'_>) -> Result<(), CliError> {
    let path = parse_path(&args.path)?;
    let value = parse_value(&args.value);

    let push_source = match (args.push, path.source_name()) {
        (Some(method), Some(source)) => Some((source.to_owned(), method)),
        (Some(_), None) => {
            return Err(CliError::Validation {
                field: "--push".into(),
                reason: format!("{path} is not inside a source"),
            });
        }
        (None, _) => None,
    };

    let mut device = ctx.boot(&args.device).await?;
    device.set_data(&path, value)?;
    if let Some((source, method)) = push_source {
        debug!(device = %args.device, %source, "pushing after set");
        device.push_values(&source, method.into()).await?;
    }

    let stored = device.get_data(&path, true)?.unwrap_or(Value::Null);
    print_output(&render(ctx.format, &stored));
    Ok(())
}

pub async fn push(args: PushArgs, ctx: &Context<'_>) -> Result<(), CliError> {
    let mut device = ctx.boot(&args.device).await?;
    device.push_values(&args.source, args.method.into()).await?;
    let reply = device
        .get_data(&DataPath::message(""), true)?
        .unwrap_or(Value::Null);
    print_output(&render(ctx.format, &reply));
    Ok(())
}

pub async fn press(args: PressArgs, ctx: &Context<'_>) -> Result<(), CliError> {
    if ctx.is_group(&args.device) {
        let hub = Hub::new();
        let result = match ctx.boot_group(&hub, &args.device).await {
            Ok(group) => group.press(&args.action).await.map_err(CliError::from),
            Err(e) => Err(e),
        };
        hub.shutdown().await;
        return result;
    }

    let mut device = ctx.boot(&args.device).await?;
    device.press(&args.action, args.head).await?;
    Ok(())
}

pub async fn refresh(args: RefreshArgs, ctx: &Context<'_>) -> Result<(), CliError> {
    let mut device = ctx.boot(&args.device).await?;

    let report = if args.config {
        device.fetch_config(args.source.as_deref()).await?
    } else {
        if let Some(source) = &args.source {
            if device.sources().get(source).is_none() {
                return Err(CoreError::UnknownSource { name: source.clone() }.into());
            }
            device.set_quick_refresh(source.clone());
        }
        device.refresh().await
    };

    print_output(&render(ctx.format, &report_json(&report)));
    if report.is_complete() {
        Ok(())
    } else {
        Err(CliError::Device {
            message: format!("{} source(s) could not be refreshed", report.failed.len()),
        })
    }
}

pub async fn wave(args: WaveArgs, ctx: &Context<'_>) -> Result<(), CliError> {
    let hub = Hub::new();
    let result = apply_wave(&hub, &args, ctx).await;
    hub.shutdown().await;
    result
}

async fn apply_wave(hub: &Hub, args: &WaveArgs, ctx: &Context<'_>) -> Result<(), CliError> {
    let device_config = ctx
        .config
        .device_config(&args.device)
        .map_err(|e| CliError::config(e, ctx.path))?;
    let handle = hub.add_device(device_config).await?;

    if args.cloud {
        let cloud = ctx
            .config
            .cloud_config()
            .map_err(|e| CliError::config(e, ctx.path))?
            .ok_or_else(|| CliError::NotLinked {
                device: args.device.clone(),
            })?;
        hub.add_cloud(&cloud).await?;

        let deadline = tokio::time::Instant::now() + LINK_WAIT;
        while handle.link_state() != LinkState::Linked && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    handle.set_wave(args.cloud).await?;
    Ok(())
}

fn report_json(report: &FetchReport) -> Value {
    let failed: Vec<Value> = report
        .failed
        .iter()
        .map(|(source, err)| json!({ "source": source, "error": err.to_string() }))
        .collect();
    json!({ "fetched": report.fetched, "failed": failed })
}
