//! Config subcommand handlers.

use std::io::BufRead;
use std::path::Path;

use serde_json::{Value, json};

use reefsync_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, OutputFormat};
use crate::error::CliError;
use crate::output::{print_output, render};

pub fn handle(args: ConfigArgs, config: &Config, path: &Path, format: OutputFormat) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            print_output(&path.display().to_string());
            Ok(())
        }
        ConfigCommand::Show => {
            print_output(&render(format, &redacted(config)));
            Ok(())
        }
        ConfigCommand::SetPassword { username } => {
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            let password = line.trim_end_matches(['\r', '\n']);
            if password.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "empty password on stdin".into(),
                });
            }
            reefsync_config::store_cloud_password(&username, password).map_err(|e| CliError::config(e, path))?;
            eprintln!("Password stored for {username}");
            Ok(())
        }
    }
}

/// Config as JSON with the cloud password masked.
fn redacted(config: &Config) -> Value {
    let devices: serde_json::Map<String, Value> = config
        .devices
        .iter()
        .map(|(name, p)| {
            let entry = json!({
                "ip": p.ip,
                "kind": p.kind.to_string(),
                "model": p.model,
                "hwid": p.hwid,
                "heads_nb": p.heads_nb,
                "live_config": p.live_config,
                "scan_interval": p.scan_interval.unwrap_or(config.defaults.scan_interval),
            });
            (name.clone(), entry)
        })
        .collect();

    let cloud = config.cloud.as_ref().map(|c| {
        json!({
            "username": c.username,
            "password": c.password.as_ref().map(|_| "****"),
            "host": c.host,
        })
    });

    let virtuals: serde_json::Map<String, Value> = config
        .virtuals
        .iter()
        .map(|(name, g)| (name.clone(), json!(g.members)))
        .collect();

    json!({
        "defaults": {
            "timeout": config.defaults.timeout,
            "retries": config.defaults.retries,
            "retry_delay_ms": config.defaults.retry_delay_ms,
            "scan_interval": config.defaults.scan_interval,
            "command_grace_ms": config.defaults.command_grace_ms,
            "insecure": config.defaults.insecure,
        },
        "devices": devices,
        "cloud": cloud,
        "virtual": virtuals,
    })
}
