//! Command dispatch and the helpers shared by device commands.

pub mod config_cmd;
pub mod device;
pub mod watch;

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use reefsync_config::Config;
use reefsync_core::{Device, Hub, Method, VirtualLed};

use crate::cli::{Command, OutputFormat, PushMethod};
use crate::error::CliError;

/// Route a device command to its handler.
pub async fn dispatch(cmd: Command, config: &Config, path: &Path, format: OutputFormat) -> Result<(), CliError> {
    let ctx = Context { config, path, format };
    match cmd {
        Command::Watch(args) => watch::handle(args, &ctx).await,
        Command::Get(args) => device::get(args, &ctx).await,
        Command::Set(args) => device::set(args, &ctx).await,
        Command::Push(args) => device::push(args, &ctx).await,
        Command::Press(args) => device::press(args, &ctx).await,
        Command::Refresh(args) => device::refresh(args, &ctx).await,
        Command::Wave(args) => device::wave(args, &ctx).await,
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}

/// What every handler needs besides its arguments.
pub struct Context<'a> {
    pub config: &'a Config,
    pub path: &'a Path,
    pub format: OutputFormat,
}

impl Context<'_> {
    /// Build and boot the device named `name`.
    pub async fn boot(&self, name: &str) -> Result<Device, CliError> {
        let device_config = self
            .config
            .device_config(name)
            .map_err(|e| CliError::config(e, self.path))?;
        let mut device = Device::new(device_config)?;
        device.get_initial_data().await?;
        Ok(device)
    }

    /// Boot the members of virtual group `name` into `hub`.
    pub async fn boot_group(&self, hub: &Hub, name: &str) -> Result<Arc<VirtualLed>, CliError> {
        let profile = self
            .config
            .virtuals
            .get(name)
            .ok_or_else(|| CliError::UnknownDevice { name: name.to_owned() })?;
        for member in &profile.members {
            let device_config = self
                .config
                .device_config(member)
                .map_err(|e| CliError::config(e, self.path))?;
            hub.add_device(device_config).await?;
        }
        Ok(hub.add_virtual(name, &profile.members)?)
    }

    pub fn is_group(&self, name: &str) -> bool {
        self.config.virtuals.contains_key(name)
    }
}

impl From<PushMethod> for Method {
    fn from(method: PushMethod) -> Self {
        match method {
            PushMethod::Post => Method::Post,
            PushMethod::Put => Method::Put,
            PushMethod::Patch => Method::Patch,
            PushMethod::Delete => Method::Delete,
        }
    }
}

/// Parse a command-line value: JSON when it parses, a bare string otherwise.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn values_parse_as_json_or_string() {
        assert_eq!(parse_value("12.5"), json!(12.5));
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value(r#"{"white": 40}"#), json!({"white": 40}));
        assert_eq!(parse_value("auto"), json!("auto"));
    }
}
