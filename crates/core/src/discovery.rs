//! Database server instance and port discovery.
//!
//! Lookups go through the Windows registry via `reg query`, executed by a
//! [`CommandRunner`] so they work against a remote host as well. Output is
//! line-oriented: a header line naming the key, then whitespace-separated
//! `name  type  value` records.

use tracing::{debug, info};

use crate::command::{argv, CommandRunner};
use crate::config::{ConnectionTarget, HostCapability, ProductVersion, ResolvedTarget};
use crate::error::{ConfigError, DenormaliseError, DiscoveryError};

/// Registry key listing installed server instances.
pub const INSTANCE_NAMES_KEY: &str =
    r"HKLM\Software\Microsoft\Microsoft SQL Server\Instance Names\SQL";

/// Registry key holding an instance's TCP settings.
pub fn tcp_settings_key(instance: &str) -> String {
    format!(
        r"HKLM\SOFTWARE\Microsoft\Microsoft SQL Server\{instance}\MSSQLServer\SuperSocketNetLib\Tcp"
    )
}

pub struct InstanceResolver<'a> {
    runner: &'a dyn CommandRunner,
    capability: HostCapability,
}

impl<'a> InstanceResolver<'a> {
    pub fn new(runner: &'a dyn CommandRunner, capability: HostCapability) -> Self {
        Self { runner, capability }
    }

    /// Fill in whatever `target` leaves unset.
    ///
    /// Without a host, this machine must be declared capable of serving the
    /// database; that check applies even when instance and port are given.
    pub fn resolve(
        &self,
        target: &ConnectionTarget,
        version: ProductVersion,
    ) -> Result<ResolvedTarget, DenormaliseError> {
        if target.host.is_none() && !self.capability.local_server {
            return Err(ConfigError::HostRequired.into());
        }

        let instance = match &target.instance {
            Some(instance) => instance.clone(),
            None => self.resolve_instance(version)?,
        };
        info!(instance = %instance, "Using SQL server instance");

        let port = match target.port {
            Some(port) => port,
            None => self.resolve_port(&instance)?,
        };
        info!(port, "Using SQL server port");

        Ok(ResolvedTarget {
            host: target.host.clone(),
            instance,
            port,
        })
    }

    /// First instance, in registry output order, whose version token
    /// matches `version`.
    pub fn resolve_instance(&self, version: ProductVersion) -> Result<String, DiscoveryError> {
        let output = self
            .runner
            .execute(&argv(["reg", "query", INSTANCE_NAMES_KEY]))?;
        let expected = version.server_version_token();

        for line in output.lines().skip(1) {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [name, _, version_token, ..] = fields.as_slice() else {
                continue;
            };
            let found = version_token.split('.').next().unwrap_or_default();
            debug!(instance = %name, version = %found, "Found SQL server instance");
            if found == expected {
                return Ok((*name).to_string());
            }
        }

        Err(DiscoveryError::NoSuitableInstance { expected })
    }

    /// TCP port configured for `instance`: third field of the first record.
    pub fn resolve_port(&self, instance: &str) -> Result<u16, DiscoveryError> {
        let key = tcp_settings_key(instance);
        let output = self.runner.execute(&argv(["reg", "query", key.as_str()]))?;

        let port = output
            .lines()
            .nth(1)
            .and_then(|line| line.split_whitespace().nth(2))
            .and_then(|field| field.parse::<u16>().ok());

        port.ok_or_else(|| DiscoveryError::MalformedPortQuery {
            instance: instance.to_string(),
            output,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
