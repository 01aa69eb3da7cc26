//! CAN interface bring-up through `ip link`

use crate::types::{LoggerError, Result};
use std::process::Command;

/// Configures a SocketCAN interface with the `ip` tool
#[derive(Debug, Clone)]
pub struct LinkManager {
    channel: String,
    bitrate: u32,
    use_sudo: bool,
    ip_program: String,
}

impl LinkManager {
    pub fn new(channel: impl Into<String>, bitrate: u32) -> Self {
        Self {
            channel: channel.into(),
            bitrate,
            use_sudo: false,
            ip_program: "ip".to_string(),
        }
    }

    /// Run the commands through `sudo`
    pub fn with_sudo(mut self, use_sudo: bool) -> Self {
        self.use_sudo = use_sudo;
        self
    }

    /// Use another binary in place of `ip`
    pub fn with_ip_program(mut self, program: impl Into<String>) -> Self {
        self.ip_program = program.into();
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn bitrate(&self) -> u32 {
        self.bitrate
    }

    /// `ip` arguments taking the interface down
    pub fn down_args(&self) -> Vec<String> {
        ["link", "set", self.channel.as_str(), "down"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// `ip` arguments bringing the interface up at the configured bitrate
    pub fn up_args(&self) -> Vec<String> {
        let mut args = vec![
            "link".to_string(),
            "set".to_string(),
            self.channel.clone(),
            "up".to_string(),
            "type".to_string(),
            "can".to_string(),
            "bitrate".to_string(),
        ];
        args.push(self.bitrate.to_string());
        args
    }

    /// Reset the interface: down (failure ignored), then up
    pub fn bring_up(&self) -> Result<()> {
        if let Err(e) = self.run(&self.down_args()) {
            log::debug!("Ignoring failed pre-reset of {}: {}", self.channel, e);
        }
        self.run(&self.up_args())?;
        log::info!("{} is up at {} bit/s", self.channel, self.bitrate);
        Ok(())
    }

    /// Take the interface down
    pub fn bring_down(&self) -> Result<()> {
        self.run(&self.down_args())?;
        log::info!("{} is down", self.channel);
        Ok(())
    }

    fn run(&self, args: &[String]) -> Result<()> {
        let mut command = if self.use_sudo {
            let mut c = Command::new("sudo");
            c.arg(&self.ip_program);
            c
        } else {
            Command::new(&self.ip_program)
        };
        command.args(args);
        log::debug!("Running {:?}", command);

        let output = command.output().map_err(|e| {
            LoggerError::LinkError(format!("cannot run {}: {}", self.ip_program, e))
        })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(LoggerError::LinkError(format!(
                "{} {} exited with {}: {}",
                self.ip_program,
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}
