use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{Result, ShortlistError};

/// Something that can show a URL to the user.
pub trait Launcher {
    fn open(&self, url: &str) -> Result<()>;
}

/// Spawns the configured command, or the platform opener, and does not wait.
pub struct SystemBrowser {
    command: Option<String>,
}

impl SystemBrowser {
    pub fn new(command: Option<String>) -> Self {
        SystemBrowser {
            command: command.filter(|c| !c.trim().is_empty()),
        }
    }

    fn build(&self, url: &str) -> Command {
        if let Some(custom) = &self.command {
            let mut parts = custom.split_whitespace();
            let program = parts.next().unwrap_or_default();
            let mut cmd = Command::new(program);
            cmd.args(parts).arg(url);
            return cmd;
        }
        platform_opener(std::env::consts::OS, url)
    }
}

/// `open` on macOS, `explorer` on Windows, `xdg-open` elsewhere. The URL is one
/// argument and never goes through a shell.
fn platform_opener(os: &str, url: &str) -> Command {
    let program = match os {
        "macos" => "open",
        "windows" => "explorer",
        _ => "xdg-open",
    };
    let mut cmd = Command::new(program);
    cmd.arg(url);
    cmd
}

impl Launcher for SystemBrowser {
    fn open(&self, url: &str) -> Result<()> {
        let mut cmd = self.build(url);
        debug!("launching {:?}", cmd);
        let spawned = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(_child) => Ok(()),
            Err(e) => Err(ShortlistError::Browser(format!(
                "{}: {}",
                cmd.get_program().to_string_lossy(),
                e
            ))),
        }
    }
}
