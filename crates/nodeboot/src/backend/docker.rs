//! Container runtime backed by the `docker` CLI.

use crate::backend::ContainerRuntime;
use crate::error::{Error, Result};
use crate::payload::{BootstrapPayload, RegistryCredentials};
use std::io::Write;
use std::process::{Command, Stdio};

/// Shell command that installs the engine
const INSTALL_SCRIPT: &str = "apt-get update -q && DEBIAN_FRONTEND=noninteractive apt-get install -y -q docker.io";

/// Runtime that shells out to `docker`, the system package manager and
/// `systemctl`.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    /// Path to the docker executable
    docker: String,
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self {
            docker: "docker".to_string(),
        }
    }
}

impl DockerRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a command and return stdout on success.
    ///
    /// `stdin` is written to the child's standard input; `env` is added to
    /// the child's environment. Neither appears in the argument list.
    fn run(&self, step: &str, program: &str, args: &[String], stdin: Option<&str>, env: &[(&str, &str)]) -> Result<String> {
        log::debug!("{step}: {program} {}", args.join(" "));
        let mut child = Command::new(program)
            .args(args)
            .envs(env.iter().copied())
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Runtime {
                step: step.to_string(),
                stderr: format!("failed to execute {program}: {e}"),
            })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::from_command_output(&stderr, step));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn docker(&self, step: &str, args: &[String]) -> Result<String> {
        self.run(step, &self.docker, args, None, &[])
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| (*a).to_string()).collect()
}

/// Arguments for `docker login`; the token is read from stdin
pub fn login_args(credentials: &RegistryCredentials) -> Vec<String> {
    strings(&[
        "login",
        &credentials.server,
        "--username",
        &credentials.username,
        "--password-stdin",
    ])
}

/// Arguments for `docker run`.
///
/// Environment entries are passed as bare `-e KEY`, so docker copies the
/// value from its own environment.
pub fn run_args(payload: &BootstrapPayload) -> Vec<String> {
    let mut args = strings(&[
        "run",
        "--detach",
        "--name",
        &payload.container_name,
        "--restart",
        &payload.restart,
    ]);
    for port in &payload.ports {
        args.push("--publish".to_string());
        args.push(format!("{}:{}", port.host, port.container));
    }
    for key in payload.environment.keys() {
        args.push("--env".to_string());
        args.push(key.clone());
    }
    args.push(payload.image.clone());
    args
}

impl ContainerRuntime for DockerRuntime {
    fn is_installed(&self) -> Result<bool> {
        Ok(self.docker("version", &strings(&["version", "--format", "{{.Server.Version}}"])).is_ok())
    }

    fn install(&self) -> Result<()> {
        self.run("install", "sh", &strings(&["-c", INSTALL_SCRIPT]), None, &[])?;
        self.run("install", "systemctl", &strings(&["enable", "--now", "docker"]), None, &[])?;
        Ok(())
    }

    fn login(&self, credentials: &RegistryCredentials) -> Result<()> {
        self.run(
            "login",
            &self.docker,
            &login_args(credentials),
            Some(credentials.token.expose()),
            &[],
        )?;
        Ok(())
    }

    fn pull(&self, image: &str) -> Result<()> {
        self.docker("pull", &strings(&["pull", "--quiet", image]))?;
        Ok(())
    }

    fn remove_container(&self, name: &str) -> Result<bool> {
        match self.docker("remove", &strings(&["rm", "--force", name])) {
            Ok(_) => Ok(true),
            Err(Error::NotFound { .. }) => Ok(false),
            Err(Error::Runtime { stderr, .. }) if stderr.to_lowercase().contains("no such container") => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn run_container(&self, payload: &BootstrapPayload) -> Result<String> {
        let env: Vec<(&str, &str)> = payload
            .environment
            .iter()
            .map(|(k, v)| (k.as_str(), v.expose()))
            .collect();
        self.run("run", &self.docker, &run_args(payload), None, &env)
    }
}
