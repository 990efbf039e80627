//! Bootstrap payload and startup script rendering
//!
//! The payload is generated once per compute apply and embedded in each
//! node's startup data. It carries secrets, so every type that can hold one
//! redacts it in `Debug` output.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

/// Environment key for the pooled database connection
pub const DATABASE_URL: &str = "DATABASE_URL";
/// Environment key for the direct (unpooled) database connection
pub const DIRECT_URL: &str = "DIRECT_URL";
pub const AUTH_SECRET_KEY: &str = "AUTH_SECRET_KEY";
pub const AUTH_PUBLIC_KEY: &str = "AUTH_PUBLIC_KEY";
pub const PAYMENT_SECRET_KEY: &str = "PAYMENT_SECRET_KEY";
pub const PAYMENT_PUBLIC_KEY: &str = "PAYMENT_PUBLIC_KEY";

const REDACTED: &str = "***";
const HEREDOC_MARKER: &str = "TIERSTACK_PAYLOAD_EOF";

static IMAGE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:[._-][a-z0-9]+)*(?::[0-9]+)?(?:/[a-z0-9]+(?:[._-][a-z0-9]+)*)*(?::[A-Za-z0-9_][A-Za-z0-9_.-]{0,127})?(?:@sha256:[a-f0-9]{64})?$")
        .expect("image reference regex is valid")
});

static ENV_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("env key regex is valid"));

static CONTAINER_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*$").expect("container name regex is valid")
});

/// A secret string; `Debug` and `Display` never show it
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The clear-text value. Only hand this to a stdin pipe or a child environment.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({REDACTED})")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

/// A container environment value
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum EnvValue {
    Literal(String),
    Secret(Secret),
}

impl EnvValue {
    /// The value to place in the container's environment
    pub fn expose(&self) -> &str {
        match self {
            Self::Literal(v) => v,
            Self::Secret(s) => s.expose(),
        }
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, Self::Secret(_))
    }
}

impl fmt::Debug for EnvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Self::Secret(s) => f.debug_tuple("Secret").field(s).finish(),
        }
    }
}

/// Credentials for the image registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCredentials {
    /// Registry host, e.g. `ghcr.io`
    pub server: String,
    pub username: String,
    pub token: Secret,
}

/// Host to container port publication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

fn default_restart() -> String {
    "unless-stopped".to_string()
}

/// Everything a node needs to reach a running container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapPayload {
    /// Logical container name; a rerun replaces the container with this name
    pub container_name: String,
    /// Container image reference
    pub image: String,
    pub registry: RegistryCredentials,
    /// Runtime environment, in key order
    #[serde(default)]
    pub environment: BTreeMap<String, EnvValue>,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    #[serde(default = "default_restart")]
    pub restart: String,
}

impl BootstrapPayload {
    /// Start a payload for an image
    pub fn new(container_name: impl Into<String>, image: impl Into<String>, registry: RegistryCredentials) -> Self {
        Self {
            container_name: container_name.into(),
            image: image.into(),
            registry,
            environment: BTreeMap::new(),
            ports: Vec::new(),
            restart: default_restart(),
        }
    }

    /// Add a literal environment value
    pub fn literal(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), EnvValue::Literal(value.into()));
        self
    }

    /// Add a secret environment value
    pub fn secret(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), EnvValue::Secret(Secret::new(value)));
        self
    }

    /// Publish a container port on the host
    pub fn port(mut self, host: u16, container: u16) -> Self {
        self.ports.push(PortMapping { host, container });
        self
    }

    /// The database connection URL handed to the container, if any
    pub fn database_connection_url(&self) -> Option<&str> {
        self.environment.get(DATABASE_URL).map(EnvValue::expose)
    }

    /// Check names, references and credentials
    pub fn validate(&self) -> Result<()> {
        if !CONTAINER_NAME.is_match(&self.container_name) {
            return Err(Error::Config(format!("invalid container name '{}'", self.container_name)));
        }
        if !IMAGE_REFERENCE.is_match(&self.image) {
            return Err(Error::Config(format!("invalid image reference '{}'", self.image)));
        }
        if self.registry.server.is_empty() || self.registry.username.is_empty() {
            return Err(Error::Config("registry server and username are required".to_string()));
        }
        if self.registry.token.is_empty() {
            return Err(Error::Config("registry token is empty".to_string()));
        }
        if let Some(key) = self.environment.keys().find(|k| !ENV_KEY.is_match(k)) {
            return Err(Error::Config(format!("invalid environment key '{key}'")));
        }
        Ok(())
    }

    /// Every secret value carried by the payload
    pub fn secrets(&self) -> Vec<&str> {
        let mut secrets = vec![self.registry.token.expose()];
        secrets.extend(
            self.environment
                .values()
                .filter(|v| v.is_secret())
                .map(EnvValue::expose),
        );
        secrets.retain(|s| !s.is_empty());
        secrets
    }

    /// Mask every secret value occurring in `text`
    pub fn redact(&self, text: &str) -> String {
        self.secrets()
            .into_iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret, REDACTED))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let payload: Self = serde_json::from_str(json)?;
        payload.validate()?;
        Ok(payload)
    }

    /// Load and validate a payload file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

/// Where the startup script puts things on the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDataOptions {
    /// Node agent executable
    pub agent_path: String,
    /// Root-only file holding the payload
    pub payload_path: String,
    /// Append-only bootstrap journal
    pub journal_path: String,
}

impl Default for UserDataOptions {
    fn default() -> Self {
        Self {
            agent_path: "/usr/local/bin/tierstack".to_string(),
            payload_path: "/etc/tierstack/payload.json".to_string(),
            journal_path: "/var/log/tierstack-bootstrap.log".to_string(),
        }
    }
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Render the node startup script.
///
/// The script writes the payload to a file only root can read, then hands
/// over to the node agent. Secrets stay in that file and never appear on a
/// command line.
pub fn render_user_data(payload: &BootstrapPayload, options: &UserDataOptions) -> Result<String> {
    payload.validate()?;
    let json = payload.to_json()?;
    if json.contains(HEREDOC_MARKER) {
        return Err(Error::Config("payload contains the heredoc terminator".to_string()));
    }

    let payload_path = shell_quote(&options.payload_path);
    let journal_path = shell_quote(&options.journal_path);
    let agent = shell_quote(&options.agent_path);

    Ok(format!(
        "#!/bin/sh\n\
         set -eu\n\
         umask 077\n\
         mkdir -p \"$(dirname {payload_path})\"\n\
         cat > {payload_path} <<'{HEREDOC_MARKER}'\n\
         {json}\n\
         {HEREDOC_MARKER}\n\
         chmod 0400 {payload_path}\n\
         exec {agent} node bootstrap --payload {payload_path} --journal {journal_path}\n"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> BootstrapPayload {
        BootstrapPayload::new(
            "shop-api",
            "ghcr.io/acme/shop-api:1.4.2",
            RegistryCredentials {
                server: "ghcr.io".to_string(),
                username: "deploy".to_string(),
                token: Secret::new("ghp_registrytoken"),
            },
        )
        .secret(DATABASE_URL, "postgres://app:pw@db.internal:5432/shop")
        .literal(AUTH_PUBLIC_KEY, "pk_live_public")
        .secret(AUTH_SECRET_KEY, "sk_live_secret")
        .port(80, 8080)
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug = format!("{:?}", payload());
        assert!(!debug.contains("ghp_registrytoken"));
        assert!(!debug.contains("sk_live_secret"));
        assert!(!debug.contains("pw@"));
        assert!(debug.contains("pk_live_public"));
    }

    #[test]
    fn test_json_round_trip_keeps_secrets() {
        let payload = payload();
        let back = BootstrapPayload::from_json(&payload.to_json().unwrap()).unwrap();
        assert_eq!(back, payload);
        assert_eq!(
            back.database_connection_url(),
            Some("postgres://app:pw@db.internal:5432/shop")
        );
    }

    #[test]
    fn test_validate_rejects_bad_image() {
        let mut bad = payload();
        bad.image = "ghcr.io/Acme/API latest".to_string();
        assert!(matches!(bad.validate(), Err(Error::Config(_))));

        let mut digest = payload();
        digest.image = format!("registry.local:5000/shop/api@sha256:{}", "a".repeat(64));
        digest.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_env_key() {
        let bad = payload().literal("NOT-A-KEY", "x");
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_redact() {
        let payload = payload();
        let text = "login with ghp_registrytoken failed; url postgres://app:pw@db.internal:5432/shop";
        let redacted = payload.redact(text);
        assert!(!redacted.contains("ghp_registrytoken"));
        assert!(!redacted.contains("pw@db"));
        assert_eq!(redacted, "login with *** failed; url ***");
    }

    #[test]
    fn test_user_data_hands_payload_to_agent() {
        let script = render_user_data(&payload(), &UserDataOptions::default()).unwrap();
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("umask 077"));
        assert!(script.contains("\"container_name\": \"shop-api\""));
        assert!(script.contains(
            "exec '/usr/local/bin/tierstack' node bootstrap --payload '/etc/tierstack/payload.json'"
        ));

        // Secrets are only inside the quoted heredoc, never on the exec line
        let exec_line = script.lines().find(|l| l.starts_with("exec ")).unwrap();
        assert!(!exec_line.contains("ghp_registrytoken"));
    }
}
