//! Stack configuration (`tierstack.toml`)
//!
//! The file never carries secret values. The `[credentials]` section names
//! the environment variables that hold them; they are read at apply time.

use anyhow::{Context, Result, bail};
use netpolicy::{Cidr, EgressPolicy, SecurityTopology, SubnetPlan, Tier};
use nodeboot::{Secret, UserDataOptions};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static PROJECT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]{1,30}[a-z0-9]$").expect("project name regex is valid"));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    /// Project identifier, tagged on every resource
    pub project: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    pub region: String,
    /// Where apply state, the local provider and the SSH key live
    #[serde(default)]
    pub state_dir: Option<String>,
    pub network: NetworkConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub load_balancer: LoadBalancerConfig,
    pub compute: ComputeConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
}

fn default_environment() -> String {
    "production".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub vpc_cidr: Cidr,
    pub zones: Vec<String>,
    /// Explicit subnet blocks; carved from the VPC when all three are empty
    #[serde(default)]
    pub public_cidrs: Vec<Cidr>,
    #[serde(default)]
    pub app_cidrs: Vec<Cidr>,
    #[serde(default)]
    pub db_cidrs: Vec<Cidr>,
    #[serde(default = "default_subnets_per_tier")]
    pub subnets_per_tier: u32,
    #[serde(default = "default_subnet_prefix")]
    pub subnet_prefix: u8,
}

fn default_subnets_per_tier() -> u32 {
    2
}

fn default_subnet_prefix() -> u8 {
    24
}

impl NetworkConfig {
    /// Subnet allocation, explicit or carved, checked against the invariants
    pub fn subnet_plan(&self) -> netpolicy::Result<SubnetPlan> {
        let explicit = !(self.public_cidrs.is_empty() && self.app_cidrs.is_empty() && self.db_cidrs.is_empty());
        if explicit {
            SubnetPlan::allocate(
                self.vpc_cidr,
                &self.zones,
                &self.public_cidrs,
                &self.app_cidrs,
                &self.db_cidrs,
            )
        } else {
            SubnetPlan::carve(self.vpc_cidr, &self.zones, self.subnets_per_tier, self.subnet_prefix)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Address blocks allowed to reach the bastion
    pub admin_cidrs: Vec<Cidr>,
    /// Port the nodes serve on, reachable from the public tier
    pub app_port: u16,
    /// Outbound policy of the database group
    pub db_egress: EgressPolicy,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            admin_cidrs: Vec::new(),
            app_port: 80,
            db_egress: EgressPolicy::DenyAll,
        }
    }
}

impl SecurityConfig {
    /// The security topology the Security module provisions
    pub fn topology(&self, db_port: u16) -> SecurityTopology {
        let mut topology = SecurityTopology::three_tier(self.app_port, db_port, &self.admin_cidrs);
        topology.set_egress(Tier::Db, self.db_egress);
        topology
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub engine: String,
    pub engine_version: String,
    pub instance_class: String,
    /// Storage in GiB
    pub allocated_storage: u32,
    pub port: u16,
    pub name: String,
    pub username: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            engine: "postgres".to_string(),
            engine_version: "16.3".to_string(),
            instance_class: "db.t3.micro".to_string(),
            allocated_storage: 20,
            port: 5432,
            name: "app".to_string(),
            username: "app".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    pub listener_port: u16,
    pub health_check_path: String,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            listener_port: 80,
            health_check_path: "/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeConfig {
    /// Container image reference, e.g. `ghcr.io/acme/shop-api:1.4.2`
    pub image: String,
    pub registry_server: String,
    pub registry_username: String,
    /// Port the container listens on
    #[serde(default = "default_container_port")]
    pub container_port: u16,
    pub machine_image: String,
    #[serde(default = "default_instance_type")]
    pub instance_type: String,
    #[serde(default = "default_bastion_instance_type")]
    pub bastion_instance_type: String,
    #[serde(default = "default_min_size")]
    pub min_size: u32,
    #[serde(default = "default_min_size")]
    pub desired_capacity: u32,
    #[serde(default = "default_max_size")]
    pub max_size: u32,
    /// Node agent location on the machine image
    #[serde(default = "default_agent_path")]
    pub agent_path: String,
}

fn default_container_port() -> u16 {
    3000
}

fn default_instance_type() -> String {
    "t3.small".to_string()
}

fn default_bastion_instance_type() -> String {
    "t3.micro".to_string()
}

fn default_min_size() -> u32 {
    2
}

fn default_max_size() -> u32 {
    4
}

fn default_agent_path() -> String {
    UserDataOptions::default().agent_path
}

/// Names of the environment variables carrying each secret
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub db_password_env: String,
    pub registry_token_env: String,
    pub auth_secret_key_env: String,
    pub auth_public_key_env: String,
    pub payment_secret_key_env: String,
    pub payment_public_key_env: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            db_password_env: "TIERSTACK_DB_PASSWORD".to_string(),
            registry_token_env: "TIERSTACK_REGISTRY_TOKEN".to_string(),
            auth_secret_key_env: "TIERSTACK_AUTH_SECRET_KEY".to_string(),
            auth_public_key_env: "TIERSTACK_AUTH_PUBLIC_KEY".to_string(),
            payment_secret_key_env: "TIERSTACK_PAYMENT_SECRET_KEY".to_string(),
            payment_public_key_env: "TIERSTACK_PAYMENT_PUBLIC_KEY".to_string(),
        }
    }
}

impl CredentialsConfig {
    fn names(&self) -> [&str; 6] {
        [
            self.db_password_env.as_str(),
            self.registry_token_env.as_str(),
            self.auth_secret_key_env.as_str(),
            self.auth_public_key_env.as_str(),
            self.payment_secret_key_env.as_str(),
            self.payment_public_key_env.as_str(),
        ]
    }

    /// Variables that are not set (or empty) in the process environment
    pub fn missing(&self) -> Vec<String> {
        self.names()
            .into_iter()
            .filter(|name| std::env::var(name).map(|v| v.is_empty()).unwrap_or(true))
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// In-process provider persisted next to the state, for rehearsal
    #[default]
    Local,
    /// Provisioning API over HTTP
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub endpoint: Option<String>,
    /// Environment variable holding the API bearer token
    pub token_env: String,
    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Local,
            endpoint: None,
            token_env: "TIERSTACK_PROVIDER_TOKEN".to_string(),
            retry_attempts: 5,
            retry_delay_secs: 15,
        }
    }
}

/// Secret values read from the environment
#[derive(Debug, Clone)]
pub struct Secrets {
    pub db_password: Secret,
    pub registry_token: Secret,
    pub auth_secret_key: Secret,
    pub auth_public_key: Secret,
    pub payment_secret_key: Secret,
    pub payment_public_key: Secret,
}

impl Secrets {
    /// Read every secret from the process environment
    pub fn from_env(credentials: &CredentialsConfig) -> Result<Self> {
        Self::from_lookup(credentials, |name| std::env::var(name).ok())
    }

    /// Read every secret through `lookup`; a missing or empty value is an error
    pub fn from_lookup(credentials: &CredentialsConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let read = |name: &str| -> Result<Secret> {
            match lookup(name) {
                Some(value) if !value.is_empty() => Ok(Secret::new(value)),
                _ => bail!("Environment variable {name} is not set"),
            }
        };

        Ok(Self {
            db_password: read(&credentials.db_password_env)?,
            registry_token: read(&credentials.registry_token_env)?,
            auth_secret_key: read(&credentials.auth_secret_key_env)?,
            auth_public_key: read(&credentials.auth_public_key_env)?,
            payment_secret_key: read(&credentials.payment_secret_key_env)?,
            payment_public_key: read(&credentials.payment_public_key_env)?,
        })
    }

    /// Empty values for commands that build the graph but never render it
    pub fn placeholder() -> Self {
        Self {
            db_password: Secret::new(""),
            registry_token: Secret::new(""),
            auth_secret_key: Secret::new(""),
            auth_public_key: Secret::new(""),
            payment_secret_key: Secret::new(""),
            payment_public_key: Secret::new(""),
        }
    }
}

impl StackConfig {
    /// Load and parse a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid stack configuration: {}", path.display()))
    }

    /// Load a configuration file and validate it
    pub fn load_valid(path: &Path) -> Result<Self> {
        let config = Self::load(path)?;
        config.validate()?;
        log::debug!("Loaded stack '{}' from {}", config.project, path.display());
        Ok(config)
    }

    /// Check every section, including the subnet and security invariants
    pub fn validate(&self) -> Result<()> {
        if !PROJECT_NAME.is_match(&self.project) {
            bail!(
                "Invalid project name '{}': use 3-32 lowercase letters, digits and dashes",
                self.project
            );
        }
        if self.region.is_empty() {
            bail!("region must not be empty");
        }

        self.network.subnet_plan().context("Invalid network configuration")?;
        self.security
            .topology(self.database.port)
            .validate()
            .context("Invalid security configuration")?;

        if self.database.port == 0 || self.security.app_port == 0 || self.compute.container_port == 0 {
            bail!("ports must be non-zero");
        }
        if self.database.username.is_empty() || self.database.name.is_empty() {
            bail!("database name and username are required");
        }

        let compute = &self.compute;
        if compute.min_size == 0 {
            bail!("compute.min_size must be at least 1");
        }
        if !(compute.min_size <= compute.desired_capacity && compute.desired_capacity <= compute.max_size) {
            bail!(
                "compute scaling bounds must satisfy min <= desired <= max (got {} / {} / {})",
                compute.min_size,
                compute.desired_capacity,
                compute.max_size
            );
        }
        if compute.image.is_empty() || compute.registry_server.is_empty() || compute.registry_username.is_empty() {
            bail!("compute.image, compute.registry_server and compute.registry_username are required");
        }

        if self.provider.kind == ProviderKind::Http && self.provider.endpoint.as_deref().is_none_or(str::is_empty) {
            bail!("provider.endpoint is required for the http provider");
        }
        Ok(())
    }

    /// Resolved state directory
    pub fn state_dir(&self) -> Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(PathBuf::from(shellexpand::tilde(dir).as_ref())),
            None => {
                let base = dirs::data_local_dir().context("Could not determine local data directory")?;
                Ok(base.join("tierstack").join(&self.project))
            }
        }
    }

    /// Startup script locations on the node
    pub fn user_data_options(&self) -> UserDataOptions {
        UserDataOptions {
            agent_path: self.compute.agent_path.clone(),
            ..UserDataOptions::default()
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) const EXAMPLE: &str = r#"
project = "shop"
region = "eu-west-1"

[network]
vpc_cidr = "10.0.0.0/16"
zones = ["eu-west-1a", "eu-west-1b"]
public_cidrs = ["10.0.1.0/24", "10.0.2.0/24"]
app_cidrs = ["10.0.3.0/24", "10.0.4.0/24"]
db_cidrs = ["10.0.5.0/24", "10.0.6.0/24"]

[security]
admin_cidrs = ["203.0.113.0/24"]
app_port = 80

[compute]
image = "ghcr.io/acme/shop-api:1.4.2"
registry_server = "ghcr.io"
registry_username = "deploy"
machine_image = "ami-0abc1234"
"#;

    pub(crate) fn example() -> StackConfig {
        toml::from_str(EXAMPLE).unwrap()
    }

    #[test]
    fn test_parse_example_with_defaults() {
        let config = example();
        assert_eq!(config.environment, "production");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.security.db_egress, EgressPolicy::DenyAll);
        assert_eq!(config.compute.desired_capacity, 2);
        assert_eq!(config.provider.kind, ProviderKind::Local);
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tierstack.toml");
        fs::write(&path, EXAMPLE).unwrap();

        let config = StackConfig::load_valid(&path).unwrap();
        assert_eq!(config.project, "shop");
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = StackConfig::load(Path::new("/nonexistent/tierstack.toml")).unwrap_err();
        assert!(err.to_string().contains("Could not read"));
    }

    #[test]
    fn test_carved_subnets_when_none_given() {
        let mut config = example();
        config.network.public_cidrs.clear();
        config.network.app_cidrs.clear();
        config.network.db_cidrs.clear();

        let plan = config.network.subnet_plan().unwrap();
        assert_eq!(plan.allocations().len(), 6);
        assert_eq!(plan.allocations()[0].cidr.to_string(), "10.0.1.0/24");
    }

    #[test]
    fn test_overlapping_subnets_rejected() {
        let mut config = example();
        config.network.db_cidrs = vec!["10.0.3.0/24".parse().unwrap(), "10.0.6.0/24".parse().unwrap()];
        let err = config.validate().unwrap_err();
        assert!(format!("{err:#}").contains("overlap"));
    }

    #[test]
    fn test_single_zone_rejected() {
        let mut config = example();
        config.network.zones.truncate(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scaling_bounds() {
        let mut config = example();
        config.compute.desired_capacity = 9;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min <= desired <= max"));
    }

    #[test]
    fn test_http_provider_needs_endpoint() {
        let mut config = example();
        config.provider.kind = ProviderKind::Http;
        assert!(config.validate().is_err());
        config.provider.endpoint = Some("https://provision.example.com".to_string());
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_project_name() {
        let mut config = example();
        config.project = "Shop_API".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_state_dir() {
        let mut config = example();
        config.state_dir = Some("/var/lib/tierstack/shop".to_string());
        assert_eq!(config.state_dir().unwrap(), PathBuf::from("/var/lib/tierstack/shop"));
    }

    #[test]
    fn test_secrets_from_lookup() {
        let credentials = CredentialsConfig::default();
        let secrets = Secrets::from_lookup(&credentials, |name| Some(format!("value-of-{name}"))).unwrap();
        assert_eq!(secrets.db_password.expose(), "value-of-TIERSTACK_DB_PASSWORD");
        assert!(!format!("{secrets:?}").contains("value-of"));

        let err = Secrets::from_lookup(&credentials, |_| None).unwrap_err();
        assert!(err.to_string().contains("TIERSTACK_DB_PASSWORD"));
    }
}
