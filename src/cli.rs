use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tierstack")]
#[command(version)]
#[command(about = "Provision a three-tier application stack and bootstrap its nodes", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Stack configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "TIERSTACK_CONFIG",
        default_value = "tierstack.toml"
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check the configuration, the module graph and the security topology
    Validate,

    /// Show the modules apply would run, in order
    Plan(PlanArgs),

    /// Provision every module that is not applied yet
    Apply(ApplyArgs),

    /// Tear down every applied module in reverse apply order
    Destroy(DestroyArgs),

    /// Show the outputs of applied modules
    Outputs(OutputsArgs),

    /// Print the node startup script with secrets masked
    RenderUserData,

    /// Commands that run on a provisioned node
    #[command(subcommand)]
    Node(NodeCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct PlanArgs {
    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Show the plan without creating anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct DestroyArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args)]
pub struct OutputsArgs {
    /// Print outputs as JSON (sensitive values stay masked)
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum NodeCommand {
    /// Install the container runtime, log in, pull and run the service
    Bootstrap(BootstrapArgs),
}

#[derive(Args)]
pub struct BootstrapArgs {
    /// Bootstrap payload written by the startup script
    #[arg(long, default_value = "/etc/tierstack/payload.json")]
    pub payload: PathBuf,

    /// Append-only journal of bootstrap steps
    #[arg(long, default_value = "/var/log/tierstack-bootstrap.log")]
    pub journal: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_flags() {
        let cli = Cli::try_parse_from(["tierstack", "apply", "--yes", "--dry-run"]).unwrap();
        match cli.command {
            Command::Apply(args) => {
                assert!(args.yes);
                assert!(args.dry_run);
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["tierstack", "plan", "--config", "stacks/shop.toml", "-vv"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("stacks/shop.toml"));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_node_bootstrap_defaults() {
        let cli = Cli::try_parse_from(["tierstack", "node", "bootstrap"]).unwrap();
        match cli.command {
            Command::Node(NodeCommand::Bootstrap(args)) => {
                assert_eq!(args.payload, PathBuf::from("/etc/tierstack/payload.json"));
                assert_eq!(args.journal, PathBuf::from("/var/log/tierstack-bootstrap.log"));
            }
            _ => panic!("expected node bootstrap"),
        }
    }
}
