mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{bulk::BulkSubcommand, profile::ProfileSubcommand};
use qprofile_core::{QualityProfileKey, RuleKey, Severity};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "qprofile",
    about = "Quality profile rule activation: activate, inherit, bulk-edit, back up and restore",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .qprofile/ or .git/)
    #[arg(long, global = true, env = "QPROFILE_ROOT")]
    root: Option<PathBuf>,

    /// Login of the caller; admins are listed in .qprofile/config.yaml
    #[arg(long, global = true, env = "QPROFILE_USER")]
    user: Option<String>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .qprofile/ with config, an empty catalog and no profiles
    Init {
        /// Login granted profile administration (repeatable)
        #[arg(long = "admin")]
        admins: Vec<String>,
    },

    /// Manage quality profiles
    Profile {
        #[command(subcommand)]
        subcommand: ProfileSubcommand,
    },

    /// Activate a rule on a profile, or update its severity and params
    Activate {
        /// Profile as <language>:<name>
        #[arg(value_parser = cmd::parse_profile)]
        profile: QualityProfileKey,
        /// Rule as <repository>:<rule>
        rule: RuleKey,
        /// Severity (default: the rule's default severity)
        #[arg(long)]
        severity: Option<Severity>,
        /// Parameter override as name=value; an empty value resets it (repeatable)
        #[arg(long = "param", value_parser = cmd::parse_param)]
        params: Vec<(String, String)>,
    },

    /// Deactivate a rule on a profile
    Deactivate {
        #[arg(value_parser = cmd::parse_profile)]
        profile: QualityProfileKey,
        rule: RuleKey,
    },

    /// Show the active rules of a profile, or every profile a rule is active on
    Show {
        #[arg(value_parser = cmd::parse_profile, required_unless_present = "rule")]
        profile: Option<QualityProfileKey>,
        /// List bindings of this rule across profiles instead
        #[arg(long, conflicts_with = "profile")]
        rule: Option<RuleKey>,
    },

    /// Activate or deactivate every rule matching a query
    Bulk {
        #[command(subcommand)]
        subcommand: BulkSubcommand,
    },

    /// Write a profile backup (YAML) to stdout or a file
    Backup {
        #[arg(value_parser = cmd::parse_profile)]
        profile: QualityProfileKey,
        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Make a profile hold exactly the rules of a backup file
    Restore {
        #[arg(value_parser = cmd::parse_profile)]
        profile: QualityProfileKey,
        /// Backup file, or - for stdin
        file: PathBuf,
    },

    /// Rebuild the index of a profile from the store
    Resync {
        #[arg(value_parser = cmd::parse_profile)]
        profile: QualityProfileKey,
    },

    /// Print the monitoring attributes
    Monitor,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let user = cli.user.as_deref();

    let result = match cli.command {
        Commands::Init { admins } => cmd::init::run(&root, &admins),
        Commands::Profile { subcommand } => cmd::profile::run(&root, user, subcommand, cli.json),
        Commands::Activate {
            profile,
            rule,
            severity,
            params,
        } => cmd::rule::activate(&root, user, profile, rule, severity, params, cli.json),
        Commands::Deactivate { profile, rule } => {
            cmd::rule::deactivate(&root, user, profile, rule, cli.json)
        }
        Commands::Show { profile, rule } => cmd::rule::show(&root, user, profile, rule, cli.json),
        Commands::Bulk { subcommand } => cmd::bulk::run(&root, user, subcommand, cli.json),
        Commands::Backup { profile, output } => {
            cmd::backup::backup(&root, user, &profile, output.as_deref(), cli.json)
        }
        Commands::Restore { profile, file } => {
            cmd::backup::restore(&root, user, &profile, &file, cli.json)
        }
        Commands::Resync { profile } => cmd::profile::resync(&root, user, &profile, cli.json),
        Commands::Monitor => cmd::monitor::run(&root, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
