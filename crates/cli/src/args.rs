use std::path::PathBuf;

use clap::Parser;

use nvptools_core::command::DEFAULT_REMOTE_COPY;
use nvptools_core::config::{
    ConnectionTarget, Credentials, HostCapability, ProductVersion, RunConfig, DEFAULT_DB_PASSWORD,
    DEFAULT_DB_USER,
};
use nvptools_core::error::ConfigError;
use nvptools_core::policy::EntityCategory;
use nvptools_core::sqlcmd::DEFAULT_WORK_DIR;
use nvptools_core::transform::DEFAULT_TRANSFORM_PROGRAM;

#[derive(Parser, Debug)]
#[command(name = "denormalise-nvp")]
#[command(about = "Create an NVivo for Windows project from a normalised SQLite file")]
pub struct Args {
    /// Log verbosity: 0 warnings only, 1 progress, 2+ debug
    #[arg(short, long, default_value_t = 1)]
    pub verbosity: u8,

    /// NVivo version (10 or 11)
    #[arg(long, env = "NVT_NVIVO_VERSION", default_value = "10")]
    pub nvivoversion: String,

    /// IP address/name of the Microsoft SQL Server host
    #[arg(short = 'S', long, env = "NVT_SERVER")]
    pub server: Option<String>,

    /// Port of Microsoft SQL Server
    #[arg(short = 'P', long, env = "NVT_PORT")]
    pub port: Option<u16>,

    /// Microsoft SQL Server instance
    #[arg(short, long, env = "NVT_INSTANCE")]
    pub instance: Option<String>,

    /// A SQL Server runs on this machine (always assumed on Windows)
    #[arg(long, env = "NVT_LOCAL_SERVER")]
    pub local_server: bool,

    /// User action: skip, merge, overwrite or replace
    #[arg(short, long)]
    pub users: Option<String>,

    /// Project action: skip or overwrite
    #[arg(short, long)]
    pub project: Option<String>,

    /// Node category action: skip, merge or overwrite
    #[arg(long)]
    pub node_categories: Option<String>,

    /// Node action: skip or merge
    #[arg(short, long)]
    pub nodes: Option<String>,

    /// Node attribute action: skip, merge or overwrite
    #[arg(long)]
    pub node_attributes: Option<String>,

    /// Source category action: skip, merge or overwrite
    #[arg(long)]
    pub source_categories: Option<String>,

    /// Source action: skip, merge or overwrite
    #[arg(long)]
    pub sources: Option<String>,

    /// Source attribute action: skip, merge or overwrite
    #[arg(long)]
    pub source_attributes: Option<String>,

    /// Tagging action: skip or merge
    #[arg(short, long)]
    pub taggings: Option<String>,

    /// Annotation action: skip or merge
    #[arg(short, long)]
    pub annotations: Option<String>,

    /// Base NVP file to insert into
    #[arg(short, long = "base")]
    pub basefile: Option<PathBuf>,

    /// Directory holding the empty template projects
    #[arg(long, env = "NVT_TEMPLATE_DIR")]
    pub template_dir: Option<PathBuf>,

    /// Do not produce a comments logfile
    #[arg(long)]
    pub no_comments: bool,

    /// Program that performs the transform
    #[arg(long, env = "NVT_TRANSFORM_PROGRAM", default_value = DEFAULT_TRANSFORM_PROGRAM)]
    pub transform_program: PathBuf,

    /// Argument passed to the transform program (repeatable)
    #[arg(long = "transform-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub transform_args: Vec<String>,

    /// Remote shell used to reach --server
    #[arg(long, env = "NVT_REMOTE_SHELL", default_value = "ssh")]
    pub remote_shell: String,

    /// File copy program used to move files to and from --server
    #[arg(long, env = "NVT_REMOTE_COPY", default_value = DEFAULT_REMOTE_COPY)]
    pub remote_copy: String,

    /// Directory on the database host for staged database files
    #[arg(long, env = "NVT_SERVER_WORK_DIR", default_value = DEFAULT_WORK_DIR)]
    pub server_work_dir: String,

    /// Database login used by the transform
    #[arg(long, env = "NVT_DB_USER", default_value = DEFAULT_DB_USER)]
    pub db_user: String,

    /// Database password used by the transform
    #[arg(long, env = "NVT_DB_PASSWORD", default_value = DEFAULT_DB_PASSWORD, hide_env_values = true)]
    pub db_password: String,

    /// Input normalised SQLite (.norm) file
    pub infile: PathBuf,

    /// Output NVivo (.nvp) file
    pub outfile: Option<PathBuf>,
}

impl Args {
    /// Filter used when `RUST_LOG` is not set.
    pub fn default_log_filter(&self) -> String {
        let level = match self.verbosity {
            0 => "warn",
            1 => "info",
            _ => "debug",
        };
        format!("nvptools_core={level},denormalise_nvp={level}")
    }

    /// Category choices given on the command line, by wire name.
    pub fn choices(&self) -> Vec<(String, String)> {
        [
            (EntityCategory::User, &self.users),
            (EntityCategory::Project, &self.project),
            (EntityCategory::NodeCategory, &self.node_categories),
            (EntityCategory::Node, &self.nodes),
            (EntityCategory::NodeAttribute, &self.node_attributes),
            (EntityCategory::SourceCategory, &self.source_categories),
            (EntityCategory::Source, &self.sources),
            (EntityCategory::SourceAttribute, &self.source_attributes),
            (EntityCategory::Tagging, &self.taggings),
            (EntityCategory::Annotation, &self.annotations),
        ]
        .into_iter()
        .filter_map(|(category, action)| {
            action
                .as_ref()
                .map(|action| (category.as_str().to_string(), action.clone()))
        })
        .collect()
    }

    pub fn run_config(&self) -> Result<RunConfig, ConfigError> {
        let mut config = RunConfig::new(&self.infile);
        config.output = self.outfile.clone();
        config.template = self.basefile.clone();
        config.template_dir = self.template_dir.clone().unwrap_or_else(executable_dir);
        config.product_version = ProductVersion::from_str(&self.nvivoversion)?;
        config.target = ConnectionTarget {
            host: self.server.clone(),
            port: self.port,
            instance: self.instance.clone(),
        };
        config.capability = HostCapability {
            local_server: self.local_server || cfg!(windows),
        };
        config.credentials = Credentials {
            user: self.db_user.clone(),
            password: self.db_password.clone(),
        };
        config.choices = self.choices();
        config.write_comments = !self.no_comments;
        Ok(config)
    }
}

/// Directory of the running executable, where default templates ship.
fn executable_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("denormalise-nvp").chain(args.iter().copied()))
            .expect("parse args")
    }

    #[test]
    fn minimal_invocation_uses_defaults() {
        let args = parse(&["A.norm"]);
        let config = args.run_config().expect("config");
        assert_eq!(config.input, PathBuf::from("A.norm"));
        assert_eq!(config.output_path(), PathBuf::from("A.nvp"));
        assert_eq!(config.product_version, ProductVersion::V10);
        assert_eq!(config.target, ConnectionTarget::default());
        assert!(config.choices.is_empty());
        assert!(config.write_comments);
        assert_eq!(config.credentials, Credentials::default());
    }

    #[test]
    fn connection_flags_fill_target() {
        let args = parse(&["-S", "dbhost", "-P", "1444", "-i", "NVIVO", "A.norm", "B.nvp"]);
        let config = args.run_config().expect("config");
        assert_eq!(config.target.host.as_deref(), Some("dbhost"));
        assert_eq!(config.target.port, Some(1444));
        assert_eq!(config.target.instance.as_deref(), Some("NVIVO"));
        assert_eq!(config.output_path(), PathBuf::from("B.nvp"));
    }

    #[test]
    fn category_flags_become_choices() {
        let args = parse(&["-u", "replace", "--node-categories", "skip", "-a", "skip", "A.norm"]);
        assert_eq!(
            args.choices(),
            vec![
                ("users".to_string(), "replace".to_string()),
                ("node_categories".to_string(), "skip".to_string()),
                ("annotations".to_string(), "skip".to_string()),
            ]
        );
    }

    #[test]
    fn unknown_version_is_config_error() {
        let args = parse(&["--nvivoversion", "12", "A.norm"]);
        assert_matches!(args.run_config(), Err(ConfigError::UnknownProductVersion(_)));
    }

    #[test]
    fn local_server_flag_sets_capability() {
        let args = parse(&["--local-server", "A.norm"]);
        let config = args.run_config().expect("config");
        assert!(config.capability.local_server);
    }

    #[test]
    fn verbosity_selects_log_level() {
        assert!(parse(&["-v", "0", "A.norm"]).default_log_filter().contains("=warn"));
        assert!(parse(&["A.norm"]).default_log_filter().contains("=info"));
        assert!(parse(&["-v", "3", "A.norm"]).default_log_filter().contains("=debug"));
    }

    #[test]
    fn transform_args_accept_hyphens() {
        let args = parse(&[
            "--transform-program",
            "python",
            "--transform-arg",
            "-m",
            "--transform-arg",
            "nvivotools.denormalise",
            "A.norm",
        ]);
        assert_eq!(args.transform_program, PathBuf::from("python"));
        assert_eq!(args.transform_args, vec!["-m", "nvivotools.denormalise"]);
    }

    #[test]
    fn remote_copy_defaults_to_scp() {
        assert_eq!(parse(&["A.norm"]).remote_copy, "scp");
        assert_eq!(parse(&["--remote-copy", "pscp", "A.norm"]).remote_copy, "pscp");
    }

    #[test]
    fn no_comments_disables_sidecar() {
        let config = parse(&["--no-comments", "A.norm"]).run_config().expect("config");
        assert!(!config.write_comments);
    }
}
