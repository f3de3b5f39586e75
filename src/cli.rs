use crate::config::source::ConfigSource;
use crate::core::supervisor::Supervisor;
use crate::core::types::SupervisorOptions;
use crate::kernel::process;
use crate::observability::log::init_logger;
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;

/// Environment variable whose presence enables manual mode.
pub const MANUAL_MODE_ENV: &str = "NANOINIT_MANUAL_MODE";

const PROGRAM_NAME: &str = "nanoinit";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Relaxed-JSON file listing the applications to supervise
    #[arg(short = 'c', long, env = "NANOINIT_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Slash-separated path of the object holding the application list
    #[arg(
        short = 'j',
        long,
        env = "NANOINIT_CONFIG_JSON_OBJECT",
        value_name = "SELECTOR"
    )]
    pub config_json_object: Option<String>,

    /// Write log records to this file instead of stderr
    #[arg(short = 'l', long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Do not auto-start applications marked manual
    #[arg(short = 'm', long)]
    pub manual_mode: bool,

    /// Ask the running instance to reload its configuration, then exit
    #[arg(short = 'r', long, conflicts_with = "check_config")]
    pub reload: bool,

    /// Verbosity: 0 errors, 1 application errors, 2 info
    #[arg(short = 'v', long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub verbose: u8,

    /// Print the projected configuration as JSON and exit
    #[arg(long)]
    pub check_config: bool,
}

impl Cli {
    /// Manual mode is on if either the flag or the environment asks for it.
    pub fn manual_mode_resolved(&self, env_present: bool) -> bool {
        self.manual_mode || env_present
    }

    pub fn config_source(&self) -> ConfigSource {
        ConfigSource::new(self.config_file.clone(), self.config_json_object.as_deref())
    }
}

pub fn run() -> Result<()> {
    if !cfg!(unix) {
        bail!("{} requires a Unix-like system", PROGRAM_NAME);
    }

    let cli = Cli::parse();
    init_logger(cli.verbose, cli.log_path.as_deref());

    if cli.reload {
        let pid = process::send_reload(PROGRAM_NAME)
            .with_context(|| format!("failed to reload running {}", PROGRAM_NAME))?;
        println!("reload requested (pid {})", pid);
        return Ok(());
    }

    let source = cli.config_source();

    if cli.check_config {
        let config = source.try_load().context("configuration rejected")?;
        println!("{}", serde_json::to_string_pretty(&config)?);
        if config.is_empty() {
            bail!("configuration contains no applications");
        }
        return Ok(());
    }

    let options = SupervisorOptions {
        manual_mode: cli.manual_mode_resolved(std::env::var_os(MANUAL_MODE_ENV).is_some()),
        ..SupervisorOptions::default()
    };
    let mut supervisor = Supervisor::new(options).context("failed to start supervisor")?;
    supervisor.run(&source)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("nanoinit").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_short_flags() {
        let cli = parse(&["-c", "/etc/ni.json", "-j", "apps", "-l", "/tmp/ni.log", "-v", "2"]);
        assert_eq!(cli.config_file, Some(PathBuf::from("/etc/ni.json")));
        assert_eq!(cli.config_json_object.as_deref(), Some("apps"));
        assert_eq!(cli.log_path, Some(PathBuf::from("/tmp/ni.log")));
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config_source().selector(), "/apps");
    }

    #[test]
    fn test_verbosity_is_bounded() {
        let result = Cli::try_parse_from(["nanoinit", "-v", "3"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_reload_conflicts_with_check_config() {
        let result = Cli::try_parse_from(["nanoinit", "--reload", "--check-config"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_manual_mode_resolution() {
        let cli = parse(&[]);
        assert!(!cli.manual_mode_resolved(false));
        assert!(cli.manual_mode_resolved(true));
        assert!(parse(&["-m"]).manual_mode_resolved(false));
    }
}
