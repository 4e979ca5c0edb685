//! CLI definitions using clap.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use operant_reconciler::{Config, parse_bool};

/// operantctl - keep panel behaviors in line with the panel/subject/behavior table
#[derive(Parser, Debug)]
#[command(name = "operantctl")]
#[command(version)]
#[command(about = "Reconcile pyoperant behavior processes on magpi panel nodes")]
#[command(
    long_about = "Reads the panel/subject/behavior table, lists the behavior processes running on each magpi node, and reports what must be killed or started. Pass -k and -s to act on the report."
)]
pub struct Cli {
    /// Start behaviors that should be running (yes/true/t/y/1 or no/false/f/n/0)
    #[arg(
        short = 's',
        long = "start",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true",
        value_name = "BOOL",
        value_parser = parse_bool
    )]
    pub start: bool,

    /// Kill behaviors that should not be running
    #[arg(
        short = 'k',
        long = "kill",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true",
        value_name = "BOOL",
        value_parser = parse_bool
    )]
    pub kill: bool,

    /// Whether this machine is the gateway (default: true)
    #[arg(
        long = "is-magpi",
        alias = "is_magpi",
        num_args = 0..=1,
        default_missing_value = "true",
        value_name = "BOOL",
        value_parser = parse_bool
    )]
    pub is_magpi: Option<bool>,

    /// Location of the panel/subject/behavior table
    #[arg(long = "psb-loc", alias = "psb_loc", value_name = "PATH")]
    pub psb_loc: Option<PathBuf>,

    /// Config file (default: the user config directory's operantctl/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Abort on the first malformed table line
    #[arg(long)]
    pub strict: bool,

    /// Print the report and action outcomes as JSON
    #[arg(long)]
    pub json: bool,

    /// Maximum panels inspected at once
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Per-command SSH timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Single-dash long flags used by existing cron lines and wrappers.
const SINGLE_DASH_FLAGS: [(&str, &str); 2] =
    [("-is_magpi", "--is_magpi"), ("-psb_loc", "--psb_loc")];

/// Rewrite `-is_magpi` and `-psb_loc` (with or without `=value`) to their
/// double-dash forms. clap would otherwise read them as bundled short flags.
pub fn normalize_args<I, S>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            let Some(text) = arg.to_str() else {
                return arg;
            };
            SINGLE_DASH_FLAGS
                .iter()
                .find_map(|(single, double)| {
                    let rest = text.strip_prefix(single)?;
                    (rest.is_empty() || rest.starts_with('='))
                        .then(|| OsString::from(format!("{double}{rest}")))
                })
                .unwrap_or(arg)
        })
        .collect()
}

impl Cli {
    /// Layer command-line flags over a loaded config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(is_magpi) = self.is_magpi {
            config.is_magpi = is_magpi;
        }
        if let Some(path) = &self.psb_loc {
            config.table_path = path.display().to_string();
        }
        if self.strict {
            config.reconcile.strict = true;
        }
        if let Some(concurrency) = self.concurrency {
            config.reconcile.concurrency = concurrency;
        }
        if let Some(timeout) = self.timeout {
            config.ssh.command_timeout_secs = timeout;
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("operantctl").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_report_only() {
        let cli = parse(&[]);
        assert!(!cli.start);
        assert!(!cli.kill);
        assert_eq!(cli.is_magpi, None);
    }

    #[test]
    fn test_bare_flags_mean_true() {
        let cli = parse(&["-s", "-k"]);
        assert!(cli.start);
        assert!(cli.kill);
    }

    #[test]
    fn test_flag_values() {
        let cli = parse(&["-s", "no", "--kill", "Yes", "--is_magpi", "f"]);
        assert!(!cli.start);
        assert!(cli.kill);
        assert_eq!(cli.is_magpi, Some(false));
    }

    #[test]
    fn test_single_dash_long_flags() {
        let args = normalize_args([
            "operantctl",
            "-is_magpi",
            "False",
            "-psb_loc",
            "/tmp/psb",
            "-k",
        ]);
        let cli = Cli::try_parse_from(args).unwrap();

        assert_eq!(cli.is_magpi, Some(false));
        assert_eq!(cli.psb_loc, Some(PathBuf::from("/tmp/psb")));
        assert!(cli.kill);
    }

    #[test]
    fn test_single_dash_with_equals_and_bare() {
        let args = normalize_args(["operantctl", "-psb_loc=/tmp/psb", "-is_magpi"]);
        let cli = Cli::try_parse_from(args).unwrap();

        assert_eq!(cli.psb_loc, Some(PathBuf::from("/tmp/psb")));
        assert_eq!(cli.is_magpi, Some(true));
    }

    #[test]
    fn test_normalize_leaves_other_args_alone() {
        let args = normalize_args(["operantctl", "-s", "-is_magpix", "/data/-psb_loc"]);
        assert_eq!(args, vec!["operantctl", "-s", "-is_magpix", "/data/-psb_loc"]);
    }

    #[test]
    fn test_invalid_bool_rejected() {
        let result = Cli::try_parse_from(["operantctl", "-s", "perhaps"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_apply_overrides_config() {
        let cli = parse(&[
            "--psb_loc",
            "/tmp/psb",
            "--is-magpi",
            "0",
            "--strict",
            "--concurrency",
            "2",
            "--timeout",
            "7",
        ]);
        let mut config = Config::default();

        cli.apply(&mut config);

        assert_eq!(config.table_path, "/tmp/psb");
        assert!(!config.is_magpi);
        assert!(config.reconcile.strict);
        assert_eq!(config.reconcile.concurrency, 2);
        assert_eq!(config.ssh.command_timeout_secs, 7);
    }

    #[test]
    fn test_apply_without_flags_keeps_config() {
        let mut config = Config::default();
        parse(&[]).apply(&mut config);
        assert_eq!(config, Config::default());
    }
}
