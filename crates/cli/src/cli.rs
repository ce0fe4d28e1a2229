use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::{Path, PathBuf};

/// dccached: configuration cache and check scheduler
///
/// Keeps an in-memory copy of the monitoring configuration synchronized with
/// a rows file and schedules checks, proxy polls, trigger timers, discovery
/// rules and web tests from it.
#[derive(Debug, Parser, Clone)]
#[command(about, long_about, version)]
pub struct Cli {
    /// Path to configuration file.
    ///
    /// Defaults and `DCCACHE_` environment variables apply when omitted.
    #[arg(short, long, value_parser = validate_file)]
    pub conffile: Option<PathBuf>,

    /// TOML file holding the configuration rows, one table per section.
    #[arg(short, long, value_parser = validate_file)]
    pub rows: PathBuf,

    /// Synchronize once, report the cache status and exit.
    #[arg(long)]
    pub once: bool,

    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,
}

/// Check if the file exists.
#[inline(always)]
fn validate_file(file: &str) -> Result<PathBuf, String> {
    let path = Path::new(file);
    if path.is_file() {
        Ok(path.to_owned())
    } else {
        Err(format!("File not found: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn rows_file_is_required() {
        assert!(Cli::try_parse_from(["dccached"]).is_err());
    }

    #[test]
    fn parses_once_and_rows() {
        let rows = NamedTempFile::new().unwrap();
        let cli = Cli::try_parse_from([
            "dccached",
            "--rows",
            rows.path().to_str().unwrap(),
            "--once",
            "-vv",
        ])
        .unwrap();
        assert!(cli.once);
        assert_eq!(cli.rows, rows.path());
        assert!(cli.conffile.is_none());
    }

    #[test]
    fn missing_files_are_rejected() {
        let err = Cli::try_parse_from(["dccached", "--rows", "/nonexistent/rows.toml"]);
        assert!(err.is_err());
    }
}
