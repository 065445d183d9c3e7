use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "spectool",
    version,
    about = "Gated cuts, identifier selectors and calibrations",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Debug output (repeat for more).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Log events as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// JSON session configuration; missing fields use defaults.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Project a matrix through gates, subtracting background gates.
    Cut(CutArgs),

    /// Resolve an identifier selector against a set of live ids.
    Ids(IdsArgs),

    /// Fit a calibration polynomial to channel/energy pairs.
    Calfit(CalfitArgs),

    /// Parse a calibration list file.
    Callist(CallistArgs),
}

#[derive(Args, Debug)]
pub struct CutArgs {
    /// Matrix as JSON.
    pub matrix: PathBuf,

    /// Axis the gates are set on: x, y or 0 for the matrix default.
    #[arg(long, default_value = "0")]
    pub axis: String,

    /// Foreground gate `lo:hi` (repeatable).
    #[arg(long = "gate", value_name = "LO:HI", value_parser = parse_interval, required = true)]
    pub gates: Vec<(f64, f64)>,

    /// Background gate `lo:hi` (repeatable).
    #[arg(long = "bg", value_name = "LO:HI", value_parser = parse_interval)]
    pub backgrounds: Vec<(f64, f64)>,

    /// Gates are energies in the calibration of the cut axis instead of channels.
    #[arg(long)]
    pub cal: bool,

    /// Output file (default: stdout).
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,

    /// Write the projected histogram bincode encoded instead of JSON; needs --out.
    #[arg(long, requires = "out")]
    pub binary: bool,
}

#[derive(Args, Debug)]
pub struct IdsArgs {
    /// Selector expression, e.g. "1-3,ACTIVE".
    pub selector: String,

    /// Live ids, comma separated.
    #[arg(long, value_delimiter = ',')]
    pub live: Vec<String>,

    /// Active id.
    #[arg(long)]
    pub active: Option<String>,

    /// Visible ids, comma separated.
    #[arg(long, value_delimiter = ',')]
    pub visible: Vec<String>,

    /// Keep ids that are not live.
    #[arg(long)]
    pub keep_missing: bool,
}

#[derive(Args, Debug)]
pub struct CalfitArgs {
    /// Channel/energy pair `ch:e` (repeatable).
    #[arg(long = "pair", value_name = "CH:E", value_parser = parse_interval, required = true)]
    pub pairs: Vec<(f64, f64)>,

    /// Polynomial degree; 0 fits only the offset with slope 1.
    #[arg(long, default_value_t = 1)]
    pub degree: usize,

    /// Print the fit as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CallistArgs {
    pub file: PathBuf,
}

/// Parses `a:b` into two numbers.
pub fn parse_interval(s: &str) -> Result<(f64, f64), String> {
    let (a, b) = s.split_once(':').ok_or_else(|| format!("expected LO:HI, got '{}'", s))?;
    let parse = |v: &str| {
        v.trim().parse::<f64>().map_err(|e| format!("invalid number '{}': {}", v.trim(), e))
    };
    Ok((parse(a)?, parse(b)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("10:20.5"), Ok((10.0, 20.5)));
        assert_eq!(parse_interval(" 30 : 5 "), Ok((30.0, 5.0)));
        assert_eq!(parse_interval("-3:-1"), Ok((-3.0, -1.0)));
        assert!(parse_interval("10-20").is_err());
        assert!(parse_interval("a:2").is_err());
    }

    #[test]
    fn test_cut_args() {
        let cli = Cli::try_parse_from([
            "spectool", "cut", "m.json", "--axis", "y", "--gate", "1:4", "--gate", "9:7", "--bg",
            "20:30",
        ])
        .unwrap();
        let Commands::Cut(args) = cli.command else {
            panic!("expected cut");
        };
        assert_eq!(args.axis, "y");
        assert_eq!(args.gates, vec![(1.0, 4.0), (9.0, 7.0)]);
        assert_eq!(args.backgrounds, vec![(20.0, 30.0)]);
        assert!(!args.cal);
    }

    #[test]
    fn test_cut_requires_gate() {
        assert!(Cli::try_parse_from(["spectool", "cut", "m.json"]).is_err());
        let no_out = ["spectool", "cut", "m.json", "--gate", "1:2", "--binary"];
        assert!(Cli::try_parse_from(no_out).is_err());
    }

    #[test]
    fn test_ids_args() {
        let args = ["spectool", "-v", "ids", "ALL", "--live", "0,1,2.1", "--active", "1"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.verbose, 1);
        let Commands::Ids(args) = cli.command else {
            panic!("expected ids");
        };
        assert_eq!(args.live, vec!["0", "1", "2.1"]);
        assert_eq!(args.active.as_deref(), Some("1"));
    }
}
