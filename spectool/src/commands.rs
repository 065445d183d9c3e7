use std::io::Write;
use std::path::Path;

use itertools::Itertools;
use tracing::{debug, info};

use speccore::calibration::fitting::fit_calibration;
use speccore::calibration::list::read_cal_list;
use speccore::config::SessionConfig;
use speccore::cut::engine::{AxisSelector, CutEngine};
use speccore::cut::region::RegionMarker;
use speccore::data::matrix::MatrixSource;
use speccore::ident::collection::Collection;
use speccore::ident::identifier::Identifier;
use speccore::ident::selector::resolve_ids;

use crate::cli::{CalfitArgs, CallistArgs, Cli, Commands, CutArgs, IdsArgs};
use crate::matrix_file::{CutOutput, MatrixFile};

pub fn load_config(path: Option<&Path>) -> Result<SessionConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            let config: SessionConfig = serde_json::from_str(&text)?;
            debug!(path = %path.display(), "loaded configuration");
            Ok(config)
        }
        None => Ok(SessionConfig::default()),
    }
}

pub fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Cut(args) => cut(&config, args),
        Commands::Ids(args) => ids(&config, args),
        Commands::Calfit(args) => calfit(args),
        Commands::Callist(args) => callist(args),
    }
}

fn cut(config: &SessionConfig, args: CutArgs) -> Result<(), Box<dyn std::error::Error>> {
    let axis: AxisSelector = args.axis.parse()?;
    let matrix = MatrixFile::read(&args.matrix)?.into_matrix()?;
    let cut_axis = axis.resolve(&matrix);

    let cal = if args.cal { matrix.calibration(cut_axis) } else { None };
    let marker = |&(lo, hi): &(f64, f64)| {
        if args.cal {
            RegionMarker::from_cal(lo, hi, cal.as_ref())
        } else {
            RegionMarker::from_uncal(lo, hi, None)
        }
    };
    let gates: Vec<RegionMarker> = args.gates.iter().map(&marker).collect();
    let backgrounds: Vec<RegionMarker> = args.backgrounds.iter().map(&marker).collect();

    let result = CutEngine::new(config.cut.clone()).execute(&matrix, &gates, &backgrounds, axis)?;
    info!("{}", result.info());

    let output = CutOutput {
        axis: result.axis,
        fg_bins: result.fg_bins,
        bg_bins: result.bg_bins,
        bg_factor: result.bg_factor,
        calibration: result.calibration.map(|c| c.snapshot().coefficients().to_vec()),
        hist: result.hist,
    };

    match (&args.out, args.binary) {
        (Some(path), true) => {
            let bytes = bincode::encode_to_vec(&output.hist, bincode::config::standard())?;
            std::fs::write(path, bytes)?;
        }
        (Some(path), false) => std::fs::write(path, serde_json::to_string_pretty(&output)?)?,
        (None, _) => {
            let mut stdout = std::io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, &output)?;
            writeln!(stdout)?;
        }
    }
    Ok(())
}

fn parse_id_list(tokens: &[String]) -> Result<Vec<Identifier>, Box<dyn std::error::Error>> {
    Ok(tokens
        .iter()
        .filter(|t| !t.trim().is_empty())
        .map(|t| t.parse::<Identifier>())
        .collect::<Result<Vec<_>, _>>()?)
}

fn ids(config: &SessionConfig, args: IdsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut collection = Collection::new();
    for id in parse_id_list(&args.live)? {
        collection.insert(id, ());
    }
    if let Some(active) = &args.active {
        collection.activate(&active.parse()?)?;
    }
    collection.show(&parse_id_list(&args.visible)?);

    let only_existent = config.only_existent && !args.keep_missing;
    let resolution = resolve_ids(&args.selector, &collection, only_existent)?;
    println!("{}", resolution);
    if !resolution.dropped.is_empty() {
        info!(dropped = %resolution.dropped.iter().join(","), "ids not live");
    }
    Ok(())
}

fn calfit(args: CalfitArgs) -> Result<(), Box<dyn std::error::Error>> {
    let fit = fit_calibration(&args.pairs, args.degree)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&fit)?);
    } else {
        println!("{}", fit);
    }
    Ok(())
}

fn callist(args: CallistArgs) -> Result<(), Box<dyn std::error::Error>> {
    let list = read_cal_list(&args.file)?;
    for (name, cal) in &list.entries {
        println!("{}: {}", name, cal);
    }
    info!(entries = list.entries.len(), skipped = list.skipped.len(), "read calibration list");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_list() {
        let ids = parse_id_list(&["0".to_string(), " ".to_string(), "2.1".to_string()]).unwrap();
        assert_eq!(ids, vec![Identifier::major(0), Identifier::child(2, 1)]);
        assert!(parse_id_list(&["x".to_string()]).is_err());
    }

    #[test]
    fn test_default_config_without_file() {
        assert_eq!(load_config(None).unwrap(), SessionConfig::default());
    }

    #[test]
    fn test_partial_config() {
        let json = r#"{"only_existent": false, "cut": {"name_suffix": "_g"}}"#;
        let config: SessionConfig = serde_json::from_str(json).unwrap();
        assert!(!config.only_existent);
        assert_eq!(config.cut.name_suffix, "_g");
        assert_eq!(config.background_degree, 1);
    }
}
