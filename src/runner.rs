use std::path::PathBuf;
use std::time::Instant;

use clap::{Args, Command, FromArgMatches as _};
use log::{info, LevelFilter};

use crate::context::Context;
use crate::error::SimError;
use crate::parameters::ContextParametersExt;
use crate::random::ContextRandomExt;
use crate::simulation::{add_output_files, execute_simulation, load_config, setup_simulation};

/// Default cli arguments for the simulation runner
#[derive(Args, Debug, Clone, Default)]
pub struct BaseArgs {
    /// Random seed
    #[arg(short, long, default_value = "0")]
    pub random_seed: u64,

    /// Optional path to a JSON file of dotted configuration keys
    #[arg(short, long, default_value = "")]
    pub config: String,

    /// Directory for `events.csv`, `persons.csv`, `relations.csv` and `config.json`. No files are
    /// written when empty.
    #[arg(short, long, default_value = "")]
    pub output_dir: String,

    /// Enable logging at this level (error, warn, info, debug or trace)
    #[arg(short, long)]
    pub log_level: Option<LevelFilter>,

    /// Log level for one module, as `module=level` (e.g. `stisim::scheduler=trace`). May be
    /// repeated.
    #[arg(long = "log-module", value_name = "MODULE=LEVEL", value_parser = parse_module_filter)]
    pub log_modules: Vec<(String, LevelFilter)>,
}

fn parse_module_filter(value: &str) -> Result<(String, LevelFilter), String> {
    let (module, level) = value
        .split_once('=')
        .ok_or_else(|| format!("expected MODULE=LEVEL, got `{value}`"))?;
    if module.is_empty() {
        return Err(format!("missing module in `{value}`"));
    }
    let level = level
        .parse::<LevelFilter>()
        .map_err(|e| format!("invalid level in `{value}`: {e}"))?;
    Ok((module.to_string(), level))
}

fn create_cli() -> Command {
    let cli = Command::new("stisim");
    BaseArgs::augment_args(cli)
}

/// Runs a simulation with the default cli arguments
///
/// `setup_fn` is called after the population and its initial events have been created and before
/// the run starts, so it can add plans or adjust people.
///
/// # Errors
/// Returns an error if argument parsing, the configuration, the setup function or the run fails
pub fn run_with_args<F>(setup_fn: F) -> Result<Context, Box<dyn std::error::Error>>
where
    F: Fn(&mut Context, &BaseArgs) -> Result<(), SimError>,
{
    let matches = create_cli().get_matches();
    let args = BaseArgs::from_arg_matches(&matches)?;
    Ok(run_with_base_args(&args, setup_fn)?)
}

/// Runs a simulation from already parsed arguments
///
/// # Errors
/// Returns an error if the configuration, the setup function or the run fails
pub fn run_with_base_args<F>(args: &BaseArgs, setup_fn: F) -> Result<Context, SimError>
where
    F: Fn(&mut Context, &BaseArgs) -> Result<(), SimError>,
{
    if let Some(level) = args.log_level {
        crate::log::set_log_level(level);
    }
    if !args.log_modules.is_empty() {
        let filters: Vec<(&String, LevelFilter)> = args
            .log_modules
            .iter()
            .map(|(module, level)| (module, *level))
            .collect();
        crate::log::set_module_filters(&filters);
    }

    let mut context = Context::new();
    if !args.config.is_empty() {
        info!("loading configuration from {}", args.config);
    }
    context.load_parameters(load_config(&args.config)?)?;
    context.init_random(args.random_seed);

    if !args.output_dir.is_empty() {
        add_output_files(&mut context, &PathBuf::from(&args.output_dir))?;
    }

    let started = Instant::now();
    setup_simulation(&mut context)?;
    setup_fn(&mut context, args)?;
    execute_simulation(&mut context)?;
    info!(
        "simulated {} years in {}",
        context.get_current_time(),
        humantime::format_duration(started.elapsed())
    );
    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::ContextEventLogExt;
    use crate::population::ContextPopulationExt;
    use crate::simulation::{CONFIG_FILE, EVENTS_FILE, PERSONS_FILE, RELATIONS_FILE};
    use std::path::Path;
    use tempfile::tempdir;

    #[test]
    fn parses_base_args() {
        let matches = create_cli()
            .try_get_matches_from([
                "stisim",
                "--random-seed",
                "7",
                "--config",
                "config.json",
                "--log-level",
                "debug",
            ])
            .unwrap();
        let args = BaseArgs::from_arg_matches(&matches).unwrap();
        assert_eq!(args.random_seed, 7);
        assert_eq!(args.config, "config.json");
        assert_eq!(args.output_dir, "");
        assert_eq!(args.log_level, Some(LevelFilter::Debug));
        assert!(args.log_modules.is_empty());
    }

    #[test]
    fn parses_module_log_levels() {
        let matches = create_cli()
            .try_get_matches_from([
                "stisim",
                "--log-module",
                "stisim::scheduler=trace",
                "--log-module",
                "stisim::prep=info",
            ])
            .unwrap();
        let args = BaseArgs::from_arg_matches(&matches).unwrap();
        assert_eq!(
            args.log_modules,
            vec![
                ("stisim::scheduler".to_string(), LevelFilter::Trace),
                ("stisim::prep".to_string(), LevelFilter::Info),
            ]
        );

        for bad in ["stisim::scheduler", "=trace", "stisim::scheduler=loud"] {
            assert!(
                create_cli()
                    .try_get_matches_from(["stisim", "--log-module", bad])
                    .is_err(),
                "{bad}"
            );
        }
    }

    #[test]
    fn runs_with_config_file() {
        let args = BaseArgs {
            random_seed: 42,
            config: "tests/data/small_population.json".to_string(),
            ..BaseArgs::default()
        };
        let context = run_with_base_args(&args, |context, _| {
            assert_eq!(context.population_size(), 30);
            Ok(())
        })
        .unwrap();
        assert_eq!(context.params().population.sim_time, 3.0);
        assert!(context.event_count("debut") > 0);
    }

    #[test]
    fn same_seed_gives_the_same_run() {
        let args = BaseArgs {
            random_seed: 3,
            config: "tests/data/small_population.json".to_string(),
            ..BaseArgs::default()
        };
        let first = run_with_base_args(&args, |_, _| Ok(())).unwrap();
        let second = run_with_base_args(&args, |_, _| Ok(())).unwrap();
        assert_eq!(first.event_counts(), second.event_counts());
    }

    #[test]
    fn writes_output_files() {
        let dir = tempdir().unwrap();
        let args = BaseArgs {
            random_seed: 1,
            config: "tests/data/small_population.json".to_string(),
            output_dir: dir.path().to_string_lossy().into_owned(),
            ..BaseArgs::default()
        };
        run_with_base_args(&args, |_, _| Ok(())).unwrap();
        for file in [EVENTS_FILE, PERSONS_FILE, RELATIONS_FILE, CONFIG_FILE] {
            assert!(Path::new(&args.output_dir).join(file).exists(), "{file}");
        }
    }

    #[test]
    fn setup_errors_are_returned() {
        let result = run_with_base_args(&BaseArgs::default(), |_, _| {
            Err(SimError::SimError("setup failed".to_string()))
        });
        assert!(matches!(result, Err(SimError::SimError(_))));
    }

    #[test]
    fn missing_config_is_an_error() {
        let args = BaseArgs {
            config: "tests/data/no_such_file.json".to_string(),
            ..BaseArgs::default()
        };
        assert!(run_with_base_args(&args, |_, _| Ok(())).is_err());
    }
}
