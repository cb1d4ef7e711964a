use anyhow::{Context, Result};
use campaign_ranker::models::{Config, CostPerResultPolicy, NumericPolicy, ThresholdPolicy};
use campaign_ranker::{report, CampaignAnalyzer, ReportError, ReportOutcome};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info};

fn cli() -> Command {
    Command::new("campaign-ranker")
        .version("1.0")
        .about("Ranks ad campaigns by cost efficiency after filtering out untested ones")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("FILE")
                .help("Campaign export CSV"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Where to write the sorted campaigns CSV"),
        )
        .arg(
            Arg::new("creatives")
                .long("creatives")
                .value_name("FILE")
                .help("Creative copy CSV used to enrich the top campaigns"),
        )
        .arg(
            Arg::new("threshold-policy")
                .long("threshold-policy")
                .value_parser(["fixed", "percentile", "dispersion"])
                .help("How the minimum results/spend cutoff is derived"),
        )
        .arg(
            Arg::new("percentile")
                .long("percentile")
                .value_parser(value_parser!(f64))
                .help("Percentile used by the percentile policy (0-100)"),
        )
        .arg(
            Arg::new("min-results")
                .long("min-results")
                .value_parser(value_parser!(f64))
                .help("Minimum results for the fixed policy"),
        )
        .arg(
            Arg::new("min-spent")
                .long("min-spent")
                .value_parser(value_parser!(f64))
                .help("Minimum amount spent for the fixed policy"),
        )
        .arg(
            Arg::new("top-k")
                .short('k')
                .long("top-k")
                .value_parser(value_parser!(usize))
                .help("Number of top campaigns to enrich with creative copy"),
        )
        .arg(
            Arg::new("strict")
                .long("strict")
                .action(ArgAction::SetTrue)
                .help("Abort on non-numeric values instead of treating them as missing"),
        )
        .arg(
            Arg::new("recompute-cpr")
                .long("recompute-cpr")
                .action(ArgAction::SetTrue)
                .help("Derive cost per result from amount spent / results"),
        )
        .arg(
            Arg::new("write-config")
                .long("write-config")
                .action(ArgAction::SetTrue)
                .help("Save the effective configuration to the config file"),
        )
        .arg(
            Arg::new("no-output")
                .long("no-output")
                .action(ArgAction::SetTrue)
                .help("Only display results, do not write the output CSV"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Debug logging"),
        )
}

/// Command line values take precedence over the config file
fn apply_overrides(config: &mut Config, matches: &ArgMatches) {
    if let Some(input) = matches.get_one::<String>("input") {
        config.input_file = input.clone();
    }
    if let Some(output) = matches.get_one::<String>("output") {
        config.output_file = output.clone();
    }
    if let Some(creatives) = matches.get_one::<String>("creatives") {
        config.creative_file = Some(creatives.clone());
    }
    if let Some(policy) = matches.get_one::<String>("threshold-policy") {
        config.threshold.policy = match policy.as_str() {
            "fixed" => ThresholdPolicy::Fixed,
            "dispersion" => ThresholdPolicy::Dispersion,
            _ => ThresholdPolicy::Percentile,
        };
    }
    if let Some(&percentile) = matches.get_one::<f64>("percentile") {
        config.threshold.percentile = percentile;
    }
    if let Some(&min_results) = matches.get_one::<f64>("min-results") {
        config.threshold.min_results = min_results;
    }
    if let Some(&min_spent) = matches.get_one::<f64>("min-spent") {
        config.threshold.min_amount_spent = min_spent;
    }
    if let Some(&top_k) = matches.get_one::<usize>("top-k") {
        config.top_k = top_k;
    }
    if matches.get_flag("strict") {
        config.numeric_policy = NumericPolicy::Strict;
    }
    if matches.get_flag("recompute-cpr") {
        config.cost_per_result = CostPerResultPolicy::Recompute;
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(matches: &ArgMatches) -> Result<()> {
    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config.toml");

    // Load configuration, falling back to defaults
    let mut config = if Path::new(config_file).exists() {
        info!("Loading configuration from {}", config_file);
        Config::load_from_file(config_file)
            .with_context(|| format!("Failed to load configuration from {}", config_file))?
    } else {
        info!("No configuration file at {}, using defaults", config_file);
        Config::default()
    };
    apply_overrides(&mut config, matches);
    config.validate()?;

    if matches.get_flag("write-config") {
        config
            .save_to_file(config_file)
            .with_context(|| format!("Failed to write configuration to {}", config_file))?;
        println!("📝 Saved configuration to {}", config_file);
    }

    println!("🔍 Analyzing campaigns from: {}", config.input_file);
    if let Some(creatives) = &config.creative_file {
        println!("🎨 Creative copy from: {}", creatives);
    }

    let analyzer = CampaignAnalyzer::new(&config);
    match analyzer.run()? {
        ReportOutcome::Ranked(campaign_report) => {
            println!("\n{}", report::render_report(&campaign_report));

            if matches.get_flag("no-output") {
                return Ok(());
            }
            report::write_output_csv(&campaign_report, &config.output_file)
                .with_context(|| format!("Failed to write {}", config.output_file))?;
            println!("✅ Results have been saved to '{}'", config.output_file);
        }
        ReportOutcome::NoneQualified {
            headers,
            total_records,
            threshold,
        } => {
            println!("\n{}", report::render_no_results(total_records, &threshold));

            if matches.get_flag("no-output") {
                return Ok(());
            }
            report::write_empty_output(&headers, &config.output_file)
                .with_context(|| format!("Failed to write {}", config.output_file))?;
            println!("📄 Wrote header-only '{}'", config.output_file);
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    match run(&matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let kind = match e.downcast_ref::<ReportError>() {
                Some(ReportError::InputNotFound { .. }) => "input file missing",
                Some(ReportError::EmptyInput { .. }) => "empty input",
                Some(ReportError::MissingColumns { .. }) => "missing columns",
                Some(ReportError::NonNumericValue { .. }) => "invalid numeric value",
                Some(ReportError::InvalidConfig(_)) | Some(ReportError::ConfigParse(_)) => {
                    "configuration"
                }
                _ => "unexpected failure",
            };
            error!("Run failed ({}): {:#}", kind, e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
