use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Args, Overrides, SubArgs};
use crate::config::ScreenConfig;
use crate::data_handling::normalized_table::normalized_frame;
use crate::data_handling::reference_catalog::ReferenceCatalogFile;
use crate::data_handling::snv_table::snv_frame;
use crate::data_handling::stat_table::stat_frame;
use crate::helper_functions::dataframe_to_csv;
use crate::invivo::{annotate_invivo, invivo_frame, Tki};
use crate::models::{Dataset, ScoreLevel};
use crate::pipeline::{run_screen, ScreenInputs};
use crate::read_patterns::{read_pattern_frame, run_read_classification};
use crate::variant_filter::{run_filter, FilterCutoffs};
use crate::variant_scorer::{run_scoring, scored_frame, QuantileCutoffs};

mod background_stats;
mod cli;
mod config;
mod counting;
mod data_handling;
mod errors;
mod fisher;
mod helper_functions;
mod invivo;
mod lfc_normalizer;
mod models;
mod pipeline;
mod read_patterns;
mod smoothing;
mod variant_filter;
mod variant_scorer;

/// Config file values (or defaults) with command-line overrides applied.
fn configured(config_file: Option<&Path>, overrides: &Overrides) -> Result<ScreenConfig> {
    let base = ScreenConfig::load(config_file).context("Failed to load configuration")?;
    Ok(overrides.apply(base)?)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config_file = args.config.as_deref();

    match args.command {
        SubArgs::Count { args } => {
            let catalog = ReferenceCatalogFile { path: args.catalog.clone() }
                .read()
                .context("Failed to read reference catalog")?;
            let result = counting::count_sample(&args.freq_table, &catalog)
                .with_context(|| format!("Counting {} failed", args.freq_table.display()))?;
            let mut df = result.to_frame(args.frequency)?;
            dataframe_to_csv(&mut df, &args.out)?;
        }
        SubArgs::Stats { args } => {
            let records = background_stats::run_statistics(&args.sample, &args.background)
                .context("Background statistics failed")?;
            dataframe_to_csv(&mut stat_frame(&records)?, &args.out)?;
        }
        SubArgs::ClassifyReads { args } => {
            let patterns = run_read_classification(&args.freq_table, &args.whitelist)
                .context("Read classification failed")?;
            dataframe_to_csv(&mut read_pattern_frame(&patterns)?, &args.out)?;
        }
        SubArgs::Filter { args } => {
            let config = configured(config_file, &args.overrides)?;
            let result = run_filter(
                [args.stats1.as_path(), args.stats2.as_path()],
                [args.test1.as_path(), args.test2.as_path()],
                &FilterCutoffs::from(&config),
            )
            .context("Variant filtering failed")?;
            if !result.aa_conflicts.is_empty() {
                warn!("{} SNVs had conflicting AA_var labels", result.aa_conflicts.len());
            }
            let mut rep_1 = snv_frame(&result.replicate_1)?;
            let mut rep_2 = snv_frame(&result.replicate_2)?;
            dataframe_to_csv(&mut rep_1, &args.out1)?;
            dataframe_to_csv(&mut rep_2, &args.out2)?;
        }
        SubArgs::Normalize { args } => {
            let config = configured(config_file, &args.overrides)?;
            let rows = lfc_normalizer::run_normalization(&args.snv, &config)
                .with_context(|| format!("Normalizing {} failed", args.snv.display()))?;
            dataframe_to_csv(&mut normalized_frame(&rows)?, &args.out)?;
        }
        SubArgs::Score { args } => {
            let level: ScoreLevel = args.level.parse()?;
            let config = configured(config_file, &args.overrides)?;
            let result = run_scoring(&args.rep1, &args.rep2, level, &QuantileCutoffs::from(&config))
                .context("Scoring failed")?;
            dataframe_to_csv(&mut scored_frame(&result)?, &args.out)?;
        }
        SubArgs::AnnotateInvivo { args } => {
            let tki: Tki = args.tki.parse()?;
            let rows = annotate_invivo(&args.lfc, &args.classes, tki)
                .context("In-vivo annotation failed")?;
            dataframe_to_csv(&mut invivo_frame(&rows)?, &args.out)?;
        }
        SubArgs::Run { args } => {
            let config = configured(config_file, &args.overrides)?;
            let inputs = ScreenInputs {
                catalog: args.catalog,
                unedited: args.unedited,
                control: [args.control1, args.control2],
                test: [args.test1, args.test2],
            };
            info!("Starting screen run");
            let run = run_screen(&inputs, &config).context("Screen run failed")?;
            run.write(&args.out_dir)
                .with_context(|| format!("Writing outputs to {} failed", args.out_dir.display()))?;
        }
    }

    info!("Done");
    Ok(())
}
