use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::ScreenConfig;
use crate::errors::ScreenResult;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Scores saturation prime-editing variants from drug-selection screens",
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    pub command: SubArgs,

    #[arg(
        long = "config",
        global = true,
        value_name = "JSON",
        help = "JSON file with cutoffs; command-line flags override its values"
    )]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum SubArgs {
    /// Collapse an aligned-read frequency table onto the reference catalog
    #[command(name = "count")]
    Count {
        #[command(flatten)]
        args: CountArgs,
    },
    /// Odds ratio, Fisher p-value and RPM of a sample against the unedited background
    #[command(name = "stats")]
    Stats {
        #[command(flatten)]
        args: StatsArgs,
    },
    /// Classify every aligned read as substitution, insertion, deletion or complex
    #[command(name = "classify-reads")]
    ClassifyReads {
        #[command(flatten)]
        args: ClassifyArgs,
    },
    /// Keep variants significant in both replicates and collapse them to SNVs
    #[command(name = "filter")]
    Filter {
        #[command(flatten)]
        args: FilterArgs,
    },
    /// Position-corrected, standardised log fold change of one replicate
    #[command(name = "normalize")]
    Normalize {
        #[command(flatten)]
        args: NormalizeArgs,
    },
    /// Combine two normalized replicates and classify drug response
    #[command(name = "score")]
    Score {
        #[command(flatten)]
        args: ScoreArgs,
    },
    /// Attach drug classes to an in-vivo LFC table
    #[command(name = "annotate-invivo")]
    AnnotateInvivo {
        #[command(flatten)]
        args: InvivoArgs,
    },
    /// Every stage over one screen, writing all tables only if the run succeeds
    #[command(name = "run")]
    Run {
        #[command(flatten)]
        args: RunArgs,
    },
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default, Parser)]
pub struct Overrides {
    #[arg(long = "or-cutoff", value_name = "FLOAT", help = "Odds ratio must exceed this")]
    pub or_cutoff: Option<f64>,

    #[arg(long = "p-cutoff", value_name = "FLOAT", help = "Fisher p-value must be below this")]
    pub p_cutoff: Option<f64>,

    #[arg(long = "rpm-cutoff", value_name = "FLOAT", help = "Minimum reads per million")]
    pub rpm_cutoff: Option<f64>,

    #[arg(long = "lowess-frac", value_name = "FLOAT", help = "LOWESS smoothing fraction")]
    pub lowess_frac: Option<f64>,

    #[arg(long = "sensitive-cutoff", value_name = "QUANTILE")]
    pub sensitive_cutoff: Option<f64>,

    #[arg(long = "resistant-cutoff", value_name = "QUANTILE")]
    pub resistant_cutoff: Option<f64>,
}

impl Overrides {
    pub fn apply(&self, mut config: ScreenConfig) -> ScreenResult<ScreenConfig> {
        let pairs = [
            (self.or_cutoff, &mut config.or_cutoff),
            (self.p_cutoff, &mut config.p_cutoff),
            (self.rpm_cutoff, &mut config.rpm_cutoff),
            (self.lowess_frac, &mut config.lowess_frac),
            (self.sensitive_cutoff, &mut config.sensitive_cutoff),
            (self.resistant_cutoff, &mut config.resistant_cutoff),
        ];
        for (value, field) in pairs {
            if let Some(v) = value {
                *field = v;
            }
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Parser)]
pub struct CountArgs {
    #[arg(short = 'f', long = "freq-table", required = true, value_name = "TSV")]
    pub freq_table: PathBuf,

    #[arg(short = 'c', long = "catalog", required = true, value_name = "CSV")]
    pub catalog: PathBuf,

    #[arg(short = 'o', long = "out", required = true, value_name = "CSV")]
    pub out: PathBuf,

    #[arg(long = "frequency", help = "Add a per-variant read fraction column")]
    pub frequency: bool,
}

#[derive(Debug, Parser)]
pub struct StatsArgs {
    #[arg(short = 's', long = "sample", required = true, value_name = "CSV")]
    pub sample: PathBuf,

    #[arg(short = 'b', long = "background", required = true, value_name = "CSV")]
    pub background: PathBuf,

    #[arg(short = 'o', long = "out", required = true, value_name = "CSV")]
    pub out: PathBuf,
}

#[derive(Debug, Parser)]
pub struct ClassifyArgs {
    #[arg(short = 'f', long = "freq-table", required = true, value_name = "TSV")]
    pub freq_table: PathBuf,

    #[arg(short = 'w', long = "whitelist", required = true, value_name = "CSV")]
    pub whitelist: PathBuf,

    #[arg(short = 'o', long = "out", required = true, value_name = "CSV")]
    pub out: PathBuf,
}

#[derive(Debug, Parser)]
pub struct FilterArgs {
    #[arg(long = "stats1", required = true, value_name = "CSV")]
    pub stats1: PathBuf,

    #[arg(long = "stats2", required = true, value_name = "CSV")]
    pub stats2: PathBuf,

    #[arg(long = "test1", required = true, value_name = "CSV", help = "Test-sample counts, replicate 1")]
    pub test1: PathBuf,

    #[arg(long = "test2", required = true, value_name = "CSV", help = "Test-sample counts, replicate 2")]
    pub test2: PathBuf,

    #[arg(long = "out1", required = true, value_name = "CSV")]
    pub out1: PathBuf,

    #[arg(long = "out2", required = true, value_name = "CSV")]
    pub out2: PathBuf,

    #[command(flatten)]
    pub overrides: Overrides,
}

#[derive(Debug, Parser)]
pub struct NormalizeArgs {
    #[arg(short = 's', long = "snv", required = true, value_name = "CSV")]
    pub snv: PathBuf,

    #[arg(short = 'o', long = "out", required = true, value_name = "CSV")]
    pub out: PathBuf,

    #[command(flatten)]
    pub overrides: Overrides,
}

#[derive(Debug, Parser)]
pub struct ScoreArgs {
    #[arg(long = "rep1", required = true, value_name = "CSV")]
    pub rep1: PathBuf,

    #[arg(long = "rep2", required = true, value_name = "CSV")]
    pub rep2: PathBuf,

    #[arg(short = 'o', long = "out", required = true, value_name = "CSV")]
    pub out: PathBuf,

    #[arg(long = "level", default_value = "snv", value_name = "snv|aa")]
    pub level: String,

    #[command(flatten)]
    pub overrides: Overrides,
}

#[derive(Debug, Parser)]
pub struct InvivoArgs {
    #[arg(short = 'l', long = "lfc", required = true, value_name = "CSV")]
    pub lfc: PathBuf,

    #[arg(short = 'c', long = "classes", required = true, value_name = "CSV")]
    pub classes: PathBuf,

    #[arg(short = 't', long = "tki", required = true, value_name = "NAME")]
    pub tki: String,

    #[arg(short = 'o', long = "out", required = true, value_name = "CSV")]
    pub out: PathBuf,
}

#[derive(Debug, Parser)]
pub struct RunArgs {
    #[arg(long = "catalog", required = true, value_name = "CSV")]
    pub catalog: PathBuf,

    #[arg(long = "unedited", required = true, value_name = "TSV")]
    pub unedited: PathBuf,

    #[arg(long = "control1", required = true, value_name = "TSV")]
    pub control1: PathBuf,

    #[arg(long = "control2", required = true, value_name = "TSV")]
    pub control2: PathBuf,

    #[arg(long = "test1", required = true, value_name = "TSV")]
    pub test1: PathBuf,

    #[arg(long = "test2", required = true, value_name = "TSV")]
    pub test2: PathBuf,

    #[arg(short = 'o', long = "out-dir", required = true, value_name = "DIR")]
    pub out_dir: PathBuf,

    #[command(flatten)]
    pub overrides: Overrides,
}
