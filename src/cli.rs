use clap::{ArgAction, Args, Parser};
use std::path::PathBuf;

use irdist::{
    metrics::Metric, sequence_dist::DEFAULT_CHUNKSIZE, DualIr, ReceptorArms, SequenceKind,
};

#[derive(Debug, Parser)]
#[clap(author, version, about)]
/// Immune-receptor sequence distances and clonotype neighbors
pub struct Cli {
    /// Path to the query cell table
    ///
    /// Note: tab-separated for .tsv/.txt files, comma-separated otherwise. Chains are read from
    /// the IR_{VJ,VDJ}_{1,2}_{junction_aa,junction} columns
    #[clap(short, long)]
    pub query: PathBuf,

    /// Path to a reference cell table
    ///
    /// When specified, query clonotypes are compared against reference clonotypes instead of
    /// against themselves
    #[clap(short, long)]
    pub reference: Option<PathBuf>,

    /// Output directory
    #[clap(short, long, default_value = "irdist_out/")]
    pub output: PathBuf,

    /// Overwrites the output directory (if the specified path already exists)
    #[clap(long, visible_alias = "ow")]
    pub overwrite: bool,

    /// Number of processors to use
    ///
    /// Uses all available processors if not specified
    #[clap(long)]
    pub threads: Option<u16>,

    /// Number of sequences (or clonotypes) processed by a single task
    #[clap(long, default_value_t = DEFAULT_CHUNKSIZE)]
    pub chunk_size: usize,

    /// Increases the logging verbosity (-v for debug, -vv for trace)
    #[clap(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    #[clap(flatten, next_help_heading = "Distance options")]
    pub distance_args: DistanceArgs,

    #[clap(flatten, next_help_heading = "Clonotype options")]
    pub clonotype_args: ClonotypeArgs,
}

#[derive(Debug, Args)]
pub struct DistanceArgs {
    /// Sequence distance metric (identity, levenshtein, hamming or alignment)
    #[clap(long, default_value = "identity")]
    pub metric: Metric,

    /// Maximum distance for two sequences to be connected
    ///
    /// Defaults to 0 for identity, 2 for levenshtein and hamming, 10 for alignment
    #[clap(long)]
    pub cutoff: Option<u32>,

    /// Compare amino acid (aa) or nucleotide (nt) junction sequences
    #[clap(long, default_value = "aa")]
    pub sequence: SequenceKind,

    /// Name under which distances are stored, also used to name the clonotype column
    ///
    /// Defaults to ir_dist_{sequence}_{metric}
    #[clap(long)]
    pub key_added: Option<String>,
}

#[derive(Debug, Args)]
pub struct ClonotypeArgs {
    /// Receptor arms to compare (VJ, VDJ, all or any)
    ///
    /// With "all" both arms need to match, with "any" a single one is enough
    #[clap(long, default_value = "all")]
    pub receptor_arms: ReceptorArms,

    /// How chains within an arm are matched (primary_only, any or all)
    #[clap(long, default_value = "any")]
    pub dual_ir: DualIr,
}
