mod cli;

use std::{fs, io::BufWriter, path::Path};

use anyhow::{bail, Context};
use clap::Parser;
use itertools::Itertools;
use log::{info, LevelFilter};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use irdist::{
    ir_dist, CellTable, ClonotypeNeighbors, ColumnTable, DistanceCache, EncodedMatrixExt,
    IrDistParams, NeighborsParams, SequenceKind,
};

use crate::cli::Cli;

#[derive(Debug, Serialize, Tabled)]
struct RunSummary {
    #[tabled(rename = "Metric")]
    metric: String,

    #[tabled(rename = "Sequence")]
    sequence: SequenceKind,

    #[tabled(rename = "Cutoff")]
    cutoff: u32,

    #[tabled(rename = "Arms")]
    receptor_arms: String,

    #[tabled(rename = "Dual IR")]
    dual_ir: String,

    #[tabled(rename = "Clonotypes")]
    clonotypes: usize,

    #[tabled(rename = "Ref. clonotypes")]
    reference_clonotypes: usize,

    #[tabled(rename = "Connected pairs")]
    connected_pairs: usize,

    #[tabled(rename = "Mean distance", display_with = "display_mean")]
    mean_distance: Option<f64>,
}

fn display_mean(mean: &Option<f64>) -> String {
    mean.map_or_else(|| "-".to_owned(), |mean| format!("{mean:.2}"))
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn prepare_output_dir(path: &Path, overwrite: bool) -> anyhow::Result<()> {
    if path.exists() {
        if !overwrite {
            bail!(
                "output directory {} already exists, use --overwrite to replace it",
                path.display()
            );
        }
        fs::remove_dir_all(path)
            .with_context(|| format!("unable to remove output directory {}", path.display()))?;
    }

    fs::create_dir_all(path)
        .with_context(|| format!("unable to create output directory {}", path.display()))
}

fn read_table(path: &Path) -> anyhow::Result<ColumnTable> {
    let table = ColumnTable::read_path(path)
        .with_context(|| format!("unable to read cell table {}", path.display()))?;
    info!(
        "read {} cells from {} ({})",
        table.n_rows(),
        path.display(),
        table.column_names().iter().join(", ")
    );
    Ok(table)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let mut query = read_table(&cli.query)?;
    let reference = cli.reference.as_deref().map(read_table).transpose()?;
    let reference = reference.as_ref().map(|table| table as &dyn CellTable);
    prepare_output_dir(&cli.output, cli.overwrite)?;

    let n_jobs = cli.threads.map(usize::from);
    let distance_args = &cli.distance_args;
    let ir_params = IrDistParams {
        metric: distance_args.metric.clone(),
        sequence: distance_args.sequence,
        cutoff: distance_args.cutoff,
        n_jobs,
        chunksize: cli.chunk_size,
        key_added: distance_args.key_added.clone(),
    };

    let mut cache = DistanceCache::new();
    let key = ir_dist(&query, reference, &ir_params, &mut cache)
        .context("unable to compute sequence distances")?;

    let neighbors_params = NeighborsParams {
        receptor_arms: cli.clonotype_args.receptor_arms,
        dual_ir: cli.clonotype_args.dual_ir,
        distance_key: key.clone(),
        sequence_key: distance_args.sequence,
        n_jobs,
        chunksize: cli.chunk_size,
    };
    let neighbors = ClonotypeNeighbors::new(&query, reference, &cache, neighbors_params)
        .context("unable to build clonotypes")?;
    let distances = neighbors
        .compute_distances()
        .context("unable to compute clonotype distances")?;

    let distances_path = cli.output.join("distances.mtx");
    distances
        .write_matrix_market(&distances_path)
        .with_context(|| format!("unable to write {}", distances_path.display()))?;

    let clonotypes = neighbors.clonotypes();
    clonotypes
        .to_column_table()?
        .write_path(&cli.output.join("clonotypes.tsv"))
        .context("unable to write clonotype table")?;
    if reference.is_some() {
        neighbors
            .clonotypes2()
            .to_column_table()?
            .write_path(&cli.output.join("clonotypes2.tsv"))
            .context("unable to write reference clonotype table")?;
    }

    clonotypes.write_cell_clonotypes(&mut query, &format!("{key}_clonotype"))?;
    query
        .write_path(&cli.output.join("cell_clonotypes.tsv"))
        .context("unable to write cell table")?;

    let true_distances = distances.true_distances();
    let mean_distance = (!true_distances.is_empty()).then(|| {
        true_distances
            .iter()
            .map(|&(_, _, distance)| f64::from(distance))
            .sum::<f64>()
            / true_distances.len() as f64
    });
    let summary = RunSummary {
        metric: ir_params.metric.to_string(),
        sequence: ir_params.sequence,
        cutoff: ir_params.metric.effective_cutoff(ir_params.cutoff),
        receptor_arms: neighbors.params().receptor_arms.to_string(),
        dual_ir: neighbors.params().dual_ir.to_string(),
        clonotypes: clonotypes.len(),
        reference_clonotypes: neighbors.clonotypes2().len(),
        connected_pairs: true_distances.len(),
        mean_distance,
    };

    let summary_file = fs::File::create(cli.output.join("summary.json"))
        .context("unable to create summary file")?;
    serde_json::to_writer_pretty(BufWriter::new(summary_file), &summary)
        .context("unable to write summary file")?;

    println!("{}", Table::new([summary]).with(Style::modern()));
    Ok(())
}
