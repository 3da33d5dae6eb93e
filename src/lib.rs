pub mod alignment;
pub mod codeml;
pub mod lrt;
pub mod summary;
pub mod tree;

use crate::{
    alignment::SeqRecord,
    codeml::{CtlTemplate, Hypothesis, ModelRunner},
    summary::{Outcome, SummaryAccumulator},
};
use anyhow::{anyhow, bail, Result};
use clap::{builder::PossibleValue, Parser, ValueEnum};
use csv::ReaderBuilder;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::{
    collections::HashMap,
    fs::{self, File},
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

/// Measure positive selection across a cluster of protein-coding
/// sequences with codeml branch-site likelihood-ratio tests
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Cluster membership table with a GenBank_Accession column
    #[arg(value_name = "CLUSTER")]
    pub cluster_table: PathBuf,

    /// Unlabelled gene tree covering the cluster
    #[arg(value_name = "TREE")]
    pub cluster_tree: PathBuf,

    /// Nucleotide MSA of the cluster in FASTA format
    #[arg(value_name = "MSA")]
    pub seq_path: PathBuf,

    /// codeml control file to use as the template for every run
    #[arg(value_name = "CTL")]
    pub ctl_template: PathBuf,

    /// Append per-accession statistics to this TSV
    #[arg(long, value_name = "SUMMARY")]
    pub summary: Option<PathBuf>,

    /// Name of or path to the codeml executable
    #[arg(long, value_name = "CODEML", default_value = "codeml")]
    pub codeml: String,

    /// Seconds allowed per codeml run
    #[arg(long, value_name = "SECS", default_value = "3600")]
    pub timeout: u64,

    /// Number of worker threads (0 = all available)
    #[arg(short, long, value_name = "THREADS", default_value = "0")]
    pub threads: usize,

    /// Output directory [default: the cluster table's directory]
    #[arg(short, long, value_name = "OUTDIR")]
    pub outdir: Option<PathBuf>,

    /// Print codeml progress to the terminal
    #[arg(short, long)]
    pub verbose: bool,

    /// Log level
    #[arg(short, long)]
    pub log: Option<LogLevel>,
}

#[derive(Debug, Clone)]
pub enum LogLevel {
    Info,
    Debug,
}

impl ValueEnum for LogLevel {
    fn value_variants<'a>() -> &'a [Self] {
        &[LogLevel::Info, LogLevel::Debug]
    }

    fn to_possible_value<'a>(&self) -> Option<PossibleValue> {
        Some(match self {
            LogLevel::Info => PossibleValue::new("info"),
            LogLevel::Debug => PossibleValue::new("debug"),
        })
    }
}

// --------------------------------------------------
pub fn run(args: Args) -> Result<()> {
    let start = Instant::now();
    env_logger::Builder::new()
        .filter_level(match args.log {
            Some(LogLevel::Debug) => log::LevelFilter::Debug,
            Some(LogLevel::Info) => log::LevelFilter::Info,
            _ => log::LevelFilter::Off,
        })
        .init();

    info!("args = {args:#?}");

    let engine = which::which(&args.codeml).map_err(|e| {
        anyhow!("Cannot find codeml executable {}: {e}", args.codeml)
    })?;
    let engine = fs::canonicalize(&engine)?;

    let outdir = match &args.outdir {
        Some(dir) => dir.clone(),
        _ => match args.cluster_table.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                parent.to_path_buf()
            }
            _ => PathBuf::from("."),
        },
    };
    if !outdir.is_dir() {
        fs::create_dir_all(&outdir)?;
    }

    // A missing tree file kills the whole batch, unlike an accession
    // missing from the tree, which only skips that accession
    let tree_text = fs::read_to_string(&args.cluster_tree).map_err(|e| {
        anyhow!("Cannot read tree {}: {e}", args.cluster_tree.display())
    })?;

    let template = CtlTemplate::from_path(&args.ctl_template)?;
    let records = alignment::read_fasta(&args.seq_path)?;
    let accessions = read_accessions(&args.cluster_table)?;
    info!(
        "{} accessions in {}",
        accessions.len(),
        args.cluster_table.display()
    );

    let num_threads = if args.threads == 0 {
        num_cpus::get()
    } else {
        args.threads
    };
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()?;

    let runner = ModelRunner {
        engine: &engine,
        template: &template,
        timeout: Duration::from_secs(args.timeout),
        verbose: args.verbose,
    };

    let progress = ProgressBar::new(accessions.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
            )
            .expect("Failed to set progress bar template")
            .progress_chars("#>-"),
    );

    // Accessions are independent; only the accumulator below is
    // shared, and it runs on this thread alone
    let outcomes: Vec<Outcome> = pool.install(|| {
        accessions
            .par_iter()
            .map(|accession| {
                let outcome = process_accession(
                    accession, &outdir, &records, &tree_text, &runner,
                )
                .unwrap_or_else(|e| {
                    warn!("{accession}: {e}");
                    Outcome::Rerun {
                        accession: accession.clone(),
                        reason: e.to_string(),
                    }
                });
                progress.inc(1);
                outcome
            })
            .collect()
    });
    progress.finish_and_clear();

    let mut accumulator =
        SummaryAccumulator::new(&outdir, args.summary.as_deref());
    for outcome in outcomes {
        accumulator.record(outcome);
    }
    let tally = accumulator.tally();
    accumulator.flush()?;

    println!(
        r#"Finished {} accessions in {} seconds ({tally}), see output in "{}""#,
        accessions.len(),
        start.elapsed().as_secs(),
        outdir.display()
    );

    Ok(())
}

// --------------------------------------------------
/// Run the whole selection test for one accession: reorder the MSA,
/// label the tree, fit both hypotheses, classify. Anything that goes
/// wrong here stays confined to this accession.
fn process_accession(
    accession: &str,
    outdir: &Path,
    records: &[SeqRecord],
    tree_text: &str,
    runner: &ModelRunner,
) -> Result<Outcome> {
    let workdir = outdir.join(accession);
    fs::create_dir_all(&workdir)?;
    // The engine runs inside the working directory, so every path
    // handed to it must survive the change of directory
    let workdir = fs::canonicalize(&workdir)?;
    debug!("{accession}: working directory {}", workdir.display());

    let reordered = match alignment::reorder(records, accession) {
        Some(reordered) => reordered,
        _ => {
            return Ok(Outcome::Skipped {
                accession: accession.to_string(),
                reason: "alignment does not contain the accession"
                    .to_string(),
            })
        }
    };

    let fasta_path = workdir.join(format!("{accession}_msa.fasta"));
    let msa_path = workdir.join(format!("{accession}_msa.phylip"));
    alignment::write_fasta(&reordered, &fasta_path)?;
    alignment::write_phylip(&reordered, &msa_path)?;

    let tree_path = workdir.join(format!("{accession}_tree"));
    match tree::label(tree_text, accession) {
        Some(labelled) => fs::write(&tree_path, labelled)?,
        _ => {
            return Ok(Outcome::Skipped {
                accession: accession.to_string(),
                reason: "tree does not contain the accession".to_string(),
            })
        }
    }

    let (alt_out, alt_fit) = runner.run(
        &workdir,
        &msa_path,
        &tree_path,
        accession,
        Hypothesis::Alternative,
    )?;
    let (null_out, null_fit) = runner.run(
        &workdir,
        &msa_path,
        &tree_path,
        accession,
        Hypothesis::Null,
    )?;

    let (Some(alt), Some(null)) = (alt_fit.complete(), null_fit.complete())
    else {
        return Ok(Outcome::Rerun {
            accession: accession.to_string(),
            reason: format!(
                "no likelihood in engine output ({} / {})",
                alt_out.display(),
                null_out.display()
            ),
        });
    };

    Ok(match lrt::test(accession, alt, null) {
        Some(result) => Outcome::Classified(result),
        _ => Outcome::Rerun {
            accession: accession.to_string(),
            reason: "degenerate degrees of freedom".to_string(),
        },
    })
}

// --------------------------------------------------
/// Read the accession list from the cluster membership table. Blank
/// and NaN cells are skipped; duplicated accessions are an input
/// error.
pub fn read_accessions(path: &Path) -> Result<Vec<String>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| anyhow!("Cannot read {}: {e}", path.display()))?;

    let col = reader
        .headers()?
        .iter()
        .position(|header| header == "GenBank_Accession")
        .ok_or_else(|| {
            anyhow!("No GenBank_Accession column in {}", path.display())
        })?;

    let mut accessions = vec![];
    for record in reader.records() {
        let record = record?;
        let val = record.get(col).unwrap_or_default().trim();
        if val.is_empty() || val.eq_ignore_ascii_case("nan") {
            continue;
        }
        accessions.push(val.to_string());
    }

    let mut counts: HashMap<&str, u32> = HashMap::new();
    for accession in &accessions {
        *counts.entry(accession).or_insert(0) += 1;
    }
    let mut dups: Vec<_> = counts
        .iter()
        .filter_map(|(&acc, &count)| (count > 1).then_some(acc))
        .collect();

    if !dups.is_empty() {
        dups.sort();
        bail!(
            "The following accessions are duplicated: {}",
            dups.iter().join(", ")
        );
    }

    Ok(accessions)
}

// --------------------------------------------------
pub(crate) fn open(filename: &Path) -> Result<Box<dyn BufRead>> {
    Ok(Box::new(BufReader::new(File::open(filename).map_err(
        |e| anyhow!("Cannot read {}: {e}", filename.display()),
    )?)))
}

// --------------------------------------------------
pub(crate) fn open_for_write(filename: &Path) -> Result<Box<dyn Write>> {
    Ok(Box::new(BufWriter::new(File::create(filename).map_err(
        |e| anyhow!("Cannot write {}: {e}", filename.display()),
    )?)))
}
