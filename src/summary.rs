use crate::lrt::SelectionResult;
use anyhow::{anyhow, Result};
use csv::{ReaderBuilder, WriterBuilder};
use log::{info, warn};
use serde::Serialize;
use std::{
    io::Write,
    path::{Path, PathBuf},
};

/// Terminal state of one accession after a pipeline pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Classified(SelectionResult),
    Rerun { accession: String, reason: String },
    Skipped { accession: String, reason: String },
}

/// One row of the cumulative summary table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub cluster: String,
    pub accessions: String,
    pub p_value: Option<f64>,
    pub lnl1: Option<f64>,
    pub np1: Option<u32>,
    pub lnl0: Option<f64>,
    pub np0: Option<u32>,
}

/// Collects per-accession outcomes and writes the listing files and
/// the cumulative summary table. Workers only produce `Outcome`s; the
/// driver owns the single accumulator, so every append target has
/// exactly one writer.
#[derive(Debug)]
pub struct SummaryAccumulator {
    cluster: String,
    outdir: PathBuf,
    summary_path: Option<PathBuf>,
    selected: Vec<(String, f64)>,
    not_selected: Vec<(String, f64)>,
    rerun: Vec<String>,
    skipped: Vec<String>,
    rows: Vec<SummaryRow>,
}

impl SummaryAccumulator {
    pub fn new(outdir: &Path, summary_path: Option<&Path>) -> Self {
        Self {
            cluster: outdir.display().to_string(),
            outdir: outdir.to_path_buf(),
            summary_path: summary_path.map(Path::to_path_buf),
            selected: vec![],
            not_selected: vec![],
            rerun: vec![],
            skipped: vec![],
            rows: vec![],
        }
    }

    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Classified(res) => {
                self.rows.push(SummaryRow {
                    cluster: self.cluster.clone(),
                    accessions: res.accession.clone(),
                    p_value: Some(res.p_value),
                    lnl1: Some(res.lnl_alt),
                    np1: Some(res.np_alt),
                    lnl0: Some(res.lnl_null),
                    np0: Some(res.np_null),
                });

                if res.positively_selected() {
                    info!(
                        "Positive selection detected: {} {}",
                        res.p_value, res.accession
                    );
                    self.selected.push((res.accession, res.p_value));
                } else {
                    info!(
                        "Positive selection NOT detected: {} {}",
                        res.p_value, res.accession
                    );
                    self.not_selected.push((res.accession, res.p_value));
                }
            }
            Outcome::Rerun { accession, reason } => {
                warn!("{accession} needs a rerun: {reason}");
                self.rows.push(SummaryRow {
                    cluster: self.cluster.clone(),
                    accessions: accession.clone(),
                    p_value: None,
                    lnl1: None,
                    np1: None,
                    lnl0: None,
                    np0: None,
                });
                self.rerun.push(accession);
            }
            Outcome::Skipped { accession, reason } => {
                // Deliberately absent from every listing; the log is
                // the only trace
                warn!("Skipping {accession}: {reason}");
                self.skipped.push(accession);
            }
        }
    }

    pub fn tally(&self) -> String {
        format!(
            "{} positively selected, {} not, {} to rerun, {} skipped",
            self.selected.len(),
            self.not_selected.len(),
            self.rerun.len(),
            self.skipped.len()
        )
    }

    /// Write the three listing files (always, possibly empty) and
    /// append this run's rows to the summary table when one was asked
    /// for.
    pub fn flush(&self) -> Result<()> {
        let with_p = |pairs: &[(String, f64)]| -> Vec<String> {
            pairs
                .iter()
                .map(|(acc, p)| format!("{acc}\t{p}"))
                .collect()
        };

        write_listing(
            &self.outdir.join("positively_selected_proteins.out"),
            &with_p(&self.selected),
        )?;
        write_listing(
            &self.outdir.join("not_positively_selected_proteins.out"),
            &with_p(&self.not_selected),
        )?;
        write_listing(&self.outdir.join("rerun_proteins.out"), &self.rerun)?;

        if let Some(path) = &self.summary_path {
            let mut rows = if path.exists() {
                load_summary(path)?
            } else {
                vec![]
            };
            rows.extend(self.rows.iter().cloned());

            let mut wtr = WriterBuilder::new()
                .delimiter(b'\t')
                .has_headers(true)
                .from_path(path)
                .map_err(|e| anyhow!("Cannot write {}: {e}", path.display()))?;
            for row in rows {
                wtr.serialize(row)?;
            }
            wtr.flush()?;

            info!("Summary table written to {}", path.display());
        }

        Ok(())
    }
}

// --------------------------------------------------
fn write_listing(outpath: &Path, lines: &[String]) -> Result<()> {
    let mut output = crate::open_for_write(outpath)?;
    for line in lines {
        writeln!(output, "{line}")?;
    }

    Ok(())
}

// --------------------------------------------------
/// Load an existing summary table so new rows append rather than
/// clobber. An unnamed leading index column left by an earlier writer
/// is dropped.
pub fn load_summary(path: &Path) -> Result<Vec<SummaryRow>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path)
        .map_err(|e| anyhow!("Cannot read {}: {e}", path.display()))?;

    let headers = reader.headers()?.clone();
    let first = headers.iter().next().unwrap_or_default();
    let offset = usize::from(first.is_empty() || first == "Unnamed: 0");

    let mut rows = vec![];
    for record in reader.records() {
        let record = record?;
        let field =
            |i: usize| record.get(i + offset).unwrap_or_default().trim().to_string();
        let opt_f64 = |i: usize| field(i).parse::<f64>().ok();
        let opt_u32 = |i: usize| field(i).parse::<u32>().ok();

        rows.push(SummaryRow {
            cluster: field(0),
            accessions: field(1),
            p_value: opt_f64(2),
            lnl1: opt_f64(3),
            np1: opt_u32(4),
            lnl0: opt_f64(5),
            np0: opt_u32(6),
        });
    }

    Ok(rows)
}

// --------------------------------------------------
#[cfg(test)]
mod tests {
    use super::{load_summary, Outcome, SummaryAccumulator};
    use crate::lrt::SelectionResult;
    use anyhow::Result;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn classified(accession: &str, p_value: f64) -> Outcome {
        Outcome::Classified(SelectionResult {
            accession: accession.to_string(),
            p_value,
            lnl_alt: -1000.0,
            np_alt: 3,
            lnl_null: -1005.0,
            np_null: 2,
        })
    }

    #[test]
    fn test_outcomes_partition_into_disjoint_listings() -> Result<()> {
        let outdir = tempdir()?;
        let mut acc = SummaryAccumulator::new(outdir.path(), None);
        acc.record(classified("QJT20307.1", 0.001));
        acc.record(classified("QKY51244.1", 0.9));
        acc.record(Outcome::Rerun {
            accession: "AUZ40945.1".to_string(),
            reason: "no likelihood in engine output".to_string(),
        });
        acc.record(Outcome::Skipped {
            accession: "XYZ123".to_string(),
            reason: "tree does not contain the accession".to_string(),
        });
        acc.flush()?;

        let selected = fs::read_to_string(
            outdir.path().join("positively_selected_proteins.out"),
        )?;
        let not_selected = fs::read_to_string(
            outdir.path().join("not_positively_selected_proteins.out"),
        )?;
        let rerun =
            fs::read_to_string(outdir.path().join("rerun_proteins.out"))?;

        assert_eq!(selected, "QJT20307.1\t0.001\n");
        assert_eq!(not_selected, "QKY51244.1\t0.9\n");
        assert_eq!(rerun, "AUZ40945.1\n");

        // A skipped accession leaves no trace in any listing
        for listing in [&selected, &not_selected, &rerun] {
            assert!(!listing.contains("XYZ123"));
        }

        Ok(())
    }

    #[test]
    fn test_listings_exist_even_when_empty() -> Result<()> {
        let outdir = tempdir()?;
        let acc = SummaryAccumulator::new(outdir.path(), None);
        acc.flush()?;

        for name in [
            "positively_selected_proteins.out",
            "not_positively_selected_proteins.out",
            "rerun_proteins.out",
        ] {
            assert_eq!(fs::read_to_string(outdir.path().join(name))?, "");
        }

        Ok(())
    }

    #[test]
    fn test_summary_created_then_appended() -> Result<()> {
        let outdir = tempdir()?;
        let summary = outdir.path().join("summary.tsv");

        let mut acc =
            SummaryAccumulator::new(outdir.path(), Some(&summary));
        acc.record(classified("QJT20307.1", 0.001));
        acc.flush()?;

        let mut acc =
            SummaryAccumulator::new(outdir.path(), Some(&summary));
        acc.record(classified("QKY51244.1", 0.9));
        acc.record(Outcome::Rerun {
            accession: "AUZ40945.1".to_string(),
            reason: "timeout".to_string(),
        });
        acc.flush()?;

        let text = fs::read_to_string(&summary)?;
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines[0],
            "cluster\taccessions\tp_value\tlnl1\tnp1\tlnl0\tnp0"
        );
        assert_eq!(lines.len(), 4);
        assert!(lines[1].contains("QJT20307.1\t0.001\t-1000.0\t3\t-1005.0\t2"));
        assert!(lines[2].contains("QKY51244.1\t0.9"));
        // The rerun row carries the accession but no statistics
        assert!(lines[3].contains("AUZ40945.1\t\t\t\t\t"));

        Ok(())
    }

    #[test]
    fn test_load_summary_drops_stray_index_column() -> Result<()> {
        let outdir = tempdir()?;
        let summary = outdir.path().join("summary.tsv");
        fs::write(
            &summary,
            "\tcluster\taccessions\tp_value\tlnl1\tnp1\tlnl0\tnp0\n\
             0\tpecto_cluster\tQJT20307.1\t0.001\t-1000.0\t3\t-1005.0\t2\n",
        )?;

        let rows = load_summary(&summary)?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cluster, "pecto_cluster");
        assert_eq!(rows[0].accessions, "QJT20307.1");
        assert_eq!(rows[0].p_value, Some(0.001));
        assert_eq!(rows[0].np0, Some(2));

        // Rewriting after a load leaves a clean header behind
        let mut acc =
            SummaryAccumulator::new(outdir.path(), Some(&summary));
        acc.record(classified("QKY51244.1", 0.9));
        acc.flush()?;

        let text = fs::read_to_string(&summary)?;
        assert!(text
            .starts_with("cluster\taccessions\tp_value\tlnl1\tnp1\tlnl0\tnp0"));
        assert!(text.contains("pecto_cluster\tQJT20307.1"));
        assert!(text.contains("QKY51244.1"));

        Ok(())
    }
}
