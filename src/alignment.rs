use anyhow::{bail, Result};
use kseq::parse_reader;
use std::{io::Write, path::Path};

/// One record of the nucleotide MSA. `desc` keeps the raw description,
/// including its leading whitespace, so FASTA headers round-trip.
#[derive(Debug, Clone, PartialEq)]
pub struct SeqRecord {
    pub id: String,
    pub desc: String,
    pub seq: String,
}

// --------------------------------------------------
/// Read all records of a FASTA alignment.
pub fn read_fasta(path: &Path) -> Result<Vec<SeqRecord>> {
    let mut reader = parse_reader(crate::open(path)?)?;
    let mut records = vec![];
    while let Some(rec) = reader.iter_record()? {
        records.push(SeqRecord {
            id: rec.head().to_string(),
            desc: rec.des().to_string(),
            seq: rec.seq().to_string(),
        });
    }

    if records.is_empty() {
        bail!("No sequences in {}", path.display());
    }

    Ok(records)
}

// --------------------------------------------------
/// Move the record for `accession` to the front of the alignment,
/// keeping the relative order of all other records. The engine reads
/// the first sequence as the protein under test. Returns `None` when
/// the alignment has no record with that id.
pub fn reorder(records: &[SeqRecord], accession: &str) -> Option<Vec<SeqRecord>> {
    let wanted = accession.trim();
    let seq_of_interest = records.iter().find(|rec| rec.id.trim() == wanted)?;

    let mut reordered = vec![seq_of_interest.clone()];
    reordered.extend(
        records
            .iter()
            .filter(|rec| rec.id.trim() != wanted)
            .cloned(),
    );

    Some(reordered)
}

// --------------------------------------------------
pub fn write_fasta(records: &[SeqRecord], outpath: &Path) -> Result<()> {
    let mut output = crate::open_for_write(outpath)?;
    for rec in records {
        writeln!(output, ">{}{}\n{}", rec.id, rec.desc, rec.seq)?;
    }

    Ok(())
}

// --------------------------------------------------
/// Write the fixed-width tabular rendition the engine reads: a header
/// line with the record count and alignment length, then one
/// `"<id>  <seq>"` line per record.
pub fn write_phylip(records: &[SeqRecord], outpath: &Path) -> Result<()> {
    let mut output = crate::open_for_write(outpath)?;
    let seq_len = records.first().map_or(0, |rec| rec.seq.len());
    writeln!(output, "  {}  {}  ", records.len(), seq_len)?;
    for rec in records {
        writeln!(output, "{}  {}", rec.id, rec.seq)?;
    }

    Ok(())
}
