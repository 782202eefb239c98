//! Multi-allele comparison export.
//!
//! One eluted-ligand run over a comma-joined allele list, post-processed
//! into two artifacts: a per-allele summary document and a tab-delimited
//! table that spreadsheet tools open directly. The raw predictor report is
//! scratch here; the two derived files are the deliverables.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::parser::{AlleleSummary, ParsedOutput, PredictionRecord};
use crate::predict::{AffinityRequest, PredictionMode, PredictionRequest, Predictor};
use crate::utils::{file_stem_string, sanitize_allele};

/// Parameters for one export run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRequest {
    /// Peptide-list file, one sequence per line.
    pub input_file: PathBuf,
    /// Alleles to compare; scored in a single run.
    pub alleles: Vec<String>,
    /// Optional `%Rank` display cutoff passed as `-t`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rank_threshold: Option<f64>,
    /// Summary document location; derived next to the input when unset.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output_file: Option<PathBuf>,
    /// Tab-delimited table location; derived next to the input when unset.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub excel_file: Option<PathBuf>,
}

impl ExportRequest {
    /// Allele tag used in derived file names: the first two alleles with
    /// `:` and `*` stripped, joined by `_`.
    fn allele_tag(&self) -> String {
        self.alleles
            .iter()
            .take(2)
            .map(|allele| sanitize_allele(allele))
            .collect::<Vec<_>>()
            .join("_")
    }

    fn derived_path(&self, extension: &str) -> PathBuf {
        let parent = self
            .input_file
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        parent.join(format!(
            "{}_multi_{}.{extension}",
            file_stem_string(&self.input_file),
            self.allele_tag()
        ))
    }

    /// Where the summary document goes.
    #[must_use]
    pub fn summary_path(&self) -> PathBuf {
        self.output_file
            .clone()
            .unwrap_or_else(|| self.derived_path("txt"))
    }

    /// Where the tab-delimited table goes.
    #[must_use]
    pub fn table_path(&self) -> PathBuf {
        self.excel_file
            .clone()
            .unwrap_or_else(|| self.derived_path("tsv"))
    }
}

/// What one export run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    /// The per-allele summary document.
    pub output_file: PathBuf,
    /// The tab-delimited table.
    pub excel_file: PathBuf,
    /// Alleles that were compared, in request order.
    pub alleles: Vec<String>,
    /// Rows in the table.
    pub total_records: usize,
    /// Recomputed counts per allele.
    pub allele_summaries: Vec<AlleleSummary>,
    /// Wall-clock seconds the predictor ran for.
    pub duration_secs: f64,
}

/// Runs the comparison and writes both artifacts.
///
/// # Errors
///
/// Validation, launch, and nonzero-exit failures propagate from the
/// underlying prediction; IO errors when an artifact cannot be written.
pub async fn run_export(predictor: &Predictor, request: &ExportRequest) -> Result<ExportReport> {
    // The raw report only lives long enough to be parsed.
    let scratch = tempfile::tempdir()?;
    let prediction = PredictionRequest::Affinity(AffinityRequest {
        input_file: request.input_file.clone(),
        alleles: request.alleles.clone(),
        mode: PredictionMode::El,
        rank_threshold: request.rank_threshold,
        chunk_size: None,
        output_file: Some(scratch.path().join("raw_report.txt")),
    });
    let report = predictor.run(&prediction).await?;

    let summary_path = request.summary_path();
    let table_path = request.table_path();
    std::fs::write(
        &summary_path,
        render_summary(&request.input_file, &request.alleles, &report.parsed),
    )?;
    std::fs::write(&table_path, render_table(&report.parsed.records))?;

    info!(
        alleles = request.alleles.len(),
        records = report.parsed.summary.total_records,
        table = %table_path.display(),
        "export finished"
    );
    Ok(ExportReport {
        output_file: summary_path,
        excel_file: table_path,
        alleles: request.alleles.clone(),
        total_records: report.parsed.summary.total_records,
        allele_summaries: report.parsed.allele_summaries.clone(),
        duration_secs: report.duration_secs,
    })
}

/// Renders the human-readable per-allele summary document.
fn render_summary(input_file: &Path, alleles: &[String], parsed: &ParsedOutput) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Multi-allele NetMHCpan prediction results");
    let _ = writeln!(out, "# Input file: {}", input_file.display());
    let _ = writeln!(out, "# Alleles: {}", alleles.join(", "));
    let _ = writeln!(out, "# Total records: {}", parsed.summary.total_records);
    let _ = writeln!(out, "#");

    for entry in &parsed.allele_summaries {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Allele: {}", entry.allele);
        let _ = writeln!(out, "Strong binders: {}", entry.summary.strong_binders);
        let _ = writeln!(out, "Weak binders: {}", entry.summary.weak_binders);
        let _ = writeln!(out, "Total processed: {}", entry.summary.total_records);
    }
    out
}

/// Renders the tab-delimited table. Optional columns are left empty rather
/// than dropped, so every row has the same number of cells.
fn render_table(records: &[PredictionRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "peptide\tallele\tscore_el\trank_el\tpos\tlength\tidentity\tbinder\tbind_level\tscore_ba\trank_ba\taffinity_nm"
    );
    for record in records {
        let _ = writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            record.peptide,
            record.allele,
            record.score_el,
            record.rank_el,
            record.pos,
            record.length,
            record.identity,
            record.binder,
            record.bind_level.map(|l| l.to_string()).unwrap_or_default(),
            record.score_ba.map(|v| v.to_string()).unwrap_or_default(),
            record.rank_ba.map(|v| v.to_string()).unwrap_or_default(),
            record
                .affinity_nm
                .map(|v| v.to_string())
                .unwrap_or_default(),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::OutputParser;

    const REPORT: &str = "\
# NetMHCpan version 4.2\n\
---------------------------------------------------\n\
 Pos         MHC        Peptide      Core Of Gp Gl Ip Il        Icore        Identity  Score_EL %Rank_EL BindLevel\n\
---------------------------------------------------\n\
   1 HLA-A*02:01      SIINFEKL   SIINFEKL  0  0  0  0  0     SIINFEKL         PEPLIST 0.8523450    0.123 <= SB\n\
   2 HLA-A*02:01      KVAELVHFL  KVAELVHFL 0  0  0  0  0     KVAELVHFL        PEPLIST 0.2233410    1.500 <= WB\n\
   1 HLA-B*07:02      SIINFEKL   SIINFEKL  0  0  0  0  0     SIINFEKL         PEPLIST 0.0023450   45.000\n\
---------------------------------------------------\n";

    fn request() -> ExportRequest {
        ExportRequest {
            input_file: PathBuf::from("/data/test.pep"),
            alleles: vec![
                "HLA-A02:01".to_owned(),
                "HLA-B07:02".to_owned(),
                "HLA-C04:01".to_owned(),
            ],
            rank_threshold: None,
            output_file: None,
            excel_file: None,
        }
    }

    #[test]
    fn derived_names_use_first_two_alleles() {
        let request = request();
        assert_eq!(
            request.summary_path(),
            PathBuf::from("/data/test_multi_HLA-A0201_HLA-B0702.txt")
        );
        assert_eq!(
            request.table_path(),
            PathBuf::from("/data/test_multi_HLA-A0201_HLA-B0702.tsv")
        );
    }

    #[test]
    fn explicit_paths_win() {
        let mut request = request();
        request.output_file = Some(PathBuf::from("/elsewhere/summary.txt"));
        request.excel_file = Some(PathBuf::from("/elsewhere/table.tsv"));
        assert_eq!(request.summary_path(), PathBuf::from("/elsewhere/summary.txt"));
        assert_eq!(request.table_path(), PathBuf::from("/elsewhere/table.tsv"));
    }

    #[test]
    fn summary_document_lists_each_allele() {
        let parsed = OutputParser::default().parse(REPORT);
        let doc = render_summary(
            Path::new("/data/test.pep"),
            &["HLA-A02:01".to_owned(), "HLA-B07:02".to_owned()],
            &parsed,
        );

        assert!(doc.starts_with("# Multi-allele NetMHCpan prediction results"));
        assert!(doc.contains("# Alleles: HLA-A02:01, HLA-B07:02"));
        assert!(doc.contains("# Total records: 3"));
        assert!(doc.contains("## Allele: HLA-A*02:01"));
        assert!(doc.contains("## Allele: HLA-B*07:02"));
        assert!(doc.contains("Strong binders: 1"));
    }

    #[test]
    fn table_has_one_row_per_record_plus_header() {
        let parsed = OutputParser::default().parse(REPORT);
        let table = render_table(&parsed.records);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("peptide\tallele\tscore_el"));
        assert!(lines[1].starts_with("SIINFEKL\tHLA-A*02:01\t0.852345\t0.123"));
        // Every row carries the full cell count even with BA columns absent.
        for line in &lines[1..] {
            assert_eq!(line.matches('\t').count(), 11);
        }
        // Non-binder rows have an empty bind_level cell.
        assert!(lines[3].contains("\tnone\t\t"));
    }
}
