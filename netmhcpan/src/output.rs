use crate::export::ExportReport;
use crate::jobs::{JobRecord, JobState, JobSummary};
use crate::parser::{AlleleSummary, BinderClass, ParsedOutput, PredictionRecord};
use crate::predict::PredictionReport;
use crate::utils::format_secs;
use chrono::{DateTime, Utc};
use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::time::Duration;

/// Binder rows shown in the top-binders table before truncation.
const TOP_BINDER_LIMIT: usize = 20;

/// Create and return a spinner shown while the predictor runs.
///
/// In test mode, returns a hidden progress bar to avoid polluting test output.
#[must_use]
pub fn create_spinner() -> ProgressBar {
    // In test mode, return a hidden progress bar to avoid polluting test output
    if cfg!(test) {
        return ProgressBar::hidden();
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("netMHCpan running…");
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Print the main header with box-drawing characters.
///
/// # Errors
///
/// Returns an error if writing to the output fails.
pub fn print_header(writer: &mut impl Write) -> std::io::Result<()> {
    writeln!(writer)?;
    writeln!(
        writer,
        "{}",
        "╔════════════════════════════════════════╗".cyan()
    )?;
    writeln!(
        writer,
        "{}",
        "║  NetMHCpan Binding Predictions         ║".cyan().bold()
    )?;
    writeln!(
        writer,
        "{}",
        "╚════════════════════════════════════════╝".cyan()
    )?;
    writeln!(writer)?;
    Ok(())
}

/// Print binder counts as colored "pills".
///
/// # Errors
///
/// Returns an error if writing to the output fails.
pub fn print_summary_pills(writer: &mut impl Write, parsed: &ParsedOutput) -> std::io::Result<()> {
    fn pill(label: &str, count: usize, hot: fn(String) -> colored::ColoredString) -> String {
        if count == 0 {
            format!("{}: {}", label, count.to_string().dimmed())
        } else {
            format!("{}: {}", label, hot(count.to_string()).bold())
        }
    }

    writeln!(
        writer,
        "{}  {}  {}: {}",
        pill("Strong binders", parsed.summary.strong_binders, |s| s.green()),
        pill("Weak binders", parsed.summary.weak_binders, |s| s.yellow()),
        "Records",
        parsed.summary.total_records.to_string().cyan(),
    )?;
    Ok(())
}

/// Print the per-allele breakdown table. Skipped when only one allele was
/// scored, the pills already say everything then.
///
/// # Errors
///
/// Returns an error if writing to the output fails.
pub fn print_allele_table(
    writer: &mut impl Write,
    summaries: &[AlleleSummary],
) -> std::io::Result<()> {
    if summaries.len() < 2 {
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Allele").add_attribute(Attribute::Bold),
            Cell::new("Strong").add_attribute(Attribute::Bold),
            Cell::new("Weak").add_attribute(Attribute::Bold),
            Cell::new("Records").add_attribute(Attribute::Bold),
        ]);
    for entry in summaries {
        table.add_row(vec![
            Cell::new(&entry.allele),
            Cell::new(entry.summary.strong_binders).fg(Color::Green),
            Cell::new(entry.summary.weak_binders).fg(Color::Yellow),
            Cell::new(entry.summary.total_records),
        ]);
    }
    writeln!(writer, "{table}")?;
    Ok(())
}

/// Print the strongest binders, best percentile rank first.
///
/// # Errors
///
/// Returns an error if writing to the output fails.
pub fn print_top_binders(
    writer: &mut impl Write,
    records: &[PredictionRecord],
) -> std::io::Result<()> {
    let mut binders: Vec<&PredictionRecord> = records
        .iter()
        .filter(|record| record.binder != BinderClass::None)
        .collect();
    if binders.is_empty() {
        writeln!(
            writer,
            "{}",
            "No binders at the configured thresholds.".dimmed()
        )?;
        return Ok(());
    }
    binders.sort_by(|a, b| {
        a.rank_el
            .partial_cmp(&b.rank_el)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let shown = binders.len().min(TOP_BINDER_LIMIT);

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Peptide").add_attribute(Attribute::Bold),
            Cell::new("Allele").add_attribute(Attribute::Bold),
            Cell::new("%Rank EL").add_attribute(Attribute::Bold),
            Cell::new("Score EL").add_attribute(Attribute::Bold),
            Cell::new("Binder").add_attribute(Attribute::Bold),
        ]);
    for record in &binders[..shown] {
        let class = match record.binder {
            BinderClass::Strong => Cell::new("strong").fg(Color::Green),
            BinderClass::Weak => Cell::new("weak").fg(Color::Yellow),
            BinderClass::None => Cell::new("none"),
        };
        table.add_row(vec![
            Cell::new(&record.peptide),
            Cell::new(&record.allele),
            Cell::new(format!("{:.3}", record.rank_el)),
            Cell::new(format!("{:.4}", record.score_el)),
            class,
        ]);
    }
    writeln!(writer, "{table}")?;
    if binders.len() > shown {
        writeln!(
            writer,
            "{}",
            format!("… and {} more binders", binders.len() - shown).dimmed()
        )?;
    }
    Ok(())
}

/// Print parser notes (degraded-input explanations), if any.
///
/// # Errors
///
/// Returns an error if writing to the output fails.
pub fn print_notes(writer: &mut impl Write, notes: &[String]) -> std::io::Result<()> {
    for note in notes {
        writeln!(writer, "{} {}", "[note]".yellow(), note)?;
    }
    Ok(())
}

/// Print a full parsed report: pills, per-allele table, top binders, notes.
///
/// # Errors
///
/// Returns an error if writing to the output fails.
pub fn print_parsed_output(writer: &mut impl Write, parsed: &ParsedOutput) -> std::io::Result<()> {
    print_summary_pills(writer, parsed)?;
    writeln!(writer)?;
    print_allele_table(writer, &parsed.allele_summaries)?;
    print_top_binders(writer, &parsed.records)?;
    print_notes(writer, &parsed.notes)?;
    Ok(())
}

/// Print the outcome of a foreground prediction run.
///
/// # Errors
///
/// Returns an error if writing to the output fails.
pub fn print_prediction_report(
    writer: &mut impl Write,
    report: &PredictionReport,
) -> std::io::Result<()> {
    print_header(writer)?;
    print_parsed_output(writer, &report.parsed)?;
    writeln!(
        writer,
        "\n{} {}",
        "Report:".bold(),
        report.output_file.display()
    )?;
    writeln!(
        writer,
        "{} {}",
        "Predictor time:".bold(),
        format_secs(report.duration_secs)
    )?;
    Ok(())
}

/// Print the outcome of a multi-allele export run.
///
/// # Errors
///
/// Returns an error if writing to the output fails.
pub fn print_export_report(writer: &mut impl Write, report: &ExportReport) -> std::io::Result<()> {
    print_header(writer)?;
    print_allele_table(writer, &report.allele_summaries)?;
    writeln!(
        writer,
        "{} {} alleles, {} records",
        "Compared:".bold(),
        report.alleles.len(),
        report.total_records
    )?;
    writeln!(
        writer,
        "{} {}",
        "Summary:".bold(),
        report.output_file.display()
    )?;
    writeln!(writer, "{} {}", "Table:".bold(), report.excel_file.display())?;
    writeln!(
        writer,
        "{} {}",
        "Predictor time:".bold(),
        format_secs(report.duration_secs)
    )?;
    Ok(())
}

fn state_cell(state: JobState) -> Cell {
    match state {
        JobState::Pending => Cell::new("pending").fg(Color::Cyan),
        JobState::Running => Cell::new("running").fg(Color::Blue),
        JobState::Completed => Cell::new("completed").fg(Color::Green),
        JobState::Failed => Cell::new("failed").fg(Color::Red),
        JobState::Cancelled => Cell::new("cancelled").fg(Color::Yellow),
    }
}

fn stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Print the job listing table.
///
/// # Errors
///
/// Returns an error if writing to the output fails.
pub fn print_job_table(writer: &mut impl Write, jobs: &[JobSummary]) -> std::io::Result<()> {
    if jobs.is_empty() {
        writeln!(writer, "{}", "No jobs.".dimmed())?;
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Job").add_attribute(Attribute::Bold),
            Cell::new("Name").add_attribute(Attribute::Bold),
            Cell::new("Operation").add_attribute(Attribute::Bold),
            Cell::new("State").add_attribute(Attribute::Bold),
            Cell::new("Created").add_attribute(Attribute::Bold),
        ]);
    for job in jobs {
        table.add_row(vec![
            Cell::new(&job.id),
            Cell::new(job.name.as_deref().unwrap_or("-")),
            Cell::new(&job.operation),
            state_cell(job.state),
            Cell::new(stamp(job.created_at)),
        ]);
    }
    writeln!(writer, "{table}")?;
    Ok(())
}

/// Print one job's record in key/value form.
///
/// # Errors
///
/// Returns an error if writing to the output fails.
pub fn print_job_record(writer: &mut impl Write, record: &JobRecord) -> std::io::Result<()> {
    writeln!(writer, "{} {}", "Job:".bold(), record.id)?;
    if let Some(name) = &record.name {
        writeln!(writer, "{} {name}", "Name:".bold())?;
    }
    writeln!(
        writer,
        "{} {}",
        "Operation:".bold(),
        record.request.operation()
    )?;
    let state = match record.state {
        JobState::Pending => "pending".cyan(),
        JobState::Running => "running".blue(),
        JobState::Completed => "completed".green(),
        JobState::Failed => "failed".red(),
        JobState::Cancelled => "cancelled".yellow(),
    };
    writeln!(writer, "{} {state}", "State:".bold())?;
    writeln!(writer, "{} {}", "Created:".bold(), stamp(record.created_at))?;
    if let Some(at) = record.started_at {
        writeln!(writer, "{} {}", "Started:".bold(), stamp(at))?;
    }
    if let Some(at) = record.finished_at {
        writeln!(writer, "{} {}", "Finished:".bold(), stamp(at))?;
    }
    writeln!(writer, "{} {}", "Log:".bold(), record.log_path.display())?;
    if record.state == JobState::Completed {
        writeln!(
            writer,
            "{} {}",
            "Result:".bold(),
            record.result_path.display()
        )?;
    }
    if let Some(error) = &record.error {
        writeln!(
            writer,
            "{} [{}] {}",
            "Error:".red().bold(),
            error.kind,
            error.message
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::OutputParser;

    fn plain() {
        colored::control::set_override(false);
    }

    fn render(f: impl FnOnce(&mut Vec<u8>) -> std::io::Result<()>) -> String {
        let mut buffer = Vec::new();
        f(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    const REPORT: &str = "\
 Pos         MHC        Peptide Identity  Score_EL %Rank_EL BindLevel\n\
   1 HLA-A*02:01      SIINFEKL   PEPLIST 0.8523450    0.123 <= SB\n\
   2 HLA-A*02:01     KVAELVHFL   PEPLIST 0.2233410    1.500 <= WB\n\
   3 HLA-B*07:02     AAAAAAAAA   PEPLIST 0.0023450   45.000\n";

    #[test]
    fn pills_show_counts() {
        plain();
        let parsed = OutputParser::default().parse(REPORT);
        let text = render(|w| print_summary_pills(w, &parsed));
        assert!(text.contains("Strong binders: 1"));
        assert!(text.contains("Weak binders: 1"));
        assert!(text.contains("Records: 3"));
    }

    #[test]
    fn allele_table_needs_two_alleles() {
        plain();
        let parsed = OutputParser::default().parse(REPORT);
        let text = render(|w| print_allele_table(w, &parsed.allele_summaries));
        assert!(text.contains("HLA-A*02:01"));
        assert!(text.contains("HLA-B*07:02"));

        let single = render(|w| print_allele_table(w, &parsed.allele_summaries[..1]));
        assert!(single.is_empty());
    }

    #[test]
    fn top_binders_sorted_by_rank() {
        plain();
        let parsed = OutputParser::default().parse(REPORT);
        let text = render(|w| print_top_binders(w, &parsed.records));
        let strong_at = text.find("SIINFEKL").unwrap();
        let weak_at = text.find("KVAELVHFL").unwrap();
        assert!(strong_at < weak_at);
        // Non-binders stay out of the table.
        assert!(!text.contains("AAAAAAAAA"));
    }

    #[test]
    fn empty_parse_prints_no_binders_line() {
        plain();
        let parsed = OutputParser::default().parse("");
        let text = render(|w| print_parsed_output(w, &parsed));
        assert!(text.contains("No binders"));
        assert!(text.contains("no prediction rows found"));
    }

    #[test]
    fn job_table_handles_empty_store() {
        plain();
        let text = render(|w| print_job_table(w, &[]));
        assert!(text.contains("No jobs."));
    }
}
