//! Human-readable rendering of catalogs, results and batch reports

use calib_core::application::CalibrationBatch;
use calib_core::domain::{CalibrationResult, CalibratorSpec, JobOutcome, ParameterKind};
use colored::Colorize;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct CalibratorRow {
    name: String,
    binary: String,
    parameters: String,
    artifact: String,
    fields: String,
}

#[derive(Tabled)]
struct QuantityRow {
    label: String,
    quantity: String,
    value: String,
}

#[derive(Tabled)]
struct OutcomeRow {
    label: String,
    job: String,
    status: String,
    exit_code: String,
    detail: String,
    duration_ms: String,
}

fn parameter_summary(spec: &CalibratorSpec) -> String {
    spec.parameters
        .iter()
        .map(|p| {
            let mut entry = match (&p.kind, &p.flag) {
                (ParameterKind::Positional, _) | (_, None) => format!("<{}>", p.name),
                (_, Some(flag)) => format!("{} {}", flag, p.name),
            };
            if let Some(default) = &p.default {
                entry.push_str(&format!("={}", default));
            }
            if p.required {
                entry.push('*');
            }
            entry
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn print_catalog<'a>(specs: impl Iterator<Item = &'a CalibratorSpec>) {
    let rows: Vec<CalibratorRow> = specs
        .map(|spec| CalibratorRow {
            name: spec.name.clone(),
            binary: spec.executable.binary_name(),
            parameters: parameter_summary(spec),
            artifact: format!("{}{}", spec.output.default_prefix, spec.output.suffix),
            fields: spec.schema.field_names().collect::<Vec<_>>().join(", "),
        })
        .collect();

    println!("{}", "Available calibrators".cyan().bold());
    println!("{}", Table::new(rows));
    println!("  * required, =default");
}

fn quantity_rows(result: &CalibrationResult) -> impl Iterator<Item = QuantityRow> + '_ {
    result.quantities.iter().map(|(name, value)| QuantityRow {
        label: result.label.clone(),
        quantity: name.clone(),
        value: value.to_string(),
    })
}

pub fn print_result(result: &CalibrationResult) {
    println!(
        "{}",
        format!("✓ {} calibration succeeded", result.label).green().bold()
    );
    if result.quantities.is_empty() {
        return;
    }
    println!("{}", Table::new(quantity_rows(result)));
    for (name, values) in &result.series {
        let joined = values
            .iter()
            .map(f64::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        println!("  {} [{}]", name.bold(), joined);
    }
}

fn outcome_row(outcome: &JobOutcome) -> OutcomeRow {
    OutcomeRow {
        label: outcome.label.clone(),
        job: outcome.job_id.clone(),
        status: if outcome.succeeded { "ok" } else { "FAILED" }.to_string(),
        exit_code: outcome
            .exit_code
            .map_or_else(|| "-".to_string(), |c| c.to_string()),
        detail: outcome
            .failure
            .as_ref()
            .map_or_else(String::new, ToString::to_string),
        duration_ms: outcome.duration_ms.to_string(),
    }
}

pub fn print_batch(batch: &CalibrationBatch) {
    let report = &batch.report;
    let mut rows: Vec<OutcomeRow> = report.outcomes().iter().map(outcome_row).collect();
    rows.extend(report.not_launched().iter().map(|job| OutcomeRow {
        label: job.label.clone(),
        job: job.job_id.clone(),
        status: "NOT LAUNCHED".to_string(),
        exit_code: "-".to_string(),
        detail: "batch interrupted".to_string(),
        duration_ms: "-".to_string(),
    }));

    println!("{}", "Batch report".cyan().bold());
    println!("{}", Table::new(rows));

    let quantities: Vec<QuantityRow> = batch.results.iter().flat_map(quantity_rows).collect();
    if !quantities.is_empty() {
        println!();
        println!("{}", Table::new(quantities));
    }

    let succeeded = report.succeeded().count();
    let failed = report.failed().count();
    let not_launched = report.not_launched().len();
    println!();
    let summary = format!(
        "{} succeeded, {} failed, {} not launched",
        succeeded, failed, not_launched
    );
    if report.all_succeeded() {
        println!("{}", summary.green().bold());
    } else {
        println!("{}", summary.red().bold());
    }
    if report.was_interrupted() {
        println!("{}", "Interrupted: no new jobs were launched".yellow());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calib_core::CalibratorCatalog;

    #[test]
    fn test_parameter_summary() {
        let catalog = CalibratorCatalog::builtin();
        let summary = parameter_summary(catalog.get("mip").unwrap());
        assert_eq!(summary, "-a root-file*, -b muon-energy=10");

        let marlin = parameter_summary(catalog.get("marlin").unwrap());
        assert_eq!(marlin, "<steering-file>*");
    }

    #[test]
    fn test_outcome_row_failure_detail() {
        let outcome = JobOutcome::failure(
            "job-3",
            "hcal-20",
            Some(2),
            calib_core::domain::FailureKind::ExitFailure { code: Some(2) },
            150,
        );
        let row = outcome_row(&outcome);
        assert_eq!(row.status, "FAILED");
        assert_eq!(row.exit_code, "2");
        assert!(!row.detail.is_empty());
    }
}
