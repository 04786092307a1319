use crate::core::sweep::{RocPoint, SweepReport};
use crate::types::FloodResult;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const ROC_CSV_HEADER: &str = "threshold,perennialThreshold,weekFreq,yearFreq,TPR,FPR,TP,FP,FN,TN";

/// Write the ROC table: sorted defined points, then points with an undefined rate.
/// Every row carries the threshold pair it was evaluated at.
pub fn write_roc_csv<W: Write>(report: &SweepReport, mut writer: W) -> FloodResult<()> {
    writeln!(writer, "{}", ROC_CSV_HEADER)?;
    for point in report.points.iter().chain(report.undefined.iter()) {
        write_row(&mut writer, point)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_roc_csv_file<P: AsRef<Path>>(report: &SweepReport, path: P) -> FloodResult<()> {
    log::info!("Writing ROC table: {}", path.as_ref().display());
    let file = File::create(path.as_ref())?;
    write_roc_csv(report, BufWriter::new(file))
}

fn write_row<W: Write>(writer: &mut W, point: &RocPoint) -> FloodResult<()> {
    let counts = &point.counts;
    writeln!(
        writer,
        "{},{},{},{},{},{},{},{},{},{}",
        point.threshold_db,
        point.perennial_threshold,
        point.week_freq,
        point.year_freq,
        format_rate(point.tpr),
        format_rate(point.fpr),
        counts.true_positive,
        counts.false_positive,
        counts.false_negative,
        counts.true_negative
    )?;
    Ok(())
}

fn format_rate(rate: Option<f64>) -> String {
    match rate {
        Some(value) => format!("{:.6}", value),
        None => "NA".to_string(),
    }
}

impl SweepReport {
    /// Human-readable AUC and best combination
    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "ROC points: {} (undefined: {}, skipped: {}){}",
            self.points.len(),
            self.undefined.len(),
            self.skipped.len(),
            if self.cancelled { ", cancelled" } else { "" }
        )];
        lines.push(format!("AUC: {:.4}", self.auc));

        match &self.best {
            Some(best) => lines.push(format!(
                "Best combination: threshold = {}, perennialThreshold = {}, weekFreq = {}, yearFreq = {}, TPR = {}, FPR = {}, Youden index = {:.4}",
                best.point.threshold_db,
                best.point.perennial_threshold,
                best.point.week_freq,
                best.point.year_freq,
                format_rate(best.point.tpr),
                format_rate(best.point.fpr),
                best.youden_index
            )),
            None => lines.push("Best combination: none".to_string()),
        }

        for skip in &self.skipped {
            lines.push(format!(
                "Skipped threshold = {}, perennialThreshold = {}, weekFreq = {}, yearFreq = {}: {}",
                skip.thresholds.threshold_db,
                skip.thresholds.perennial_threshold,
                skip.week_freq,
                skip.year_freq,
                skip.reason
            ));
        }
        lines.join("\n")
    }
}
