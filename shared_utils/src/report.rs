//! Report Module
//!
//! Summary reporting for a finished batch.

use crate::batch::BatchResult;
use crate::progress::{format_bytes, format_duration};
use std::time::Duration;

/// Output size relative to input, as a reduction percentage. Negative when
/// the outputs grew.
pub fn size_reduction_percent(input_bytes: u64, output_bytes: u64) -> f64 {
    if input_bytes > 0 {
        (1.0 - output_bytes as f64 / input_bytes as f64) * 100.0
    } else {
        0.0
    }
}

pub fn print_summary_report(result: &BatchResult, duration: Duration, operation_name: &str) {
    let reduction = size_reduction_percent(result.input_bytes, result.output_bytes);

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  📊 {:<57}║", format!("{} Summary Report", operation_name));
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  📁 Files Processed:    {:>10}                           ║", result.total);
    println!("║  ✅ Converted:          {:>10}                           ║", result.succeeded);
    println!("║  ❌ Failed:             {:>10}                           ║", result.failed);
    println!("║  ⏭️  Not started:        {:>10}                           ║", result.skipped);
    println!(
        "║  📈 Success Rate:       {:>9.1}%                           ║",
        result.success_rate()
    );
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!(
        "║  💾 Input Size:         {:>10}                           ║",
        format_bytes(result.input_bytes)
    );
    println!(
        "║  💾 Output Size:        {:>10}                           ║",
        format_bytes(result.output_bytes)
    );
    println!("║  📉 Size Reduction:     {:>9.1}%                           ║", reduction);
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!(
        "║  ⏱️  Total Time:         {:>10}                           ║",
        format_duration(duration)
    );
    if result.succeeded > 0 {
        let avg_time = duration.as_secs_f64() / result.succeeded as f64;
        println!("║  ⏱️  Avg Time/File:      {:>9.2}s                           ║", avg_time);
    }
    if result.cancelled {
        println!("║  🛑 Canceled by user                                         ║");
    }
    println!("╚══════════════════════════════════════════════════════════════╝");

    if !result.errors.is_empty() {
        println!();
        println!("❌ Errors encountered:");
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        for (path, error) in &result.errors {
            println!("   {} → {}", path.display(), error);
        }
    }
}

pub fn print_simple_summary(result: &BatchResult) {
    println!(
        "\n✅ Complete: {} converted, {} failed, {} not started (total: {})",
        result.succeeded, result.failed, result.skipped, result.total
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_size_reduction_formula() {
        assert!((size_reduction_percent(1000, 500) - 50.0).abs() < 0.01);
        assert!((size_reduction_percent(1000, 250) - 75.0).abs() < 0.01);
        assert!((size_reduction_percent(1000, 1000) - 0.0).abs() < 0.01);
        assert!((size_reduction_percent(500, 1000) - (-100.0)).abs() < 0.01);
        assert_eq!(size_reduction_percent(0, 1000), 0.0);
    }

    #[test]
    fn test_print_summary_report_no_panic() {
        let mut result = BatchResult::new();
        result.success(1000, 500);
        result.fail(PathBuf::from("broken.avi"), "Invalid data found".to_string());
        result.mark_cancelled();
        result.skip_many(2);

        print_summary_report(&result, Duration::from_secs(10), "MP4");
    }

    #[test]
    fn test_print_summary_report_empty() {
        print_summary_report(&BatchResult::new(), Duration::from_secs(1), "MP4");
        print_simple_summary(&BatchResult::new());
    }
}
