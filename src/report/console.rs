use crate::report::report_model::{PageReport, PipelineReport};

// ============================================================================
// Console reporter: formatted terminal output
// ============================================================================

/// Format a pipeline report for terminal output.
///
/// Produces output like:
/// ```text
/// === Capture run: 2 page(s) ===
///
/// ✓ DONE  https://app.test/dashboard [complete] (3 components: 3 ok, 0 skipped, 0 failed; 2 variants)
/// ✗ STOP  https://app.test/settings [capturing] (7 components: 2 ok, 1 skipped, 0 failed; 1 variants)
///     [ERROR] authentication expired: redirected to /login
///     [UNRESTORED] main::#density
///
/// === Results: 5 captured, 1 skipped, 0 failed in 12.3s ===
/// ```
pub fn format_console_report(report: &PipelineReport) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== Capture run: {} page(s) ===\n\n", report.pages.len()));

    for page in &report.pages {
        format_page(&mut out, page);
    }

    if report.halted {
        out.push_str("\n!!! Pipeline halted: authentication expired. Re-run to resume from checkpoints.\n");
    }

    let (captured, skipped, failed) = report.totals();
    out.push_str(&format!(
        "\n=== Results: {} captured, {} skipped, {} failed",
        captured, skipped, failed
    ));

    if let Some(ms) = report.duration_ms {
        let secs = ms as f64 / 1000.0;
        out.push_str(&format!(" in {:.1}s", secs));
    }

    out.push_str(" ===\n");

    out
}

fn format_page(out: &mut String, page: &PageReport) {
    let marker = if page.is_complete() {
        "\u{2713} DONE"
    } else {
        "\u{2717} STOP"
    };

    out.push_str(&format!(
        "{}  {} [{}] ({} components: {} ok, {} skipped, {} failed; {} variants)\n",
        marker, page.url, page.stage, page.components, page.captured, page.skipped, page.failed, page.variants
    ));

    if let Some(ref error) = page.error {
        out.push_str(&format!("    [ERROR] {}\n", error));
    }
    for key in &page.unrestored {
        out.push_str(&format!("    [UNRESTORED] {}\n", key));
    }
    for err in &page.write_errors {
        out.push_str(&format!("    [WRITE] {}\n", err));
    }
}
