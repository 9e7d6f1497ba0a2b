use crate::report::report_model::{PageReport, PipelineReport};

// ============================================================================
// JUnit XML reporter: standard CI integration format
// ============================================================================

/// Generate a JUnit XML report, one testcase per page.
///
/// A page that did not reach `complete` is a failure; a completed page with
/// skipped or failed components carries them in `system-out`.
/// ```xml
/// <?xml version="1.0" encoding="UTF-8"?>
/// <testsuite name="screen-inventory" tests="2" failures="1" time="1.234">
///   <testcase name="https://app.test/" classname="screen-inventory" />
///   <testcase name="https://app.test/settings" classname="screen-inventory">
///     <failure message="stopped at capturing" type="PageIncomplete">authentication expired</failure>
///   </testcase>
/// </testsuite>
/// ```
pub fn generate_junit_xml(report: &PipelineReport) -> String {
    let time_attr = report
        .duration_ms
        .map(|ms| format!(" time=\"{:.3}\"", ms as f64 / 1000.0))
        .unwrap_or_default();

    let mut cases = String::new();
    for page in &report.pages {
        cases.push_str(&testcase(page));
    }

    let failures = report.pages.iter().filter(|p| !p.is_complete()).count();

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<testsuite name=\"screen-inventory\" tests=\"{tests}\" failures=\"{failures}\"{time}>\n{cases}</testsuite>\n",
        tests = report.pages.len(),
        failures = failures,
        time = time_attr,
        cases = cases,
    )
}

fn testcase(page: &PageReport) -> String {
    let summary = format!(
        "{} ok, {} skipped, {} failed, {} variants",
        page.captured, page.skipped, page.failed, page.variants
    );

    if page.is_complete() {
        if page.skipped == 0 && page.failed == 0 && page.unrestored.is_empty() {
            return format!(
                "  <testcase name=\"{}\" classname=\"screen-inventory\" />\n",
                escape_xml(&page.url)
            );
        }

        let mut lines = vec![summary];
        lines.extend(page.unrestored.iter().map(|k| format!("unrestored: {}", k)));
        return format!(
            "  <testcase name=\"{name}\" classname=\"screen-inventory\">\n    <system-out>{body}</system-out>\n  </testcase>\n",
            name = escape_xml(&page.url),
            body = escape_xml(&lines.join("\n")),
        );
    }

    let body = match &page.error {
        Some(error) => format!("{}\n{}", error, summary),
        None => summary,
    };

    format!(
        "  <testcase name=\"{name}\" classname=\"screen-inventory\">\n    <failure message=\"{message}\" type=\"PageIncomplete\">{body}</failure>\n  </testcase>\n",
        name = escape_xml(&page.url),
        message = escape_xml(&format!("stopped at {}", page.stage)),
        body = escape_xml(&body),
    )
}

/// Escape XML special characters.
pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
