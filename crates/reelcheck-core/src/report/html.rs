use crate::defects::DefectRegistry;
use crate::models::{OutcomeStatus, TestOutcome};
use crate::runner::RunResults;

const STYLE: &str = "body{font-family:sans-serif;margin:2em;color:#222}\
table{border-collapse:collapse;margin:1em 0}\
td,th{border:1px solid #ccc;padding:4px 8px;text-align:left;vertical-align:top}\
.passed{color:#1a7f37}.failed{color:#cf222e}.expected_failure{color:#9a6700}.skipped{color:#6e7781}\
.counts span{margin-right:1.5em;font-weight:bold}pre{white-space:pre-wrap;margin:0}";

/// Escapes text for HTML element and attribute content.
pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn seconds(outcome: &TestOutcome) -> String {
    format!("{:.2}s", outcome.duration.as_secs_f64())
}

/// Self-contained HTML report.
#[derive(Debug, Default)]
pub struct HtmlReporter;

impl HtmlReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self, results: &RunResults, registry: &DefectRegistry) -> String {
        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
        html.push_str("<title>reelcheck report</title>\n");
        html.push_str(&format!("<style>{STYLE}</style>\n</head>\n<body>\n"));
        html.push_str("<h1>reelcheck report</h1>\n");
        html.push_str(&format!(
            "<p>{} &middot; {} &middot; {} &middot; started {} &middot; {:.1}s</p>\n",
            escape(&results.base_url),
            escape(&results.browser),
            escape(&results.driver),
            results.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            results.duration.as_secs_f64()
        ));

        html.push_str("<div class=\"counts\">");
        for (status, count) in [
            (OutcomeStatus::Passed, results.passed_count()),
            (OutcomeStatus::Failed, results.failed_count()),
            (OutcomeStatus::ExpectedFailure, results.expected_failure_count()),
            (OutcomeStatus::Skipped, results.skipped_count()),
        ] {
            html.push_str(&format!("<span class=\"{status}\">{status}: {count}</span>"));
        }
        html.push_str(&format!("<span>total: {}</span></div>\n", results.total_count()));
        if results.leaked_sessions > 0 {
            html.push_str(&format!(
                "<p class=\"failed\">{} browser sessions leaked</p>\n",
                results.leaked_sessions
            ));
        }

        self.failures(&mut html, results);
        self.expected_failures(&mut html, results, registry);
        self.all_tests(&mut html, results);
        self.defect_table(&mut html, registry);

        html.push_str("</body>\n</html>\n");
        html
    }

    fn failures(&self, html: &mut String, results: &RunResults) {
        let failures = results.failures();
        if failures.is_empty() {
            return;
        }
        html.push_str("<h2 class=\"failed\">Failures</h2>\n");
        for outcome in failures {
            html.push_str(&format!(
                "<h3 id=\"{id}\">{id}: {title}</h3>\n<ul>\n",
                id = escape(&outcome.test_id),
                title = escape(&outcome.title)
            ));
            if let Some(message) = &outcome.message {
                html.push_str(&format!("<li>{}</li>\n", escape(message)));
            }
            for a in outcome.failed_assertions() {
                html.push_str(&format!(
                    "<li>{}: expected <code>{}</code>, got <code>{}</code></li>\n",
                    escape(&a.name),
                    escape(&a.expected),
                    escape(&a.actual)
                ));
            }
            for error in &outcome.console_errors {
                html.push_str(&format!("<li>console: <code>{}</code></li>\n", escape(error)));
            }
            for attachment in &outcome.attachments {
                html.push_str(&format!(
                    "<li>{}: <pre>{}</pre></li>\n",
                    escape(&attachment.name),
                    escape(&attachment.content)
                ));
            }
            if let Some(path) = &outcome.screenshot {
                let path = escape(&path.display().to_string());
                html.push_str(&format!(
                    "<li>screenshot: <a href=\"{path}\">{path}</a></li>\n"
                ));
            }
            html.push_str("</ul>\n");
        }
    }

    fn expected_failures(&self, html: &mut String, results: &RunResults, registry: &DefectRegistry) {
        let expected = results.expected_failures();
        if expected.is_empty() {
            return;
        }
        html.push_str("<h2 class=\"expected_failure\">Expected failures</h2>\n");
        html.push_str("<table>\n<tr><th>Test</th><th>Defect</th><th>Severity</th><th>Observed</th></tr>\n");
        for outcome in expected {
            let defect = outcome.defect_id.as_deref().and_then(|id| registry.lookup(id));
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                escape(&outcome.test_id),
                escape(outcome.defect_id.as_deref().unwrap_or("")),
                defect.map(|d| d.severity.to_string()).unwrap_or_default(),
                escape(outcome.message.as_deref().unwrap_or(""))
            ));
        }
        html.push_str("</table>\n");
    }

    fn all_tests(&self, html: &mut String, results: &RunResults) {
        html.push_str("<h2>Tests</h2>\n");
        for (suite, outcomes) in results.by_suite() {
            html.push_str(&format!("<h3>{}</h3>\n<table>\n", escape(suite)));
            html.push_str("<tr><th>Test</th><th>Title</th><th>Status</th><th>Duration</th></tr>\n");
            for outcome in outcomes {
                html.push_str(&format!(
                    "<tr><td>{}</td><td>{}</td><td class=\"{status}\">{status}</td><td>{}</td></tr>\n",
                    escape(&outcome.test_id),
                    escape(&outcome.title),
                    seconds(outcome),
                    status = outcome.status
                ));
            }
            html.push_str("</table>\n");
        }
    }

    fn defect_table(&self, html: &mut String, registry: &DefectRegistry) {
        if registry.is_empty() {
            return;
        }
        html.push_str("<h2>Known defects</h2>\n<table>\n");
        html.push_str("<tr><th>ID</th><th>Title</th><th>Severity</th><th>Status</th><th>Expected symptom</th></tr>\n");
        for defect in registry.all() {
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                escape(&defect.id),
                escape(&defect.title),
                defect.severity,
                defect.status,
                escape(&defect.expected_symptom)
            ));
        }
        html.push_str("</table>\n");
    }
}
