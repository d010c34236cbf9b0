// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unified test-output parsing for forensic verification.
//!
//! Parses raw runner output, not agent claims, into [`TestSummary`]. Error
//! signatures feed stall detection. Pytest and JUnit are text/markup scraped
//! with regexes; Jest and Playwright report JSON.

use std::sync::OnceLock;
use swarm_core::{error_signature, FailureType, SourceFormat, TestFailure, TestSummary};

fn re(pattern: &str) -> regex::Regex {
    regex::Regex::new(pattern).unwrap_or_else(|_| unreachable!())
}

fn pytest_counts_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| re(r"(\d+) (passed|failed|errors?|skipped|xfailed|xpassed)"))
}

fn pytest_duration_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| re(r"in ([0-9.]+)s"))
}

fn pytest_failed_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| re(r"(?m)^FAILED ([^\s]+?)(?: - (.*))?$"))
}

fn coverage_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| re(r"(?m)^TOTAL\s+.*?(\d+)%\s*$"))
}

fn classify_message(message: &str) -> FailureType {
    let lower = message.to_ascii_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        FailureType::Timeout
    } else if lower.contains("assert") || lower.contains("expected") {
        FailureType::Assertion
    } else if lower.contains("setup") {
        FailureType::Setup
    } else if lower.contains("teardown") {
        FailureType::Teardown
    } else if lower.contains("error") || lower.contains("exception") {
        FailureType::Exception
    } else {
        FailureType::Unknown
    }
}

/// Parse pytest console output.
pub fn parse_pytest_output(raw: &str) -> TestSummary {
    let mut summary = TestSummary {
        source_format: SourceFormat::Pytest,
        ..TestSummary::default()
    };

    for caps in pytest_counts_re().captures_iter(raw) {
        let count: u64 = caps[1].parse().unwrap_or(0);
        match &caps[2] {
            "passed" => summary.passed = count,
            "failed" => summary.failed = count,
            "error" | "errors" => summary.errors = count,
            "skipped" => summary.skipped = count,
            _ => {}
        }
    }
    summary.total = summary.passed + summary.failed + summary.errors + summary.skipped;

    if let Some(caps) = pytest_duration_re().captures(raw) {
        if let Ok(secs) = caps[1].parse::<f64>() {
            summary.duration_ms = (secs * 1000.0) as u64;
        }
    }

    if let Some(caps) = coverage_re().captures(raw) {
        summary.coverage_percent = caps[1].parse().ok();
    }

    for caps in pytest_failed_re().captures_iter(raw) {
        let test_name = caps[1].to_string();
        let message = caps.get(2).map(|m| m.as_str()).unwrap_or("").to_string();
        summary
            .error_signatures
            .push(error_signature(&test_name, &message));
        summary.failures.push(TestFailure {
            failure_type: classify_message(&message),
            test_name,
            message,
            file: None,
            line: None,
        });
    }

    summary
}

fn attr<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("{name}=\"");
    let start = tag.find(&needle)? + needle.len();
    let rest = &tag[start..];
    let end = rest.find('"')?;
    Some(&rest[..end])
}

fn junit_suite_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| re(r"<testsuite\b[^>]*>"))
}

fn junit_case_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| re(r"(?s)<testcase\b([^>]*?)(?:/>|>(.*?)</testcase>)"))
}

fn junit_failure_msg_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| re(r#"<(?:failure|error)\b[^>]*?message="([^"]*)""#))
}

fn junit_failure_any_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| re(r"<(?:failure|error)\b"))
}

/// Parse JUnit XML report content.
pub fn parse_junit_xml(xml: &str) -> TestSummary {
    let mut summary = TestSummary {
        source_format: SourceFormat::Junit,
        ..TestSummary::default()
    };

    for caps in junit_suite_re().captures_iter(xml) {
        let tag = caps.get(0).map(|m| m.as_str()).unwrap_or("");
        let get = |name: &str| attr(tag, name).and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
        summary.total += get("tests");
        summary.failed += get("failures");
        summary.errors += get("errors");
        summary.skipped += get("skipped");
        if let Some(time) = attr(tag, "time").and_then(|v| v.parse::<f64>().ok()) {
            summary.duration_ms += (time * 1000.0) as u64;
        }
    }
    summary.passed = summary
        .total
        .saturating_sub(summary.failed + summary.errors + summary.skipped);

    for caps in junit_case_re().captures_iter(xml) {
        let attrs = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let body = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        if body.is_empty() || !junit_failure_any_re().is_match(body) {
            continue;
        }
        let message = junit_failure_msg_re()
            .captures(body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or("")
            .to_string();
        let name = attr(attrs, "name").unwrap_or("unknown");
        let classname = attr(attrs, "classname").unwrap_or("");
        let full_name = if classname.is_empty() {
            name.to_string()
        } else {
            format!("{classname}::{name}")
        };
        summary
            .error_signatures
            .push(error_signature(&full_name, &message));
        summary.failures.push(TestFailure {
            failure_type: classify_message(&message),
            test_name: full_name,
            message,
            file: attr(attrs, "file").map(str::to_string),
            line: attr(attrs, "line").and_then(|l| l.parse().ok()),
        });
    }

    summary
}

/// Parse a Jest-style JSON report. Playwright's JSON reporter uses the same
/// shape, so `format` distinguishes them in the summary.
pub fn parse_jest_json(raw: &str, format: SourceFormat) -> Option<TestSummary> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;

    let get = |key: &str| value.get(key).and_then(|v| v.as_u64()).unwrap_or(0);
    let mut summary = TestSummary {
        total: get("numTotalTests"),
        passed: get("numPassedTests"),
        failed: get("numFailedTests"),
        skipped: get("numPendingTests"),
        source_format: format,
        ..TestSummary::default()
    };

    if let Some(results) = value.get("testResults").and_then(|v| v.as_array()) {
        for file_result in results {
            let Some(assertions) = file_result.get("assertionResults").and_then(|v| v.as_array())
            else {
                continue;
            };
            for assertion in assertions {
                let status = assertion.get("status").and_then(|v| v.as_str()).unwrap_or("");
                if status != "failed" {
                    continue;
                }
                let name = assertion
                    .get("fullName")
                    .or_else(|| assertion.get("title"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string();
                let message = assertion
                    .get("failureMessages")
                    .and_then(|v| v.as_array())
                    .and_then(|msgs| msgs.first())
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();

                summary.error_signatures.push(error_signature(&name, &message));
                summary.failures.push(TestFailure {
                    failure_type: classify_message(&message),
                    test_name: name,
                    message,
                    file: file_result
                        .get("name")
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                    line: None,
                });
            }
        }
    }

    Some(summary)
}

#[cfg(test)]
#[path = "test_parser_tests.rs"]
mod tests;
