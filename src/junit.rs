use junit_report::{Duration, ReportBuilder, TestCaseBuilder, TestSuiteBuilder};
use std::io::Write;

use crate::error::SimError;
use crate::test::TestReport;

pub(crate) fn write_junit_xml(suite: &str, reports: &[TestReport], out: impl Write) -> Result<(), SimError> {
    let mut test_cases = Vec::new();

    for t in reports {
        let tc = match t.passed {
            true => TestCaseBuilder::success(&t.name, Duration::seconds_f64(t.time_secs)),
            false => TestCaseBuilder::failure(
                &t.name,
                Duration::seconds_f64(t.time_secs),
                "failure",
                &t.message,
            ),
        }
        .build();
        test_cases.push(tc);
    }

    let test_suite = TestSuiteBuilder::new(suite).add_testcases(test_cases).build();
    let report = ReportBuilder::new().add_testsuite(test_suite).build();
    report.write_xml(out).map_err(|e| SimError::Report(e.to_string()))
}
