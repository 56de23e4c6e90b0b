use std::fs;

use serdac_tb::config::TbConfig;
use serdac_tb::dut::CookieDac;
use serdac_tb::prelude::*;
use serdac_tb::project::{test_dac_duty, test_project, test_random_words};
use serdac_tb::{run_tests, TbTests, Test};

fn project_tests() -> TbTests {
    let mut tests = TbTests::new();
    tests.push(Test::new("test_project", |dut| test_project(dut).boxed_local()));
    tests.push(Test::new("test_random_words", |dut| test_random_words(dut).boxed_local()));
    tests.push(Test::new("test_dac_duty", |dut| test_dac_duty(dut).boxed_local()));
    tests
}

fn config() -> TbConfig {
    TbConfig {
        results_file: None,
        seed: Some(0x5eed),
        ..Default::default()
    }
}

#[test]
fn project_tests_pass_on_model() {
    let summary = run_tests(CookieDac::new(), project_tests(), &config()).unwrap();
    for t in &summary.tests {
        assert!(t.passed, "{} failed: {}", t.name, t.message);
    }
    assert!(summary.all_passed());
    assert_eq!(summary.tests.len(), 3);
    assert!(summary.aborted.is_none());
    assert!(summary.sim_time_ns > 0.0);
}

#[test]
fn wrong_cookie_is_not_detected() {
    let summary = run_tests(CookieDac::with_cookie(0xBEEF), project_tests(), &config()).unwrap();
    let project = summary.test("test_project").unwrap();
    assert!(!project.passed);
    assert!(project.message.contains("cookie not detected after store"), "{}", project.message);
    assert!(!summary.test("test_random_words").unwrap().passed);
    // the DAC does not depend on the cookie
    assert!(summary.test("test_dac_duty").unwrap().passed);
}

#[test]
fn testcase_selects_tests() {
    let config = TbConfig {
        testcase: vec!["test_dac_duty".to_string()],
        ..config()
    };
    let summary = run_tests(CookieDac::new(), project_tests(), &config).unwrap();
    assert_eq!(summary.tests.len(), 1);
    assert_eq!(summary.tests[0].name, "test_dac_duty");
    assert!(summary.all_passed());
}

#[test]
fn writes_report_and_waves() {
    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("results.xml");
    let waves = dir.path().join("waves.vcd");
    let config = TbConfig {
        testcase: vec!["test_project".to_string()],
        results_file: Some(results.clone()),
        waves_file: Some(waves.clone()),
        ..config()
    };
    let summary = run_tests(CookieDac::new(), project_tests(), &config).unwrap();
    assert!(summary.all_passed());

    let xml = fs::read_to_string(&results).unwrap();
    assert!(xml.contains("test_project"));
    assert!(!xml.contains("test_dac_duty"));

    let vcd = fs::read_to_string(&waves).unwrap();
    assert!(vcd.contains("$timescale 1ps $end"));
    assert!(vcd.contains("$enddefinitions $end"));
    assert!(vcd.contains("uio_out"));
    // the clock toggles every 50 ns
    assert!(vcd.contains("#50000\n"));
}

#[test]
fn time_limit_aborts_run() {
    let config = TbConfig {
        time_limit_ns: Some(1_000),
        ..config()
    };
    let summary = run_tests(CookieDac::new(), project_tests(), &config).unwrap();
    let reason = summary.aborted.clone().unwrap();
    assert!(reason.contains("time limit exceeded"));
    assert!(summary.sim_time_ns <= 1_000.0);

    let project = summary.test("test_project").unwrap();
    assert!(!project.passed);
    assert!(project.message.contains("time limit exceeded"));
    // later tests never started
    let dac = summary.test("test_dac_duty").unwrap();
    assert!(dac.message.contains("simulation ended before the test completed"));
}
