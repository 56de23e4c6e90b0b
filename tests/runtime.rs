use serdac_tb::config::TbConfig;
use serdac_tb::dut::CookieDac;
use serdac_tb::prelude::*;
use serdac_tb::{run_tests, SimSummary, TbTests, Test, TestFn};

fn run(tests: &[(&str, TestFn)]) -> SimSummary {
    let mut tb_tests = TbTests::new();
    for (name, generator) in tests {
        tb_tests.push(Test::new(name, *generator));
    }
    let config = TbConfig {
        results_file: None,
        seed: Some(1),
        ..Default::default()
    };
    run_tests(CookieDac::new(), tb_tests, &config).unwrap()
}

async fn timer_advances_time(_dut: SimObject) -> TbResult {
    Trigger::timer(10, "ns").await?;
    tb_assert!(SIM_IF.get_sim_time("ns")? == 10.0);
    Trigger::timer(250, "ps").await?;
    tb_assert!(SIM_IF.get_sim_time_steps() == 10_250);
    Trigger::timer_steps(0).await?;
    tb_assert!(SIM_IF.get_sim_time_steps() == 10_250);
    Ok(Val::None)
}

#[test]
fn timers() {
    let summary = run(&[("timers", |d| timer_advances_time(d).boxed_local())]);
    let t = summary.test("timers").unwrap();
    assert!(t.passed, "{}", t.message);
    assert_eq!(t.sim_time_ns, 10.25);
}

async fn count_clock_edges(dut: SimObject) -> TbResult {
    let clk = dut.c("clk")?;
    Task::fork(clock(clk, 100, "ns"));
    clock_cycles(clk, 10).await?;
    // first rising edge after half a period
    tb_assert!(SIM_IF.get_sim_time("ns")? == 950.0);
    clk.falling_edge().await?;
    tb_assert!(SIM_IF.get_sim_time("ns")? == 1000.0);
    tb_assert!(!clk.bit(0)?);
    Ok(Val::None)
}

#[test]
fn edges() {
    let summary = run(&[("edges", |d| count_clock_edges(d).boxed_local())]);
    assert!(summary.all_passed(), "{:?}", summary.tests);
}

async fn write_in_read_only(dut: SimObject) -> TbResult {
    let ui_in = dut.c("ui_in")?;
    Trigger::read_only().await?;
    let write = ui_in.set(1);
    tb_assert!(matches!(write, Err(SimError::ReadOnlyWrite { .. })), "{:?}", write);
    // writes are allowed again on the next time step
    Trigger::timer(1, "ns").await?;
    ui_in.set(1)?;
    Trigger::read_write().await?;
    ui_in.set(2)?;
    Trigger::read_only().await?;
    tb_assert!(ui_in.u32()? == 2);
    Ok(Val::None)
}

#[test]
fn read_only_phase_rejects_writes() {
    let summary = run(&[("read_only", |d| write_in_read_only(d).boxed_local())]);
    assert!(summary.all_passed(), "{:?}", summary.tests);
}

async fn cancel_forked(dut: SimObject) -> TbResult {
    let ui_in = dut.c("ui_in")?;
    let handle = Task::fork(async move {
        Trigger::timer(100, "ns").await?;
        ui_in.set(0xff)?;
        Ok(Val::None)
    });
    let joined = Task::fork(async move { Ok(Val::Int(ui_in.u32()? as i64)) });
    tb_assert!(joined.await == Ok(Val::Int(0)));

    Trigger::timer(10, "ns").await?;
    handle.cancel();
    Trigger::timer(200, "ns").await?;
    tb_assert!(ui_in.u32()? == 0, "cancelled task still wrote ui_in");
    Ok(Val::None)
}

#[test]
fn cancelled_tasks_stop() {
    let summary = run(&[("cancel", |d| cancel_forked(d).boxed_local())]);
    assert!(summary.all_passed(), "{:?}", summary.tests);
}

async fn failing(_dut: SimObject) -> TbResult {
    Trigger::timer(5, "ns").await?;
    let flag = 0;
    tb_assert!(flag == 1, "flag is {}", flag);
    Ok(Val::None)
}

async fn count_up(signal: SimObject) -> TbResult {
    loop {
        Trigger::timer(1, "ns").await?;
        signal.set_u32((signal.u32()? + 1) & 0xff)?;
    }
}

async fn leaves_forked_task(dut: SimObject) -> TbResult {
    Task::fork(count_up(dut.c("ui_in")?));
    Trigger::timer(20, "ns").await?;
    Ok(Val::None)
}

async fn sees_quiet_pins(dut: SimObject) -> TbResult {
    let ui_in = dut.c("ui_in")?;
    let before = ui_in.u32()?;
    Trigger::timer(20, "ns").await?;
    tb_assert!(ui_in.u32()? == before, "task of the previous test still runs");
    Ok(Val::None)
}

#[test]
fn tests_run_in_order_and_in_isolation() {
    let summary = run(&[
        ("failing", |d| failing(d).boxed_local()),
        ("leaves_forked_task", |d| leaves_forked_task(d).boxed_local()),
        ("sees_quiet_pins", |d| sees_quiet_pins(d).boxed_local()),
    ]);
    let names: Vec<&str> = summary.tests.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["failing", "leaves_forked_task", "sees_quiet_pins"]);

    let failing = summary.test("failing").unwrap();
    assert!(!failing.passed);
    assert!(failing.message.contains("assertion failed at 5 ns: flag is 0"));
    assert!(summary.test("leaves_forked_task").unwrap().passed);
    assert!(summary.test("sees_quiet_pins").unwrap().passed);
    assert_eq!(summary.sim_time_ns, 45.0);
}

async fn passed_from_fork(_dut: SimObject) -> TbResult {
    Task::fork(async {
        Trigger::timer(10, "ns").await?;
        pass_test("done early");
        Ok(Val::None)
    });
    Trigger::timer(1, "us").await?;
    fail_test("test was not ended by the forked task");
    Ok(Val::None)
}

#[test]
fn forked_task_can_end_test() {
    let summary = run(&[("early", |d| passed_from_fork(d).boxed_local())]);
    let t = summary.test("early").unwrap();
    assert!(t.passed);
    assert!(t.message.contains("done early"));
    assert_eq!(t.sim_time_ns, 10.0);
    assert_eq!(summary.sim_time_ns, 10.0);
}

async fn waits_forever(dut: SimObject) -> TbResult {
    dut.c("uio_in")?.edge().await?;
    Ok(Val::None)
}

#[test]
fn unfinished_test_fails() {
    let summary = run(&[("forever", |d| waits_forever(d).boxed_local())]);
    let t = summary.test("forever").unwrap();
    assert!(!t.passed);
    assert!(summary.aborted.is_none());
}

async fn toggle_on_edge(watch: SimObject, drive: SimObject) -> TbResult {
    loop {
        watch.edge().await?;
        drive.set_u32(drive.u32()? ^ 1)?;
    }
}

async fn oscillates(dut: SimObject) -> TbResult {
    let ui_in = dut.c("ui_in")?;
    let uio_in = dut.c("uio_in")?;
    Task::fork(toggle_on_edge(uio_in, ui_in));
    Task::fork(toggle_on_edge(ui_in, uio_in));
    Trigger::timer(1, "ns").await?;
    uio_in.set(1)?;
    Trigger::timer(1, "us").await?;
    Ok(Val::None)
}

#[test]
fn delta_cycle_limit_aborts() {
    let summary = run(&[("oscillates", |d| oscillates(d).boxed_local())]);
    assert!(summary.aborted.unwrap().contains("delta cycle limit"));
    assert!(!summary.tests[0].passed);
}

async fn bad_lookups(dut: SimObject) -> TbResult {
    tb_assert!(matches!(dut.c("nope"), Err(SimError::ObjectNotFound { .. })));
    tb_assert!(Trigger::timer(1, "parsec").await.is_err());
    tb_assert!(Trigger::timer_steps(1).await.is_ok());
    tb_assert!(dut.rising_edge().await.is_err());
    let ui_in = dut.c("ui_in")?;
    tb_assert!(ui_in.set(256).is_err());
    ui_in.set_bin("0b1010_0101")?;
    tb_assert!(ui_in.bin()? == "10100101");
    tb_assert!(ui_in.set_bin("101").is_err());
    Ok(Val::None)
}

#[test]
fn errors_surface_in_tests() {
    let summary = run(&[("bad_lookups", |d| bad_lookups(d).boxed_local())]);
    assert!(summary.all_passed(), "{:?}", summary.tests);
}

async fn timer_beyond_time_range(_dut: SimObject) -> TbResult {
    Trigger::timer(1, "ns").await?;
    tb_assert!(Trigger::timer(20_000_000, "sec").await.is_err());
    tb_assert!(Trigger::timer_steps(u64::MAX).await.is_err());
    // the failed timers leave the simulation usable
    Trigger::timer(1, "ns").await?;
    Ok(Val::None)
}

#[test]
fn oversized_timers_fail() {
    let summary = run(&[("oversized", |d| timer_beyond_time_range(d).boxed_local())]);
    assert!(summary.all_passed(), "{:?}", summary.tests);
    assert!(summary.aborted.is_none());
}
