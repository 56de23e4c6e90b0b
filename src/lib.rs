//! Coroutine testbenches for the serial cookie DAC, run on a native simulator.
//!
//! Tests are `async fn(SimObject) -> TbResult` that drive and sample the pins of
//! the design below the root object. They await [`Trigger`](prelude::Trigger)s
//! for simulated time, signal edges and simulator phases, and may fork further
//! tasks. Tests run one after another in a single simulation.

pub mod config;
pub mod dut;
pub mod error;
mod executor;
mod junit;
mod native;
pub mod prelude;
pub mod project;
mod signal;
pub mod sim_if;
mod tb_obj;
pub mod testbench;
mod trigger;
pub mod utils;
mod value;
mod waves;

use once_cell::sync::OnceCell;
use prettytable::{format, Cell, Row, Table};
use std::cell::RefCell;
use std::fs::File;
use std::process::ExitCode;
use std::time;

use config::TbConfig;
use dut::Design;
use error::SimError;
use executor::{JoinHandle, Task, TaskScope};
use sim_if::SIM_IF;
use value::Val;

pub use signal::{ObjectKind, SimObject};
pub use test::{TbTests, Test, TestFn, TestReport};
pub use waves::VcdWriter;

pub type TbResult = Result<Val, Val>;

pub static CRATE_NAME: OnceCell<String> = OnceCell::new();

struct RunningTest {
    index: usize,
    started: time::Instant,
    sim_start_ns: f64,
}

thread_local! {
    static CURRENT_TEST: RefCell<Option<RunningTest>> = RefCell::new(None);
}

/// Result of a whole simulation run.
#[derive(Debug, Clone)]
pub struct SimSummary {
    pub tests: Vec<TestReport>,
    pub sim_time_ns: f64,
    pub real_time_secs: f64,
    /// Set when the run ended on a delta cycle or time limit.
    pub aborted: Option<String>,
}

impl SimSummary {
    pub fn all_passed(&self) -> bool {
        !self.tests.is_empty() && self.tests.iter().all(|t| t.passed)
    }

    pub fn test(&self, name: &str) -> Option<&TestReport> {
        self.tests.iter().find(|t| t.name == name)
    }
}

pub fn pass_test(msg: &str) {
    // Passes test that has not already failed/passed
    finish_test(Ok(Val::String(msg.to_string())));
}

pub fn fail_test(msg: &str) {
    // Fails test that has not already failed/passed
    finish_test(Err(Val::String(msg.to_string())));
}

fn finish_test(result: TbResult) {
    let Some(running) = CURRENT_TEST.with(|c| c.borrow_mut().take()) else {
        return;
    };
    let sim_now = SIM_IF.get_sim_time("ns").unwrap_or(0.0);
    test::with_test(running.index, |t| {
        t.time_secs = running.started.elapsed().as_secs_f64();
        t.sim_time_ns = sim_now - running.sim_start_ns;
        t.set_result(result);
    });
    tear_down_test();
}

fn tear_down_test() {
    trigger::cancel_all_triggers();
    executor::clear_ready_queue();
    // cancelling the test tasks wakes the chain task waiting for this one
    executor::cancel_scope(TaskScope::Test);
}

fn start_of_simulation() -> Result<(), SimError> {
    let sim_root = signal::SimObject::get_root()?;
    let n_tests = test::TESTS.with(|t| t.borrow().len());

    // All tests are scheduled in a chain at simulation start up by awaiting the previous test completion.
    let mut join_handle: Option<JoinHandle> = None;
    for index in 0..n_tests {
        let previous = join_handle.take();
        join_handle = Some(Task::spawn_system(
            async move {
                // await previous test, if there is one
                if let Some(handle) = previous {
                    let _ = handle.await;
                }
                let Some((name, generator)) = test::with_test(index, |t| (t.name.clone(), t.generator)) else {
                    return Ok(Val::None);
                };
                SIM_IF.log(&format!("Running test {}", name));
                // spawn the test itself, so tearing it down leaves this task alive
                let test_handle = Task::spawn_from_future(
                    async move {
                        let result = (generator)(sim_root).await;
                        finish_test(result);
                        Ok(Val::None)
                    },
                    &name,
                );
                let sim_start_ns = SIM_IF.get_sim_time("ns").unwrap_or(0.0);
                CURRENT_TEST.with(|c| {
                    c.borrow_mut().replace(RunningTest {
                        index,
                        started: time::Instant::now(),
                        sim_start_ns,
                    })
                });
                // await test execution
                let _ = test_handle.await;
                Ok(Val::None)
            },
            "test chain",
        ));
    }

    // execute first simulation tick
    executor::run_once();
    Ok(())
}

fn summary_table(summary: &SimSummary) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
    table.set_titles(Row::new(
        ["TEST", "RESULT", "REAL TIME (s)", "SIM TIME (ns)", "SIM SPEED (ns/s)"]
            .iter()
            .map(|h| Cell::new(h))
            .collect(),
    ));
    for t in &summary.tests {
        let speed = match t.time_secs > 0.0 {
            true => t.sim_time_ns / t.time_secs,
            false => 0.0,
        };
        table.add_row(Row::new(vec![
            Cell::new(&t.name),
            Cell::new(if t.passed { "passed" } else { "failed" }),
            Cell::new(&format!("{:.3}", t.time_secs)),
            Cell::new(&format!("{:.0}", t.sim_time_ns)),
            Cell::new(&format!("{:.3}", speed)),
        ]));
    }
    table
}

fn end_of_simulation(summary: &SimSummary) {
    for line in summary_table(summary).to_string().lines() {
        SIM_IF.log(line);
    }
    for t in summary.tests.iter().filter(|t| !t.passed) {
        SIM_IF.log(&format!("TEST {} failed: {}", t.name, t.message));
    }
    if let Some(reason) = &summary.aborted {
        SIM_IF.log(&format!("Simulation aborted: {}", reason));
    }

    let speed = match summary.real_time_secs > 0.0 {
        true => summary.sim_time_ns / summary.real_time_secs,
        false => 0.0,
    };
    SIM_IF.log("TOTAL SIMULATION");
    SIM_IF.log(&format!("Simulation time: {} ns", summary.sim_time_ns));
    SIM_IF.log(&format!("Real time: {:.3} s", summary.real_time_secs));
    SIM_IF.log(&format!("Simulation speed: {:.3} ns/s", speed));
}

fn reset_thread_state() {
    CURRENT_TEST.with(|c| c.borrow_mut().take());
    trigger::cancel_all_triggers();
    executor::reset();
    signal::clear_objects();
    test::TESTS.with(|t| *t.borrow_mut() = TbTests::new());
}

/// Runs the tests selected by `config` against `design` on the calling thread.
///
/// Test failures are reported in the summary. An `Err` means the simulation
/// could not be set up or its outputs could not be written.
pub fn run_tests<D: Design + 'static>(design: D, tests: TbTests, config: &TbConfig) -> Result<SimSummary, SimError> {
    let tests = tests.filter(|name| config.selects(name));
    let kernel = native::Kernel::new(Box::new(design), config)?;
    native::install(kernel)?;
    utils::seed(config.seed);
    test::TESTS.with(|t| *t.borrow_mut() = tests);

    let start = time::Instant::now();
    let mut aborted = None;
    let outcome = start_of_simulation().and_then(|_| native::run_sim(config.time_limit_ns));
    if let Err(e) = outcome {
        // the running test fails with the reason, later ones never start
        finish_test(Err(Val::String(e.to_string())));
        aborted = Some(e.to_string());
    }
    let summary = SimSummary {
        tests: test::reports(),
        sim_time_ns: SIM_IF.get_sim_time("ns").unwrap_or(0.0),
        real_time_secs: start.elapsed().as_secs_f64(),
        aborted,
    };
    end_of_simulation(&summary);

    reset_thread_state();
    native::uninstall()?;

    if let Some(path) = &config.results_file {
        let suite = CRATE_NAME.get().map(String::as_str).unwrap_or(env!("CARGO_PKG_NAME"));
        junit::write_junit_xml(suite, &summary.tests, File::create(path)?)?;
    }
    Ok(summary)
}

/// Entry point used by [`run_with_native!`].
pub fn native_main<D: Design + 'static>(design: D, tests: TbTests) -> ExitCode {
    let config = match TbConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    match run_tests(design, tests, &config) {
        Ok(summary) if summary.all_passed() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[macro_export]
macro_rules! run_with_native {
    ($design:expr; $( $i:ident ),+ $(,)?) => {
        fn main() -> std::process::ExitCode {
            let _ = $crate::CRATE_NAME.set(std::module_path!().to_string());
            // add tests to execution vector
            let mut tests = $crate::TbTests::new();
            $(tests.push($crate::Test::new(stringify!($i), |sim_root| {
                $crate::prelude::FutureExt::boxed_local($i(sim_root))
            }));)+
            $crate::native_main($design, tests)
        }
    };
}

/// Fails the enclosing test with the simulation time and message if `cond` is false.
#[macro_export]
macro_rules! tb_assert {
    ($cond:expr $(,)?) => {
        $crate::tb_assert!($cond, "{}", stringify!($cond))
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            let t = $crate::prelude::SIM_IF.get_sim_time("ns").unwrap_or(0.0);
            return Err($crate::prelude::Val::String(format!(
                "assertion failed at {} ns: {}",
                t,
                format!($($arg)+)
            )));
        }
    };
}
