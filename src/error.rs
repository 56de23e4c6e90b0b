//! Error types for the testbench runtime and the native simulator.

use std::io;

use crate::value::Val;

/// Errors raised while setting up or running a simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// A simulator call was made while no simulation runs on this thread.
    #[error("no simulation is active on this thread")]
    NoActiveSimulation,

    /// A simulation is already running on this thread.
    #[error("a simulation is already active on this thread")]
    SimulationActive,

    /// No object with the given full name exists in the design.
    #[error("object not found: {name}")]
    ObjectNotFound {
        /// Full hierarchical name that was looked up.
        name: String,
    },

    /// A handle does not refer to any known object.
    #[error("invalid object handle {0}")]
    InvalidHandle(usize),

    /// The object is a scope and carries no value.
    #[error("{name} has no value")]
    NotAValue {
        /// Full name of the object.
        name: String,
    },

    /// A value does not fit into the signal width.
    #[error("value {value:#x} does not fit into {name} ({width} bits)")]
    ValueOutOfRange {
        /// Full name of the signal.
        name: String,
        /// Rejected value.
        value: u64,
        /// Signal width in bits.
        width: u32,
    },

    /// A binary string has the wrong length or unsupported characters.
    #[error("can't set {name} to {value}: {reason}")]
    InvalidBinStr {
        /// Full name of the signal.
        name: String,
        /// Offending string.
        value: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// Unknown time unit string.
    #[error("unknown time unit '{0}'")]
    UnknownTimeUnit(String),

    /// A time can't be converted to simulator steps without rounding.
    #[error("can't convert {time} {unit} to sim steps without rounding (sim precision: {precision})")]
    InexactTime {
        /// Requested time.
        time: f64,
        /// Requested unit.
        unit: String,
        /// Simulator precision unit.
        precision: String,
    },

    /// A time is beyond the range of simulator steps.
    #[error("{time} {unit} is beyond the simulator time range")]
    TimeOutOfRange {
        /// Requested time.
        time: f64,
        /// Requested unit.
        unit: String,
    },

    /// A callback delay added to the current time overflows.
    #[error("callback {delay} steps after step {now} overflows the simulator time")]
    TimeOverflow {
        /// Current time in steps.
        now: u64,
        /// Requested delay in steps.
        delay: u64,
    },

    /// A callback handle is not registered.
    #[error("callback {0} is not registered")]
    CallbackNotFound(usize),

    /// Edge callbacks can only be placed on value carrying objects.
    #[error("can't watch {name} for value changes")]
    NotWatchable {
        /// Full name of the object.
        name: String,
    },

    /// A signal was written during the read-only phase.
    #[error("write to {name} during read-only phase")]
    ReadOnlyWrite {
        /// Full name of the signal.
        name: String,
    },

    /// Two design ports share a name.
    #[error("duplicate port '{0}' in design")]
    DuplicatePort(String),

    /// A port is wider than the 32 bits the native simulator supports.
    #[error("port '{name}' is {width} bits wide, at most 32 are supported")]
    PortTooWide {
        /// Port name.
        name: String,
        /// Declared width.
        width: u32,
    },

    /// Too many delta cycles at one time step.
    #[error("delta cycle limit exceeded at step {steps} (max {max_deltas} deltas)")]
    DeltaCycleLimit {
        /// Simulation time in steps.
        steps: u64,
        /// Maximum number of delta cycles.
        max_deltas: u32,
    },

    /// The simulation ran past the configured time limit.
    #[error("time limit exceeded: {limit_ns} ns")]
    TimeLimitExceeded {
        /// Limit in nanoseconds.
        limit_ns: u64,
    },

    /// A waveform change refers to an undeclared signal.
    #[error("no waveform signal with index {0}")]
    UnknownWaveSignal(usize),

    /// A configuration variable could not be parsed.
    #[error("invalid value for {key}: {reason}")]
    Config {
        /// Environment variable name.
        key: String,
        /// Parse failure.
        reason: String,
    },

    /// Writing the test report failed.
    #[error("report error: {0}")]
    Report(String),

    /// Waveform or report I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<SimError> for Val {
    fn from(e: SimError) -> Self {
        Val::String(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_out_of_range_display() {
        let e = SimError::ValueOutOfRange {
            name: "tb.ui_in".into(),
            value: 0x1ff,
            width: 8,
        };
        assert_eq!(e.to_string(), "value 0x1ff does not fit into tb.ui_in (8 bits)");
    }

    #[test]
    fn inexact_time_display() {
        let e = SimError::InexactTime {
            time: 0.5,
            unit: "ps".into(),
            precision: "ps".into(),
        };
        assert_eq!(
            e.to_string(),
            "can't convert 0.5 ps to sim steps without rounding (sim precision: ps)"
        );
    }

    #[test]
    fn converts_into_test_value() {
        let v: Val = SimError::ObjectNotFound { name: "tb.nope".into() }.into();
        assert!(matches!(v, Val::String(s) if s == "object not found: tb.nope"));
    }
}
