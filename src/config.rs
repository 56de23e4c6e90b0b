//! Run configuration, read from the environment.
//!
//! | variable            | meaning                                         |
//! |---------------------|-------------------------------------------------|
//! | `TESTCASE`          | comma separated names of the tests to run       |
//! | `TB_RESULTS_FILE`   | JUnit report path, `results.xml` if unset       |
//! | `TB_WAVES`          | write a VCD of all design signals to this path  |
//! | `RANDOM_SEED`       | seed of the testbench RNG                       |
//! | `TB_TIME_LIMIT_NS`  | end the run once simulation time passes this    |

use std::path::PathBuf;

use crate::error::SimError;

pub const DEFAULT_RESULTS_FILE: &str = "results.xml";
/// Simulator precision, 1 ps.
pub const DEFAULT_PRECISION: i8 = -12;

#[derive(Debug, Clone, PartialEq)]
pub struct TbConfig {
    pub testcase: Vec<String>,
    pub results_file: Option<PathBuf>,
    pub waves_file: Option<PathBuf>,
    pub seed: Option<u64>,
    pub time_limit_ns: Option<u64>,
    pub precision: i8,
}

impl Default for TbConfig {
    fn default() -> Self {
        Self {
            testcase: Vec::new(),
            results_file: Some(PathBuf::from(DEFAULT_RESULTS_FILE)),
            waves_file: None,
            seed: None,
            time_limit_ns: None,
            precision: DEFAULT_PRECISION,
        }
    }
}

impl TbConfig {
    pub fn from_env() -> Result<Self, SimError> {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, SimError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            match key {
                "TESTCASE" => {
                    config.testcase = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect();
                }
                "TB_RESULTS_FILE" => {
                    // empty disables the report
                    config.results_file = (!value.is_empty()).then(|| PathBuf::from(value));
                }
                "TB_WAVES" => {
                    config.waves_file = (!value.is_empty()).then(|| PathBuf::from(value));
                }
                "RANDOM_SEED" => config.seed = Some(parse_u64(key, value)?),
                "TB_TIME_LIMIT_NS" => config.time_limit_ns = Some(parse_u64(key, value)?),
                _ => {}
            }
        }
        Ok(config)
    }

    /// Whether the named test is selected by `TESTCASE`.
    pub fn selects(&self, name: &str) -> bool {
        self.testcase.is_empty() || self.testcase.iter().any(|t| t == name)
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, SimError> {
    value.parse().map_err(|e: std::num::ParseIntError| SimError::Config {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_variables() {
        let config = TbConfig::from_vars(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(config, TbConfig::default());
        assert!(config.selects("test_project"));
    }

    #[test]
    fn reads_known_variables() {
        let config = TbConfig::from_vars([
            ("TESTCASE", "test_project, test_dac_duty"),
            ("TB_RESULTS_FILE", ""),
            ("TB_WAVES", "tb.vcd"),
            ("RANDOM_SEED", "42"),
            ("TB_TIME_LIMIT_NS", "1000000"),
            ("HOME", "/root"),
        ])
        .unwrap();
        assert_eq!(config.testcase, vec!["test_project", "test_dac_duty"]);
        assert_eq!(config.results_file, None);
        assert_eq!(config.waves_file, Some(PathBuf::from("tb.vcd")));
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.time_limit_ns, Some(1_000_000));
        assert!(config.selects("test_dac_duty"));
        assert!(!config.selects("test_random_words"));
    }

    #[test]
    fn rejects_bad_seed() {
        let err = TbConfig::from_vars([("RANDOM_SEED", "abc")]).unwrap_err();
        assert!(err.to_string().starts_with("invalid value for RANDOM_SEED"));
    }
}
