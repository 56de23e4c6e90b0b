use serdac_tb::dut::CookieDac;
use serdac_tb::project::{test_dac_duty, test_project, test_random_words};

// Specify tests to be executed
serdac_tb::run_with_native!(CookieDac::new(); test_project, test_random_words, test_dac_duty);
