pub use crate::error::SimError;
pub use crate::executor::{JoinHandle, Task};
pub use crate::signal::SimObject;
pub use crate::sim_if::SIM_IF;
pub use crate::tb_obj::TbObj;
pub use crate::testbench::{clock, Scoreboard};
pub use crate::trigger::Trigger;
pub use crate::utils::clock_cycles;
pub use crate::value::Val;
pub use crate::{fail_test, pass_test, tb_assert, TbResult};
pub use futures::future::FutureExt;
