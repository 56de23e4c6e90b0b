use crate::error::SimError;
use crate::native;
use crate::signal::SimObject;
use lazy_static::lazy_static;

lazy_static! {
    pub static ref SIM_IF: Box<dyn SimIf + Sync> = new_interface();
}

fn new_interface() -> Box<dyn SimIf + Sync> {
    Box::new(native::Native)
}

#[derive(Debug, Hash, Clone, Copy, Eq, PartialEq)]
pub enum SimCallback {
    Time(u64),
    Edge(usize),
    ReadWrite,
    ReadOnly,
}

pub trait SimIf {
    fn set_value(&self, obj: &SimObject, value: u32) -> Result<(), SimError>;
    fn get_value(&self, obj: &SimObject) -> Result<u32, SimError>;
    fn set_value_i32(&self, obj: &SimObject, value: i32) -> Result<(), SimError>;
    fn get_value_i32(&self, obj: &SimObject) -> Result<i32, SimError>;
    fn set_value_bin(&self, obj: &SimObject, value: &str) -> Result<(), SimError>;
    fn get_value_bin(&self, obj: &SimObject) -> Result<String, SimError>;
    fn get_object_by_name(&self, name: &str) -> Result<SimObject, SimError>;
    fn get_root_object(&self) -> Result<SimObject, SimError>;
    fn get_full_name(&self, obj: &SimObject) -> Result<String, SimError>;
    fn get_sim_time_steps(&self) -> u64;
    fn get_sim_precision(&self) -> i8;
    fn log(&self, msg: &str);
    fn register_callback(&self, cb: SimCallback) -> Result<usize, SimError>;
    fn cancel_callback(&self, cb_hdl: usize) -> Result<(), SimError>;
    fn get_sim_time(&self, unit: &str) -> Result<f64, SimError> {
        // this function does not preserve precision, so don't use carelessly
        let t = self.get_sim_time_steps() as f64;
        let precision = self.get_sim_precision();
        Ok(ldexp10(t, precision - time_scale(unit)?))
    }
    fn get_sim_steps(&self, time: f64, unit: &str) -> Result<u64, SimError> {
        let precision = self.get_sim_precision();
        let steps = ldexp10(time, time_scale(unit)? - precision);
        // u64::MAX as f64 rounds up to 2^64, which no u64 holds
        if steps >= u64::MAX as f64 {
            return Err(SimError::TimeOutOfRange {
                time,
                unit: unit.to_string(),
            });
        }
        if steps >= 0.0 && steps % 1.0 == 0.0 {
            Ok(steps as u64)
        } else {
            Err(SimError::InexactTime {
                time,
                unit: unit.to_string(),
                precision: scale_time(precision)?,
            })
        }
    }
}

pub(crate) fn time_scale(unit: &str) -> Result<i8, SimError> {
    match unit {
        "fs" => Ok(-15),
        "ps" => Ok(-12),
        "ns" => Ok(-9),
        "us" => Ok(-6),
        "ms" => Ok(-3),
        "sec" => Ok(0),
        _ => Err(SimError::UnknownTimeUnit(unit.to_string())),
    }
}

pub(crate) fn scale_time(scale: i8) -> Result<String, SimError> {
    match scale {
        -15 => Ok("fs".to_string()),
        -12 => Ok("ps".to_string()),
        -9 => Ok("ns".to_string()),
        -6 => Ok("us".to_string()),
        -3 => Ok("ms".to_string()),
        0 => Ok("sec".to_string()),
        _ => Err(SimError::UnknownTimeUnit(format!("1e{}", scale))),
    }
}

fn ldexp10(frac: f64, exp: i8) -> f64 {
    // Like math.ldexp, but base 10
    if exp >= 0 {
        frac * 10_u64.pow(exp as u32) as f64
    } else {
        let div = 10_u64.pow(-exp as u32) as f64;
        frac / div
    }
}
