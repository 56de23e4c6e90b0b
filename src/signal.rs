use intmap::IntMap;
use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::SimError;
use crate::sim_if::SIM_IF;
use crate::trigger::Trigger;
use crate::value::Val;
use crate::TbResult;

// Object caches of the simulation running on this thread
thread_local! {
    static SIG_MAP_NAME: RefCell<HashMap<String, usize>> = RefCell::new(HashMap::new());
    static SIG_MAP: RefCell<IntMap<SimObject>> = RefCell::new(IntMap::new());
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimObject {
    pub(crate) handle: usize,
    pub(crate) kind: ObjectKind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Int(u32),
    Hier,
}

pub(crate) fn clear_objects() {
    SIG_MAP_NAME.with(|m| m.borrow_mut().clear());
    SIG_MAP.with(|m| m.borrow_mut().clear());
}

impl SimObject {
    pub fn handle(&self) -> usize {
        self.handle
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn name(&self) -> String {
        SIM_IF
            .get_full_name(self)
            .unwrap_or_else(|_| format!("<handle {}>", self.handle))
    }

    pub fn size(&self) -> u32 {
        match self.kind {
            ObjectKind::Int(size) => size,
            ObjectKind::Hier => 0,
        }
    }

    pub fn has_value(&self) -> bool {
        !matches!(self.kind, ObjectKind::Hier)
    }

    pub fn get_child(&self, name: &str) -> Result<Self, SimError> {
        let mut child_name = SIM_IF.get_full_name(self)?;
        child_name.push('.');
        child_name.push_str(name);
        SimObject::from_name(&child_name)
    }

    /// Shorthand for [`SimObject::get_child`].
    pub fn c(&self, name: &str) -> Result<Self, SimError> {
        self.get_child(name)
    }

    pub fn from_handle(handle: usize) -> Result<Self, SimError> {
        SIG_MAP
            .with(|m| m.borrow().get(handle as u64).copied())
            .ok_or(SimError::InvalidHandle(handle))
    }

    pub fn from_name(full_name: &str) -> Result<Self, SimError> {
        let handle = SIG_MAP_NAME.with(|m| m.borrow().get(full_name).copied());
        match handle {
            Some(h) => SimObject::from_handle(h),
            None => SimObject::new_from_name(full_name),
        }
    }

    fn new_from_name(full_name: &str) -> Result<Self, SimError> {
        let obj = SIM_IF.get_object_by_name(full_name)?;
        SIG_MAP.with(|m| m.borrow_mut().insert(obj.handle as u64, obj));
        SIG_MAP_NAME.with(|m| m.borrow_mut().insert(full_name.to_string(), obj.handle));
        Ok(obj)
    }

    pub fn get_root() -> Result<Self, SimError> {
        let root = SIM_IF.get_root_object()?;
        SIG_MAP.with(|m| m.borrow_mut().insert(root.handle as u64, root));
        Ok(root)
    }

    pub fn i32(&self) -> Result<i32, SimError> {
        SIM_IF.get_value_i32(self)
    }

    pub fn u32(&self) -> Result<u32, SimError> {
        SIM_IF.get_value(self)
    }

    /// Single bit of the value, LSB is bit 0.
    pub fn bit(&self, index: u32) -> Result<bool, SimError> {
        Ok((self.u32()? >> index) & 1 == 1)
    }

    pub fn bin(&self) -> Result<String, SimError> {
        SIM_IF.get_value_bin(self)
    }

    pub fn set(&self, val: i32) -> Result<(), SimError> {
        SIM_IF.set_value_i32(self, val)
    }

    pub fn set_u32(&self, val: u32) -> Result<(), SimError> {
        SIM_IF.set_value(self, val)
    }

    pub fn set_bin(&self, val: &str) -> Result<(), SimError> {
        // remove '_' and 0b
        let size = match self.kind {
            ObjectKind::Int(size) => size,
            ObjectKind::Hier => return Err(SimError::NotAValue { name: self.name() }),
        };
        let stripped = val.strip_prefix("0b").unwrap_or(val).replace('_', "");
        if stripped.len() != size as usize {
            return Err(SimError::InvalidBinStr {
                name: self.name(),
                value: val.to_string(),
                reason: "length mismatch",
            });
        }
        if !stripped.chars().all(valid_char) {
            return Err(SimError::InvalidBinStr {
                name: self.name(),
                value: val.to_string(),
                reason: "invalid characters",
            });
        }
        SIM_IF.set_value_bin(self, &stripped)
    }

    // convenience functions to get edge triggers for this signal
    pub fn rising_edge(self) -> Trigger {
        Trigger::rising_edge(self)
    }
    pub async fn rising_edge_ro(self) -> TbResult {
        self.rising_edge().await?;
        Trigger::read_only().await?;
        Ok(Val::None)
    }
    pub async fn rising_edge_rw(self) -> TbResult {
        self.rising_edge().await?;
        Trigger::read_write().await?;
        Ok(Val::None)
    }
    pub fn falling_edge(self) -> Trigger {
        Trigger::falling_edge(self)
    }
    pub fn edge(self) -> Trigger {
        Trigger::edge(self)
    }
}

// the native simulator is two-state
fn valid_char(c: char) -> bool {
    c == '0' || c == '1'
}
