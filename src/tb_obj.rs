use std::{
    cell::{Ref, RefCell, RefMut},
    rc::Rc,
};

// TbObj lets tasks of one testbench mutably share objects such as a Scoreboard.
// All tasks of a simulation run on the same thread, so Rc and RefCell suffice.
pub struct TbObj<T>(Rc<RefCell<T>>);

impl<T> TbObj<T> {
    pub fn new(data: T) -> TbObj<T> {
        TbObj(Rc::new(RefCell::new(data)))
    }
    pub fn get(&self) -> Ref<T> {
        self.0.borrow()
    }
    pub fn get_mut(&self) -> RefMut<T> {
        self.0.borrow_mut()
    }
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }
}

impl<T> Clone for TbObj<T> {
    fn clone(&self) -> Self {
        TbObj(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::TbObj;

    #[test]
    fn clones_share_state() {
        let a = TbObj::new(vec![1u32]);
        let b = a.clone();
        b.get_mut().push(2);
        a.with_mut(|v| v.push(3));
        assert_eq!(*b.get(), vec![1, 2, 3]);
    }
}
