use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;

use crate::prelude::*;

thread_local! {
    static RNG: RefCell<StdRng> = RefCell::new(StdRng::from_entropy());
}

/// Reseeds the testbench RNG of this thread. Without a seed it draws from entropy.
pub fn seed(seed: Option<u64>) {
    let rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    RNG.with(|r| *r.borrow_mut() = rng);
}

pub async fn clock_cycles(signal: SimObject, n_cycles: u32) -> TbResult {
    for _ in 0..n_cycles {
        signal.rising_edge().await?;
    }
    Ok(Val::None)
}

#[inline]
pub fn rand() -> f32 {
    RNG.with(|r| r.borrow_mut().gen::<f32>())
}

#[inline]
pub fn rand_int(ceil: u32) -> u32 {
    RNG.with(|r| r.borrow_mut().gen_range(0..ceil))
}
