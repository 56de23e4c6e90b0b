use crate::prelude::*;
use std::collections::VecDeque;

/// In-order comparison of expected against received items.
pub struct Scoreboard<T: PartialEq>(TbObj<ScoreboardInner<T>>);

impl<T: PartialEq> Clone for Scoreboard<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: 'static + PartialEq + std::fmt::Debug> Scoreboard<T> {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(TbObj::new(ScoreboardInner {
            exp_q: VecDeque::new(),
            recv_q: VecDeque::new(),
            errors: 0,
            expected: 0,
            received: 0,
            matched: 0,
        }))
    }
    pub fn add_exp(&self, data: T) {
        self.0.with_mut(|s| {
            s.exp_q.push_back(data);
            s.expected += 1;
        });
        self.compare();
    }
    pub fn add_recv(&self, data: T) {
        self.0.with_mut(|s| {
            s.recv_q.push_back(data);
            s.received += 1;
        });
        self.compare();
    }
    fn compare(&self) {
        self.0.with_mut(|s| {
            while !s.exp_q.is_empty() && !s.recv_q.is_empty() {
                let (exp, recv) = (s.exp_q.pop_front(), s.recv_q.pop_front());
                match exp == recv {
                    true => s.matched += 1,
                    false => {
                        SIM_IF.log(&format!("Scoreboard mismatch: expected {:?}, received {:?}", exp, recv));
                        s.errors += 1
                    }
                }
            }
        });
    }
    pub fn result(&self) -> TbResult {
        match self.passed() {
            true => Ok(Val::String(self.result_str())),
            false => Err(Val::String(self.result_str())),
        }
    }
    pub fn passed(&self) -> bool {
        let inner = self.0.get();
        inner.expected > 0
            && inner.received == inner.expected
            && inner.matched == inner.received
            && inner.errors == 0
            && inner.exp_q.is_empty()
            && inner.recv_q.is_empty()
    }
    pub fn result_str(&self) -> String {
        let inner = self.0.get();
        format!(
            "expected={}, received={}, matched={}, errors={}, expQ: {}, recvQ: {}",
            inner.expected,
            inner.received,
            inner.matched,
            inner.errors,
            inner.exp_q.len(),
            inner.recv_q.len()
        )
    }
}

struct ScoreboardInner<T>
where
    T: PartialEq,
{
    exp_q: VecDeque<T>,
    recv_q: VecDeque<T>,
    errors: u32,
    expected: u32,
    received: u32,
    matched: u32,
}

/*
 * CLOCK
 */
pub async fn clock(clk: SimObject, period: u32, unit: &str) -> TbResult {
    let high_t = period / 2;
    let low_t = period - high_t;
    if period % 2 != 0 {
        SIM_IF.log(&format!("Warning: Clock period {period}{unit} not dividable by 2. High time will be {high}{unit}; low time will be {low}{unit}.", period=period, unit=unit, high=high_t, low=low_t));
    }
    loop {
        clk.set(0)?;
        Trigger::timer(low_t as u64, unit).await?;
        clk.set(1)?;
        Trigger::timer(high_t as u64, unit).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoreboard_passes_on_matching_streams() {
        let sb = Scoreboard::new();
        sb.add_exp(1u8);
        sb.add_recv(1u8);
        sb.add_recv(2u8);
        assert!(!sb.passed());
        sb.add_exp(2u8);
        assert!(sb.passed());
        assert!(sb.result().is_ok());
    }

    #[test]
    fn scoreboard_counts_mismatches() {
        let sb = Scoreboard::new();
        sb.add_exp(0xfe_u8);
        sb.add_recv(0xca_u8);
        assert!(!sb.passed());
        assert_eq!(
            sb.result_str(),
            "expected=1, received=1, matched=0, errors=1, expQ: 0, recvQ: 0"
        );
    }

    #[test]
    fn empty_scoreboard_fails() {
        let sb: Scoreboard<u8> = Scoreboard::new();
        assert!(sb.result().is_err());
    }
}
