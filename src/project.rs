//! Tests of the serial cookie DAC project, driven through its top level pins.

use crate::prelude::*;
use crate::utils;

pub use crate::dut::MAGIC_COOKIE;

/// Clock cycles each serial clock level is held for.
const HOLD_CYCLES: u32 = 3;
/// Cycles left for the DAC to run after a store.
const DAC_WAIT_CYCLES: u32 = 100;
const DAC_CYCLES: u32 = 1024;
const RANDOM_WORDS: usize = 16;

/// Bits of `word`, most significant first, in shift order.
pub fn word_bits(word: u16) -> [u8; 16] {
    let mut bits = [0; 16];
    for (i, bit) in bits.iter_mut().enumerate() {
        *bit = ((word >> (15 - i)) & 1) as u8;
    }
    bits
}

/// Controls packed into `ui_in`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UiIn {
    pub sclk: bool,
    pub sdat: bool,
    pub load: bool,
    pub select: bool,
}

impl UiIn {
    pub fn pack(self) -> u32 {
        // b0 is clk, b1 is dat, b2 is load, b3 is select
        self.sclk as u32 | (self.sdat as u32) << 1 | (self.load as u32) << 2 | (self.select as u32) << 3
    }
}

#[derive(Clone)]
pub struct ProjectTb {
    pub clk: SimObject,
    pub rst_n: SimObject,
    pub ena: SimObject,
    pub ui_in: SimObject,
    pub uio_in: SimObject,
    pub uo_out: SimObject,
    pub uio_out: SimObject,
}

impl ProjectTb {
    /// Looks up the pins below `dut` and starts a 10 MHz clock on `clk`.
    pub fn new(dut: SimObject) -> Result<Self, SimError> {
        let tb = Self {
            clk: dut.c("clk")?,
            rst_n: dut.c("rst_n")?,
            ena: dut.c("ena")?,
            ui_in: dut.c("ui_in")?,
            uio_in: dut.c("uio_in")?,
            uo_out: dut.c("uo_out")?,
            uio_out: dut.c("uio_out")?,
        };
        Task::fork(clock(tb.clk, 100, "ns"));
        Ok(tb)
    }

    pub async fn reset(&self) -> TbResult {
        self.ena.set(1)?;
        self.ui_in.set(0)?;
        self.uio_in.set(0)?;
        self.rst_n.set(0)?;
        clock_cycles(self.clk, 3).await?;
        self.rst_n.set(1)?;
        Ok(Val::None)
    }

    async fn drive(&self, ui: UiIn, cycles: u32) -> TbResult {
        self.ui_in.set_u32(ui.pack())?;
        clock_cycles(self.clk, cycles).await
    }

    /// Shifts `word` in MSB first. With `flag` set, the detect flag is
    /// checked against it after every bit.
    pub async fn shift_word(&self, word: u16, flag: Option<bool>) -> TbResult {
        for bit in word_bits(word) {
            let mut ui = UiIn {
                sdat: bit == 1,
                ..Default::default()
            };
            self.drive(ui, HOLD_CYCLES).await?;
            ui.sclk = true;
            self.drive(ui, HOLD_CYCLES).await?;
            if let Some(expected) = flag {
                let detected = self.cookie_detected()?;
                tb_assert!(
                    detected == expected,
                    "cookie flag {} while shifting {:#06x}, expected {}",
                    detected,
                    word,
                    expected
                );
            }
        }
        Ok(Val::None)
    }

    /// Copies the shift register into the data register.
    pub async fn store(&self) -> TbResult {
        self.drive(UiIn::default(), HOLD_CYCLES).await?;
        let load = UiIn {
            load: true,
            ..Default::default()
        };
        self.drive(load, HOLD_CYCLES).await
    }

    pub fn cookie_detected(&self) -> Result<bool, SimError> {
        Ok(self.uo_out.u32()? & 2 == 2)
    }

    /// Selects a byte of the data register and returns `uio_out` one clock later.
    pub async fn parallel_byte(&self, high: bool) -> Result<u32, Val> {
        let ui = UiIn {
            select: high,
            ..Default::default()
        };
        self.drive(ui, 1).await?;
        Ok(self.uio_out.u32()?)
    }
}

pub async fn test_project(dut: SimObject) -> TbResult {
    SIM_IF.log("Start");
    let tb = ProjectTb::new(dut)?;

    SIM_IF.log("Reset");
    tb.reset().await?;

    SIM_IF.log("Test project behavior");
    tb_assert!(!tb.uo_out.bit(2)?, "uo_out[2] set after reset");

    SIM_IF.log(&format!("Loading {:016b}", MAGIC_COOKIE));
    tb.shift_word(MAGIC_COOKIE, Some(false)).await?;
    tb.store().await?;

    SIM_IF.log("Check magic cookie detection");
    tb_assert!(tb.cookie_detected()?, "cookie not detected after store");

    SIM_IF.log("Check parallel output");
    let low = tb.parallel_byte(false).await?;
    tb_assert!(low == 0xfe, "uio_out is {:#04x} with select low, expected 0xfe", low);
    let high = tb.parallel_byte(true).await?;
    tb_assert!(high == 0xca, "uio_out is {:#04x} with select high, expected 0xca", high);

    // the stored cookie stays detected until the zeros are stored
    tb.shift_word(0x0000, Some(true)).await?;
    tb.store().await?;
    clock_cycles(tb.clk, DAC_WAIT_CYCLES).await?;

    tb.shift_word(0xffff, Some(false)).await?;
    tb.store().await?;
    clock_cycles(tb.clk, DAC_WAIT_CYCLES).await?;

    Ok(Val::None)
}

pub async fn test_random_words(dut: SimObject) -> TbResult {
    let tb = ProjectTb::new(dut)?;
    tb.reset().await?;

    let mut words: Vec<u16> = (0..RANDOM_WORDS).map(|_| utils::rand_int(1 << 16) as u16).collect();
    let at = utils::rand_int(words.len() as u32 + 1) as usize;
    words.insert(at, MAGIC_COOKIE);

    let sb = Scoreboard::new();
    for word in words {
        tb.shift_word(word, None).await?;
        tb.store().await?;
        sb.add_exp((word, word == MAGIC_COOKIE));

        let low = tb.parallel_byte(false).await?;
        let high = tb.parallel_byte(true).await?;
        sb.add_recv(((high << 8 | low) as u16, tb.cookie_detected()?));
    }
    SIM_IF.log(&format!("Scoreboard: {}", sb.result_str()));
    sb.result()
}

pub async fn test_dac_duty(dut: SimObject) -> TbResult {
    let tb = ProjectTb::new(dut)?;
    tb.reset().await?;

    for word in [0x4000u16, 0x0100, MAGIC_COOKIE] {
        tb.shift_word(word, None).await?;
        tb.store().await?;

        let mut ones = 0u32;
        for _ in 0..DAC_CYCLES {
            // the design has already seen this edge when the trigger fires
            tb.clk.rising_edge().await?;
            ones += tb.uo_out.bit(0)? as u32;
        }
        let expected = (DAC_CYCLES as u64 * word as u64 >> 16) as u32;
        SIM_IF.log(&format!("DAC {:#06x}: {} of {} cycles high", word, ones, DAC_CYCLES));
        tb_assert!(
            ones.abs_diff(expected) <= 1,
            "DAC {:#06x} was high {} of {} cycles, expected {}",
            word,
            ones,
            DAC_CYCLES,
            expected
        );
    }
    Ok(Val::None)
}
