use super::{Design, PinBank, Port};

/// Value whose presence in the data register raises the detect flag.
pub const MAGIC_COOKIE: u16 = 0xCAFE;

// port indices
const CLK: usize = 0;
const RST_N: usize = 1;
const ENA: usize = 2;
const UI_IN: usize = 3;
const UO_OUT: usize = 5;
const UIO_OUT: usize = 6;
const UIO_OE: usize = 7;

// ui_in bits
const SCLK: u32 = 0;
const SDAT: u32 = 1;
const LOAD: u32 = 2;
const SELECT: u32 = 3;

/// Serially loaded 16-bit register driving a first-order sigma-delta DAC.
///
/// `ui_in[0]` is the serial clock, `ui_in[1]` serial data, `ui_in[2]` the load
/// strobe and `ui_in[3]` selects the byte shown on `uio_out`. `uo_out[0]` is the
/// DAC bitstream, `uo_out[1]` flags the magic cookie in the data register.
#[derive(Debug, Clone)]
pub struct CookieDac {
    cookie: u16,
    clk_q: bool,
    sclk_q: bool,
    load_q: bool,
    shift: u16,
    data: u16,
    acc: u16,
    dac: bool,
}

impl CookieDac {
    pub fn new() -> Self {
        Self::with_cookie(MAGIC_COOKIE)
    }

    /// Model detecting a different cookie value.
    pub fn with_cookie(cookie: u16) -> Self {
        Self {
            cookie,
            clk_q: false,
            sclk_q: false,
            load_q: false,
            shift: 0,
            data: 0,
            acc: 0,
            dac: false,
        }
    }

    fn reset(&mut self) {
        self.sclk_q = false;
        self.load_q = false;
        self.shift = 0;
        self.data = 0;
        self.acc = 0;
        self.dac = false;
    }

    fn clock(&mut self, ui_in: u32) {
        let sclk = (ui_in >> SCLK) & 1 == 1;
        let sdat = (ui_in >> SDAT) & 1 == 1;
        let load = (ui_in >> LOAD) & 1 == 1;

        if sclk && !self.sclk_q {
            self.shift = (self.shift << 1) | sdat as u16;
        }
        if load && !self.load_q {
            self.data = self.shift;
        }
        self.sclk_q = sclk;
        self.load_q = load;

        let (acc, carry) = self.acc.overflowing_add(self.data);
        self.acc = acc;
        self.dac = carry;
    }
}

impl Default for CookieDac {
    fn default() -> Self {
        Self::new()
    }
}

impl Design for CookieDac {
    fn top_name(&self) -> &str {
        "tb"
    }

    fn ports(&self) -> Vec<Port> {
        vec![
            Port::input("clk", 1),
            Port::input("rst_n", 1),
            Port::input("ena", 1),
            Port::input("ui_in", 8),
            Port::input("uio_in", 8),
            Port::output("uo_out", 8),
            Port::output("uio_out", 8),
            Port::output("uio_oe", 8),
        ]
    }

    fn evaluate(&mut self, pins: &mut PinBank) {
        let clk = pins.bit(CLK, 0);
        if clk && !self.clk_q {
            if !pins.bit(RST_N, 0) {
                self.reset();
            } else if pins.bit(ENA, 0) {
                self.clock(pins.get(UI_IN));
            }
        }
        self.clk_q = clk;

        let detected = self.data == self.cookie;
        pins.drive(UO_OUT, (detected as u32) << 1 | self.dac as u32);
        let byte = match pins.bit(UI_IN, SELECT) {
            true => self.data >> 8,
            false => self.data & 0xff,
        };
        pins.drive(UIO_OUT, byte as u32);
        pins.drive(UIO_OE, 0xff);
    }
}
