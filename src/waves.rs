//! Value Change Dump output of the native simulator's signals.

use std::io::Write;

use crate::error::SimError;

/// Writes signal changes in IEEE 1364 VCD format.
///
/// Signals are declared once with [`VcdWriter::add_signal`]; the header is
/// written lazily on the first recorded change or on [`VcdWriter::finish`].
pub struct VcdWriter<W: Write> {
    writer: W,
    scope: String,
    timescale: String,
    signals: Vec<(String, String, u32)>, // (id code, name, width)
    header_written: bool,
    current_time: Option<u64>,
}

impl<W: Write> VcdWriter<W> {
    pub fn new(writer: W, scope: &str, timescale: &str) -> Self {
        Self {
            writer,
            scope: scope.to_string(),
            timescale: timescale.to_string(),
            signals: Vec::new(),
            header_written: false,
            current_time: None,
        }
    }

    /// Declares a signal and returns its index for [`VcdWriter::change`].
    pub fn add_signal(&mut self, name: &str, width: u32) -> usize {
        let index = self.signals.len();
        self.signals
            .push((make_id_code(index as u32), name.to_string(), width));
        index
    }

    fn write_header(&mut self, initial: &[u32]) -> Result<(), SimError> {
        writeln!(self.writer, "$version")?;
        writeln!(self.writer, "  {} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))?;
        writeln!(self.writer, "$end")?;
        writeln!(self.writer, "$timescale {} $end", self.timescale)?;
        writeln!(self.writer, "$scope module {} $end", self.scope)?;
        for (id, name, width) in &self.signals {
            writeln!(self.writer, "$var wire {width} {id} {name} $end")?;
        }
        writeln!(self.writer, "$upscope $end")?;
        writeln!(self.writer, "$enddefinitions $end")?;
        writeln!(self.writer, "#0")?;
        writeln!(self.writer, "$dumpvars")?;
        for (index, value) in initial.iter().enumerate() {
            self.write_value(index, *value)?;
        }
        writeln!(self.writer, "$end")?;
        self.current_time = Some(0);
        self.header_written = true;
        Ok(())
    }

    /// Writes the header with the given initial values. Must precede changes.
    pub fn start(&mut self, initial: &[u32]) -> Result<(), SimError> {
        if !self.header_written {
            self.write_header(initial)?;
        }
        Ok(())
    }

    /// Records a new value of the signal at `time`.
    pub fn change(&mut self, time: u64, index: usize, value: u32) -> Result<(), SimError> {
        if index >= self.signals.len() {
            return Err(SimError::UnknownWaveSignal(index));
        }
        if !self.header_written {
            let zeros = vec![0; self.signals.len()];
            self.write_header(&zeros)?;
        }
        if self.current_time != Some(time) {
            writeln!(self.writer, "#{time}")?;
            self.current_time = Some(time);
        }
        self.write_value(index, value)
    }

    fn write_value(&mut self, index: usize, value: u32) -> Result<(), SimError> {
        let (id, _, width) = self.signals.get(index).ok_or(SimError::UnknownWaveSignal(index))?;
        if *width == 1 {
            writeln!(self.writer, "{}{}", value & 1, id)?;
        } else {
            writeln!(self.writer, "b{:0w$b} {}", value, id, w = *width as usize)?;
        }
        Ok(())
    }

    /// Flushes the output and hands back the writer.
    pub fn finish(mut self) -> Result<W, SimError> {
        if !self.header_written {
            let zeros = vec![0; self.signals.len()];
            self.write_header(&zeros)?;
        }
        self.writer.flush()?;
        Ok(self.writer)
    }
}

// printable ASCII codes starting at '!', more characters once they run out
fn make_id_code(index: u32) -> String {
    let mut result = String::new();
    let mut idx = index;
    loop {
        result.push((b'!' + (idx % 94) as u8) as char);
        idx /= 94;
        if idx == 0 {
            break;
        }
        idx -= 1;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_codes_are_unique() {
        assert_eq!(make_id_code(0), "!");
        assert_eq!(make_id_code(93), "~");
        assert_eq!(make_id_code(94), "!!");
        assert_ne!(make_id_code(95), make_id_code(94));
    }

    #[test]
    fn writes_header_and_changes() {
        let mut vcd = VcdWriter::new(Vec::new(), "tb", "1ps");
        let clk = vcd.add_signal("clk", 1);
        let ui = vcd.add_signal("ui_in", 8);
        vcd.start(&[0, 0x0a]).unwrap();
        vcd.change(50_000, clk, 1).unwrap();
        vcd.change(50_000, ui, 0x02).unwrap();
        vcd.change(100_000, clk, 0).unwrap();
        let out = String::from_utf8(vcd.finish().unwrap()).unwrap();

        assert!(out.contains("$timescale 1ps $end"));
        assert!(out.contains("$var wire 1 ! clk $end"));
        assert!(out.contains("$var wire 8 \" ui_in $end"));
        assert!(out.contains("b00001010 \"\n"));
        let tail = out.split("$enddefinitions $end\n").nth(1).unwrap();
        assert!(tail.contains("#50000\n1!\nb00000010 \"\n#100000\n0!\n"));
    }

    #[test]
    fn unknown_signal_is_rejected() {
        let mut vcd = VcdWriter::new(Vec::new(), "tb", "1ps");
        let clk = vcd.add_signal("clk", 1);
        vcd.change(10, clk, 1).unwrap();
        assert!(matches!(vcd.change(20, 1, 1), Err(SimError::UnknownWaveSignal(1))));
        let out = String::from_utf8(vcd.finish().unwrap()).unwrap();
        assert!(!out.contains("#20"));
    }
}
