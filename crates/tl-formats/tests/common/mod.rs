//! Byte builders for synthetic MOD and XM files.
//!
//! Also used by the workspace-level integration tests.

#![allow(dead_code)]

/// Amiga period of C-4.
pub const C4: u16 = 428;
/// XM note number of C-4.
pub const XM_C4: u8 = 49;
pub const XM_KEY_OFF: u8 = 97;

struct ModSample {
    name: String,
    data: Vec<i8>,
    volume: u8,
    /// Loop start and length in words; length 0 means no loop
    loop_words: (u16, u16),
}

/// A 31-sample MOD file.
pub struct ModBuilder {
    title: String,
    channels: u8,
    samples: Vec<ModSample>,
    patterns: Vec<Vec<[u8; 4]>>,
    order: Vec<u8>,
}

impl ModBuilder {
    pub fn new(channels: u8) -> Self {
        Self {
            title: String::new(),
            channels,
            samples: Vec::new(),
            patterns: Vec::new(),
            order: Vec::new(),
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    pub fn sample(mut self, name: &str, data: Vec<i8>, volume: u8) -> Self {
        self.samples.push(ModSample {
            name: name.into(),
            data,
            volume,
            loop_words: (0, 0),
        });
        self
    }

    /// A sample looping over its whole length.
    pub fn looped_sample(mut self, name: &str, data: Vec<i8>, volume: u8) -> Self {
        let words = (data.len() / 2) as u16;
        self.samples.push(ModSample {
            name: name.into(),
            data,
            volume,
            loop_words: (0, words),
        });
        self
    }

    /// A sample with explicit loop start and length in words.
    pub fn sample_with_loop(mut self, name: &str, data: Vec<i8>, start: u16, length: u16) -> Self {
        self.samples.push(ModSample {
            name: name.into(),
            data,
            volume: 64,
            loop_words: (start, length),
        });
        self
    }

    /// Append `count` empty patterns.
    pub fn patterns(mut self, count: usize) -> Self {
        for _ in 0..count {
            self.patterns.push(vec![[0; 4]; 64 * self.channels as usize]);
        }
        self
    }

    /// Write a cell. `period` 0 leaves the note empty.
    pub fn cell(
        mut self,
        pattern: usize,
        row: usize,
        channel: usize,
        period: u16,
        sample: u8,
        effect: u8,
        param: u8,
    ) -> Self {
        let index = row * self.channels as usize + channel;
        self.patterns[pattern][index] = [
            (sample & 0xF0) | ((period >> 8) as u8 & 0x0F),
            period as u8,
            ((sample & 0x0F) << 4) | (effect & 0x0F),
            param,
        ];
        self
    }

    pub fn order(mut self, order: &[u8]) -> Self {
        self.order = order.to_vec();
        self
    }

    fn magic(&self) -> [u8; 4] {
        let text = match self.channels {
            4 => "M.K.".to_string(),
            n @ 1..=9 => format!("{}CHN", n),
            n => format!("{:02}CH", n),
        };
        let mut magic = [0u8; 4];
        magic.copy_from_slice(text.as_bytes());
        magic
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        push_text(&mut out, &self.title, 20);
        for i in 0..31 {
            match self.samples.get(i) {
                Some(s) => {
                    push_text(&mut out, &s.name, 22);
                    out.extend_from_slice(&((s.data.len() / 2) as u16).to_be_bytes());
                    out.push(0);
                    out.push(s.volume);
                    out.extend_from_slice(&s.loop_words.0.to_be_bytes());
                    out.extend_from_slice(&s.loop_words.1.max(1).to_be_bytes());
                }
                None => {
                    out.extend_from_slice(&[0; 28]);
                    out.extend_from_slice(&1u16.to_be_bytes());
                }
            }
        }
        out.push(self.order.len() as u8);
        out.push(0);
        let mut orders = [0u8; 128];
        orders[..self.order.len()].copy_from_slice(&self.order);
        out.extend_from_slice(&orders);
        out.extend_from_slice(&self.magic());
        for pattern in &self.patterns {
            for cell in pattern {
                out.extend_from_slice(cell);
            }
        }
        for s in &self.samples {
            out.extend(s.data.iter().map(|&b| b as u8));
        }
        out
    }
}

#[derive(Clone, Copy, Default)]
pub struct XmCell {
    pub note: u8,
    pub instrument: u8,
    pub volume: u8,
    pub effect: u8,
    pub param: u8,
}

struct XmPattern {
    rows: u16,
    cells: Vec<XmCell>,
}

/// An XM 1.04 file whose instruments each hold one 8-bit sample.
pub struct XmBuilder {
    title: String,
    channels: u16,
    speed: u16,
    bpm: u16,
    linear: bool,
    order: Vec<u8>,
    patterns: Vec<XmPattern>,
    instruments: Vec<(String, Vec<i8>, bool)>,
}

impl XmBuilder {
    pub fn new(channels: u16) -> Self {
        Self {
            title: String::new(),
            channels,
            speed: 6,
            bpm: 125,
            linear: true,
            order: Vec::new(),
            patterns: Vec::new(),
            instruments: Vec::new(),
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    pub fn timing(mut self, speed: u16, bpm: u16) -> Self {
        self.speed = speed;
        self.bpm = bpm;
        self
    }

    pub fn pattern(mut self, rows: u16) -> Self {
        let cells = vec![XmCell::default(); rows as usize * self.channels as usize];
        self.patterns.push(XmPattern { rows, cells });
        self
    }

    pub fn cell(mut self, pattern: usize, row: usize, channel: usize, cell: XmCell) -> Self {
        let channels = self.channels as usize;
        self.patterns[pattern].cells[row * channels + channel] = cell;
        self
    }

    /// An instrument with one sample, optionally looped over its length.
    pub fn instrument(mut self, name: &str, data: Vec<i8>, looped: bool) -> Self {
        self.instruments.push((name.into(), data, looped));
        self
    }

    pub fn order(mut self, order: &[u8]) -> Self {
        self.order = order.to_vec();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"Extended Module: ");
        push_text(&mut out, &self.title, 20);
        out.push(0x1A);
        push_text(&mut out, "FastTracker v2.00", 20);
        out.extend_from_slice(&0x0104u16.to_le_bytes());

        out.extend_from_slice(&276u32.to_le_bytes());
        for value in [
            self.order.len() as u16,
            0,
            self.channels,
            self.patterns.len() as u16,
            self.instruments.len() as u16,
            self.linear as u16,
            self.speed,
            self.bpm,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        let mut orders = [0u8; 256];
        orders[..self.order.len()].copy_from_slice(&self.order);
        out.extend_from_slice(&orders);

        for pattern in &self.patterns {
            let mut packed = Vec::new();
            for c in &pattern.cells {
                packed.extend_from_slice(&[0x9F, c.note, c.instrument, c.volume, c.effect, c.param]);
            }
            out.extend_from_slice(&9u32.to_le_bytes());
            out.push(0);
            out.extend_from_slice(&pattern.rows.to_le_bytes());
            out.extend_from_slice(&(packed.len() as u16).to_le_bytes());
            out.extend_from_slice(&packed);
        }

        for (name, data, looped) in &self.instruments {
            let start = out.len();
            out.extend_from_slice(&263u32.to_le_bytes());
            push_text(&mut out, name, 22);
            out.push(0);
            out.extend_from_slice(&1u16.to_le_bytes());
            out.extend_from_slice(&40u32.to_le_bytes());
            // Keymap, envelopes, envelope settings, vibrato and fadeout
            out.resize(start + 263, 0);

            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
            let loop_len = if *looped { data.len() as u32 } else { 0 };
            out.extend_from_slice(&loop_len.to_le_bytes());
            out.push(64);
            out.push(0);
            out.push(if *looped { 1 } else { 0 });
            out.push(128);
            out.push(0);
            out.push(0);
            push_text(&mut out, name, 22);

            let mut prev = 0i8;
            for &s in data {
                out.push(s.wrapping_sub(prev) as u8);
                prev = s;
            }
        }
        out
    }
}

fn push_text(out: &mut Vec<u8>, text: &str, len: usize) {
    let bytes = text.as_bytes();
    let n = bytes.len().min(len);
    out.extend_from_slice(&bytes[..n]);
    out.extend(std::iter::repeat(0).take(len - n));
}

/// One cycle of a square wave, `len` samples long.
pub fn square(len: usize, amplitude: i8) -> Vec<i8> {
    (0..len)
        .map(|i| if i < len / 2 { amplitude } else { -amplitude })
        .collect()
}
