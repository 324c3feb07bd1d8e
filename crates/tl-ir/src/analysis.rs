//! Playback traits of a module.
//!
//! Reports the parts of a module that change how it is played back: the
//! pitch model, envelope and loop kinds, and the row-flow commands that
//! decide song length and subsong layout.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use core::fmt;

use crate::effects::{cmd, Effect, VolumeCommand};
use crate::instrument::Envelope;
use crate::module::{FrequencyMode, Module};
use crate::pattern::Note;
use crate::sample::LoopType;

/// Row-flow commands found in the patterns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlowCommands {
    /// Bxx
    pub position_jumps: usize,
    /// Dxx
    pub pattern_breaks: usize,
    /// E6x with x > 0
    pub pattern_loops: usize,
    /// EEx
    pub pattern_delays: usize,
    /// Fxx changing speed or tempo after the first row
    pub timing_changes: usize,
}

impl FlowCommands {
    /// Whether any command can make playback leave the plain order sequence.
    pub fn redirects(&self) -> bool {
        self.position_jumps > 0 || self.pattern_breaks > 0 || self.pattern_loops > 0
    }
}

/// Summary of how a module will be played.
#[derive(Clone, Debug, PartialEq)]
pub struct ModuleFeatures {
    pub frequency_mode: FrequencyMode,
    /// Instruments with an enabled volume envelope
    pub volume_envelopes: usize,
    /// Instruments with an enabled panning envelope
    pub panning_envelopes: usize,
    pub forward_loops: usize,
    pub ping_pong_loops: usize,
    pub flow: FlowCommands,
    /// Channels holding at least one non-empty cell
    pub channels_used: usize,
    pub key_offs: usize,
    /// Distinct effect and volume-column commands
    pub commands: BTreeSet<&'static str>,
}

/// Scan a module for its playback traits.
pub fn analyze(module: &Module) -> ModuleFeatures {
    let enabled = |env: &Option<Envelope>| env.as_ref().is_some_and(|e| e.enabled);
    let mut features = ModuleFeatures {
        frequency_mode: module.frequency_mode,
        volume_envelopes: module
            .instruments
            .iter()
            .filter(|i| enabled(&i.volume_envelope))
            .count(),
        panning_envelopes: module
            .instruments
            .iter()
            .filter(|i| enabled(&i.panning_envelope))
            .count(),
        forward_loops: 0,
        ping_pong_loops: 0,
        flow: FlowCommands::default(),
        channels_used: 0,
        key_offs: 0,
        commands: BTreeSet::new(),
    };

    for sample in module.samples.iter().filter(|s| s.has_loop()) {
        match sample.loop_type {
            LoopType::Forward => features.forward_loops += 1,
            LoopType::PingPong => features.ping_pong_loops += 1,
            LoopType::None => {}
        }
    }

    let mut active = Vec::new();
    active.resize(module.num_channels(), false);
    for pattern in &module.patterns {
        for row in 0..pattern.rows {
            for (ch, cell) in pattern.row(row).iter().enumerate() {
                if cell.is_empty() {
                    continue;
                }
                if let Some(flag) = active.get_mut(ch) {
                    *flag = true;
                }
                if matches!(cell.note, Note::Off) || cell.effect == cmd::KEY_OFF {
                    features.key_offs += 1;
                }
                if cell.volume != VolumeCommand::None {
                    features.commands.insert(cell.volume.name());
                }
                let effect = Effect::decode(cell.effect, cell.param);
                if effect != Effect::None {
                    features.commands.insert(effect.name());
                }
                count_flow(&mut features.flow, effect, row);
            }
        }
    }
    features.channels_used = active.iter().filter(|&&a| a).count();
    features
}

fn count_flow(flow: &mut FlowCommands, effect: Effect, row: u16) {
    match effect {
        Effect::PositionJump(_) => flow.position_jumps += 1,
        Effect::PatternBreak(_) => flow.pattern_breaks += 1,
        Effect::PatternLoop(n) if n > 0 => flow.pattern_loops += 1,
        Effect::PatternDelay(_) => flow.pattern_delays += 1,
        Effect::SetSpeed(_) | Effect::SetTempo(_) if row > 0 => flow.timing_changes += 1,
        _ => {}
    }
}

impl fmt::Display for ModuleFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pitch = match self.frequency_mode {
            FrequencyMode::Amiga => "Amiga periods",
            FrequencyMode::Linear => "linear periods",
        };
        writeln!(f, "Pitch:     {}", pitch)?;
        writeln!(f, "Channels:  {} in use", self.channels_used)?;
        writeln!(
            f,
            "Envelopes: {} volume, {} panning",
            self.volume_envelopes, self.panning_envelopes
        )?;
        writeln!(
            f,
            "Loops:     {} forward, {} ping-pong",
            self.forward_loops, self.ping_pong_loops
        )?;
        let flow = &self.flow;
        writeln!(
            f,
            "Flow:      {} jumps, {} breaks, {} loops, {} delays, {} timing changes",
            flow.position_jumps,
            flow.pattern_breaks,
            flow.pattern_loops,
            flow.pattern_delays,
            flow.timing_changes
        )?;
        if self.key_offs > 0 {
            writeln!(f, "Key offs:  {}", self.key_offs)?;
        }
        if !self.commands.is_empty() {
            let names: Vec<&str> = self.commands.iter().copied().collect();
            writeln!(f, "Commands:  {}", names.join(", "))?;
        }
        Ok(())
    }
}
