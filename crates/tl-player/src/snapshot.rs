//! Lock-free playback position shared between the render thread and the
//! control side.
//!
//! A sequence counter guards the fields: the writer makes it odd while
//! storing and even when done, and readers retry until they see the same
//! even value before and after reading.

use std::sync::atomic::{fence, AtomicBool, AtomicU32, AtomicU64, Ordering};

use tl_ir::PlaybackPosition;

#[derive(Debug, Default)]
pub(crate) struct PositionSnapshot {
    sequence: AtomicU32,
    loaded: AtomicBool,
    seconds: AtomicU64,
    order: AtomicU32,
    pattern: AtomicU32,
    row: AtomicU32,
    /// speed << 8 | tempo
    timing: AtomicU32,
}

impl PositionSnapshot {
    /// Render thread only.
    pub fn publish(&self, position: Option<&PlaybackPosition>) {
        let seq = self.sequence.load(Ordering::Relaxed);
        self.sequence.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        match position {
            Some(p) => {
                self.loaded.store(true, Ordering::Relaxed);
                self.seconds.store(p.seconds.to_bits(), Ordering::Relaxed);
                self.order.store(p.order as u32, Ordering::Relaxed);
                self.pattern.store(p.pattern as u32, Ordering::Relaxed);
                self.row.store(p.row as u32, Ordering::Relaxed);
                self.timing
                    .store((p.speed as u32) << 8 | p.tempo as u32, Ordering::Relaxed);
            }
            None => self.loaded.store(false, Ordering::Relaxed),
        }

        self.sequence.store(seq.wrapping_add(2), Ordering::Release);
    }

    pub fn read(&self) -> Option<PlaybackPosition> {
        loop {
            let before = self.sequence.load(Ordering::Acquire);
            if before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }
            let loaded = self.loaded.load(Ordering::Relaxed);
            let timing = self.timing.load(Ordering::Relaxed);
            let position = PlaybackPosition {
                seconds: f64::from_bits(self.seconds.load(Ordering::Relaxed)),
                order: self.order.load(Ordering::Relaxed) as u16,
                pattern: self.pattern.load(Ordering::Relaxed) as u16,
                row: self.row.load(Ordering::Relaxed) as u16,
                speed: (timing >> 8) as u8,
                tempo: timing as u8,
            };
            fence(Ordering::Acquire);
            if self.sequence.load(Ordering::Relaxed) == before {
                return loaded.then_some(position);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn starts_unloaded() {
        assert_eq!(PositionSnapshot::default().read(), None);
    }

    #[test]
    fn publish_then_read() {
        let snap = PositionSnapshot::default();
        let pos = PlaybackPosition {
            seconds: 12.5,
            order: 3,
            pattern: 7,
            row: 42,
            speed: 6,
            tempo: 125,
        };
        snap.publish(Some(&pos));
        assert_eq!(snap.read(), Some(pos));
        snap.publish(None);
        assert_eq!(snap.read(), None);
    }

    #[test]
    fn readers_never_see_torn_values() {
        let snap = Arc::new(PositionSnapshot::default());
        let writer = {
            let snap = snap.clone();
            std::thread::spawn(move || {
                for i in 0..20_000u32 {
                    let v = (i % 200) as u16;
                    snap.publish(Some(&PlaybackPosition {
                        seconds: v as f64,
                        order: v,
                        pattern: v,
                        row: v,
                        speed: 6,
                        tempo: 125,
                    }));
                }
            })
        };
        for _ in 0..20_000 {
            if let Some(p) = snap.read() {
                assert_eq!(p.order, p.row);
                assert_eq!(p.pattern, p.row);
                assert_eq!(p.seconds, p.row as f64);
            }
        }
        writer.join().unwrap();
    }
}
