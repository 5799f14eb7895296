use btmesh_common::Seq;

/// Monotonic 24-bit outbound sequence-number counter. Persistence of the
/// value across node restarts is a host concern — this only exposes
/// peek/next/set, as the distilled specification requires.
#[derive(Default)]
pub struct SequenceAllocator {
    seq: Seq,
}

impl SequenceAllocator {
    pub fn new(seq: Seq) -> Self {
        Self { seq }
    }

    /// Returns the next SEQ to be burned without consuming it.
    pub fn peek(&self) -> Seq {
        self.seq
    }

    /// Consumes and returns the next SEQ; each call advances the counter.
    pub fn next(&mut self) -> Seq {
        let current = self.seq;
        if let Ok(advanced) = current + 1 {
            self.seq = advanced;
        }
        current
    }

    pub fn set(&mut self, seq: Seq) {
        self.seq = seq;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_advances_and_peek_does_not() {
        let mut alloc = SequenceAllocator::new(Seq::new(10));
        assert_eq!(alloc.peek().value(), 10);
        assert_eq!(alloc.next().value(), 10);
        assert_eq!(alloc.peek().value(), 11);
        assert_eq!(alloc.next().value(), 11);
    }

    #[test]
    fn set_overrides_counter() {
        let mut alloc = SequenceAllocator::new(Seq::new(10));
        alloc.set(Seq::new(500));
        assert_eq!(alloc.next().value(), 500);
    }
}
