/// Client-side sequence number assignment for one session.
///
/// Sequence numbers form a dense, strictly increasing stream starting at 1.
/// A number is issued exactly once: callers assign a sequence when the
/// logical operation is created and keep it across every resend, so a retry
/// is recognizable to the cluster as the same operation. An abandoned
/// operation's number stays consumed; the stream never backs up or skips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequencer {
    next: u64,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequencer {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Issue the next sequence number. Each call returns a fresh number.
    pub fn assign(&mut self) -> u64 {
        let sequence = self.next;
        self.next += 1;
        sequence
    }

    /// The number the next call to [`assign`](Self::assign) will return.
    pub fn next_sequence(&self) -> u64 {
        self.next
    }

    /// The highest number issued so far; 0 if none.
    pub fn last_issued(&self) -> u64 {
        self.next - 1
    }
}
