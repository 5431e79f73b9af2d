/// Percentage of `completed` out of `total` chunks, rounded half-up.
///
/// 100 is reserved for a finished plan: with 200 or more chunks the last
/// partial step would otherwise round up to 100, so it is held at 99.
/// A plan with no chunks is complete by definition and reports 100.
pub fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 || completed >= total {
        return 100;
    }
    let completed = completed as u64;
    let total = total as u64;
    // round(c * 100 / t) == floor((200c + t) / 2t)
    let rounded = (completed * 200 + total) / (total * 2);
    rounded.min(99) as u8
}

/// Derives per-run progress from the completed-chunk count.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    total: usize,
    completed: usize,
}

impl ProgressReporter {
    pub fn new(total_chunks: usize) -> Self {
        Self {
            total: total_chunks,
            completed: 0,
        }
    }

    /// Records `completed` acknowledged chunks and returns the percentage.
    ///
    /// Counts never move backwards within a run.
    pub fn record(&mut self, completed: usize) -> u8 {
        self.completed = self.completed.max(completed.min(self.total));
        self.current()
    }

    /// Percentage for the chunks recorded so far.
    pub fn current(&self) -> u8 {
        percent(self.completed, self.total)
    }
}
