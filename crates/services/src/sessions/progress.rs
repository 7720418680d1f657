/// Aggregated view of attempt progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub total: usize,
    pub answered: usize,
    /// Zero-based positions of questions without a selection.
    pub unanswered: Vec<usize>,
}

impl SessionProgress {
    /// Build progress from a per-question "answered" flag, in paper order.
    pub(crate) fn from_flags(flags: impl IntoIterator<Item = bool>) -> Self {
        let mut total = 0;
        let mut unanswered = Vec::new();
        for (index, answered) in flags.into_iter().enumerate() {
            total += 1;
            if !answered {
                unanswered.push(index);
            }
        }
        Self {
            total,
            answered: total - unanswered.len(),
            unanswered,
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.unanswered.is_empty()
    }
}
