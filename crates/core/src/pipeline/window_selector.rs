/// Inclusive range of sequence indices chosen for encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameWindow {
    bounds: Option<(u64, u64)>,
}

impl FrameWindow {
    pub fn empty() -> Self {
        Self { bounds: None }
    }

    /// `low..=high`; an inverted pair yields an empty window.
    pub fn new(low: u64, high: u64) -> Self {
        if low > high {
            Self::empty()
        } else {
            Self {
                bounds: Some((low, high)),
            }
        }
    }

    pub fn bounds(&self) -> Option<(u64, u64)> {
        self.bounds
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_none()
    }

    pub fn len(&self) -> u64 {
        self.bounds.map_or(0, |(low, high)| high - low + 1)
    }

    /// Indices in strictly increasing order. Encoding order (and so pts order)
    /// follows this iterator.
    pub fn indices(&self) -> impl Iterator<Item = u64> {
        let (low, high) = self.bounds.unwrap_or((1, 0));
        low..=high
    }
}

/// Computes `[max(0, center - radius), min(submitted - 1, center + radius)]`.
///
/// Empty when nothing was submitted or the clipped range is inverted (e.g. a
/// centre far beyond the last submitted frame).
pub fn compute_range(center: i64, submitted_count: u64, radius: u64) -> FrameWindow {
    if submitted_count == 0 {
        return FrameWindow::empty();
    }
    let center = i128::from(center);
    let radius = i128::from(radius);
    let last = i128::from(submitted_count) - 1;

    let low = (center - radius).max(0);
    let high = (center + radius).min(last);
    if high < low {
        return FrameWindow::empty();
    }
    // Both bounds are within [0, submitted_count - 1] here.
    FrameWindow::new(low as u64, high as u64)
}

/// Lifetime cap on frames accepted by the encoder. A limit of 0 is unlimited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameBudget {
    limit: u64,
}

impl FrameBudget {
    pub fn new(limit: u64) -> Self {
        Self { limit }
    }

    pub fn unlimited() -> Self {
        Self { limit: 0 }
    }

    pub fn limit(&self) -> Option<u64> {
        (self.limit > 0).then_some(self.limit)
    }

    /// Whether another frame may be fed after `fed` have been accepted.
    pub fn permits(&self, fed: u64) -> bool {
        self.limit == 0 || fed < self.limit
    }

    pub fn remaining(&self, fed: u64) -> Option<u64> {
        self.limit().map(|limit| limit.saturating_sub(fed))
    }
}
