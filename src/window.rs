use thiserror::Error;

/// Errors raised while constructing window values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("window duration must be greater than zero")]
    ZeroDuration,
}

/// A fixed-duration time bucket identified by its index since the epoch.
///
/// The index is `floor(timestamp / duration)`, so two timestamps that fall
/// inside the same bucket always produce the same window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeWindow {
    index: u64,
    duration_millis: u64,
}

impl TimeWindow {
    /// Returns the window containing the given epoch-millisecond timestamp.
    pub fn containing(timestamp_millis: u64, duration_millis: u64) -> Result<Self, WindowError> {
        if duration_millis == 0 {
            return Err(WindowError::ZeroDuration);
        }
        Ok(Self {
            index: timestamp_millis / duration_millis,
            duration_millis,
        })
    }

    /// Rebuilds a window from its index, as recovered from a decoded row key.
    pub fn from_index(index: u64, duration_millis: u64) -> Result<Self, WindowError> {
        if duration_millis == 0 {
            return Err(WindowError::ZeroDuration);
        }
        Ok(Self {
            index,
            duration_millis,
        })
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn duration_millis(&self) -> u64 {
        self.duration_millis
    }

    pub fn start_millis(&self) -> u64 {
        self.index.saturating_mul(self.duration_millis)
    }

    /// Exclusive end boundary of the window.
    pub fn end_millis(&self) -> u64 {
        self.start_millis().saturating_add(self.duration_millis)
    }

    /// Returns the adjacent later window of the same duration.
    pub fn next(&self) -> Self {
        Self {
            index: self.index.saturating_add(1),
            duration_millis: self.duration_millis,
        }
    }

    /// True once the wall clock has moved past the window's end boundary.
    pub fn has_elapsed(&self, now_millis: u64) -> bool {
        now_millis >= self.end_millis()
    }
}

/// Enumerates every window whose index lies in
/// `[containing(start).index, containing(end).index]`, ascending.
///
/// The range is inclusive at both ends: a span of exactly one window
/// duration yields two windows. An inverted range yields no windows.
pub fn windows_between(
    start_millis: u64,
    end_millis: u64,
    duration_millis: u64,
) -> Result<Vec<TimeWindow>, WindowError> {
    if duration_millis == 0 {
        return Err(WindowError::ZeroDuration);
    }
    if end_millis < start_millis {
        return Ok(Vec::new());
    }
    let first = TimeWindow::containing(start_millis, duration_millis)?;
    let last_index = end_millis / duration_millis;
    let mut windows = Vec::with_capacity((last_index - first.index + 1) as usize);
    let mut current = first;
    while current.index <= last_index {
        windows.push(current);
        current = current.next();
    }
    Ok(windows)
}
