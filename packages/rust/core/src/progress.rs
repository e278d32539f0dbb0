//! Progress reporting for scans.

use contextpack_shared::ScrapedPage;

/// Orchestrator phases, in order. `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Start,
    Fetching,
    Extracting,
    Assembling,
    Done,
    Failed,
}

impl ScanPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Fetching => "fetching",
            Self::Extracting => "extracting",
            Self::Assembling => "assembling",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Human-readable label for progress UIs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Start => "Starting scan",
            Self::Fetching => "Fetching company pages",
            Self::Extracting => "Extracting facts",
            Self::Assembling => "Assembling context pack",
            Self::Done => "Done",
            Self::Failed => "Scan failed",
        }
    }
}

impl std::fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress callback for reporting scan status.
pub trait ScanProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, phase: ScanPhase);
    /// Called once per candidate page after fetching completes.
    fn page_fetched(&self, page: &ScrapedPage, current: usize, total: usize);
    /// Called when one extraction field finishes, successfully or not.
    fn field_extracted(&self, field: &str, current: usize, total: usize);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ScanProgress for SilentProgress {
    fn phase(&self, _phase: ScanPhase) {}
    fn page_fetched(&self, _page: &ScrapedPage, _current: usize, _total: usize) {}
    fn field_extracted(&self, _field: &str, _current: usize, _total: usize) {}
}
