//! Function coverage summary from V8 precise coverage.

use std::fmt;

use chromiumoxide::cdp::js_protocol::profiler::ScriptCoverage;

/// Path segment identifying scripts served by the bundle route.
const BUNDLE_SEGMENT: &str = "/bundle/";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoverageSummary {
    pub covered: usize,
    pub total: usize,
}

impl CoverageSummary {
    /// Summarize the scripts of one page, counting only the test bundle.
    pub fn from_scripts(scripts: &[ScriptCoverage]) -> Self {
        let counts = scripts
            .iter()
            .filter(|script| is_bundle_script(&script.url))
            .flat_map(|script| script.functions.iter())
            // The first range spans the whole function and carries its call count.
            .map(|function| function.ranges.first().map_or(0, |range| range.count));
        Self::from_call_counts(counts)
    }

    pub fn from_call_counts(counts: impl IntoIterator<Item = i64>) -> Self {
        counts.into_iter().fold(Self::default(), |mut acc, count| {
            acc.total += 1;
            if count > 0 {
                acc.covered += 1;
            }
            acc
        })
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.covered as f64 * 100.0 / self.total as f64
    }
}

impl fmt::Display for CoverageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}% functions ({}/{})", self.percent(), self.covered, self.total)
    }
}

fn is_bundle_script(url: &str) -> bool {
    url.contains(BUNDLE_SEGMENT)
}
