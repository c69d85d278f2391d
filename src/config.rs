//! Run configuration for qutest
//!
//! Built once from the command line (see `cli`) and passed down explicitly. Nothing below reads the environment
//! after startup.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Globs used when no include pattern is given.
pub const DEFAULT_INCLUDE: &[&str] = &["**/*.js", "**/*.ts", "**/*.jsx", "**/*.tsx"];

/// Globs excluded unless the user passes their own excludes.
pub const DEFAULT_EXCLUDE: &[&str] = &["**/node_modules"];

/// Default per-job timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Run configuration
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Directory test paths are discovered in and served from
    pub root: PathBuf,
    /// Globs selecting test files, relative to `root`
    pub include: Vec<String>,
    /// Globs removing files (or whole directories) from the selection
    pub exclude: Vec<String>,
    /// Extra esbuild arguments, as one shell-quoted string
    pub bundler_args: String,
    /// Explicit esbuild executable
    pub esbuild_bin: Option<PathBuf>,
    /// Collect V8 function coverage per job
    pub coverage: bool,
    /// Upper bound for a single job, from navigation to captured result
    pub timeout: Duration,
    /// Maximum number of browser sessions in flight; `None` means unbounded
    pub parallel: Option<usize>,
    /// Re-run the batch when files under `root` change
    pub watch: bool,
    /// Launch the browser with a visible window
    pub visible: bool,
    /// Leave sessions and the browser open after the batch
    pub keep_running: bool,
    /// Fixed port for the harness server instead of an ephemeral one
    pub port: Option<u16>,
    /// Output styling
    pub palette: Palette,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            include: DEFAULT_INCLUDE.iter().map(|s| s.to_string()).collect(),
            exclude: DEFAULT_EXCLUDE.iter().map(|s| s.to_string()).collect(),
            bundler_args: String::new(),
            esbuild_bin: None,
            coverage: false,
            timeout: DEFAULT_TIMEOUT,
            parallel: Some(default_parallelism()),
            watch: false,
            visible: false,
            keep_running: false,
            port: None,
            palette: Palette::plain(),
        }
    }
}

impl RunConfig {
    /// Create a new config with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the root directory
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Replace the include globs; an empty list keeps the defaults
    pub fn with_include(mut self, include: Vec<String>) -> Self {
        if !include.is_empty() {
            self.include = include;
        }
        self
    }

    /// Replace the exclude globs; an empty list keeps the defaults
    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        if !exclude.is_empty() {
            self.exclude = exclude;
        }
        self
    }

    /// Set the per-job timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the parallelism limit. Zero means unbounded.
    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.parallel = if parallel == 0 { None } else { Some(parallel) };
        self
    }

    /// Set the output palette
    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

/// ANSI styling used by the console reporter.
///
/// Every field is empty when color is disabled, so format strings stay the same either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub dim: &'static str,
    pub bold: &'static str,
    pub green: &'static str,
    pub red: &'static str,
    pub reset: &'static str,
}

impl Palette {
    /// Palette with ANSI escapes
    pub const fn colored() -> Self {
        Self {
            dim: "\x1b[37m",
            bold: "\x1b[1m",
            green: "\x1b[32m",
            red: "\x1b[31m",
            reset: "\x1b[0m",
        }
    }

    /// Palette without any escapes
    pub const fn plain() -> Self {
        Self {
            dim: "",
            bold: "",
            green: "",
            red: "",
            reset: "",
        }
    }

    /// Choose a palette from `NO_COLOR`. Presence of the variable disables color, whatever its value.
    pub fn from_env() -> Self {
        Self::for_no_color(env::var_os("NO_COLOR").is_some())
    }

    /// Choose a palette given whether `NO_COLOR` is set.
    pub const fn for_no_color(no_color: bool) -> Self {
        if no_color { Self::plain() } else { Self::colored() }
    }
}

/// Parse a duration flag: `500ms`, `30s`, `2m`, `1h`, or a bare number of seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let split = raw.find(|c: char| !c.is_ascii_digit() && c != '.').unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid duration '{raw}': expected a number followed by ms, s, m or h"))?;
    let seconds = match unit {
        "ms" => value / 1000.0,
        "" | "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        other => return Err(format!("invalid duration unit '{other}' in '{raw}'")),
    };
    Duration::try_from_secs_f64(seconds).map_err(|e| format!("invalid duration '{raw}': {e}"))
}
