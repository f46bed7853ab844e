use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

/// e.g. ``warning: `my-project` (lib) generated 2 warnings``
static WARNINGS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"`.*` \((lib|bin)\) generated [0-9]+ warnings?").unwrap()
});

/// Whether the output of a build reports compiler warnings.
pub fn has_warnings(output: &str) -> bool {
    WARNINGS_RE.is_match(output)
}

/// The last non-empty line of the output of a build, e.g. for a one-line error summary.
pub fn last_line(output: &str) -> Option<&str> {
    output
        .lines()
        .map(str::trim_end)
        .rfind(|line| !line.trim().is_empty())
}

/// Report the warnings of a successful build of `module_path`.
///
/// `is_fresh` distinguishes a build that just happened from one recorded earlier. The output is
/// logged as a warning if `show_warnings` is set, and at debug level otherwise.
pub fn log_build_warnings(module_path: &str, output: &str, is_fresh: bool, show_warnings: bool) {
    let prefix = if is_fresh { "" } else { "the last " };
    if show_warnings {
        warn!("{prefix}build of `{module_path}` succeeded with warnings:\n{output}");
    } else {
        debug!("{prefix}build of `{module_path}` succeeded with warnings:\n{output}");
    }
}
