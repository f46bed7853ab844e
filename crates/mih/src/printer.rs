use std::fmt;

/// Where command output goes. `--quiet` suppresses all of it, but not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Printer {
    Default,
    Quiet,
}

impl Printer {
    pub(crate) fn stdout(self) -> Stream {
        Stream {
            target: Target::Stdout,
            enabled: self == Self::Default,
        }
    }

    pub(crate) fn stderr(self) -> Stream {
        Stream {
            target: Target::Stderr,
            enabled: self == Self::Default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Stdout,
    Stderr,
}

/// A standard stream that strips colors when they aren't supported.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Stream {
    target: Target,
    enabled: bool,
}

impl fmt::Write for Stream {
    #[allow(clippy::print_stdout, clippy::print_stderr)]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.enabled {
            match self.target {
                Target::Stdout => anstream::print!("{s}"),
                Target::Stderr => anstream::eprint!("{s}"),
            }
        }
        Ok(())
    }
}
