pub(crate) use prune::prune;
pub(crate) use serve::serve;
pub(crate) use work::work;

mod prune;
mod serve;
mod work;

use std::process::ExitCode;

#[derive(Copy, Clone)]
pub(crate) enum ExitStatus {
    /// The command succeeded.
    Success,
    /// The command failed with an unexpected error.
    Error,
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Success => Self::from(0),
            ExitStatus::Error => Self::from(2),
        }
    }
}
