use color_eyre::Result;
use tokio_util::sync::CancellationToken;

use crate::{
    component::Component,
    config::{Config, Theme},
    errors::AppError,
    format_error,
    service::FleetService,
};

crate::using! {
    pub select,
    pub show,
    pub regions,
    pub cache,
}

/// How a process finished, mapped to the exit code of the application
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputStatus {
    #[default]
    Success,
    /// The process failed, the reason is on the stderr
    Failure,
    /// The user cancelled the process
    Cancelled,
}

/// Output of a process
#[derive(Debug, Default)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub struct ProcessOutput {
    pub status: OutputStatus,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl ProcessOutput {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn fail() -> Self {
        Self {
            status: OutputStatus::Failure,
            ..Default::default()
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: OutputStatus::Cancelled,
            ..Default::default()
        }
    }

    /// Sets the text to be written to the standard output
    pub fn stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = Some(stdout.into());
        self
    }

    /// Sets the text to be written to the standard error
    pub fn stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = Some(stderr.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == OutputStatus::Success
    }

    /// Exit code of the application: 0 on success, 1 on failure and 130 when cancelled
    pub fn exit_code(&self) -> i32 {
        match self.status {
            OutputStatus::Success => 0,
            OutputStatus::Failure => 1,
            OutputStatus::Cancelled => 130,
        }
    }
}

impl ProcessOutput {
    /// Maps an application error into the output of a process.
    ///
    /// User-facing errors are printed on the stderr and cancellations are silent, any other error is propagated.
    pub fn from_error(err: AppError, theme: &Theme) -> Result<Self> {
        match err {
            AppError::UserFacing(err) => Ok(Self::fail().stderr(format_error!(theme, "{err}"))),
            AppError::Cancelled => Ok(Self::cancelled()),
            AppError::Unexpected(report) => Err(report),
        }
    }
}

/// A process run by a subcommand without any user interaction
#[trait_variant::make(Send)]
pub trait Process {
    /// Executes the process
    async fn execute(self, config: Config, service: FleetService, token: CancellationToken) -> Result<ProcessOutput>;
}

/// A process that can also be run interactively, through a TUI component
pub trait InteractiveProcess: Process {
    /// Converts the process into the component rendering it
    fn into_component(
        self,
        config: Config,
        service: FleetService,
        inline: bool,
        token: CancellationToken,
    ) -> Result<Box<dyn Component>>;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{errors::UserFacingError, model::RecordKind};

    #[test]
    fn test_exit_codes() {
        assert_eq!(ProcessOutput::success().stdout("i-1").exit_code(), 0);
        assert_eq!(ProcessOutput::fail().stderr("boom").exit_code(), 1);
        assert_eq!(ProcessOutput::cancelled().exit_code(), 130);
        assert!(!ProcessOutput::cancelled().is_success());
    }

    #[test]
    fn test_from_error() {
        let theme = Theme::plain();
        let output = ProcessOutput::from_error(UserFacingError::EmptyFleet(RecordKind::Vm).into(), &theme).unwrap();
        assert_eq!(
            output,
            ProcessOutput::fail().stderr("[Error] There are no vm resources in this region")
        );
        let output = ProcessOutput::from_error(AppError::Cancelled, &theme).unwrap();
        assert_eq!(output.exit_code(), 130);
        assert!(ProcessOutput::from_error(AppError::Unexpected(color_eyre::eyre::eyre!("boom")), &theme).is_err());
    }
}
