//! Simulator or board test suite judged from its summary line.

use async_trait::async_trait;
use embci_core::capability::{Test, TestParameter};
use embci_core::{Outcome, TestError};
use tracing::info;

use crate::runner::CommandSpec;
use crate::test_run::{Criteria, LatencyCriteria, PassFailCriteria, TestInvocation, DEFAULT_WATCHDOG};

/// Test task registered at `tasks/test/board_suite`.
///
/// `command` is run as given. With a `threshold` the marker line must end
/// in a number no greater than it (latency benchmarks); otherwise the
/// marker line must report passes and zero failures.
#[derive(Debug, Clone, Default)]
pub struct BoardSuite;

impl BoardSuite {
    fn criteria(param: &TestParameter, marker: &str) -> Result<Box<dyn Criteria>, TestError> {
        let criteria: Box<dyn Criteria> = match param.threshold {
            Some(threshold) => Box::new(LatencyCriteria::new(marker, threshold)),
            None => Box::new(PassFailCriteria::new(marker)?),
        };
        Ok(criteria)
    }
}

#[async_trait]
impl Test for BoardSuite {
    async fn do_test(&self, param: &TestParameter) -> Result<Outcome, TestError> {
        let (program, args) = param
            .command
            .split_first()
            .ok_or_else(|| TestError::MissingAsset("suite command".to_string()))?;
        let marker = param
            .marker
            .as_deref()
            .ok_or_else(|| TestError::MissingAsset("completion marker".to_string()))?;

        let mut spec = CommandSpec::new(program.as_str()).args(args.iter().map(String::as_str));
        if !param.target_dir.as_os_str().is_empty() {
            spec = spec.current_dir(&param.target_dir);
        }
        info!(command = %spec.display(), marker, threshold = ?param.threshold, "running suite");

        let mut invocation = TestInvocation::new(
            spec,
            Self::criteria(param, marker)?,
            param.watchdog.unwrap_or(DEFAULT_WATCHDOG),
        );
        Ok(invocation.run().await?)
    }
}
