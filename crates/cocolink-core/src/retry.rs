// ── Command retry policy ──
//
// A send that fails on a communication error gets one forced restart
// and one more attempt. Semantic and configuration errors are returned
// as-is on the first failure.

use std::future::Future;

use tracing::{debug, warn};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 2 }
    }
}

impl RetryPolicy {
    /// Run `op`, calling `recover` between attempts.
    ///
    /// A failing `recover` ends the loop with its own error.
    pub async fn run<T, Op, OpFut, Rec, RecFut>(
        &self,
        mut op: Op,
        mut recover: Rec,
    ) -> Result<T, CoreError>
    where
        Op: FnMut() -> OpFut,
        OpFut: Future<Output = Result<T, CoreError>>,
        Rec: FnMut() -> RecFut,
        RecFut: Future<Output = Result<(), CoreError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_communication() || attempt >= self.max_attempts => return Err(e),
                Err(e) => {
                    debug!(error = %e, attempt, "Send failed, restarting before retry");
                    if let Err(recover_err) = recover().await {
                        warn!(error = %recover_err, "Restart before retry failed");
                        return Err(recover_err);
                    }
                    attempt += 1;
                }
            }
        }
    }
}
