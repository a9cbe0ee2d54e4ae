use flashrpc_peer::RpcCaller;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::EraseConfig;
use crate::error::{ProgrammerError, Result};
use crate::methods::{ERASE_DONE, START_ERASE_CHIP};

/// Starts a chip erase and waits for the device to finish it.
pub struct EraseController<'a, R> {
    rpc: &'a mut R,
    config: EraseConfig,
}

impl<'a, R: RpcCaller> EraseController<'a, R> {
    pub fn new(rpc: &'a mut R, config: EraseConfig) -> Self {
        Self { rpc, config }
    }

    /// Ask the device to begin erasing. Returns the device's acknowledgement.
    pub async fn start_erase(&mut self) -> Result<Value> {
        let ack = self.rpc.request(START_ERASE_CHIP, None).await?;
        info!(%ack, "chip erase started");
        Ok(ack)
    }

    /// Query `programmer_erase_done` every poll interval until it returns
    /// `true`. Returns the number of queries made.
    pub async fn poll_until_done(&mut self) -> Result<u32> {
        let started = Instant::now();
        let mut polls = 0u32;

        loop {
            polls += 1;
            let done = self.rpc.request(ERASE_DONE, None).await?;
            match done {
                Value::Bool(true) => {
                    info!(polls, elapsed = ?started.elapsed(), "chip erase complete");
                    return Ok(polls);
                }
                Value::Bool(false) => debug!(polls, "erase in progress"),
                other => {
                    return Err(ProgrammerError::UnexpectedResult {
                        method: ERASE_DONE,
                        value: other,
                    })
                }
            }

            if let Some(limit) = self.config.timeout {
                if started.elapsed() + self.config.poll_interval > limit {
                    return Err(ProgrammerError::EraseTimeout(limit));
                }
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Start the erase and wait for it to finish.
    pub async fn erase(&mut self) -> Result<u32> {
        self.start_erase().await?;
        self.poll_until_done().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::testing::ScriptedRpc;

    fn device(pending_polls: u32) -> ScriptedRpc {
        let mut remaining = pending_polls;
        ScriptedRpc::new(move |method, _| match method {
            START_ERASE_CHIP => Ok(json!("Chip erase started.")),
            ERASE_DONE if remaining > 0 => {
                remaining -= 1;
                Ok(json!(false))
            }
            ERASE_DONE => Ok(json!(true)),
            _ => unreachable!("unexpected method {method}"),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn returns_on_first_true_after_polling_each_second() {
        let mut rpc = device(3);
        let started = Instant::now();
        let polls = EraseController::new(&mut rpc, EraseConfig::default())
            .erase()
            .await
            .unwrap();

        assert_eq!(polls, 4);
        assert_eq!(
            rpc.methods(),
            vec![START_ERASE_CHIP, ERASE_DONE, ERASE_DONE, ERASE_DONE, ERASE_DONE]
        );
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn already_done_needs_one_poll() {
        let mut rpc = device(0);
        let mut eraser = EraseController::new(&mut rpc, EraseConfig::default());
        assert_eq!(eraser.poll_until_done().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_timeout() {
        let mut rpc = device(u32::MAX);
        let config = EraseConfig {
            poll_interval: Duration::from_secs(1),
            timeout: Some(Duration::from_secs(5)),
        };
        let err = EraseController::new(&mut rpc, config)
            .poll_until_done()
            .await
            .unwrap_err();
        assert!(matches!(err, ProgrammerError::EraseTimeout(t) if t == Duration::from_secs(5)));
        assert!(rpc.calls().len() <= 6);
    }

    #[tokio::test]
    async fn non_boolean_status_is_rejected() {
        let mut rpc = ScriptedRpc::new(|_, _| Ok(json!("busy")));
        let err = EraseController::new(&mut rpc, EraseConfig::default())
            .poll_until_done()
            .await
            .unwrap_err();
        assert!(matches!(err, ProgrammerError::UnexpectedResult { method: ERASE_DONE, .. }));
    }
}
