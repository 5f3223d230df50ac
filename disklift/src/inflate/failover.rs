//! Format-aware failover composition.
//!
//! Tries the direct-API path first and falls back to the engine-driven
//! path only when the API rejected the source format. Any other API
//! failure is terminal.

use super::{InflationInfo, Inflater, PersistentDisk};
use crate::cancel::Cancellable;
use crate::compute::classify::is_caused_by_unsupported_format;
use crate::errors::DiskliftResult;
use async_trait::async_trait;
use std::sync::Arc;

pub struct FailoverInflater {
    api: Arc<dyn Inflater>,
    engine: Arc<dyn Inflater>,
}

impl FailoverInflater {
    pub fn new(api: Arc<dyn Inflater>, engine: Arc<dyn Inflater>) -> Self {
        Self { api, engine }
    }
}

#[async_trait]
impl Inflater for FailoverInflater {
    async fn inflate(&self) -> DiskliftResult<(PersistentDisk, InflationInfo)> {
        match self.api.inflate().await {
            Ok(result) => Ok(result),
            Err(err) if is_caused_by_unsupported_format(&err) => {
                tracing::info!(
                    error = %err,
                    "source format unsupported by API inflation, retrying with engine"
                );
                self.engine.inflate().await
            }
            Err(err) => Err(err),
        }
    }

    fn describe(&self) -> &'static str {
        "api-failover"
    }
}

#[async_trait]
impl Cancellable for FailoverInflater {
    async fn cancel(&self, reason: &str) -> bool {
        let (api, engine) = futures::join!(self.api.cancel(reason), self.engine.cancel(reason));
        api && engine
    }
}
