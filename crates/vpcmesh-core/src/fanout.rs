//! Concurrent per-region queries
//!
//! Every "list X everywhere" question goes through [`FanOut::query`]: one
//! future per region, at most `workers` in flight, each writing only its own
//! result slot. Slots are merged into a region-keyed map after all of them
//! have finished, so nothing outlives the call.

use futures_util::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use vpcmesh_cloud::{CloudError, CloudGateway, Region, RegionClient};

/// Default number of regions queried at once
pub const DEFAULT_WORKERS: usize = 8;

/// A region whose query failed
#[derive(Debug)]
pub struct RegionFailure {
    pub region: String,
    pub error: CloudError,
}

/// Joined results of one fan-out call
#[derive(Debug)]
pub struct FanOutResult<T> {
    pub by_region: BTreeMap<String, T>,
    pub failures: Vec<RegionFailure>,
}

impl<T> FanOutResult<T> {
    /// Every region answered
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_regions(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.region.as_str()).collect()
    }
}

impl<T> FanOutResult<Vec<T>> {
    /// All items from all regions, in region name order
    pub fn flatten(self) -> Vec<T> {
        self.by_region.into_values().flatten().collect()
    }
}

#[derive(Clone)]
pub struct FanOut {
    gateway: Arc<dyn CloudGateway>,
    workers: usize,
}

impl FanOut {
    pub fn new(gateway: Arc<dyn CloudGateway>, workers: usize) -> Self {
        Self {
            gateway,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `query` against every region and wait for all of them
    ///
    /// A failing region does not stop the others; it is logged and reported
    /// in [`FanOutResult::failures`].
    pub async fn query<T, F, Fut>(
        &self,
        regions: &[Region],
        what: &str,
        query: F,
    ) -> FanOutResult<T>
    where
        F: Fn(Arc<dyn RegionClient>) -> Fut,
        Fut: Future<Output = vpcmesh_cloud::Result<T>>,
    {
        let slots: Vec<(String, vpcmesh_cloud::Result<T>)> = stream::iter(regions)
            .map(|region| {
                let name = region.name.clone();
                let pending = query(self.gateway.region_client(region));
                async move { (name, pending.await) }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut result = FanOutResult {
            by_region: BTreeMap::new(),
            failures: Vec::new(),
        };
        for (region, outcome) in slots {
            match outcome {
                Ok(value) => {
                    result.by_region.insert(region, value);
                }
                Err(error) => {
                    tracing::warn!(region = %region, what, error = %error, "Region query failed");
                    result.failures.push(RegionFailure { region, error });
                }
            }
        }

        tracing::debug!(
            what,
            regions = regions.len(),
            failed = result.failures.len(),
            "Fan-out complete"
        );
        result
    }
}
