//! Create, list and delete connections

use crate::bootstrap::{CloudInitRenderer, UserDataRenderer};
use crate::directory::{ConnectionDirectory, DirectoryScan};
use crate::endpoint::Connection;
use crate::error::{MeshError, Result};
use crate::fanout::FanOut;
use crate::resolver::resolve;
use crate::rollback::{Rollback, RollbackReport};
use crate::saga::{Compensation, Provisioner};
use crate::subnet::select_public_subnets;
use crate::topology::TopologyIndex;
use std::sync::Arc;
use vpcmesh_cloud::{CloudGateway, Region};
use vpcmesh_config::MeshConfig;

/// Entry point for the three operator commands
pub struct MeshService {
    gateway: Arc<dyn CloudGateway>,
    config: MeshConfig,
    renderer: Arc<dyn UserDataRenderer>,
}

impl MeshService {
    pub fn new(gateway: Arc<dyn CloudGateway>, config: MeshConfig) -> Result<Self> {
        Ok(Self::with_renderer(
            gateway,
            config,
            Arc::new(CloudInitRenderer::new()?),
        ))
    }

    pub fn with_renderer(
        gateway: Arc<dyn CloudGateway>,
        config: MeshConfig,
        renderer: Arc<dyn UserDataRenderer>,
    ) -> Self {
        Self {
            gateway,
            config,
            renderer,
        }
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    fn fanout(&self) -> FanOut {
        FanOut::new(self.gateway.clone(), self.config.fanout_workers)
    }

    async fn regions(&self) -> Result<Vec<Region>> {
        let regions = self.gateway.describe_regions().await?;
        tracing::debug!(count = regions.len(), provider = self.gateway.name(), "Regions");
        Ok(regions)
    }

    /// Resolve the tokens and provision a full mesh between them
    ///
    /// Nothing is created unless every token resolves to a distinct network
    /// with a public subnet. If any phase fails after that, everything the
    /// saga created is rolled back before the error is returned.
    pub async fn create(&self, tokens: &[String]) -> Result<Connection> {
        if tokens.len() < 2 {
            return Err(MeshError::NotEnoughEndpoints(tokens.len()));
        }

        let regions = self.regions().await?;
        let (index, failures) = TopologyIndex::load(&self.fanout(), &regions).await;
        if !failures.is_empty() {
            tracing::warn!(
                regions = ?failures.iter().map(|f| f.region.as_str()).collect::<Vec<_>>(),
                "Some regions could not be described; their networks cannot be resolved"
            );
        }

        let mut endpoints = resolve(tokens, &index)?;
        select_public_subnets(&mut endpoints, &index)?;

        let mut connection = Connection::generate(endpoints);
        let mut provisioner = Provisioner::new(
            self.gateway.as_ref(),
            &self.config,
            &index,
            self.renderer.as_ref(),
        );

        if let Err(err) = provisioner.run(&mut connection).await {
            let compensations = provisioner.log().compensations();
            if !compensations.is_empty() {
                tracing::warn!(
                    connection_id = %connection.id,
                    "Create failed, rolling back provisioned resources"
                );
                let report = Rollback::new(self.gateway.as_ref(), &self.config, compensations)
                    .run(&connection)
                    .await;
                if !report.is_clean() {
                    tracing::warn!(
                        connection_id = %connection.id,
                        failed = report.failed.len(),
                        pending = ?report.pending_termination,
                        "Rollback left resources behind"
                    );
                }
            }
            return Err(err);
        }

        Ok(connection)
    }

    /// Every connection currently advertised by instance tags
    pub async fn list(&self) -> Result<DirectoryScan> {
        let regions = self.regions().await?;
        Ok(ConnectionDirectory::new(self.fanout()).scan(&regions).await)
    }

    /// Tear down every resource of a connection
    pub async fn delete(&self, id: &str) -> Result<RollbackReport> {
        let scan = self.list().await?;
        let connection = scan
            .get(id)
            .ok_or_else(|| MeshError::ConnectionNotFound(id.to_string()))?;

        tracing::info!(
            connection_id = %connection.id,
            endpoints = connection.len(),
            "Deleting connection"
        );
        Ok(
            Rollback::new(self.gateway.as_ref(), &self.config, Compensation::all())
                .run(connection)
                .await,
        )
    }
}
