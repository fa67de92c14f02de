//! Resource and data source traits
//!
//! Each cloud resource type implements [`Resource`]; each read-only lookup
//! implements [`DataSource`]. Handlers receive the shared [`Provider`] and
//! mutate a [`ResourceData`] in place.

use async_trait::async_trait;

use crate::error::Result;
use crate::provider::Provider;
use crate::schema::{ResourceData, Timeouts};

#[async_trait]
pub trait Resource: Send + Sync {
    /// Type name, e.g. `huaweicloud_dcs_instance`
    fn type_name(&self) -> &'static str;

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    async fn create(&self, provider: &Provider, d: &mut ResourceData) -> Result<()>;

    /// Refresh state; clears the ID when the remote object is gone
    async fn read(&self, provider: &Provider, d: &mut ResourceData) -> Result<()>;

    async fn update(&self, provider: &Provider, d: &mut ResourceData) -> Result<()>;

    async fn delete(&self, provider: &Provider, d: &mut ResourceData) -> Result<()>;

    /// Translate an import ID into the state `read` expects
    async fn import(&self, _provider: &Provider, _d: &mut ResourceData) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait DataSource: Send + Sync {
    fn type_name(&self) -> &'static str;

    async fn read(&self, provider: &Provider, d: &mut ResourceData) -> Result<()>;
}
