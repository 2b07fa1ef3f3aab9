//! The Graph operations the core pipeline depends on, as one seam.
//!
//! `GraphClient` is the production implementation; tests substitute an
//! in-memory directory.

use crate::error::Result;
use crate::graph::conditional_access::{self, ConditionalAccessPolicy, NamedLocation};
use crate::graph::users::{self, DirectoryUser};
use crate::graph::GraphClient;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait GraphService: Send + Sync {
    async fn list_named_locations(&self) -> Result<Vec<NamedLocation>>;
    async fn create_named_location(&self, location: &NamedLocation) -> Result<NamedLocation>;
    async fn get_named_location(&self, id: &str) -> Result<NamedLocation>;
    async fn update_named_location(&self, id: &str, patch: &Value) -> Result<()>;
    async fn delete_named_location(&self, id: &str) -> Result<()>;

    async fn list_policies(&self) -> Result<Vec<ConditionalAccessPolicy>>;
    async fn get_policy(&self, id: &str) -> Result<ConditionalAccessPolicy>;
    async fn create_policy(&self, payload: &Value) -> Result<ConditionalAccessPolicy>;
    async fn update_policy(&self, id: &str, patch: &Value) -> Result<()>;
    async fn delete_policy(&self, id: &str) -> Result<()>;

    async fn find_users(&self, filter: &str) -> Result<Vec<DirectoryUser>>;
    async fn get_user(&self, id: &str) -> Result<DirectoryUser>;
}

#[async_trait]
impl GraphService for GraphClient {
    async fn list_named_locations(&self) -> Result<Vec<NamedLocation>> {
        conditional_access::list_named_locations(self).await
    }

    async fn create_named_location(&self, location: &NamedLocation) -> Result<NamedLocation> {
        conditional_access::create_named_location(self, location).await
    }

    async fn get_named_location(&self, id: &str) -> Result<NamedLocation> {
        conditional_access::get_named_location(self, id).await
    }

    async fn update_named_location(&self, id: &str, patch: &Value) -> Result<()> {
        conditional_access::update_named_location(self, id, patch).await
    }

    async fn delete_named_location(&self, id: &str) -> Result<()> {
        conditional_access::delete_named_location(self, id).await
    }

    async fn list_policies(&self) -> Result<Vec<ConditionalAccessPolicy>> {
        conditional_access::list_policies(self).await
    }

    async fn get_policy(&self, id: &str) -> Result<ConditionalAccessPolicy> {
        conditional_access::get_policy(self, id).await
    }

    async fn create_policy(&self, payload: &Value) -> Result<ConditionalAccessPolicy> {
        conditional_access::create_policy(self, payload).await
    }

    async fn update_policy(&self, id: &str, patch: &Value) -> Result<()> {
        conditional_access::update_policy(self, id, patch).await
    }

    async fn delete_policy(&self, id: &str) -> Result<()> {
        conditional_access::delete_policy(self, id).await
    }

    async fn find_users(&self, filter: &str) -> Result<Vec<DirectoryUser>> {
        users::find_users(self, filter).await
    }

    async fn get_user(&self, id: &str) -> Result<DirectoryUser> {
        users::get_user(self, id).await
    }
}
