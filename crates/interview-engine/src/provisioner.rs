//! Call URL provisioning
//!
//! Each admitted session needs a fresh, externally valid link to its 1:1
//! interview call. Real deployments call out to a videoconferencing service;
//! [`RoomUrlProvisioner`] builds room links from the configured base URL.

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::ProvisioningConfig;
use crate::error::{QueueError, Result};
use crate::session::Session;

/// Source of per-session call URLs
#[async_trait]
pub trait CallProvisioner: Send + Sync + 'static {
    /// Return a fresh call URL for `session`.
    ///
    /// Upstream failures are reported as [`QueueError::Provisioning`].
    async fn generate_url(&self, session: &Session) -> Result<String>;
}

/// Builds `<base_url>/<session id>-<random room suffix>` links
#[derive(Debug, Clone)]
pub struct RoomUrlProvisioner {
    base_url: String,
}

impl RoomUrlProvisioner {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(QueueError::config("provisioning base_url cannot be empty"));
        }
        Ok(Self { base_url })
    }

    pub fn from_config(config: &ProvisioningConfig) -> Result<Self> {
        Self::new(config.base_url.clone())
    }
}

#[async_trait]
impl CallProvisioner for RoomUrlProvisioner {
    async fn generate_url(&self, session: &Session) -> Result<String> {
        let room = Uuid::new_v4().simple().to_string();
        Ok(format!("{}/{}-{}", self.base_url, session.id, &room[..12]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionId;

    #[tokio::test]
    async fn test_room_urls_are_fresh() {
        let provisioner = RoomUrlProvisioner::new("https://calls.example.com/rooms/").unwrap();
        let session = Session::new(SessionId::from("s1"));

        let first = provisioner.generate_url(&session).await.unwrap();
        let second = provisioner.generate_url(&session).await.unwrap();

        assert!(first.starts_with("https://calls.example.com/rooms/s1-"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_empty_base_url_rejected() {
        assert!(RoomUrlProvisioner::new("").is_err());
        assert!(RoomUrlProvisioner::new("/").is_err());
    }
}
