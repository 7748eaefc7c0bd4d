//! Making sure an image is available before a container is created.

use docket_core::Result;
use std::sync::Arc;
use tracing::info;

use crate::client::EngineClient;

/// Pulls images that are not present locally.
pub struct ImageResolver {
    client: Arc<dyn EngineClient>,
}

impl ImageResolver {
    pub fn new(client: Arc<dyn EngineClient>) -> Self {
        Self { client }
    }

    /// Ensure `image:tag` is present, pulling it if no local image matches.
    ///
    /// Any number of matches counts as present. A failed pull is returned
    /// as is, without retrying.
    pub async fn ensure_image(&self, image: &str, tag: &str) -> Result<()> {
        let reference = format!("{}:{}", image, tag);
        let matches = self.client.list_images(&reference).await?;
        if !matches.is_empty() {
            return Ok(());
        }

        info!(image = %reference, "Pulling image");
        self.client.pull_image(image, tag).await?;
        info!(image = %reference, "Pulled image");
        Ok(())
    }
}
