//! Client of the predict endpoint.
use std::path::Path;

use common::protocol::{decode_image_data, PredictRequest, PredictResponse, PREDICT_PATH};

pub use common::Error;

/// Posts images to a predict server.
#[derive(Clone, Debug)]
pub struct PredictClient {
    client: reqwest::Client,
    url: String,
}

impl PredictClient {
    /// Create a client for a server at `address`, e.g. `127.0.0.1:6060`.
    pub fn new(address: &str) -> Self {
        let base = match address.starts_with("http://") || address.starts_with("https://") {
            true => address.trim_end_matches('/').to_owned(),
            false => format!("http://{}", address),
        };

        Self {
            client: reqwest::Client::new(),
            url: format!("{}{}", base, PREDICT_PATH),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send encoded image bytes and return the annotated JPEG.
    pub async fn predict(&self, image_bytes: &[u8]) -> Result<Vec<u8>, Error> {
        let response: PredictResponse = self
            .client
            .post(&self.url)
            .json(&PredictRequest::new(image_bytes))
            .send()
            .await?
            .json()
            .await?;

        let image = response
            .into_result()
            .map_err(|message| format!("server error: {}", message))?;

        Ok(decode_image_data(&image)?)
    }

    /// Annotate the image at `input` and write the result to `output`.
    pub async fn predict_file(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<(), Error> {
        let image_bytes = tokio::fs::read(input.as_ref()).await?;
        log::info!(
            "Sending {} ({} bytes) to {}",
            input.as_ref().display(),
            image_bytes.len(),
            &self.url
        );

        let annotated = self.predict(&image_bytes).await?;
        tokio::fs::write(output.as_ref(), &annotated).await?;
        log::info!(
            "Wrote annotated image to {} ({} bytes)",
            output.as_ref().display(),
            annotated.len()
        );

        Ok(())
    }
}
