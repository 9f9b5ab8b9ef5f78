//! Cloudinary Admin API client.
//!
//! Lists uploaded image resources in one call and flattens the optional
//! `context` metadata into [`ImageRecord`]s. Credentials and endpoints come from
//! an explicit [`CloudinaryOptions`]; nothing is configured process-wide.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{ImageRecord, ImageSource};
use crate::config::CloudinaryOptions;
use crate::error::SourceError;

/// Which URL ends up in [`ImageRecord::url`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Scaled WebP rendition built from the public id.
    Optimized,
    /// The `secure_url` reported by the API, untouched.
    Original,
}

#[derive(Clone)]
pub struct CloudinaryClient {
    options: CloudinaryOptions,
    delivery: Delivery,
    http: reqwest::Client,
}

impl CloudinaryClient {
    /// Build a client; fails when any credential is missing.
    pub fn new(options: CloudinaryOptions) -> Result<Self, SourceError> {
        if options.cloud_name.trim().is_empty() {
            return Err(SourceError::MissingCredential("cloud-name"));
        }
        if options.api_key.trim().is_empty() {
            return Err(SourceError::MissingCredential("api-key"));
        }
        if options.api_secret.trim().is_empty() {
            return Err(SourceError::MissingCredential("api-secret"));
        }
        let http = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()?;
        Ok(Self {
            options,
            delivery: Delivery::Optimized,
            http,
        })
    }

    /// Same account, but records carry the original `secure_url`.
    pub fn original_urls(&self) -> Self {
        Self {
            delivery: Delivery::Original,
            ..self.clone()
        }
    }

    pub fn delivery(&self) -> Delivery {
        self.delivery
    }

    /// Delivery URL for a WebP rendition scaled to `width` pixels.
    pub fn optimized_url(&self, public_id: &str, width: u32) -> String {
        optimized_url(
            &self.options.delivery_base_url,
            &self.options.cloud_name,
            public_id,
            width,
        )
    }

    fn resources_url(&self) -> String {
        format!(
            "{}/v1_1/{}/resources/image/upload",
            self.options.api_base_url.trim_end_matches('/'),
            self.options.cloud_name
        )
    }

    async fn fetch_resources(&self) -> Result<Vec<Resource>, SourceError> {
        let max_results = self.options.max_results.to_string();
        let response = self
            .http
            .get(self.resources_url())
            .basic_auth(&self.options.api_key, Some(&self.options.api_secret))
            .query(&[
                ("type", "upload"),
                ("max_results", max_results.as_str()),
                ("sort_by", "created_at"),
                ("direction", "desc"),
                ("context", "true"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response.bytes().await?;
        parse_resources(&bytes)
    }

    fn to_record(&self, resource: Resource) -> ImageRecord {
        let url = match self.delivery {
            Delivery::Optimized => {
                self.optimized_url(&resource.public_id, self.options.display_width)
            }
            Delivery::Original => resource.secure_url.clone(),
        };
        resource.into_record(url)
    }
}

impl std::fmt::Debug for CloudinaryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryClient")
            .field("cloud_name", &self.options.cloud_name)
            .field("delivery", &self.delivery)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ImageSource for CloudinaryClient {
    fn name(&self) -> &'static str {
        "cloudinary"
    }

    #[instrument(skip(self), fields(cloud = %self.options.cloud_name, delivery = ?self.delivery))]
    async fn list_images(&self) -> Result<Vec<ImageRecord>, SourceError> {
        let resources = self.fetch_resources().await?;
        debug!(total = resources.len(), "resources listed");
        debug!(
            ids = ?resources.iter().map(|r| r.public_id.as_str()).collect::<Vec<_>>(),
            "resource ids"
        );
        Ok(resources.into_iter().map(|r| self.to_record(r)).collect())
    }
}

/// `{base}/{cloud}/image/upload/dpr_auto,f_auto,w_auto/c_scale,w_{width}/q_auto:best/{id}.webp`
pub fn optimized_url(base: &str, cloud_name: &str, public_id: &str, width: u32) -> String {
    format!(
        "{}/{}/image/upload/dpr_auto,f_auto,w_auto/c_scale,w_{}/q_auto:best/{}.webp",
        base.trim_end_matches('/'),
        cloud_name,
        width,
        public_id
    )
}

#[derive(Debug, Deserialize)]
struct ResourceList {
    #[serde(default)]
    resources: Vec<Resource>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    public_id: String,
    #[serde(default)]
    secure_url: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    format: String,
    #[serde(default)]
    context: Option<ResourceContext>,
}

#[derive(Debug, Default, Deserialize)]
struct ResourceContext {
    #[serde(default)]
    custom: Option<ContextFields>,
    #[serde(flatten)]
    top: ContextFields,
}

#[derive(Debug, Default, Deserialize)]
struct ContextFields {
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    alt: Option<String>,
}

/// First non-empty value wins; `custom` takes precedence over the top level.
fn pick(custom: Option<&String>, top: Option<&String>) -> String {
    custom
        .filter(|v| !v.is_empty())
        .or(top.filter(|v| !v.is_empty()))
        .cloned()
        .unwrap_or_default()
}

impl Resource {
    fn into_record(self, url: String) -> ImageRecord {
        let (caption, alt) = match &self.context {
            Some(ctx) => {
                let custom = ctx.custom.as_ref();
                (
                    pick(
                        custom.and_then(|c| c.caption.as_ref()),
                        ctx.top.caption.as_ref(),
                    ),
                    pick(custom.and_then(|c| c.alt.as_ref()), ctx.top.alt.as_ref()),
                )
            }
            None => (String::new(), String::new()),
        };
        ImageRecord {
            id: self.public_id,
            url,
            width: self.width,
            height: self.height,
            caption,
            alt,
            format: self.format,
        }
    }
}

fn parse_resources(body: &[u8]) -> Result<Vec<Resource>, SourceError> {
    let list: ResourceList = serde_json::from_slice(body)?;
    Ok(list.resources)
}
