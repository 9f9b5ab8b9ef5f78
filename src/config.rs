use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Result, ensure};
use serde::Deserialize;

use crate::engine::{DEFAULT_TRANSITION, PlaybackInterval};

/// Environment variables that override the credentials in the YAML file.
pub const ENV_CLOUD_NAME: &str = "CLOUDINARY_CLOUD_NAME";
pub const ENV_API_KEY: &str = "CLOUDINARY_API_KEY";
pub const ENV_API_SECRET: &str = "CLOUDINARY_API_SECRET";

/// Cloudinary's Admin API refuses larger pages.
const MAX_PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Where the images come from.
    pub cloudinary: CloudinaryOptions,
    /// Rotation and timing behaviour.
    pub slideshow: SlideshowOptions,
    /// HTTP listener for the page and control API.
    pub server: ServerOptions,
    /// Page title and header links.
    pub site: SiteOptions,
}

/// Values given on the command line; each one replaces its file counterpart.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    pub bind_address: Option<SocketAddr>,
    pub shuffle_seed: Option<u64>,
    pub default_interval: Option<PlaybackInterval>,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Replace credentials with values from `lookup` (normally the process environment).
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty(ENV_CLOUD_NAME) {
            self.cloudinary.cloud_name = v;
        }
        if let Some(v) = non_empty(ENV_API_KEY) {
            self.cloudinary.api_key = v;
        }
        if let Some(v) = non_empty(ENV_API_SECRET) {
            self.cloudinary.api_secret = v;
        }
        self
    }

    /// Apply command-line overrides. Call before [`Configuration::validated`].
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(addr) = overrides.bind_address {
            self.server.bind_address = addr;
        }
        if let Some(seed) = overrides.shuffle_seed {
            self.slideshow.shuffle_seed = Some(seed);
        }
        if let Some(interval) = overrides.default_interval {
            self.slideshow.default_interval = interval;
        }
        self
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        self.cloudinary.validate()?;
        self.slideshow.validate()?;
        self.server.validate()?;
        self.site.validate()?;
        Ok(self)
    }
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CloudinaryOptions {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Admin API root; tests point this at a local stand-in.
    pub api_base_url: String,
    /// Delivery root for generated image URLs.
    pub delivery_base_url: String,
    /// Page size for the single resource listing call.
    pub max_results: u32,
    /// Width, in pixels, of the scaled delivery rendition.
    pub display_width: u32,
    /// Per-request timeout.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl CloudinaryOptions {
    const fn default_max_results() -> u32 {
        MAX_PAGE_SIZE
    }

    const fn default_display_width() -> u32 {
        800
    }

    const fn default_request_timeout() -> Duration {
        Duration::from_secs(15)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            (1..=MAX_PAGE_SIZE).contains(&self.max_results),
            "cloudinary.max-results must be between 1 and {MAX_PAGE_SIZE}"
        );
        ensure!(
            self.display_width > 0,
            "cloudinary.display-width must be greater than zero"
        );
        ensure!(
            self.request_timeout > Duration::ZERO,
            "cloudinary.request-timeout must be positive"
        );
        ensure!(
            !self.api_base_url.trim().is_empty(),
            "cloudinary.api-base-url must not be empty"
        );
        ensure!(
            !self.delivery_base_url.trim().is_empty(),
            "cloudinary.delivery-base-url must not be empty"
        );
        Ok(())
    }
}

impl Default for CloudinaryOptions {
    fn default() -> Self {
        Self {
            cloud_name: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            api_base_url: "https://api.cloudinary.com".to_string(),
            delivery_base_url: "https://res.cloudinary.com".to_string(),
            max_results: Self::default_max_results(),
            display_width: Self::default_display_width(),
            request_timeout: Self::default_request_timeout(),
        }
    }
}

// Keep the secret out of the startup config dump.
impl std::fmt::Debug for CloudinaryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryOptions")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .field("delivery_base_url", &self.delivery_base_url)
            .field("max_results", &self.max_results)
            .field("display_width", &self.display_width)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SlideshowOptions {
    /// Auto-advance period at startup; one of 3000, 5000, 8000, 10000.
    #[serde(rename = "default-interval-ms")]
    pub default_interval: PlaybackInterval,
    /// Duration of the wipe between images.
    #[serde(with = "humantime_serde")]
    pub transition_duration: Duration,
    /// Index shown first.
    pub initial_index: usize,
    /// Whether auto-play starts enabled.
    pub autoplay: bool,
    /// Optional deterministic seed for the selection RNG.
    pub shuffle_seed: Option<u64>,
}

impl SlideshowOptions {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.transition_duration > Duration::ZERO,
            "slideshow.transition-duration must be positive"
        );
        ensure!(
            self.transition_duration < self.default_interval.as_duration(),
            "slideshow.transition-duration must be shorter than the default interval"
        );
        Ok(())
    }
}

impl Default for SlideshowOptions {
    fn default() -> Self {
        Self {
            default_interval: PlaybackInterval::default(),
            transition_duration: DEFAULT_TRANSITION,
            initial_index: 0,
            autoplay: true,
            shuffle_seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ServerOptions {
    pub bind_address: SocketAddr,
    /// How often the page polls for engine state.
    #[serde(with = "humantime_serde")]
    pub state_poll_interval: Duration,
}

impl ServerOptions {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.state_poll_interval >= Duration::from_millis(50),
            "server.state-poll-interval must be at least 50ms"
        );
        Ok(())
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::LOCALHOST, 3000)),
            state_poll_interval: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SiteOptions {
    /// Heading and document title.
    pub title: String,
    /// Links shown at the right of the header, in order.
    pub links: Vec<HeaderLink>,
}

impl SiteOptions {
    fn validate(&self) -> Result<()> {
        ensure!(
            !self.title.trim().is_empty(),
            "site.title must not be empty"
        );
        for link in &self.links {
            ensure!(
                !link.label.trim().is_empty() && !link.url.trim().is_empty(),
                "site.links entries need both a label and a url"
            );
        }
        Ok(())
    }
}

impl Default for SiteOptions {
    fn default() -> Self {
        Self {
            title: "Photo Slideshow".to_string(),
            links: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HeaderLink {
    /// Accessible name; also the visible text when no icon is set.
    pub label: String,
    pub url: String,
    #[serde(default)]
    pub icon: Option<LinkIcon>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkIcon {
    Mail,
    Instagram,
}
