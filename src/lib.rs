//! Describes a static website hosted on AWS as a single cloudformation
//! template: a private S3 bucket readable only through a cloudfront origin
//! access identity, a distribution in front of it (optionally presenting an
//! externally issued ACM certificate for a custom domain), and a route53
//! zone with A/AAAA alias records pointing at the distribution.
//!
//! This crate only synthesizes. Deploying the template, syncing the site
//! files and resolving the certificate live in the `level2` crates.
//!
//! ```no_run
//! use std::path::Path;
//! use sitedeploy::{SiteConfig, SiteDescriptor};
//!
//! let conf = SiteConfig::load_layered(Path::new("site.toml"), Path::new(".env"))?;
//! let template = SiteDescriptor::from_config(&conf)?.synthesize()?;
//! println!("{}", serde_json::to_string_pretty(&template)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod regions;
pub mod resources;
pub mod variables;

pub use config::SiteConfig;
pub use error::DescriptorError;
pub use resources::{SavedTemplate, SiteDescriptor};

/// convenience for the common path: config in, pretty json template out.
pub fn synthesize_json(conf: &SiteConfig) -> Result<String, DescriptorError> {
    let template = SiteDescriptor::from_config(conf)?.synthesize()?;
    // pretty so it reads well in the cloudformation console
    Ok(serde_json::to_string_pretty(&template)?)
}
