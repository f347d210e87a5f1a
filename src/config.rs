use std::{collections::HashMap, path::{Path, PathBuf}};

use serde::{Deserialize, Serialize};

use crate::{
    error::DescriptorError,
    regions::verify_region,
    resources::{verify_document_name, verify_domain_name, PriceClass},
    variables::load_dot_env,
};

pub const ENV_DOMAIN_NAME: &str = "SITE_DOMAIN_NAME";
pub const ENV_CERTIFICATE_ARN: &str = "SITE_CERTIFICATE_ARN";
pub const ENV_STACK_NAME: &str = "SITE_STACK_NAME";
pub const ENV_REGION: &str = "SITE_REGION";
pub const ENV_SOURCE_DIR: &str = "SITE_SOURCE_DIR";

/// contents of `site.toml`. Every field has a default so a file only needs
/// the values it wants to change; the domain is the only required value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// if left empty, a name is derived from the domain,
    /// eg: example.com -> example-com-site
    pub stack_name: String,
    /// region of the stack and bucket. The certificate is always
    /// read from us-east-1, regardless of this value.
    pub region: String,
    pub domain_name: String,
    /// ARN of a certificate issued outside of this tool.
    /// when not set, the site is served only on the cloudfront domain.
    pub certificate_arn: Option<String>,
    /// local directory uploaded to the bucket on every deploy
    pub source_dir: PathBuf,
    pub index_document: String,
    pub price_class: PriceClass,
    /// adds a custom resource that empties the bucket when the stack is deleted
    pub cleanup_on_teardown: bool,
    pub comment: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            stack_name: String::new(),
            region: "us-east-1".into(),
            domain_name: String::new(),
            certificate_arn: None,
            source_dir: PathBuf::from("site"),
            index_document: "index.html".into(),
            price_class: PriceClass::default(),
            cleanup_on_teardown: true,
            comment: None,
        }
    }
}

impl SiteConfig {
    pub fn from_toml_str(contents: &str, path: &Path) -> Result<Self, DescriptorError> {
        toml::from_str(contents).map_err(|source| DescriptorError::Toml { path: path.to_path_buf(), source })
    }

    pub fn load(path: &Path) -> Result<Self, DescriptorError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|source| DescriptorError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&contents, path)
    }

    /// `site.toml`, then the `.env` file, then the process environment.
    /// later sources win.
    pub fn load_layered(config_path: &Path, env_file: &Path) -> Result<Self, DescriptorError> {
        let mut conf = Self::load(config_path)?;
        if let Some(vars) = load_dot_env(env_file)? {
            tracing::debug!(path = ?env_file, count = vars.len(), "applying .env overrides");
            conf.apply_overrides(&vars);
        }
        let process_vars: HashMap<String, String> = std::env::vars().collect();
        conf.apply_overrides(&process_vars);
        conf.normalize();
        conf.validate()?;
        Ok(conf)
    }

    pub fn apply_overrides(&mut self, vars: &HashMap<String, String>) {
        if let Some(v) = vars.get(ENV_DOMAIN_NAME) {
            self.domain_name = v.clone();
        }
        if let Some(v) = vars.get(ENV_CERTIFICATE_ARN) {
            // an empty value explicitly turns the certificate off
            self.certificate_arn = if v.trim().is_empty() { None } else { Some(v.clone()) };
        }
        if let Some(v) = vars.get(ENV_STACK_NAME) {
            self.stack_name = v.clone();
        }
        if let Some(v) = vars.get(ENV_REGION) {
            self.region = v.clone();
        }
        if let Some(v) = vars.get(ENV_SOURCE_DIR) {
            self.source_dir = PathBuf::from(v);
        }
    }

    pub fn normalize(&mut self) {
        self.domain_name = self.domain_name.trim().to_ascii_lowercase();
        self.region = self.region.trim().to_string();
        if matches!(&self.certificate_arn, Some(arn) if arn.trim().is_empty()) {
            self.certificate_arn = None;
        }
        if self.stack_name.trim().is_empty() {
            self.stack_name = default_stack_name(&self.domain_name);
        }
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        if let Some(err) = verify_domain_name(&self.domain_name) {
            return Err(DescriptorError::InvalidConfig(err));
        }
        if let Some(err) = verify_region(&self.region) {
            return Err(DescriptorError::InvalidConfig(err));
        }
        validate_stack_name(&self.stack_name).map_err(DescriptorError::InvalidConfig)?;
        verify_document_name(&self.index_document).map_err(DescriptorError::InvalidConfig)?;
        Ok(())
    }
}

pub fn default_stack_name(domain_name: &str) -> String {
    let mut stack_name = format!("{}-site", domain_name.replace(['.', '_'], "-"));
    let mut end = stack_name.len().min(128);
    while !stack_name.is_char_boundary(end) {
        end -= 1;
    }
    stack_name.truncate(end);
    stack_name
}

/// A stack name can contain only alphanumeric characters (case sensitive) and hyphens.
/// It must start with an alphabetical character and can't be longer than 128 characters.
pub fn validate_stack_name(stack_name: &str) -> Result<(), String> {
    let restriction = "Must only consist of alphanumeric characters and hyphens, Must start with an alphabetical character, and cannot be longer than 128 characters.";
    let mut chars = stack_name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return Err(format!("Invalid stack name {:?}\n{}", stack_name, restriction)),
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '-') || stack_name.len() > 128 {
        return Err(format!("Invalid stack name {:?}\n{}", stack_name, restriction));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> SiteConfig {
        SiteConfig::from_toml_str(s, Path::new("site.toml")).expect("valid toml")
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let conf = parse("domain_name = \"rentingorbuy.com\"\n");
        assert_eq!(conf.region, "us-east-1");
        assert_eq!(conf.index_document, "index.html");
        assert_eq!(conf.price_class, PriceClass::PriceClass100);
        assert!(conf.cleanup_on_teardown);
        assert!(conf.certificate_arn.is_none());
    }

    #[test]
    fn full_file_parses() {
        let conf = parse(r#"
            stack_name = "renting-or-buy"
            region = "eu-west-1"
            domain_name = "rentingorbuy.com"
            certificate_arn = "arn:aws:acm:us-east-1:123456789012:certificate/abc"
            source_dir = "../src"
            price_class = "PriceClass_All"
            cleanup_on_teardown = false
        "#);
        assert_eq!(conf.stack_name, "renting-or-buy");
        assert_eq!(conf.source_dir, PathBuf::from("../src"));
        assert_eq!(conf.price_class, PriceClass::PriceClassAll);
        assert!(!conf.cleanup_on_teardown);
        assert!(conf.validate().is_ok());
    }

    #[test]
    fn unknown_price_class_is_a_parse_error() {
        let err = SiteConfig::from_toml_str("price_class = \"Cheap\"", Path::new("site.toml")).unwrap_err();
        assert!(matches!(err, DescriptorError::Toml { .. }));
    }

    #[test]
    fn overrides_and_normalization() {
        let mut conf = parse("domain_name = \"old.com\"\ncertificate_arn = \"arn:aws:acm:us-east-1:123456789012:certificate/abc\"");
        let vars: HashMap<String, String> = [
            (ENV_DOMAIN_NAME.to_string(), " RentingOrBuy.com ".to_string()),
            (ENV_CERTIFICATE_ARN.to_string(), "".to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ].into_iter().collect();
        conf.apply_overrides(&vars);
        conf.normalize();
        assert_eq!(conf.domain_name, "rentingorbuy.com");
        assert!(conf.certificate_arn.is_none());
        assert_eq!(conf.stack_name, "rentingorbuy-com-site");
        assert!(conf.validate().is_ok());
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut conf = parse("domain_name = \"example.com\"\nregion = \"moon-1\"");
        conf.normalize();
        assert!(matches!(conf.validate(), Err(DescriptorError::InvalidConfig(m)) if m.contains("region")));

        let conf = parse("domain_name = \"example.com\"\nstack_name = \"1stack\"");
        assert!(conf.validate().is_err());

        let mut conf = parse("");
        conf.normalize();
        assert!(conf.validate().is_err());
    }

    #[test]
    fn long_non_ascii_domain_is_rejected_not_truncated_mid_char() {
        let mut conf = parse("");
        conf.domain_name = format!("{}\u{e9}.com", "a".repeat(127));
        conf.normalize();
        assert!(conf.stack_name.len() <= 128);
        assert!(matches!(conf.validate(), Err(DescriptorError::InvalidConfig(_))));
        assert_eq!(default_stack_name(&"b".repeat(200)).len(), 128);
    }

    #[test]
    fn stack_name_rules() {
        assert!(validate_stack_name("my-site").is_ok());
        assert!(validate_stack_name("").is_err());
        assert!(validate_stack_name("my_site").is_err());
        assert!(validate_stack_name(&"a".repeat(129)).is_err());
    }
}
