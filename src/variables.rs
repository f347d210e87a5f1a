use std::{collections::HashMap, io::Read, path::Path};

use crate::error::DescriptorError;

/// reads `KEY=VALUE` pairs without touching the process environment.
/// Comments, quoting and `export ` prefixes follow the usual `.env` rules.
pub fn read_dot_env<R: Read>(reader: R) -> Result<HashMap<String, String>, dotenvy::Error> {
    let mut map = HashMap::new();
    for item in dotenvy::from_read_iter(reader) {
        let (key, val) = item?;
        map.insert(key, val);
    }
    Ok(map)
}

pub fn parse_dot_env(contents: &str) -> Result<HashMap<String, String>, dotenvy::Error> {
    read_dot_env(contents.as_bytes())
}

/// a missing file is not an error: `.env` files are optional.
pub fn load_dot_env(path: &Path) -> Result<Option<HashMap<String, String>>, DescriptorError> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(DescriptorError::Io { path: path.to_path_buf(), source }),
    };
    read_dot_env(file)
        .map(Some)
        .map_err(|source| DescriptorError::DotEnv { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dot_env_lines() {
        let vars = parse_dot_env(
            "# site settings\n\
             SITE_DOMAIN_NAME=rentingorbuy.com\n\
             export SITE_REGION=us-east-1\n\
             SITE_STACK_NAME='renting-or-buy'\n\
             \n\
             EMPTY=\n"
        ).unwrap();
        assert_eq!(vars["SITE_DOMAIN_NAME"], "rentingorbuy.com");
        assert_eq!(vars["SITE_REGION"], "us-east-1");
        assert_eq!(vars["SITE_STACK_NAME"], "renting-or-buy");
        assert_eq!(vars["EMPTY"], "");
        assert_eq!(vars.len(), 4);
    }

    #[test]
    fn inline_comments_are_not_part_of_the_value() {
        let vars = parse_dot_env(
            "SITE_CERTIFICATE_ARN=arn:aws:acm:us-east-1:123456789012:certificate/abc # prod cert\n\
             SITE_DOMAIN_NAME=\"example.com\" # quoted\n"
        ).unwrap();
        assert_eq!(vars["SITE_CERTIFICATE_ARN"], "arn:aws:acm:us-east-1:123456789012:certificate/abc");
        assert_eq!(vars["SITE_DOMAIN_NAME"], "example.com");
    }

    #[test]
    fn malformed_line_is_an_error() {
        assert!(parse_dot_env("NOT_A_PAIR\n").is_err());
    }

    #[test]
    fn missing_file_is_none() {
        let res = load_dot_env(Path::new("/definitely/not/here/.env")).unwrap();
        assert!(res.is_none());
    }

    #[test]
    fn malformed_file_reports_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "SITE_REGION=us-east-1\nbroken line\n").unwrap();
        let err = load_dot_env(&path).unwrap_err();
        assert!(matches!(&err, DescriptorError::DotEnv { path: p, .. } if p == &path));
    }
}
