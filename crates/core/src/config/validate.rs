use std::collections::BTreeSet;

use crate::fingerprint::TypeTag;

use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - At least one worker
/// - Packet cap is not 0
/// - Every format name is a known type (or alias)
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.scheduler.workers == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.workers cannot be 0".to_string(),
        ));
    }

    if config.limits.max_packets == 0 {
        return Err(ConfigError::ValidationError(
            "limits.max_packets cannot be 0".to_string(),
        ));
    }

    parse_formats(config.scheduler.formats.as_deref())?;

    Ok(())
}

/// Turns format names into the allow-list. `None` means every type.
pub fn parse_formats(names: Option<&[String]>) -> Result<Option<BTreeSet<TypeTag>>, ConfigError> {
    let Some(names) = names else {
        return Ok(None);
    };

    let mut allowed = BTreeSet::new();
    for name in names {
        let tag = name
            .parse::<TypeTag>()
            .map_err(|e| ConfigError::ValidationError(format!("scheduler.formats: {e}")))?;
        allowed.insert(tag);
    }

    if allowed.is_empty() {
        return Err(ConfigError::ValidationError(
            "scheduler.formats cannot be empty".to_string(),
        ));
    }
    Ok(Some(allowed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_workers_fails() {
        let mut config = Config::default();
        config.scheduler.workers = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_zero_packets_fails() {
        let mut config = Config::default();
        config.limits.max_packets = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_unknown_format_fails() {
        let mut config = Config::default();
        config.scheduler.formats = Some(vec!["csv".into(), "mp3".into()]);
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("mp3"));
    }

    #[test]
    fn test_parse_formats_accepts_aliases() {
        let names = vec!["log".to_string(), "tgz".to_string(), "CSV".to_string()];
        let allowed = parse_formats(Some(&names)).unwrap().unwrap();
        assert!(allowed.contains(&TypeTag::Txt));
        assert!(allowed.contains(&TypeTag::Tar));
        assert!(allowed.contains(&TypeTag::Csv));
        assert_eq!(allowed.len(), 3);
    }

    #[test]
    fn test_parse_formats_none_allows_everything() {
        assert_eq!(parse_formats(None).unwrap(), None);
    }
}
