//! Error module tests

use crate::error::{Error, Result};

#[test]
fn test_unknown_entity_error() {
    let error = Error::UnknownEntity {
        relation_id: "rel-1".to_string(),
        entity_id: "ghost".to_string(),
    };
    assert_eq!(error.code(), "E001");
    assert!(error.suggestion().is_none());
    assert!(error.to_string().contains("ghost"));
    assert!(error.to_string().contains("rel-1"));
}

#[test]
fn test_type_conflict_suggests_recategorize() {
    let error = Error::TypeConflict {
        id: "ent-7".to_string(),
        existing: "brand".to_string(),
        requested: "model".to_string(),
    };
    assert_eq!(error.code(), "E002");
    assert_eq!(
        error.suggestion(),
        Some("supportgraph recategorize ent-7".to_string())
    );
}

#[test]
fn test_not_found_codes() {
    assert_eq!(Error::EntityNotFound("e".into()).code(), "E003");
    assert_eq!(Error::RelationNotFound("r".into()).code(), "E004");
}

#[test]
fn test_extraction_errors() {
    let parse = Error::ExtractionParseError("missing candidates".to_string());
    assert_eq!(parse.code(), "E100");
    assert!(!parse.is_transient());
    assert!(parse.suggestion().unwrap().contains("unchanged"));

    let timeout = Error::ExtractionTimeout(45);
    assert_eq!(timeout.code(), "E101");
    assert!(timeout.is_transient());
    assert!(timeout.to_string().contains("45"));
}

#[test]
fn test_llm_errors_transience() {
    assert!(Error::LLMError("Server error 502".into()).is_transient());
    assert!(!Error::LLMError("Invalid API key".into()).is_transient());
    assert!(Error::RateLimited(10).is_transient());
    assert_eq!(Error::RateLimited(10).code(), "E104");
}

#[test]
fn test_ambient_error_codes() {
    assert_eq!(Error::ConfigError("bad".into()).code(), "E600");
    assert_eq!(Error::InvalidInput("bad".into()).code(), "E800");
    assert_eq!(Error::Other("bad".into()).code(), "E9999");
    assert_eq!(
        Error::ConfigError("bad".into()).suggestion(),
        Some("supportgraph config list".to_string())
    );
}

#[test]
fn test_io_error_conversion() {
    fn read() -> Result<()> {
        Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
        Ok(())
    }
    let err = read().unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert_eq!(err.code(), "E9999");
}

#[tokio::test]
async fn test_database_error_conversion() {
    fn convert(e: sqlx::Error) -> Error {
        e.into()
    }
    let err = convert(sqlx::Error::RowNotFound);
    assert_eq!(err.code(), "E400");
    assert!(!err.is_transient());
}
