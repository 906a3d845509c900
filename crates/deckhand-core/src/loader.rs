//! Loading configuration documents from layered files

use std::path::Path;

use crate::config::ConfigDocument;
use crate::error::Result;
use crate::values::{Values, parse_set_values};

/// Load a document from one or more YAML files plus `--set` overrides.
///
/// Later files win over earlier ones, and `--set` wins over all files.
pub fn load_document<P: AsRef<Path>>(files: &[P], set_values: &[String]) -> Result<ConfigDocument> {
    let mut values = Values::from_files(files)?;
    if !set_values.is_empty() {
        values.merge(&parse_set_values(set_values)?);
    }
    values.into_typed()
}

/// Parse a single document from a YAML string
pub fn parse_document(yaml: &str) -> Result<ConfigDocument> {
    Values::from_yaml(yaml)?.into_typed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_layers_and_overrides() {
        let base = write(
            r#"
apiVersion: deckhand/v1
workloads:
  test:
    image: test:1.0
    replicas: 2
    ports:
      - port: 3000
"#,
        );
        let prod = write("workloads:\n  test:\n    replicas: 4\n");

        let doc = load_document(
            &[base.path(), prod.path()],
            &["workloads.test.image=test:2.0".to_string()],
        )
        .unwrap();

        let test = &doc.workloads["test"];
        assert_eq!(test.replicas, Some(4));
        assert_eq!(test.image.as_deref(), Some("test:2.0"));
    }

    #[test]
    fn test_unknown_field_is_invalid_document() {
        let err = parse_document("apiVersion: deckhand/v1\nworklods: {}\n").unwrap_err();
        assert!(err.to_string().contains("worklods"));
    }
}
