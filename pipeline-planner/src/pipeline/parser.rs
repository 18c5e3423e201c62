// Pipeline Model Loader
// Reads the provider-neutral model from YAML or JSON documents

use crate::pipeline::models::Pipeline;
use crate::PlannerResult;
use std::fs;
use std::path::Path;

pub struct PipelineParser;

impl PipelineParser {
    /// Load a pipeline model from a file; `.json` files are read as JSON, anything else as YAML
    pub fn from_file<P: AsRef<Path>>(path: P) -> PlannerResult<Pipeline> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    pub fn from_yaml_str(content: &str) -> PlannerResult<Pipeline> {
        let pipeline: Pipeline = serde_yaml::from_str(content)?;
        Ok(pipeline)
    }

    pub fn from_json_str(content: &str) -> PlannerResult<Pipeline> {
        let pipeline: Pipeline = serde_json::from_str(content)?;
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_pipeline() {
        let yaml = r#"
name: test-pipeline
jobs:
  - id: build
    steps:
      - name: Build
        run: cargo build
      - name: Test
        run: cargo test
"#;
        let pipeline = PipelineParser::from_yaml_str(yaml).unwrap();
        assert_eq!(pipeline.name.as_deref(), Some("test-pipeline"));
        assert_eq!(pipeline.jobs[0].steps.len(), 2);
    }

    #[test]
    fn test_parse_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        fs::write(
            &path,
            r#"{"name":"json","jobs":[{"id":"lint","steps":[{"type":"checkout"}]}]}"#,
        )
        .unwrap();

        let pipeline = PipelineParser::from_file(&path).unwrap();
        assert_eq!(pipeline.jobs[0].id, "lint");
        assert_eq!(pipeline.jobs[0].steps[0].step_type, "checkout");
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let result = PipelineParser::from_yaml_str("jobs: [ {id: ");
        assert!(result.is_err());
    }
}
