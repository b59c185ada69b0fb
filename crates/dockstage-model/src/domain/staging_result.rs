use serde::{Deserialize, Serialize};

use crate::{ExecutionMetadata, ImageRef};

/// The staging artifact handed to the downstream runtime.
///
/// `execution_metadata` is itself a JSON document, embedded as a string.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StagingResult {
    pub docker_image: String,
    pub execution_metadata: String,
}

impl StagingResult {
    pub fn new(image: &ImageRef, metadata: &ExecutionMetadata) -> Result<Self, serde_json::Error> {
        Ok(Self {
            docker_image: image.to_string(),
            execution_metadata: serde_json::to_string(metadata)?,
        })
    }

    /// Decodes the embedded metadata document.
    pub fn metadata(&self) -> Result<ExecutionMetadata, serde_json::Error> {
        serde_json::from_str(&self.execution_metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_is_embedded_as_string() {
        let image = ImageRef::new("10.0.0.1:5000", "abc", "latest");
        let md = ExecutionMetadata {
            entrypoint: vec!["/run".into()],
            ..Default::default()
        };
        let result = StagingResult::new(&image, &md).unwrap();

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["docker_image"], "10.0.0.1:5000/abc:latest");
        assert!(json["execution_metadata"].is_string());
        assert_eq!(result.metadata().unwrap(), md);
    }
}
