use serde::de::DeserializeOwned;
use std::fs;

use crate::error::Result;

/// Parses a JSON file into a given type `T`.
///
/// Errors are converted into `crate::error::Error` variants:
/// - `Error::IoError` if the file cannot be read.
/// - `Error::DeserializationError` if the JSON is malformed.
pub fn parse_json_file<T: DeserializeOwned>(file_path: &str) -> Result<T> {
    let data = fs::read_to_string(file_path)?;
    parse_json_str(&data)
}

/// Parses an in-memory JSON document into `T`.
pub fn parse_json_str<T: DeserializeOwned>(data: &str) -> Result<T> {
    let parsed_data: T = serde_json::from_str(data)?;
    Ok(parsed_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Sample {
        value: u32,
    }

    #[test]
    fn test_parse_json_str() {
        let sample: Sample = parse_json_str(r#"{ "value": 7 }"#).unwrap();
        assert_eq!(sample.value, 7);
    }

    #[test]
    fn test_parse_missing_file_is_io_error() {
        let result = parse_json_file::<Sample>("/definitely/not/here.json");
        assert!(matches!(result, Err(Error::IoError(_))));
    }

    #[test]
    fn test_parse_malformed_json_is_deserialization_error() {
        let result = parse_json_str::<Sample>("{ value: }");
        assert!(matches!(result, Err(Error::DeserializationError(_))));
    }
}
