use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("could not encode value for key '{key}'")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}
