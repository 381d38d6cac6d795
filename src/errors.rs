use thiserror::Error;

/// Failures raised by the page collaborator itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PageError {
    #[error("element is detached from the page")]
    Detached,

    #[error("page script failed: {0}")]
    Script(String),

    #[error("mutation observer failed: {0}")]
    Observer(String),
}

#[derive(Debug, Error)]
pub enum ExpanderError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Selector error: {0}")]
    Selector(String),

    #[error("Label pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Page error: {0}")]
    Page(#[from] PageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl serde::Serialize for ExpanderError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type ExpanderResult<T> = Result<T, ExpanderError>;
