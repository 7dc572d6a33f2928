use thiserror::Error;

#[derive(Debug, Error)]
pub enum StbtError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("missing config: {section}.{key}")]
    MissingConfig { section: String, key: String },
    #[error("cli error: {0}")]
    Cli(String),
    #[error("Image for name '{0}' already logged")]
    DuplicateArtifact(String),
    #[error("unsupported image: {0}")]
    UnsupportedImage(String),
    #[error("image encode error: {0}")]
    ImageEncode(String),
}
