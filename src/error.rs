use thiserror::Error;

#[derive(Error, Debug)]
pub enum PunitoError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error in {path}: {detail}")]
    Parse { path: String, detail: String },

    #[error("invalid class file {path}: expected a .java file")]
    InvalidClassFile { path: String },

    #[error("method not found: {name}")]
    MethodNotFound { name: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("prompt {name}: {detail}")]
    Prompt { name: String, detail: String },

    #[error("llm error: {0}")]
    Llm(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("no generated fragments for class {class}: every bundle failed")]
    NoFragments { class: String },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PunitoError>;
