//! Error handling for the CWMP CPE simulator

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("SOAP envelope error: {0}")]
    Soap(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("CWMP fault {code}: {message}")]
    Fault { code: u32, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn soap<S: Into<String>>(msg: S) -> Self {
        Self::Soap(msg.into())
    }

    pub fn auth<S: Into<String>>(msg: S) -> Self {
        Self::Auth(msg.into())
    }

    pub fn session<S: Into<String>>(msg: S) -> Self {
        Self::Session(msg.into())
    }

    pub fn download<S: Into<String>>(msg: S) -> Self {
        Self::Download(msg.into())
    }

    pub fn fault(code: u32, message: impl Into<String>) -> Self {
        Self::Fault {
            code,
            message: message.into(),
        }
    }

    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}
