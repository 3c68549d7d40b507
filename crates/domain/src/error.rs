/// Failures outside any one subsystem, mostly around loading configuration.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("reading {path}: {source}")]
    ReadConfig {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {path}: {message}")]
    ParseConfig { path: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
