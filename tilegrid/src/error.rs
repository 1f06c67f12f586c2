use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridError {
    #[error("invalid area string {0}")]
    AreaFormat(String),

    #[error("invalid tile name {0}")]
    TileName(String),
}
