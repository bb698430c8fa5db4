#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid height: {height}, expected 1..={max}")]
    InvalidHeight { height: usize, max: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
