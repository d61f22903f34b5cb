use thiserror::Error;

/// EX_DATAERR from sysexits.h: the input data was incorrect in some way.
const EXIT_DATAERR: u8 = 65;

/// Failure of one stage of a pull, carrying enough context for the final message
#[derive(Debug, Error)]
pub enum PullError {
    #[error("invalid image reference {reference:?}: {message}")]
    InvalidReference { reference: String, message: String },

    #[error("failed to fetch image: {0:#}")]
    Fetch(anyhow::Error),

    #[error("failed to read image metadata: {0:#}")]
    Metadata(anyhow::Error),

    #[error("failed to extract layer {layer}: {source:#}")]
    Extract {
        layer: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl PullError {
    /// Process exit status for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            PullError::InvalidReference { .. } => EXIT_DATAERR,
            _ => 1,
        }
    }
}
