use psd_weights_core::{ConfigError, LibraryError, SamplingError};
use thiserror::Error;

use crate::capture::Channel;
use crate::ids::OwnerId;

/// Rejected control operation. Nothing is changed when one is returned.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown owner {0}")]
    UnknownOwner(OwnerId),
    #[error("owner name is empty")]
    EmptyOwnerName,
    #[error("owner '{0}' has no skeleton on the host")]
    MissingRig(String),
    #[error("capture a {0} pose first")]
    NothingCaptured(Channel),
    #[error(transparent)]
    Library(#[from] LibraryError),
    #[error(transparent)]
    Sampling(#[from] SamplingError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
