/// Error types for the background controller
use crate::tab_data::TabId;
use thiserror::Error;

/// Failure reported by the host browser or one of its storage tiers
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HostError {
    #[error("no tab with id {0}")]
    NoTab(TabId),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("conversion error: {0}")]
    Conversion(String),
}

/// Outcome of an image fetch that did not produce a data URL
///
/// Clonable because one result is fanned out to every waiter.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("empty url [{0}]")]
    NotFound(String),
    #[error("load failed [{0}]")]
    Failed(String),
    #[error("fetch abandoned before completion")]
    Abandoned,
}

#[derive(Debug, Error)]
pub enum LinkBlankerError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("target tab is none")]
    NoActiveTab,
    #[error("window {0} does not have possession of the tab")]
    WindowWithoutTabs(i32),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("unknown port name {0:?}")]
    UnknownPort(String),
    #[error("invalid message: {0}")]
    InvalidMessage(#[from] serde_json::Error),
}

pub type Result<T, E = LinkBlankerError> = std::result::Result<T, E>;
