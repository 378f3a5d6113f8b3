use std::fmt;

use thiserror::Error;

/// Transport-tier failures from a single GET against the upstream API.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("upstream returned HTTP {code}")]
    HttpStatus { code: u16 },

    #[error("response body is not valid JSON: {0}")]
    InvalidJson(String),
}

/// Failures of the catalog feeds (home, listings, search, info).
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Pipeline stage a [`ResolutionError`] was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Episodes,
    Episode,
    Servers,
    Stream,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Episodes => "episode list",
            Stage::Episode => "episode selection",
            Stage::Servers => "server list",
            Stage::Stream => "stream link",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ResolutionErrorKind {
    #[error("could not fetch data: {0}")]
    Fetch(#[from] FetchError),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("no episodes are available")]
    NoEpisodes,

    #[error("no servers are available for this episode")]
    NoServers,

    #[error("the server did not return a playable link")]
    NoStreamLink,

    #[error("invalid episode id {0:?}")]
    InvalidEpisodeId(String),

    #[error("no anime or episode is selected")]
    NothingSelected,

    #[error("server {0:?} is not offered for the selected episode")]
    UnknownServer(String),

    #[error("superseded by a newer request")]
    Superseded,
}

/// A failed resolution step, tagged with the stage that stopped the pipeline.
#[derive(Debug, Error)]
#[error("{stage} failed: {kind}")]
pub struct ResolutionError {
    pub stage: Stage,
    #[source]
    pub kind: ResolutionErrorKind,
}

impl ResolutionError {
    pub fn new(stage: Stage, kind: impl Into<ResolutionErrorKind>) -> Self {
        Self {
            stage,
            kind: kind.into(),
        }
    }

    pub fn malformed(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(stage, ResolutionErrorKind::MalformedResponse(message.into()))
    }

    pub fn superseded(stage: Stage) -> Self {
        Self::new(stage, ResolutionErrorKind::Superseded)
    }

    /// Results of superseded invocations are discarded, not displayed.
    pub fn is_superseded(&self) -> bool {
        matches!(self.kind, ResolutionErrorKind::Superseded)
    }
}

pub type Result<T> = std::result::Result<T, ResolutionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_names_stage_and_cause() {
        let err = ResolutionError::new(Stage::Servers, ResolutionErrorKind::NoServers);
        assert_eq!(
            err.to_string(),
            "server list failed: no servers are available for this episode"
        );
    }

    #[test]
    fn fetch_errors_convert_into_domain_tier() {
        let err = ResolutionError::new(Stage::Stream, FetchError::HttpStatus { code: 502 });
        assert!(matches!(
            err.kind,
            ResolutionErrorKind::Fetch(FetchError::HttpStatus { code: 502 })
        ));
        assert!(!err.is_superseded());
        assert!(ResolutionError::superseded(Stage::Stream).is_superseded());
    }
}
