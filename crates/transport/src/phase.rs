use std::fmt;

/// Lifecycle of one server-push subscription.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StreamPhase {
    #[default]
    Connecting,
    Open,
    Done,
    Error(String),
    Closed,
}

/// Input for the push lifecycle, one per received signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseTransition {
    Open,
    Chunk,
    Complete,
    Fail(String),
    Close,
}

/// Rejection reason for illegal push lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseRejection {
    AlreadySettled { phase: StreamPhase },
    ClosedBeforeCompletion { phase: StreamPhase },
}

impl fmt::Display for PhaseRejection {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadySettled { phase } => {
                write!(formatter, "stream signal received after settling in {phase:?}")
            }
            Self::ClosedBeforeCompletion { phase } => {
                write!(formatter, "stream closed in {phase:?} before completion")
            }
        }
    }
}

pub type PhaseResult = Result<StreamPhase, PhaseRejection>;

impl StreamPhase {
    pub fn is_receiving(&self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }

    /// Applies one transition deterministically.
    ///
    /// A chunk in `Connecting` opens the stream implicitly. `Close` is only legal once the
    /// stream has settled in `Done` or `Error`; anything earlier is a connection failure.
    pub fn apply(&self, transition: PhaseTransition) -> PhaseResult {
        match transition {
            PhaseTransition::Open | PhaseTransition::Chunk => self.apply_receive(),
            PhaseTransition::Complete => self.apply_complete(),
            PhaseTransition::Fail(message) => self.apply_fail(message),
            PhaseTransition::Close => self.apply_close(),
        }
    }

    fn apply_receive(&self) -> PhaseResult {
        match self {
            Self::Connecting | Self::Open => Ok(Self::Open),
            Self::Done | Self::Error(_) | Self::Closed => Err(PhaseRejection::AlreadySettled {
                phase: self.clone(),
            }),
        }
    }

    fn apply_complete(&self) -> PhaseResult {
        match self {
            Self::Connecting | Self::Open => Ok(Self::Done),
            Self::Done | Self::Error(_) | Self::Closed => Err(PhaseRejection::AlreadySettled {
                phase: self.clone(),
            }),
        }
    }

    fn apply_fail(&self, message: String) -> PhaseResult {
        match self {
            Self::Connecting | Self::Open => Ok(Self::Error(message)),
            Self::Done | Self::Error(_) | Self::Closed => Err(PhaseRejection::AlreadySettled {
                phase: self.clone(),
            }),
        }
    }

    fn apply_close(&self) -> PhaseResult {
        match self {
            Self::Done | Self::Error(_) | Self::Closed => Ok(Self::Closed),
            Self::Connecting | Self::Open => Err(PhaseRejection::ClosedBeforeCompletion {
                phase: self.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_done() {
        let phase = StreamPhase::Connecting;
        let phase = phase.apply(PhaseTransition::Open).unwrap();
        let phase = phase.apply(PhaseTransition::Chunk).unwrap();
        let phase = phase.apply(PhaseTransition::Chunk).unwrap();
        let phase = phase.apply(PhaseTransition::Complete).unwrap();

        assert_eq!(phase, StreamPhase::Done);
        assert_eq!(
            phase.apply(PhaseTransition::Close).unwrap(),
            StreamPhase::Closed
        );
    }

    #[test]
    fn failure_path_closes_after_error() {
        let phase = StreamPhase::Connecting
            .apply(PhaseTransition::Fail("refused".to_string()))
            .unwrap();

        assert_eq!(phase, StreamPhase::Error("refused".to_string()));
        assert!(!phase.is_receiving());
        assert_eq!(
            phase.apply(PhaseTransition::Close).unwrap(),
            StreamPhase::Closed
        );
    }

    #[test]
    fn chunk_before_open_opens_implicitly() {
        assert_eq!(
            StreamPhase::Connecting.apply(PhaseTransition::Chunk),
            Ok(StreamPhase::Open)
        );
    }

    #[test]
    fn close_while_receiving_is_rejected() {
        assert_eq!(
            StreamPhase::Open.apply(PhaseTransition::Close),
            Err(PhaseRejection::ClosedBeforeCompletion {
                phase: StreamPhase::Open
            })
        );
    }

    #[test]
    fn chunk_after_done_is_rejected() {
        assert!(matches!(
            StreamPhase::Done.apply(PhaseTransition::Chunk),
            Err(PhaseRejection::AlreadySettled { .. })
        ));
    }
}
