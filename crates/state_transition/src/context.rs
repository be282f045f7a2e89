use ember_bls::SignatureVerifier;
use ember_network_spec::ChainSpec;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::errors::Cancelled;

/// Everything a transition needs besides the state itself: the protocol configuration, the
/// signature capability, and an optional token the caller can use to abandon the work.
#[derive(Clone, Copy)]
pub struct TransitionContext<'a> {
    pub spec: &'a ChainSpec,
    pub verifier: &'a dyn SignatureVerifier,
    cancellation: Option<&'a CancellationToken>,
}

impl<'a> TransitionContext<'a> {
    pub fn new(spec: &'a ChainSpec, verifier: &'a dyn SignatureVerifier) -> Self {
        Self {
            spec,
            verifier,
            cancellation: None,
        }
    }

    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Returns `Err(Cancelled)` once the caller has cancelled the token.
    pub fn check_cancelled(&self) -> Result<(), Cancelled> {
        match self.cancellation {
            Some(token) if token.is_cancelled() => {
                warn!("State transition cancelled");
                Err(Cancelled)
            }
            _ => Ok(()),
        }
    }

    /// Cancellation check for per-validator loops, only consulting the token every
    /// `CANCELLATION_CHECK_INTERVAL` iterations.
    pub fn check_cancelled_at(&self, iteration: usize) -> Result<(), Cancelled> {
        if iteration % ember_consensus_misc::constants::CANCELLATION_CHECK_INTERVAL == 0 {
            self.check_cancelled()
        } else {
            Ok(())
        }
    }
}
