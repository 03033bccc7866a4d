//! The seam through which external collaborators run inside a tick.
//!
//! Genetic evolution, disease cycles, economies and other long-running
//! systems plug into the orchestrator as [`Subsystem`]s. Each registered
//! subsystem runs once per tick, in registration order, after the environment
//! update and before the second scheduler drain. Events a subsystem publishes
//! are therefore delivered within the same tick.
//!
//! A failing subsystem does not abort the tick: the orchestrator logs the
//! [`SubsystemError`] and moves on to the next one.

use futures::future::BoxFuture;

use crate::world::World;

/// Errors a subsystem can report for one tick.
#[derive(Debug, thiserror::Error)]
pub enum SubsystemError {
    /// The subsystem reported a failure.
    #[error("subsystem failed: {message}")]
    Failed {
        /// Description of the failure.
        message: String,
    },

    /// The subsystem propagated an underlying error.
    #[error(transparent)]
    Source(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl SubsystemError {
    /// Build a [`SubsystemError::Failed`] from any displayable message.
    pub fn msg(message: impl core::fmt::Display) -> Self {
        Self::Failed {
            message: message.to_string(),
        }
    }
}

/// A collaborator that runs once per tick.
///
/// `run` receives the world by shared reference. Field access goes through
/// [`World::with_field`] and [`World::with_field_mut`], and events through
/// [`World::scheduler`]; neither holds a lock across an await.
pub trait Subsystem: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &str;

    /// Run this subsystem's work for `tick`.
    ///
    /// # Errors
    ///
    /// Returns [`SubsystemError`] if this tick's work failed. The tick
    /// continues regardless.
    fn run<'a>(&'a self, world: &'a World, tick: u64) -> BoxFuture<'a, Result<(), SubsystemError>>;
}
