use std::{future::Future, time::Duration};

use async_trait::async_trait;

use crate::{error::PipelineError, types::CycleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleContext {
    pub cycle: CycleId,
    pub period: Duration,
}

/// One unit of work executed per driver cycle.
#[async_trait]
pub trait LoopWork: Send {
    async fn run_cycle(&mut self, ctx: CycleContext) -> Result<(), PipelineError>;

    /// Called once after the driver observes cancellation.
    async fn on_shutdown(&mut self) {}
}

/// Adapts an async closure into a [`LoopWork`].
pub struct FnWork<F> {
    f: F,
}

impl<F> FnWork<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> LoopWork for FnWork<F>
where
    F: FnMut(CycleContext) -> Fut + Send,
    Fut: Future<Output = Result<(), PipelineError>> + Send,
{
    async fn run_cycle(&mut self, ctx: CycleContext) -> Result<(), PipelineError> {
        (self.f)(ctx).await
    }
}

#[async_trait]
impl LoopWork for Box<dyn LoopWork> {
    async fn run_cycle(&mut self, ctx: CycleContext) -> Result<(), PipelineError> {
        (**self).run_cycle(ctx).await
    }

    async fn on_shutdown(&mut self) {
        (**self).on_shutdown().await
    }
}
