use std::future::Future;

use crate::{
    runtime::{RuntimeContext, RuntimeContextExt},
    setup_logging,
};

/// The terminal value of a node, reported to the log when the node stops.
pub trait NodeResult: Send + 'static {
    fn finish(self, context: RuntimeContext);
}

impl NodeResult for () {
    fn finish(self, context: RuntimeContext) {
        setup_logging!(context);
        info!("Node finished successfully.");
    }
}

impl<T: NodeResult, E: std::fmt::Debug + Send + 'static> NodeResult for Result<T, E> {
    fn finish(self, context: RuntimeContext) {
        setup_logging!(context);
        match self {
            Ok(result) => result.finish(context),
            Err(err) => error!("Node finished with error: {err:?}"),
        }
    }
}

/// A node whose body is blocking code, run on its own persistent thread.
pub trait SyncNode {
    type Result: NodeResult;

    fn run(self, context: RuntimeContext) -> Self::Result;

    fn spawn(self, context: RuntimeContext)
    where
        Self: Sized + Send + 'static,
    {
        context.clone().spawn_persistent_sync(move || {
            let result = self.run(context.clone());
            result.finish(context);
        });
    }
}

/// A node whose body is asynchronous, run as a tracked tokio task.
pub trait AsyncNode {
    type Result: NodeResult;

    fn run(self, context: RuntimeContext) -> impl Future<Output = Self::Result> + Send + 'static;

    fn spawn(self, context: RuntimeContext)
    where
        Self: Sized + Send + 'static,
    {
        context.clone().spawn_persistent_async(async move {
            let result = self.run(context.clone()).await;
            result.finish(context);
        });
    }
}
