pub mod builder;
pub mod classify;
pub mod context;
pub mod llm;
pub mod queue;
pub mod router;
pub mod worker;

pub use builder::{BuildOutcome, RequestBuilder};
pub use classify::{classify, HeuristicStrategy, IntentStrategy, ModelStrategy, OffStrategy};
pub use context::ContextStore;
pub use llm::{BuildClientError, GenerationClient, HttpGenerationClient};
pub use queue::{dispatch_channel, DispatchQueue, DispatchReceiver};
pub use router::{ResponseRouter, Transport};
pub use worker::{RetryPolicy, WorkerPool};
