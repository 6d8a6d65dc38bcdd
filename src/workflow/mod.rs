pub mod fragment_ctx;
pub mod fragment_flow;

pub use fragment_ctx::FragmentCtx;
pub use fragment_flow::{FragmentFlow, RetryPolicy};
