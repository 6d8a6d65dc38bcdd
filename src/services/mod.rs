pub mod matching;
pub mod normalizer;
pub mod paraphrase_service;
pub mod progress;
pub mod replacer;
pub mod rewrite_engine;

pub use matching::{ActualSpan, FragmentMatch, FragmentQuery, MatchChain, MatchStrategy};
pub use normalizer::{normalize, NormalizedText};
pub use paraphrase_service::{OpenAiParaphraser, Paraphraser};
pub use progress::{NullProgressSink, ProgressSink, TracingProgressSink};
pub use replacer::{FormattingPreservingReplacer, ReplaceMode};
pub use rewrite_engine::{DocumentRewriteEngine, RewriteOutput, RewriteReport};
