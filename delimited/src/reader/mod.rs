//! Streaming reader turning a delimited byte source into processed rows.
//!
//! [`LineTokenizer`] assembles physical lines from byte chunks, [`DelimitedReader`] turns them
//! into rows and feeds a dispatch buffer, and the completion notification reports when every
//! produced row has been processed.

mod completion;
mod delimited;
mod tokenizer;

pub use completion::{COMPLETED_MESSAGE, CompletionRx, ProcessCompleted};
pub use delimited::{DelimitedReader, ProcessSummary, ReaderPhase};
pub use tokenizer::{LineKind, LineTokenizer, TokenizedLine, TokenizerState};
