//! Agent event-stream handling.
//!
//! The agent writes one JSON record per line to stdout. [`parser`] decodes
//! them into [`event::Event`]s, [`process`] folds each event into the
//! iteration stats and renders it through [`render`] in the same pass.

pub mod event;
pub mod parser;
pub mod process;
pub mod render;

pub use event::{ContentBlock, Event, Message, TaskHints, ToolUseResult, Usage};
pub use parser::{EventParser, LineTooLongError, MAX_LINE_BYTES};
pub use process::{fold_event, process_stream};
pub use render::{Transcript, extract_param, format_tokens};
