//! Tool-call and thinking overlay recovered from plain upstream text.

pub mod invoke;
pub mod parser;

pub use invoke::{coerce_parameter_value, extract_invoke, InvokeCall, InvokeError};
pub use parser::{
    strip_leading_artifact, ParseMode, ParserEvent, ToolifyParser, TEXT_FLUSH_THRESHOLD,
    THINKING_END_TAG, THINKING_START_TAG,
};
