mod logline;
mod markers;
mod parser;
mod redact;
mod render;
mod schema;

pub use logline::{parse_timestamped_log_line, timestamped_line};
pub use markers::{Marker, extract_markers};
pub use parser::{MAX_LINE_BYTES, ResultSummary, StreamRecord, parse_line};
pub use redact::{DEFAULT_CRED_PREFIX, Redactor};
pub use render::{html_class, render_html, render_plain, strip_ansi, wrap_html};
