//! Small string and filesystem helpers used by every layer

pub mod disk;
pub mod format;
pub mod size;
pub mod url;

pub use disk::{available_space, ensure_free_space, ensure_within_quota};
pub use format::{detect_format, detect_formats_from_files};
pub use size::{
    SizeConstraint, SizeOperator, format_bytes, format_number, parse_params, parse_size,
};
pub use url::{is_url, parse_model_url, resolve_model_reference, validate_url};
