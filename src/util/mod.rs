mod format;
mod path;

pub use format::{format_delta, format_size, format_timestamp, unix_now};
pub use path::{base_name, is_within, normalize, path_key};
