pub mod loader;

pub use loader::{DataLoadError, Format, load_match_config, load_match_dir};
