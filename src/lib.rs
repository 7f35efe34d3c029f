pub mod cache;
pub mod config;
pub mod drive;
pub mod extract;
pub mod locate;
pub mod pipeline;
pub mod report;

pub mod util {
    pub mod env;
}

pub use config::RelinkConfig;
pub use pipeline::{RecordContext, RelinkMode, RelinkPipeline, RelinkStats};
