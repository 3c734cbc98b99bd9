pub mod commute;
pub mod dead_branch;
pub mod inline;
pub mod pipeline;
pub mod tag_inline;

pub use commute::{commute_pushes, CommuteStats};
pub use dead_branch::eliminate_dead_branches;
pub use inline::{inline_blocks, InlineStats};
pub use pipeline::{refresh_case_tag_flags, Pass, Pipeline, Settings};
pub use tag_inline::inline_tags;
