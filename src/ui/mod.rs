pub mod details;
pub mod jobs;
pub mod library;
pub mod search;
pub mod widgets;

pub use details::render_details_view;
pub use jobs::render_jobs_view;
pub use library::render_library_view;
pub use search::render_search_view;
