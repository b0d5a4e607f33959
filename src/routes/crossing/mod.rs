mod handler;
pub mod model;

pub use handler::{
    check_crossed_paths_unlock, get_cross_path_history, get_crossed_paths,
    get_crossed_paths_count,
};
