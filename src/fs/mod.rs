pub mod coalesce;
pub mod tree;
pub mod watcher;
