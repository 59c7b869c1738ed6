pub mod feed;
pub mod navigation;
pub mod projection;
