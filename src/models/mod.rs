pub mod event;
pub mod player;
pub mod status;
pub mod tag;
pub mod tracker;
pub mod war;
