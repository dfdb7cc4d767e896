pub mod runner;
pub mod war_archiver;
pub mod building_monitor;
