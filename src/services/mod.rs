pub mod appeals;
pub mod arrival;
pub mod escrow;
pub mod lifecycle;
pub mod locks;
pub mod no_show;
pub mod notify;
pub mod payments;
pub mod settings;
pub mod sweeper;
pub mod time_tracking;
