pub mod models {
    pub mod kasa;
}

pub mod client;
pub mod config;
pub mod device;
pub mod error;
pub mod setup;
pub mod switch;
pub mod transport;
pub mod services {
    pub mod poll;
}
