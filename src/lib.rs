pub mod capture;
pub mod config;
pub mod demo_signal;
pub mod frame;
pub mod inference_loop;
pub mod loader;
pub mod panel;
pub mod ranking;
pub mod render;
pub mod session;
pub mod skeleton;
