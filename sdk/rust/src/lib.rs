//! Client for the config mirror admin API.

mod client;

pub use client::{ConfigUnit, DatacenterConfig, MirrorClient};
