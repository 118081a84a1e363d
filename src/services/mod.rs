//! Service layer module
//!
//! Contains the channel router

pub mod router;

pub use router::{ChannelRouter, RoutedChannel};
