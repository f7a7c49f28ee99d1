pub mod client;

pub use client::{FetchError, TheSportsClient};
