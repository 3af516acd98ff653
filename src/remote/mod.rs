//! Remote-store integration layer: connectivity tracking and live-feed plumbing.

pub mod connectivity;
pub mod live_feed;
