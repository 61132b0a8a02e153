//! Subscriber half of the session protocol: a guarded local projection and the actor that
//! keeps it current from the bus and the direct channel.

pub mod follower;
pub mod projection;

pub use follower::{FollowerUpdate, SessionFollower};
pub use projection::{ApplyOutcome, ProjectionStatus, SessionProjection, Viewer};
