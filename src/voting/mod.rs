//! Poll lifecycle, ballot casting, and result tallies.

pub mod ballot_box;
pub mod polls;
pub mod results;

pub use ballot_box::{BallotBox, VoteRequest, VoteStatus};
pub use polls::{PollService, PollUpdate};
pub use results::{OptionTally, PollResults};
