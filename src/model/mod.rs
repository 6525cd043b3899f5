//! Record types and their validation rules.

pub mod organizer;
pub mod origin;
pub mod poll;
pub mod vote;
pub mod voter;

pub use organizer::{NewOrganizer, Organizer, OrganizerCore};
pub use origin::RequestOrigin;
pub use poll::{Poll, PollCore, PollOption, PollSpec, PollStatus};
pub use vote::{Vote, VoteCore};
pub use voter::{validate_cnic, validate_email, NewVoter, Voter, VoterCore};
