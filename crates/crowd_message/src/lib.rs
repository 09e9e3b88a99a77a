//! Parsing and encoding for the line-oriented Twitch chat protocol.

mod tags;
pub use tags::Tags;

mod privileges;
pub use privileges::Privileges;

mod message;
pub use message::{Message, Scope};

mod line;
pub use line::{Line, Membership, MembershipKind};

pub mod encode;

/// Every command token starts with this.
pub const LEADER: char = '!';
