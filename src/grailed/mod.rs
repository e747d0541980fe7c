pub mod config;
pub mod messages;
pub mod search;
pub mod session;

pub use messages::{MessagesClient, Messenger};
pub use search::{ListingSource, SearchClient, fetch_all};
pub use session::{SessionError, SessionManager, SessionProvider};
