pub mod comment;
pub mod prefs;
pub mod session;
pub mod user;

pub use comment::*;
pub use prefs::*;
pub use session::*;
pub use user::*;
