pub mod invite;
pub mod user;

pub use invite::RoleInvite;
pub use user::User;
