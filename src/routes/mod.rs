mod auth;
mod confirmation;
mod health_check;
mod users;

pub use auth::{list_token_lineage, login, logout, register, rotate_token, validate_token};
pub use confirmation::{confirm_email, resend_confirmation, send_confirmation_email};
pub use health_check::{health_check, welcome};
pub use users::{get_current_user, get_profile, list_users, update_profile};
