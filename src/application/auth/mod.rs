//! Authentication use cases
//!
//! Each use case turns raw request input into domain values, bounds the
//! work with a deadline and calls the `AuthService`.

mod login_user;
mod logout_all_devices;
mod logout_user;
mod refresh_session;

pub use login_user::{LoginUserCommand, LoginUserResponse, LoginUserUseCase};
pub use logout_all_devices::{LogoutAllDevicesResponse, LogoutAllDevicesUseCase};
pub use logout_user::LogoutUserUseCase;
pub use refresh_session::{RefreshSessionResponse, RefreshSessionUseCase};
