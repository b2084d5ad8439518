pub mod flow;
pub mod login;
pub mod store;

pub use flow::{RequestContext, StepUpFlow};
pub use login::AdminLoginFlow;
pub use store::{CodeSubject, VerificationCodeStore};

use rand::Rng;

pub const CODE_LENGTH: usize = 6;

/// Random six digit code without a leading zero.
pub fn generate_code() -> String {
    rand::rng().random_range(100_000..1_000_000u32).to_string()
}

/// Text sent out-of-band with a freshly issued code.
pub fn code_message(code: &str, expires_at: i64) -> String {
    let minutes = ((expires_at - crate::db::now_unix()).max(0) + 59) / 60;
    format!("Your verification code is: {code}\nThis code will expire in {minutes} minutes.")
}

/// True when `code` has the shape of an issued code.
pub fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}
