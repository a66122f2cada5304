// Herald Infrastructure - Outbound Delivery
// Implements: PushChannel (FCM HTTP v1), EmailChannel (SMTP)

mod email;
mod fcm;
mod template;

pub use email::{SmtpConfig, SmtpEmailChannel, RESET_SUBJECT};
pub use fcm::{FcmConfig, FcmPushChannel, DEFAULT_FCM_ENDPOINT};
pub use template::{escape_html, render_password_reset};
