//! HTTP request handlers.
//!
//! Handlers are grouped by service:
//! - `webhook` - purchase events from the payment provider
//! - `upload` - the browser upload form and multipart intake
//! - `health` - health probes shared by both services
//!
//! Failures are logged with their error code and answered in plain text.

pub mod health;
pub mod upload;
pub mod webhook;

pub use health::{upload_health, webhook_health};
pub use upload::{upload_fallback, upload_file, upload_form};
pub use webhook::stripe_webhook;
