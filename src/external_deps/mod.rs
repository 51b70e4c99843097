//! Integrations that rely on third-party services.
//!
//! Currently captcha provider adapters, kept behind a vendor-agnostic trait
//! so the browser strategy never sees vendor details.

pub mod captcha;
