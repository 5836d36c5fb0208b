//! Live adapters that call the real provider APIs.

pub mod chat;
pub mod replicate;
pub mod upstash;
pub mod vercel_blob;
