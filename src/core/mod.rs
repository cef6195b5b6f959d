/*!
 * Core Module
 * Shared scalar types
 */

pub mod types;

pub use types::*;
