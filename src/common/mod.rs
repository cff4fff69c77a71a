//! Small ambient helpers shared across components.
//!
//! Everything domain-specific (ABI selectors, math, gas tuning) moved to
//! the purpose-built modules that actually need it ([`crate::calldata`],
//! [`crate::quote`]); what's left here is genuinely cross-cutting.

pub mod time;
pub mod validation;
