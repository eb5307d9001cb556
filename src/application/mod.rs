//! Application layer - Use cases and business logic
//! 
//! This layer contains:
//! - Services: Chat completion gating and the receive/reply loop
//! - Errors: Domain-specific errors
//! - Messaging: Message parsing and dispatching

pub mod errors;
pub mod services;
pub mod messaging;
