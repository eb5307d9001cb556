//! Domain layer - Core business logic
//! 
//! This layer contains:
//! - Entities: Core business objects (User, Message, Command)
//! - Traits: Abstractions for infrastructure (Bot)
//! - Resolver: Exact and fuzzy command lookup
//! - Ratelimit: Per-user and global admission control

pub mod entities;
pub mod traits;
pub mod resolver;
pub mod ratelimit;
