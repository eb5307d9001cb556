//! ole-bot: a chat front end for a language model with typo-tolerant
//! command lookup and per-user admission control.

pub mod application;
pub mod domain;
pub mod infrastructure;
