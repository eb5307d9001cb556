//! Message handling - Parsing and dispatching

pub mod dispatcher;
pub mod parser;

pub use dispatcher::EventDispatcher;
pub use parser::MessageParser;
