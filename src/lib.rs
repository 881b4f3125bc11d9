// Export modules for library usage
pub mod bytecode;
pub mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod io;
pub mod narrowing;
pub mod testkit;

// Re-export commonly used types
pub use crate::bytecode::{ClassListing, Instruction, MethodBody, Op, SymbolicStack};
pub use crate::core::{Address, Error, Finding, Result, Slot};
pub use crate::io::output::{create_writer, AnalysisReport, OutputFormat, OutputWriter};
pub use crate::narrowing::{
    analyze_listing, analyze_method, LocalMetadata, OperandStack, RiskPolicy,
    ScopeNarrowingDetector,
};
