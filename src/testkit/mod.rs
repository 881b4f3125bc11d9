//! Testing infrastructure for narrowscope.
//!
//! Hand-numbering instruction addresses makes tests brittle: inserting one
//! instruction shifts every target after it. [`MethodBuilder`] lays out
//! instructions with realistic widths and resolves branch, switch, exception
//! and local variable references through named labels.
//!
//! # Quick Start
//!
//! ```rust
//! use narrowscope::narrowing::{analyze_method, RiskPolicy};
//! use narrowscope::testkit::MethodBuilder;
//!
//! // int v = 7; if (flag) { use(v); }
//! let method = MethodBuilder::new("run", "(Z)V")
//!     .const_int(7)
//!     .store(1)
//!     .label("v")
//!     .load(0)
//!     .if_false("end")
//!     .load(1)
//!     .other(1, 0)
//!     .label("end")
//!     .return_void()
//!     .local(1, "v", "I", "v", "end")
//!     .build();
//!
//! let findings = analyze_method(&method, &RiskPolicy::default()).unwrap();
//! assert_eq!(findings.len(), 1);
//! ```

pub mod builder;

pub use builder::MethodBuilder;
