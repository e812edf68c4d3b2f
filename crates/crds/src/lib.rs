//! Webserver Operator CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the webserver operator.

pub mod condition;
pub mod webserver;

pub use condition::*;
pub use webserver::*;
