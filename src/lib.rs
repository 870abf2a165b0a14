//! plancheck - scenario-driven validation for infrastructure-as-code plans
//!
//! This library drives an external provisioning tool (Terraform, OpenTofu)
//! through init, plan, apply and destroy, and asserts on what it prints.

pub mod assertions;
pub mod cli;
pub mod commands;
pub mod common;
pub mod invoker;
pub mod scenario;

// Re-export commonly used types for tests
pub use assertions::{evaluate, AssertionRule, Pattern, Violation};
pub use common::{Error, Result};
pub use invoker::{ExecutionResult, PlanInvoker, ToolCommand};
pub use scenario::{ExecutionMode, ScenarioConfig, ScenarioReport};
