// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 KSI Contributors

//! Declarative routing: condition grammar, mapping template grammar, and
//! the apply-rule algorithm that ties them together.

pub mod condition;
pub mod engine;
pub mod functions;
pub mod template;

pub use condition::ConditionError;
pub use engine::{compile, validate_registration, ApplyOutcome, CompiledTransformer, EngineError};
pub use template::{Template, TemplateError};
